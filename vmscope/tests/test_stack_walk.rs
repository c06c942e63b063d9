mod common;

use common::{ScriptedGuest, DIRECT_MAP};
use vmscope::domain::VcpuId;
use vmscope::introspection::{AddressMode, Introspector};
use vmscope::profiling::{walk, StackBuffer, STACK_FRAME_LIMIT, UNKNOWN_SYMBOL};

/// Small deterministic generator so chains differ between cases
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

#[derive(Debug, Clone, Copy)]
enum Ending {
    Null,
    SelfLoop,
    BackEdge,
}

/// Build a chain of `depth` records ending as described; returns the guest
/// and the number of frames a correct walk emits
fn chain(depth: usize, ending: Ending) -> (ScriptedGuest, usize) {
    let mut guest = ScriptedGuest::default();
    let fp = |i: usize| DIRECT_MAP + 0x10_0000 + (i as u64) * 0x40;

    for i in 0..depth {
        let next = if i + 1 < depth {
            fp(i + 1)
        } else {
            match ending {
                Ending::Null => 0,
                Ending::SelfLoop => fp(i),
                Ending::BackEdge => fp(0),
            }
        };
        guest.memory.insert(fp(i), next);
        guest.memory.insert(fp(i) + 8, 0xffff_ffff_8100_0000 + i as u64);
    }
    guest.rbp = if depth == 0 { 0 } else { fp(0) };

    let expected = match ending {
        // the last record's link terminates the walk, so it is not emitted
        Ending::Null | Ending::SelfLoop => depth.saturating_sub(1),
        // a one-record back edge is a self loop
        Ending::BackEdge if depth == 1 => 0,
        Ending::BackEdge => STACK_FRAME_LIMIT,
    };
    (guest, expected.min(STACK_FRAME_LIMIT))
}

#[test]
fn test_trace_length_never_exceeds_limit() {
    let mut rng = Lcg(0x5eed);
    let mut buffer = StackBuffer::new();

    for case in 0..200 {
        let depth = 1 + (rng.next() % 80) as usize;
        let ending = match rng.next() % 3 {
            0 => Ending::Null,
            1 => Ending::SelfLoop,
            _ => Ending::BackEdge,
        };
        let (mut guest, expected) = chain(depth, ending);
        guest.pause().unwrap();

        let mode = if case % 2 == 0 { AddressMode::Virtual } else { AddressMode::Physical };
        let trace = walk(&mut buffer, &mut guest, VcpuId(0), mode, false).unwrap();
        assert!(trace.len() <= STACK_FRAME_LIMIT);
        assert_eq!(trace.len(), expected, "depth {depth}, {ending:?}");
        assert!(trace.iter().all(|f| f.symbol() == UNKNOWN_SYMBOL));
    }
}

#[test]
fn test_zero_base_pointer_is_empty() {
    let (mut guest, expected) = chain(0, Ending::Null);
    guest.pause().unwrap();
    let mut buffer = StackBuffer::new();
    let trace = walk(&mut buffer, &mut guest, VcpuId(0), AddressMode::Virtual, false).unwrap();
    assert_eq!(expected, 0);
    assert!(trace.is_empty());
}

#[test]
fn test_self_loop_and_null_link_add_no_phantom_frame() {
    for ending in [Ending::Null, Ending::SelfLoop] {
        let (mut guest, _) = chain(4, ending);
        guest.pause().unwrap();
        let mut buffer = StackBuffer::new();
        let trace = walk(&mut buffer, &mut guest, VcpuId(0), AddressMode::Virtual, false).unwrap();

        assert_eq!(trace.len(), 3, "{ending:?}");
        assert_eq!(trace[2].return_address.0, 0xffff_ffff_8100_0002);
    }
}
