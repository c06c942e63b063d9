//! Stack trace rendering
//!
//! The folded format is the input of `flamegraph.pl`, `inferno` and
//! speedscope: one line per sample, frame labels joined with `;`, then a
//! space and the sample weight.
//!
//! ```text
//! default_idle;do_idle;cpu_startup_entry 1
//! ```
//!
//! Frames are emitted in walk order (index 0, the innermost caller, first).
//! Every record carries weight 1; aggregation across samples is left to the
//! downstream tool. Labels are written verbatim, and a sample with no frames
//! still produces a record (` 1` folded, a bare header in human format).

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::profiling::StackTrace;

/// Output record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Indexed block per sample
    Human,
    /// Folded stacks, one line per sample
    #[default]
    #[value(alias = "folded")]
    Flamegraph,
}

/// Weight of a single sample in folded output
const SAMPLE_WEIGHT: u32 = 1;

/// Render one completed trace as it is written to the output stream
#[must_use]
pub fn format_trace(trace: StackTrace<'_>, format: OutputFormat) -> String {
    let mut out = String::new();
    match format {
        OutputFormat::Human => {
            out.push_str("Stack trace:\n");
            for (i, frame) in trace.iter().enumerate() {
                let _ = writeln!(out, "{i:2}: {} (0x{:x})", frame.symbol(), frame.return_address);
            }
            out.push('\n');
        }
        OutputFormat::Flamegraph => {
            for (i, frame) in trace.iter().enumerate() {
                if i > 0 {
                    out.push(';');
                }
                out.push_str(frame.symbol());
            }
            let _ = writeln!(out, " {SAMPLE_WEIGHT}");
        }
    }
    out
}

/// Writes one formatted record per sample
///
/// Each record is rendered in full before it reaches the underlying writer,
/// so a failed sample never leaves a partial line behind.
pub struct TraceWriter<W: Write> {
    inner: W,
    format: OutputFormat,
    records: u64,
}

impl TraceWriter<BufWriter<File>> {
    /// Create (or truncate) the output file
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), format))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W, format: OutputFormat) -> Self {
        Self { inner, format, records: 0 }
    }

    /// Append one trace record
    ///
    /// # Errors
    /// Propagates write errors from the underlying stream.
    pub fn write_trace(&mut self, trace: StackTrace<'_>) -> io::Result<()> {
        let record = format_trace(trace, self.format);
        self.inner.write_all(record.as_bytes())?;
        self.records += 1;
        Ok(())
    }

    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// # Errors
    /// Propagates flush errors from the underlying stream.
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GuestVirtAddr;
    use crate::profiling::StackFrame;

    fn frame(label: &str, ra: u64) -> StackFrame {
        StackFrame {
            frame_pointer: GuestVirtAddr(0xffff_c900_0001_3e00),
            return_address: GuestVirtAddr(ra),
            label: Some(label.to_string()),
        }
    }

    fn sample() -> Vec<StackFrame> {
        vec![
            frame("foo", 0xffff_ffff_8100_1100),
            frame("bar", 0xffff_ffff_8100_2200),
            frame("main", 0xffff_ffff_8100_3300),
        ]
    }

    #[test]
    fn test_folded_line() {
        let out = format_trace(&sample(), OutputFormat::Flamegraph);
        assert_eq!(out, "foo;bar;main 1\n");
        assert_eq!(out.lines().collect::<Vec<_>>(), ["foo;bar;main 1"]);
    }

    #[test]
    fn test_human_block() {
        let out = format_trace(&sample(), OutputFormat::Human);
        assert_eq!(
            out,
            "Stack trace:\n \
             0: foo (0xffffffff81001100)\n \
             1: bar (0xffffffff81002200)\n \
             2: main (0xffffffff81003300)\n\
             \n"
        );
    }

    #[test]
    fn test_folded_labels_are_verbatim() {
        let out = format_trace(&[frame("a;b", 0x10)], OutputFormat::Flamegraph);
        assert_eq!(out, "a;b 1\n");

        let trace = [frame("<[u8; 4] as core::fmt::Debug>::fmt", 0x10), frame("main", 0x20)];
        let out = format_trace(&trace, OutputFormat::Flamegraph);
        assert_eq!(out, "<[u8; 4] as core::fmt::Debug>::fmt;main 1\n");
    }

    #[test]
    fn test_empty_trace_formats() {
        assert_eq!(format_trace(&[], OutputFormat::Flamegraph), " 1\n");
        assert_eq!(format_trace(&[], OutputFormat::Human), "Stack trace:\n\n");
    }

    #[test]
    fn test_writer_appends_one_record_per_trace() {
        let mut writer = TraceWriter::new(Vec::new(), OutputFormat::Flamegraph);
        writer.write_trace(&sample()).unwrap();
        writer.write_trace(&sample()[1..]).unwrap();
        assert_eq!(writer.records(), 2);

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "foo;bar;main 1\nbar;main 1\n");
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.trace");
        std::fs::write(&path, "stale contents\n").unwrap();

        let mut writer = TraceWriter::create(&path, OutputFormat::Flamegraph).unwrap();
        writer.write_trace(&sample()[2..]).unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "main 1\n");
    }
}
