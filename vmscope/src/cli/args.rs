//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::VcpuId;
use crate::export::OutputFormat;
use crate::introspection::AddressMode;
use crate::profiling::SamplerConfig;

#[derive(Parser, Debug)]
#[command(
    name = "vmscope",
    version,
    about = "Sample guest call stacks of a QEMU/KVM virtual machine",
    after_help = "\
EXAMPLES:
    vmscope -n guest0 -s /run/guest0.qmp --symbols System.map
    vmscope -n guest0 -s /run/guest0.qmp -t 30 -o idle.folded
    vmscope -n guest0 -s /run/guest0.qmp -f human -v --vcpu 1

Start QEMU with `-name guest0 -qmp unix:/run/guest0.qmp,server,wait=off`.
Folded output feeds straight into flamegraph.pl or inferno-flamegraph."
)]
pub struct Args {
    /// Guest name, as given to QEMU with -name
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    pub vm_name: String,

    /// QMP socket of the guest
    #[arg(short, long, value_name = "PATH")]
    pub socket: PathBuf,

    /// Where to write sampled stacks (truncated on start)
    #[arg(short, long, value_name = "FILE", default_value = "out.trace")]
    pub output: PathBuf,

    /// Sampling interval in milliseconds
    #[arg(short, long, value_name = "MS", default_value = "10")]
    pub interval: u64,

    /// Stop after N seconds (0 = unlimited)
    #[arg(short, long, value_name = "SECS", default_value = "0")]
    pub timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Flamegraph)]
    pub format: OutputFormat,

    /// Read stack memory through virtual-to-physical translation
    #[arg(short = 'v', long = "vmem")]
    pub vmem: bool,

    /// Log every frame pointer and resolved symbol
    #[arg(short, long)]
    pub debug: bool,

    /// vCPU to sample
    #[arg(long, value_name = "N", default_value = "0")]
    pub vcpu: u32,

    /// Guest symbols: System.map / kallsyms text, or an ELF image
    #[arg(long, value_name = "FILE")]
    pub symbols: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(self.interval),
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            mode: AddressMode::from_vmem_flag(self.vmem),
            format: self.format,
            vcpu: VcpuId(self.vcpu),
            debug: self.debug,
        }
    }
}
