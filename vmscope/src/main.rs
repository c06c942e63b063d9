//! # vmscope - Main Entry Point
//!
//! Wires the session together: preflight checks, QMP connection, symbol
//! loading, termination triggers, then hands control to the sampler.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::time::Instant;

use vmscope::cli::Args;
use vmscope::export::TraceWriter;
use vmscope::introspection::{QemuMachine, QmpClient};
use vmscope::preflight::run_preflight_checks;
use vmscope::profiling::{arm_timeout, install_interrupt_handler, RunFlag, Sampler};
use vmscope::symbolization::load_symbols;

// Exit codes (usage errors exit with 2 from clap itself)
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    std::process::exit(match run(&args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run(args: &Args) -> Result<()> {
    run_preflight_checks(args)?;
    let config = args.sampler_config();

    let symbols = args
        .symbols
        .as_ref()
        .map(load_symbols)
        .transpose()
        .context("Failed to load guest symbols")?;
    if symbols.is_none() {
        warn!("no --symbols given, every frame will be labelled \"unknown\"");
    }

    let client = QmpClient::connect(&args.socket)
        .with_context(|| format!("Failed to connect to QMP socket {}", args.socket.display()))?;
    let mut machine = QemuMachine::new(client, config.vcpu);
    if let Some(symbols) = symbols {
        machine = machine.with_symbols(symbols);
    }

    match machine.guest_name().context("Failed to query guest name")? {
        Some(name) if name == args.vm_name => {}
        Some(name) => bail!(
            "QMP socket {} belongs to guest \"{name}\", not \"{}\"",
            args.socket.display(),
            args.vm_name
        ),
        None => bail!(
            "Guest behind {} has no name.\n\n\
             Start QEMU with: -name {}",
            args.socket.display(),
            args.vm_name
        ),
    }
    if !machine.is_running().context("Failed to query guest status")? {
        bail!(
            "Guest \"{}\" is paused.\n\n\
             vmscope resumes the guest after every sample; resume it first (QMP: cont).",
            args.vm_name
        );
    }

    let run_flag = RunFlag::new();
    install_interrupt_handler(&run_flag).context("Failed to install Ctrl+C handler")?;
    if let Some(timeout) = config.timeout {
        arm_timeout(&run_flag, timeout).context("Failed to start timeout timer")?;
    }

    let writer = TraceWriter::create(&args.output, config.format)
        .with_context(|| format!("Failed to create output file {}", args.output.display()))?;

    if !args.quiet {
        println!("vmscope v{}", env!("CARGO_PKG_VERSION"));
        println!("guest: {} (vcpu {})", args.vm_name, args.vcpu);
        println!("interval: {}ms", args.interval);
        println!("output: {}", args.output.display());
    }
    info!("sampling with {:?} address mode", config.mode);

    let started = Instant::now();
    let mut sampler = Sampler::new(&mut machine, writer, config, run_flag.clone());
    let stats = sampler.run()?;

    if !args.quiet {
        let reason = run_flag.stop_reason().map_or_else(|| "stopped".to_string(), |r| r.to_string());
        eprintln!(
            "\n{reason}: {:.1}s, {} samples (empty: {}, failed: {}, ticks: {})",
            started.elapsed().as_secs_f64(),
            stats.written,
            stats.empty,
            stats.failed,
            stats.ticks,
        );
    }

    Ok(())
}
