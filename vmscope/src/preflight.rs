//! Pre-flight checks for vmscope
//!
//! Validates the session's inputs before connecting to the guest, so that
//! bad paths fail fast with an actionable message instead of surfacing as
//! a socket error halfway through setup.

use anyhow::{bail, Result};
use log::warn;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use crate::cli::Args;

/// Run all pre-flight checks
pub fn run_preflight_checks(args: &Args) -> Result<()> {
    check_interval(args.interval);
    check_qmp_socket(&args.socket)?;
    if let Some(ref symbols) = args.symbols {
        check_symbols_file(symbols)?;
    }
    check_output_dir(&args.output)?;
    Ok(())
}

/// A zero interval is allowed but keeps the guest paused most of the time
fn check_interval(interval_ms: u64) -> bool {
    if interval_ms == 0 {
        warn!("sampling interval is 0 ms, the guest will spend most of the session paused");
        return false;
    }
    true
}

/// Check that the QMP endpoint exists and is a unix socket
fn check_qmp_socket(socket: &Path) -> Result<()> {
    let Ok(metadata) = std::fs::metadata(socket) else {
        bail!(
            "QMP socket not found: {}\n\n\
             Start QEMU with: -qmp unix:{},server,wait=off",
            socket.display(),
            socket.display()
        );
    };
    if !metadata.file_type().is_socket() {
        bail!(
            "Not a socket: {}\n\n\
             --socket must point to the guest's QMP unix socket.",
            socket.display()
        );
    }
    Ok(())
}

fn check_symbols_file(symbols: &Path) -> Result<()> {
    if !symbols.is_file() {
        bail!(
            "Symbol file not found: {}\n\n\
             Pass the guest's System.map, a copy of its /proc/kallsyms, or its ELF image.",
            symbols.display()
        );
    }
    Ok(())
}

/// Check that the output file can be created where requested
fn check_output_dir(output: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    if !parent.is_dir() {
        bail!("Output directory does not exist: {}", parent.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::ffi::OsStr;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_socket_not_found() {
        let err = check_qmp_socket(Path::new("/nonexistent/guest.qmp")).unwrap_err();
        assert!(err.to_string().contains("QMP socket not found"));
    }

    #[test]
    fn test_regular_file_is_not_a_socket() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = check_qmp_socket(file.path()).unwrap_err();
        assert!(err.to_string().contains("Not a socket"));
    }

    #[test]
    fn test_listening_socket_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guest.qmp");
        let _listener = UnixListener::bind(&path).unwrap();
        assert!(check_qmp_socket(&path).is_ok());
    }

    #[test]
    fn test_zero_interval_only_warns() {
        assert!(!check_interval(0));
        assert!(check_interval(1));

        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("guest.qmp");
        let _listener = UnixListener::bind(&socket).unwrap();
        let output = dir.path().join("out.trace");
        let args = Args::try_parse_from([
            OsStr::new("vmscope"),
            OsStr::new("-n"),
            OsStr::new("guest0"),
            OsStr::new("-s"),
            socket.as_os_str(),
            OsStr::new("-o"),
            output.as_os_str(),
            OsStr::new("-i"),
            OsStr::new("0"),
        ])
        .unwrap();
        assert_eq!(args.interval, 0);
        assert!(run_preflight_checks(&args).is_ok());
    }

    #[test]
    fn test_output_dir() {
        assert!(check_output_dir(Path::new("out.trace")).is_ok());
        assert!(check_output_dir(Path::new("/nonexistent/dir/out.trace")).is_err());
    }
}
