//! Log output: compact lines on stderr, plus an optional size-rotated file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// A log file at least this large is rotated when the program starts.
pub const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Rotated generations kept next to the live file (`.1` is the newest).
pub const KEPT_LOGS: u32 = 3;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the stderr level. The file, when given, always
/// records debug and above without colours.
pub fn init(verbose: bool, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let log_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .with_filter(env_filter);

    let file = log_file
        .map(|path| {
            open_log(path).with_context(|| format!("Failed to open log file {}", path.display()))
        })
        .transpose()?;
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_filter(LevelFilter::DEBUG)
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    rotate(path, MAX_LOG_BYTES, KEPT_LOGS)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// Shift `path` to `path.1` once it reaches `max_bytes`, dropping the
/// generation past `keep`. Returns whether a rotation happened.
pub fn rotate(path: &Path, max_bytes: u64, keep: u32) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size < max_bytes {
        return Ok(false);
    }

    if keep == 0 {
        fs::remove_file(path)?;
        return Ok(true);
    }

    let oldest = generation(path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = generation(path, n);
        if from.exists() {
            fs::rename(&from, generation(path, n + 1))?;
        }
    }
    fs::rename(path, generation(path, 1))?;
    Ok(true)
}

fn generation(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}
