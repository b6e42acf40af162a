//! Tracing setup for the `admin-agent` binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::inference::config::{expand_tilde, LogFormat, LoggingConfig};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "admin_agent=info,warn";

/// Log file name inside `logging.log_dir`.
const LOG_FILE_NAME: &str = "agent.log";

/// Rotated log files kept next to the live one.
const KEEP_ROTATED: u32 = 3;

/// Install the global subscriber.
///
/// Logs go to stderr (stdout carries the response JSON), or to
/// `<log_dir>/agent.log` when a log directory is configured. The file is
/// rotated on every start (agent.log → .1 → .2 → .3).
pub fn init_tracing(config: &LoggingConfig) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    let log_path = match &config.log_dir {
        Some(dir) => {
            let dir = PathBuf::from(expand_tilde(dir));
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(LOG_FILE_NAME);
            rotate_log_file(&path, KEEP_ROTATED);
            Some(path)
        }
        None => None,
    };

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    // `try_init` fails when a subscriber is already set (tests); that is fine.
    match (&log_path, config.format) {
        (Some(path), LogFormat::Json) => {
            let _ = builder
                .json()
                .with_ansi(false)
                .with_writer(FlushingWriter::open(path)?)
                .try_init();
        }
        (Some(path), LogFormat::Text) => {
            let _ = builder
                .with_ansi(false)
                .with_writer(FlushingWriter::open(path)?)
                .try_init();
        }
        (None, LogFormat::Json) => {
            let _ = builder.json().with_writer(std::io::stderr).try_init();
        }
        (None, LogFormat::Text) => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?log_path,
        pid = std::process::id(),
        "admin-agent starting"
    );
    Ok(())
}

/// Stderr subscriber for the work done before the config is known.
///
/// Use it with `tracing::subscriber::with_default` around config loading so
/// warnings about the config file itself are not lost; `init_tracing` then
/// installs the configured global subscriber.
pub fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Rotate log files: `agent.log` → `agent.log.1` → `.2` → … → `.{keep}`.
///
/// The oldest file beyond `keep` is deleted. Missing files are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let _ = std::fs::remove_file(format!("{}.{keep}", base_path.display()));

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let _ = std::fs::rename(base_path, format!("{}.1", base_path.display()));
    }
}

/// File writer that flushes after every write, so each log line reaches
/// disk even if the process is killed.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn open(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = f.write(buf)?;
        f.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        f.flush()
    }
}

impl<'a> fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_keeps_three() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join(LOG_FILE_NAME);

        for generation in 0..5 {
            std::fs::write(&log, format!("gen {generation}")).unwrap();
            rotate_log_file(&log, KEEP_ROTATED);
        }

        assert!(!log.exists());
        let read = |suffix: u32| {
            std::fs::read_to_string(format!("{}.{suffix}", log.display())).unwrap()
        };
        assert_eq!(read(1), "gen 4");
        assert_eq!(read(2), "gen 3");
        assert_eq!(read(3), "gen 2");
        assert!(!PathBuf::from(format!("{}.4", log.display())).exists());
    }

    #[test]
    fn test_flushing_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.log");
        let mut writer = FlushingWriter::open(&path).unwrap();
        writer.write_all(b"one\n").unwrap();
        writer.clone().write_all(b"two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_bootstrap_subscriber_enables_warnings() {
        let enabled = tracing::subscriber::with_default(bootstrap_subscriber(), || {
            tracing::enabled!(tracing::Level::WARN)
        });
        assert!(enabled);
    }

    #[test]
    fn test_init_with_log_dir_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            format: LogFormat::Json,
            filter: Some("admin_agent=debug".into()),
            log_dir: Some(dir.path().join("logs").display().to_string()),
        };
        init_tracing(&config).unwrap();
        assert!(dir.path().join("logs").join(LOG_FILE_NAME).exists());
    }
}
