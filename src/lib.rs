pub mod inference;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Return the platform-standard data directory for the assistant.
///
/// - macOS: `~/Library/Application Support/circuit-assistant/`
/// - Windows: `{FOLDERID_RoamingAppData}\circuit-assistant\`
/// - Linux: `$XDG_DATA_HOME/circuit-assistant/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.circuit-assistant/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("circuit-assistant");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".circuit-assistant")
}

/// Initialize the tracing subscriber.
///
/// Logs go to `assistant.log` in [`data_dir`], rotating the previous three
/// files. When the log file cannot be opened, logs go to stderr instead.
/// Returns the log file path when file logging is active.
///
/// Calling this more than once is harmless; only the first call installs a
/// subscriber.
pub fn init_tracing() -> Option<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("circuit_assistant=info,warn"));

    let log_dir = data_dir();
    let log_path = log_dir.join("assistant.log");
    let log_file = std::fs::create_dir_all(&log_dir).and_then(|()| {
        rotate_log_file(&log_path, 3);
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
    });

    match log_file {
        Ok(file) => {
            let installed = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(FlushingWriter::new(file))
                .with_ansi(false)
                .with_target(true)
                .try_init()
                .is_ok();
            if installed {
                tracing::info!(
                    version = env!("CARGO_PKG_VERSION"),
                    log_file = %log_path.display(),
                    pid = std::process::id(),
                    "=== circuit-assistant starting ==="
                );
            }
            Some(log_path)
        }
        Err(e) => {
            let _ = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!(path = %log_path.display(), error = %e, "log file unavailable, logging to stderr");
            None
        }
    }
}

/// Rotate log files: `assistant.log` → `assistant.log.1` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A log writer that flushes after every write.
///
/// Without an explicit flush, lines can sit in OS buffers and be lost when the
/// host application crashes mid-stream. Log volume is a handful of lines per
/// request, so the extra syscall does not matter.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
