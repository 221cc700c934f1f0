use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::error;

use crate::utils::errors::EmptyResult;

/// Append-mode log file under an explicit directory. Both the orchestrator
/// and spawned processes write through instances of this, so every open is
/// append-only and every line is written whole.
pub struct FileLogger {
    log_path: PathBuf,
}

impl FileLogger {
    pub fn new(log_dir: &Path, file_name: &str) -> Self {
        if let Err(err) = create_dir_all(log_dir) {
            error!("Failed to create log directory: {}", err);
        }

        FileLogger {
            log_path: log_dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn log(&self, message: &str) {
        if let Err(err) = self._log(message) {
            error!(
                "Failed to write to log file {}: {}",
                self.log_path.display(),
                err
            );
        }
    }

    /// Same as `log` but prefixes every line with a `[tag]` marker so
    /// interleaved writers stay distinguishable.
    pub fn log_tagged(&self, tag: &str, message: &str) {
        self.log(&format!("[{tag}] {message}"));
    }

    fn _log(&self, message: &str) -> EmptyResult {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] {}", timestamp, message)?;
        Ok(())
    }
}
