use std::{
    io::{BufRead as _, BufReader},
    path::{Path, PathBuf},
    process::Stdio,
    sync::mpsc,
    time::Duration,
};

use tracing::{error, info};

use crate::{
    models::config::BuildConfig,
    utils::{
        dir::DirUtils,
        errors::{ResultTrait as _, ResultWithError},
        file_logger::FileLogger,
        gpu::GpuUtils,
        shlex::ShlexUtils,
    },
};

/// Result of trying to start the background native-extension build.
pub enum BuildLaunch {
    Started(BuildHandle),
    Skipped(String),
}

/// How the build ended, as observed at the join point.
pub enum BuildOutcome {
    Completed(i32),
    /// Still running after the configured join timeout; left running.
    TimedOut(Duration),
    /// The monitor thread went away without reporting an exit status.
    Lost,
}

/// Handle to a build process running concurrently with the download step.
/// Output is tagged and forwarded to a dedicated log file as it arrives, so
/// build and download logging interleave safely.
pub struct BuildHandle {
    rx: mpsc::Receiver<i32>,
}

impl BuildHandle {
    pub fn join(self, timeout: Option<Duration>) -> BuildOutcome {
        match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(code) => BuildOutcome::Completed(code),
                Err(mpsc::RecvTimeoutError::Timeout) => BuildOutcome::TimedOut(timeout),
                Err(mpsc::RecvTimeoutError::Disconnected) => BuildOutcome::Lost,
            },
            None => match self.rx.recv() {
                Ok(code) => BuildOutcome::Completed(code),
                Err(_) => BuildOutcome::Lost,
            },
        }
    }
}

/// Starts the configured build as a detached concurrent task, unless the GPU
/// probe says the target hardware cannot use it.
pub fn spawn(
    config: &BuildConfig,
    workspace: &Path,
    logs_dir: &Path,
) -> ResultWithError<BuildLaunch> {
    if let Some(min_cap) = config.min_compute_cap {
        match GpuUtils::compute_capability() {
            None => {
                return Ok(BuildLaunch::Skipped(
                    "no GPU detected, skipping kernel build".into(),
                ));
            }
            Some(cap) if cap < min_cap => {
                return Ok(BuildLaunch::Skipped(format!(
                    "compute capability {cap} below required {min_cap}"
                )));
            }
            Some(cap) => info!("GPU compute capability {cap} satisfies {min_cap}"),
        }
    }

    let mut command = ShlexUtils::parse_command(&config.command)?;
    if let Some(cwd) = &config.cwd {
        command.current_dir(DirUtils::resolve(workspace, cwd));
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    info!("Starting background kernel build: {}", config.command);
    let mut child = command
        .spawn()
        .auto_err(&format!("Failed to start build: {}", config.command))?;

    if let Some(stdout) = child.stdout.take() {
        spawn_line_logger(stdout, logs_dir.to_path_buf(), config.log_name.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_logger(stderr, logs_dir.to_path_buf(), config.log_name.clone());
    }

    let (tx, rx) = mpsc::channel();
    let log_dir = logs_dir.to_path_buf();
    let log_name = config.log_name.clone();
    std::thread::spawn(move || {
        let logger = FileLogger::new(&log_dir, &log_name);
        match child.wait() {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                logger.log_tagged("build", &format!("exited with status {code}"));
                let _ = tx.send(code);
            }
            Err(e) => {
                error!("Failed to wait for build process: {e}");
                logger.log_tagged("build", &format!("wait failed: {e}"));
            }
        }
    });

    Ok(BuildLaunch::Started(BuildHandle { rx }))
}

fn spawn_line_logger(
    stream: impl std::io::Read + Send + 'static,
    log_dir: PathBuf,
    log_name: String,
) {
    std::thread::spawn(move || {
        let logger = FileLogger::new(&log_dir, &log_name);
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => logger.log_tagged("build", &line),
                Err(_) => break,
            }
        }
    });
}
