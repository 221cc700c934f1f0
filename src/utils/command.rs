use std::{collections::HashMap, fs::OpenOptions, path::Path, process::Stdio, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    models::app_state::CommandOutput,
    utils::{
        errors::{ResultTrait as _, ResultWithError},
        shlex::ShlexUtils,
    },
};

pub struct CommandUtils {}

impl CommandUtils {
    /// Runs a shell command to completion, capturing output. The working
    /// directory is always an explicit parameter; nothing in the orchestrator
    /// relies on ambient process cwd.
    pub fn run_command_str(cmd: &str, cwd: Option<&Path>) -> ResultWithError<CommandOutput> {
        let mut command = std::process::Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command.output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    /// Spawns a long-lived process detached from the orchestrator, with
    /// stdout/stderr redirected to a dedicated log file. Returns the PID;
    /// the child is never waited on.
    pub fn spawn_detached(
        command_line: &str,
        envs: &HashMap<String, String>,
        cwd: Option<&Path>,
        log_path: &Path,
    ) -> ResultWithError<u32> {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .auto_err(&format!("Failed to open log file {}", log_path.display()))?;
        let log_clone = log_file
            .try_clone()
            .auto_err("Failed to clone log file handle")?;

        let mut command = ShlexUtils::parse_command(command_line)?;
        command
            .envs(envs)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_clone));
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let child = command
            .spawn()
            .auto_err(&format!("Failed to spawn process: {command_line}"))?;
        Ok(child.id())
    }

    pub fn display_loader(msg: String) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠸", "⠴", "⠦", "⠇", "✔"]),
        );
        spinner.set_message(msg);
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}
