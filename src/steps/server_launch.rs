use std::fs;

use tracing::info;

use crate::{
    models::app_state::StepOutcome,
    steps::iface::{Step, StepContext, StepResult},
    utils::{command::CommandUtils, dir::DirUtils, errors::ResultTrait as _},
};

/// Launches the inference server as a persistent process detached from the
/// orchestrator's lifetime. The orchestrator records the PID and never waits.
pub struct StepServerLaunch {}

impl Step for StepServerLaunch {
    fn name(&self) -> &'static str {
        "server_launch"
    }

    fn run(&self, ctx: &StepContext) -> StepResult {
        let Some(server) = &ctx.config.server else {
            return Ok((StepOutcome::Skipped, "no server configured".into()));
        };

        let logs_dir = DirUtils::logs_dir(&ctx.config.workspace);
        fs::create_dir_all(&logs_dir)
            .auto_err(&format!("Failed to create {}", logs_dir.display()))?;
        let log_path = logs_dir.join(&server.log_name);

        let cwd = server
            .cwd
            .as_ref()
            .map(|dir| DirUtils::resolve(&ctx.config.workspace, dir));

        let pid = CommandUtils::spawn_detached(
            &server.command,
            &server.env,
            cwd.as_deref(),
            &log_path,
        )?;

        info!("🚀 Server started (pid {pid}), logging to {}", log_path.display());
        Ok((
            StepOutcome::Ok,
            format!("pid {pid}, log {}", log_path.display()),
        ))
    }
}
