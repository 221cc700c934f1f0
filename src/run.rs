use std::{
    fs,
    sync::{Arc, RwLock},
    time::Duration,
};

use tracing::{error, info, warn};

use crate::{
    models::{
        app_state::{AppState, RunPhase, RunReport, StepOutcome},
        config::Config,
    },
    steps::{
        self,
        iface::{Step, StepContext},
        kernel_build::{BuildHandle, BuildLaunch, BuildOutcome},
    },
    utils::{
        dir::DirUtils,
        errors::{EmptyResult, ResultWithError},
        file_logger::FileLogger,
    },
};

/// Main controller for a provisioning run. Executes the fixed step sequence,
/// captures every step's result into the run report, and always advances to
/// Done; nothing short of a poisoned lock aborts the run.
pub struct Run {
    config: Config,
}

impl Run {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> EmptyResult {
        let state = Arc::new(RwLock::new(AppState::default()));
        let logs_dir = DirUtils::logs_dir(&self.config.workspace);
        let logger = FileLogger::new(&logs_dir, "provision.log");
        let ctx = StepContext {
            config: &self.config,
            state: state.clone(),
            logger: &logger,
        };

        {
            let state = ctx.read_state()?;
            info!("Provisioning run {} starting", state.report.run_id);
            logger.log(&format!("run {} starting", state.report.run_id));
        }

        let marker = self.config.skip_marker_path();
        if marker.exists() {
            info!("Marker {:?} present, skipping provisioning", marker);
            ctx.record(
                "run",
                StepOutcome::Skipped,
                format!("skip marker {} present", marker.display()),
            )?;
            ctx.set_phase(RunPhase::Done)?;
            return self.finish(&ctx);
        }

        self.run_step(&steps::system_packages::StepSystemPackages {}, &ctx)?;
        ctx.set_phase(RunPhase::SystemDepsInstalled)?;

        self.run_step(&steps::plugin_sync::StepPluginSync {}, &ctx)?;
        ctx.set_phase(RunPhase::PluginsSynced)?;

        // The build starts before the downloads so the compile overlaps the
        // I/O-bound fetching; the join waits below.
        let build = self.start_build(&ctx)?;
        ctx.set_phase(RunPhase::FetchInFlight)?;

        self.run_step(&steps::model_fetch::StepModelFetch {}, &ctx)?;

        self.join_build(&ctx, build)?;
        ctx.set_phase(RunPhase::Joined)?;

        self.run_step(&steps::server_launch::StepServerLaunch {}, &ctx)?;
        ctx.set_phase(RunPhase::ServerLaunched)?;

        ctx.set_phase(RunPhase::Done)?;
        self.finish(&ctx)
    }

    fn run_step(&self, step: &dyn Step, ctx: &StepContext) -> EmptyResult {
        info!("▶ {}", step.name());
        match step.run(ctx) {
            Ok((outcome, detail)) => ctx.record(step.name(), outcome, detail),
            Err(e) => {
                // Best-effort policy: the failure is captured and the
                // sequence advances.
                error!("Step {} failed: {e}", step.name());
                ctx.record(step.name(), StepOutcome::Failed, e.to_string())
            }
        }
    }

    fn start_build(&self, ctx: &StepContext) -> ResultWithError<Option<BuildHandle>> {
        let Some(build_config) = &self.config.build else {
            ctx.record("kernel_build", StepOutcome::Skipped, "no build configured")?;
            return Ok(None);
        };

        let logs_dir = DirUtils::logs_dir(&self.config.workspace);
        match steps::kernel_build::spawn(build_config, &self.config.workspace, &logs_dir) {
            Ok(BuildLaunch::Started(handle)) => Ok(Some(handle)),
            Ok(BuildLaunch::Skipped(reason)) => {
                info!("Kernel build skipped: {reason}");
                ctx.record("kernel_build", StepOutcome::Skipped, reason)?;
                Ok(None)
            }
            Err(e) => {
                error!("Kernel build failed to start: {e}");
                ctx.record("kernel_build", StepOutcome::Failed, e.to_string())?;
                Ok(None)
            }
        }
    }

    fn join_build(&self, ctx: &StepContext, build: Option<BuildHandle>) -> EmptyResult {
        let Some(handle) = build else {
            return Ok(());
        };

        let timeout = self
            .config
            .build
            .as_ref()
            .and_then(|b| b.join_timeout_secs)
            .map(Duration::from_secs);

        info!("Waiting for the background kernel build to finish...");
        match handle.join(timeout) {
            BuildOutcome::Completed(0) => {
                info!("✅ Kernel build finished");
                ctx.record("kernel_build", StepOutcome::Ok, "exit status 0")
            }
            BuildOutcome::Completed(code) => {
                // Non-zero build exit is a warning, never an abort.
                warn!("Kernel build exited with status {code}");
                ctx.record(
                    "kernel_build",
                    StepOutcome::Warning,
                    format!("exit status {code}"),
                )
            }
            BuildOutcome::TimedOut(timeout) => {
                warn!("Kernel build still running after {timeout:?}, leaving it running");
                ctx.record(
                    "kernel_build",
                    StepOutcome::Warning,
                    format!("still running after {timeout:?}"),
                )
            }
            BuildOutcome::Lost => ctx.record(
                "kernel_build",
                StepOutcome::Failed,
                "build monitor exited without reporting a status",
            ),
        }
    }

    fn finish(&self, ctx: &StepContext) -> EmptyResult {
        let (summary, json) = {
            let mut state = ctx.write_state()?;
            state.report.finished_at = Some(RunReport::timestamp());
            (state.report.summary(), serde_json::to_string_pretty(&state.report)?)
        };

        let logs_dir = DirUtils::logs_dir(&self.config.workspace);
        let report_path = logs_dir.join("provision-report.json");
        fs::write(&report_path, json)?;

        ctx.logger.log(&format!("run finished: {summary}"));
        info!(
            "Provisioning finished: {summary} (report at {})",
            report_path.display()
        );
        Ok(())
    }
}
