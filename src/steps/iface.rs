use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::{
    models::{
        app_state::{AppState, RunPhase, StepOutcome},
        config::Config,
    },
    utils::{
        errors::{EmptyResult, ResultTrait, ResultWithError},
        file_logger::FileLogger,
    },
};

/// Context passed to all steps during execution providing access to the
/// configuration, the shared run state and the run log file.
pub struct StepContext<'a> {
    pub config: &'a Config,
    pub state: Arc<RwLock<AppState>>,
    pub logger: &'a FileLogger,
}

impl StepContext<'_> {
    pub fn read_state(&self) -> ResultWithError<std::sync::RwLockReadGuard<'_, AppState>> {
        self.state
            .read()
            .auto_err("Failed to acquire read lock for state")
    }

    pub fn write_state(&self) -> ResultWithError<std::sync::RwLockWriteGuard<'_, AppState>> {
        self.state
            .write()
            .auto_err("Failed to acquire write lock for state")
    }

    pub fn set_phase(&self, phase: RunPhase) -> EmptyResult {
        let mut state = self.write_state()?;
        debug!("Run phase {:?} -> {:?}", state.phase, phase);
        state.phase = phase;
        Ok(())
    }

    /// Appends one entry to the run report and mirrors it into the run log.
    pub fn record(
        &self,
        name: impl Into<String>,
        outcome: StepOutcome,
        detail: impl Into<String>,
    ) -> EmptyResult {
        let name = name.into();
        let detail = detail.into();
        self.logger
            .log(&format!("{name}: {outcome:?} {detail}").trim_end().to_owned());

        let mut state = self.write_state()?;
        state.report.record(name, outcome, detail);
        Ok(())
    }
}

/// Outcome of a step that ran to completion without an internal error.
pub type StepResult = ResultWithError<(StepOutcome, String)>;

/// Trait that all provisioning step implementations must adhere to. A step
/// returning Err never aborts the run; the controller records the failure
/// and advances.
pub trait Step {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &StepContext) -> StepResult;
}
