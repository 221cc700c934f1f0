use serde::Serialize;

#[derive(Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

/// Phases of a provisioning run. Transitions only move forward and are never
/// retried; step failures are swallowed into the report and the run always
/// reaches `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    SystemDepsInstalled,
    PluginsSynced,
    FetchInFlight,
    Joined,
    ServerLaunched,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Ok,
    Warning,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
    pub detail: String,
}

/// Aggregated per-step results for one provisioning run. This is what the
/// operator reads after the run instead of scraping exit codes.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Self::timestamp(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    pub fn timestamp() -> String {
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn record(&mut self, name: impl Into<String>, outcome: StepOutcome, detail: impl Into<String>) {
        self.steps.push(StepReport {
            name: name.into(),
            outcome,
            detail: detail.into(),
        });
    }

    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ok, {} warnings, {} skipped, {} failed",
            self.count(StepOutcome::Ok),
            self.count(StepOutcome::Warning),
            self.count(StepOutcome::Skipped),
            self.count(StepOutcome::Failed),
        )
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared application state for steps and the run controller.
#[derive(Debug)]
pub struct AppState {
    pub phase: RunPhase,
    pub report: RunReport,
}

impl Default for AppState {
    fn default() -> Self {
        AppState {
            phase: RunPhase::NotStarted,
            report: RunReport::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_by_outcome() {
        let mut report = RunReport::new();
        report.record("a", StepOutcome::Ok, "");
        report.record("b", StepOutcome::Failed, "boom");
        report.record("c", StepOutcome::Ok, "");

        assert_eq!(report.count(StepOutcome::Ok), 2);
        assert_eq!(report.count(StepOutcome::Failed), 1);
        assert!(report.summary().contains("2 ok"));
    }
}
