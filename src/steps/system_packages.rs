use tracing::{error, info};

use crate::{
    models::{app_state::StepOutcome, config::ToolCheck},
    steps::iface::{Step, StepContext, StepResult},
    utils::{
        command::CommandUtils,
        errors::{ResultTrait as _, ResultWithError},
        semver::SemverUtils,
    },
};

/// Installs the configured apt packages and verifies tool prerequisites.
pub struct StepSystemPackages {}

impl Step for StepSystemPackages {
    fn name(&self) -> &'static str {
        "system_packages"
    }

    fn run(&self, ctx: &StepContext) -> StepResult {
        let system = &ctx.config.system;
        if system.packages.is_empty() && system.tools.is_empty() {
            return Ok((StepOutcome::Skipped, "no packages or tools configured".into()));
        }

        let mut tool_failures = 0;
        for tool in &system.tools {
            match self.check_tool(tool) {
                Ok(detail) => {
                    info!("✅ {} OK ({})", tool.name, detail);
                    ctx.record(format!("tool:{}", tool.name), StepOutcome::Ok, detail)?;
                }
                Err(e) => {
                    error!("❌ {} check failed: {e}", tool.name);
                    ctx.record(format!("tool:{}", tool.name), StepOutcome::Failed, e.to_string())?;
                    tool_failures += 1;
                }
            }
        }

        if !system.packages.is_empty() {
            self.install_packages(&system.packages)?;
        }

        let outcome = if tool_failures > 0 {
            StepOutcome::Warning
        } else {
            StepOutcome::Ok
        };
        Ok((
            outcome,
            format!(
                "{} packages installed, {} of {} tool checks failed",
                system.packages.len(),
                tool_failures,
                system.tools.len()
            ),
        ))
    }
}

impl StepSystemPackages {
    fn check_tool(&self, tool: &ToolCheck) -> ResultWithError<String> {
        let res = CommandUtils::run_command_str(&tool.version_command, None)
            .auto_err(&format!("Failed to execute command: {}", tool.version_command))?;
        let output = res.stdout.trim().to_owned();

        if !SemverUtils::is_valid_version(&output) {
            return Err(format!(
                "{} version command did not return a valid version: {output}",
                tool.name
            )
            .into());
        }

        if !SemverUtils::is_version_greater_or_equal(&tool.min_version, &output)? {
            return Err(format!(
                "{} too old ({output} < {})",
                tool.name, tool.min_version
            )
            .into());
        }

        Ok(format!("{output} ≥ {}", tool.min_version))
    }

    fn install_packages(&self, packages: &[String]) -> ResultWithError<()> {
        which::which("apt-get").auto_err("apt-get not found in PATH")?;

        let cmd = format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
            packages.join(" ")
        );
        info!("Installing system packages: {}", packages.join(", "));

        let spinner = CommandUtils::display_loader("Installing system packages...".to_owned());
        let result = CommandUtils::run_command_str(&cmd, None)?;
        spinner.finish_and_clear();

        if result.status != 0 {
            error!("❌ apt install failed: {}", result.stderr.trim());
            return Err(format!("apt-get install exited with status {}", result.status).into());
        }

        info!("✅ {} system packages installed", packages.len());
        Ok(())
    }
}
