use std::{fs, path::Path};

use tracing::{debug, error, info};

use crate::{
    models::{app_state::StepOutcome, config::PluginRepo},
    steps::iface::{Step, StepContext, StepResult},
    utils::{
        command::CommandUtils,
        dir::DirUtils,
        errors::{OptionResultTrait as _, ResultTrait as _, ResultWithError},
    },
};

/// What a sync pass does with one plugin repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Clone { recursive: bool },
    Update,
    Skip,
}

/// A missing checkout is cloned; a present one is only touched when
/// auto-update is enabled. Skipping performs no network operation at all.
pub fn plan_sync(path_exists: bool, auto_update: bool, recursive: bool) -> SyncAction {
    match (path_exists, auto_update) {
        (false, _) => SyncAction::Clone { recursive },
        (true, true) => SyncAction::Update,
        (true, false) => SyncAction::Skip,
    }
}

/// Ensures the configured plugin source trees are present and their declared
/// Python dependencies installed.
pub struct StepPluginSync {}

impl Step for StepPluginSync {
    fn name(&self) -> &'static str {
        "plugin_sync"
    }

    fn run(&self, ctx: &StepContext) -> StepResult {
        let plugins = &ctx.config.plugins;
        if plugins.repos.is_empty() {
            return Ok((StepOutcome::Skipped, "no plugin repositories configured".into()));
        }

        let plugins_dir = DirUtils::resolve(&ctx.config.workspace, &plugins.dir);
        fs::create_dir_all(&plugins_dir)
            .auto_err(&format!("Failed to create {}", plugins_dir.display()))?;

        let mut failed = 0;
        for repo in &plugins.repos {
            let name = repo.dir_name().unwrap_or_else(|| repo.url.clone());
            match self.sync_repo(ctx, repo, &plugins_dir) {
                Ok(detail) => {
                    ctx.record(format!("plugin:{name}"), StepOutcome::Ok, detail)?;
                }
                Err(e) => {
                    // Best-effort: one broken plugin never blocks the rest.
                    error!("❌ plugin {name} sync failed: {e}");
                    ctx.record(format!("plugin:{name}"), StepOutcome::Failed, e.to_string())?;
                    failed += 1;
                }
            }
        }

        let outcome = if failed > 0 {
            StepOutcome::Warning
        } else {
            StepOutcome::Ok
        };
        Ok((
            outcome,
            format!("{} of {} repositories failed", failed, plugins.repos.len()),
        ))
    }
}

impl StepPluginSync {
    fn sync_repo(
        &self,
        ctx: &StepContext,
        repo: &PluginRepo,
        plugins_dir: &Path,
    ) -> ResultWithError<String> {
        let path = repo
            .local_path(plugins_dir)
            .auto_err(&format!("Cannot derive a checkout path for {}", repo.url))?;

        let action = plan_sync(path.exists(), ctx.config.auto_update, repo.recursive);
        let synced = match action {
            SyncAction::Clone { recursive } => {
                info!("Cloning {} into {:?}", repo.url, path);
                let flags = if recursive { "--recursive " } else { "" };
                let cmd = format!("git clone {flags}'{}' '{}'", repo.url, path.display());
                let res = CommandUtils::run_command_str(&cmd, None)?;
                if res.status != 0 {
                    return Err(format!("git clone failed: {}", res.stderr.trim()).into());
                }
                "cloned"
            }
            SyncAction::Update => {
                info!("Updating {:?}", path);
                let res = CommandUtils::run_command_str("git pull --ff-only", Some(&path))?;
                if res.status != 0 {
                    return Err(format!("git pull failed: {}", res.stderr.trim()).into());
                }
                "updated"
            }
            SyncAction::Skip => {
                debug!("{:?} already present, auto-update disabled", path);
                "already present"
            }
        };

        let requirements = self.install_requirements(ctx, &path)?;
        Ok(format!("{synced}, {requirements}"))
    }

    fn install_requirements(
        &self,
        ctx: &StepContext,
        repo_path: &Path,
    ) -> ResultWithError<&'static str> {
        let manifest = repo_path.join("requirements.txt");
        if !manifest.exists() {
            // A missing manifest is normal, not an error.
            debug!("No requirements.txt in {:?}", repo_path);
            return Ok("no requirements");
        }

        let cmd = format!("{} requirements.txt", ctx.config.plugins.pip_command);
        info!("Installing requirements for {:?}", repo_path);
        let res = CommandUtils::run_command_str(&cmd, Some(repo_path))?;
        if res.status != 0 {
            return Err(format!("requirements install failed: {}", res.stderr.trim()).into());
        }

        Ok("requirements installed")
    }
}
