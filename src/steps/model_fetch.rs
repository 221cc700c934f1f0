use tokio::runtime::Runtime;
use tracing::{error, info};

use crate::{
    downloader::{DownloadTask, FetchOptions, FetchOutcome, Fetcher},
    models::app_state::StepOutcome,
    steps::iface::{Step, StepContext, StepResult},
    utils::{dir::DirUtils, errors::ResultTrait as _},
};

/// Fetches the configured model weight files, one file at a time, each with
/// bounded internal connection parallelism.
pub struct StepModelFetch {}

impl Step for StepModelFetch {
    fn name(&self) -> &'static str {
        "model_fetch"
    }

    fn run(&self, ctx: &StepContext) -> StepResult {
        let downloads = &ctx.config.downloads;
        if downloads.assets.is_empty() {
            return Ok((StepOutcome::Skipped, "no assets configured".into()));
        }

        let opts = FetchOptions {
            connections: downloads.connections,
            chunk_size: downloads.chunk_size_mb * 1024 * 1024,
            overwrite: downloads.overwrite,
            token: downloads.effective_token(),
            auth_hosts: downloads.auth_hosts.clone(),
        };
        let fetcher = Fetcher::new(opts).auto_err("Failed to create HTTP client")?;
        let rt = Runtime::new().auto_err("Failed to create runtime")?;

        let mut fetched = 0;
        let mut complete = 0;
        let mut failed = 0;

        for asset in &downloads.assets {
            let mut task = DownloadTask::new(
                asset.url.clone(),
                DirUtils::resolve(&ctx.config.workspace, &asset.dir),
            );
            if let Some(name) = &asset.filename {
                task = task.with_filename(name.clone());
            }
            let label = task.file_name().unwrap_or_else(|_| asset.url.clone());

            match rt.block_on(fetcher.fetch(&task)) {
                Ok(FetchOutcome::Downloaded { bytes }) => {
                    info!("✅ {label} downloaded ({bytes} bytes)");
                    ctx.record(
                        format!("download:{label}"),
                        StepOutcome::Ok,
                        format!("downloaded {bytes} bytes"),
                    )?;
                    fetched += 1;
                }
                Ok(FetchOutcome::Resumed { bytes }) => {
                    info!("✅ {label} resumed ({bytes} bytes remaining fetched)");
                    ctx.record(
                        format!("download:{label}"),
                        StepOutcome::Ok,
                        format!("resumed, {bytes} bytes fetched"),
                    )?;
                    fetched += 1;
                }
                Ok(FetchOutcome::AlreadyComplete) => {
                    ctx.record(
                        format!("download:{label}"),
                        StepOutcome::Skipped,
                        "already complete",
                    )?;
                    complete += 1;
                }
                Err(e) => {
                    // Best-effort: log and move on to the next asset.
                    error!("❌ download of {label} failed: {e}");
                    ctx.record(format!("download:{label}"), StepOutcome::Failed, e.to_string())?;
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
            format!("{fetched} fetched, {complete} already complete, {failed} failed"),
        ))
    }
}
