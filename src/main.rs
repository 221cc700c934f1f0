use clap::Parser as _;
use tracing::info;

use crate::{
    models::{args::AppArgs, config::Config},
    run::Run,
    schemas::schema_gen::SchemaGen,
    utils::{errors::EmptyResult, logger::LoggerUtils},
};

mod downloader;
#[cfg(target_os = "linux")]
mod linux;
mod models;
mod run;
mod schemas;
mod steps;
mod utils;

fn main() -> EmptyResult {
    let args = AppArgs::parse();

    LoggerUtils::init();

    let version = env!("CARGO_PKG_VERSION");
    info!("🔧 rigup, Version: {version}");

    #[cfg(target_os = "linux")]
    {
        use crate::utils::command::CommandUtils;
        CommandUtils::set_death_signal();
    }

    match args.command {
        models::args::Command::Up { config } => {
            let config = Config::load(config.as_deref())?;
            let run = Run::new(config);
            run.execute()?;
        }
        models::args::Command::Schema {} => {
            let schema_gen = SchemaGen::new();
            schema_gen.execute()?;
        }
    }

    Ok(())
}
