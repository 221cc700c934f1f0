use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "rigup",
    version,
    about = "Provision a GPU cloud instance with an ML inference stack.",
    long_about = r#"
rigup runs a fixed sequence of idempotent provisioning steps against the
current machine: system packages, plugin repositories, bulk model-weight
downloads, an optional background kernel build and an optional detached
inference server.

Behavior is controlled entirely by a YAML configuration file (rigup.yaml in
the current directory by default). Every step is best-effort: individual
failures are captured in the run report and the run always completes, so a
partially provisioned instance can be fixed by simply re-running.

Common use cases include:
  • Bootstrapping a fresh vast.ai/Docker instance with ComfyUI plus plugins
  • Resuming interrupted multi-gigabyte model downloads
  • Compiling an attention kernel in the background while weights download
  • Launching the inference server once provisioning is done
"#
)]
pub struct AppArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the provisioning sequence
    Up {
        /// Path to the configuration file (defaults to ./rigup.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate the JSON schema for the configuration file
    Schema {},
}
