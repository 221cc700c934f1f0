use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::utils::{
    dir::DirUtils,
    errors::{ResultTrait, ResultWithError},
    variables::VariablesUtils,
};

/// Configuration structure for a provisioning run. Loaded from rigup.yaml;
/// `${VAR}` references are expanded from the environment before parsing, so
/// credentials never live in the file itself.
#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct Config {
    /// Root directory all relative paths resolve against
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Sentinel file name under the workspace; its presence skips the run
    #[serde(default = "default_skip_marker")]
    pub skip_marker: String,

    /// Pull already-cloned plugin repositories on every run
    #[serde(default)]
    pub auto_update: bool,

    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub downloads: DownloadsConfig,

    /// Optional native-extension build run in the background while downloads
    /// proceed
    #[serde(default)]
    pub build: Option<BuildConfig>,

    /// Optional inference server launched, detached, at the end of the run
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> ResultWithError<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => DirUtils::curr_dir()?.join("rigup.yaml"),
        };
        debug!("Loading config from {:?}", config_path);

        let content = fs::read_to_string(&config_path)
            .auto_err(&format!("Could not read config file {:?}", config_path))?;

        let expanded = VariablesUtils::expand_env_vars(&content);

        let config: Config = serde_yaml::from_str(&expanded).auto_err("Invalid config format")?;
        debug!("Config deserialized");

        Ok(config)
    }

    pub fn skip_marker_path(&self) -> PathBuf {
        self.workspace.join(&self.skip_marker)
    }
}

#[derive(Debug, Deserialize, Clone, Default, JsonSchema)]
pub struct SystemConfig {
    /// apt packages installed before anything else
    #[serde(default)]
    pub packages: Vec<String>,

    /// Tools whose presence and minimum version are verified up front
    #[serde(default)]
    pub tools: Vec<ToolCheck>,
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct ToolCheck {
    pub name: String,
    pub min_version: String,
    pub version_command: String,
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct PluginsConfig {
    /// Directory the plugin repositories are cloned into, relative to the
    /// workspace unless absolute
    #[serde(default = "default_plugins_dir")]
    pub dir: PathBuf,

    /// Command prefix used to install a repository's requirements.txt
    #[serde(default = "default_pip_command")]
    pub pip_command: String,

    #[serde(default)]
    pub repos: Vec<PluginRepo>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        PluginsConfig {
            dir: default_plugins_dir(),
            pip_command: default_pip_command(),
            repos: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct PluginRepo {
    pub url: String,

    /// Checkout directory; derived from the repository name when omitted
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Clone with --recursive for nested submodules
    #[serde(default)]
    pub recursive: bool,
}

impl PluginRepo {
    /// Name of the checkout directory, from the explicit path or the final
    /// URL segment with any trailing ".git" dropped.
    pub fn dir_name(&self) -> Option<String> {
        if let Some(path) = &self.path {
            return path
                .file_name()
                .map(|n| n.to_string_lossy().to_string());
        }

        let segment = self
            .url
            .trim_end_matches('/')
            .rsplit('/')
            .next()?
            .trim_end_matches(".git");
        if segment.is_empty() {
            None
        } else {
            Some(segment.to_string())
        }
    }

    pub fn local_path(&self, plugins_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.path
            && path.is_absolute()
        {
            return Some(path.clone());
        }
        self.dir_name().map(|name| plugins_dir.join(name))
    }
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct DownloadsConfig {
    /// Bearer token attached to requests against auth_hosts; typically
    /// `${HF_TOKEN}` expanded from the environment
    #[serde(default)]
    pub token: Option<String>,

    /// Host suffixes the token is sent to
    #[serde(default = "default_auth_hosts")]
    pub auth_hosts: Vec<String>,

    /// Concurrent ranged connections per file
    #[serde(default = "default_connections")]
    pub connections: usize,

    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,

    /// Re-fetch files that already exist at their destination
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        DownloadsConfig {
            token: None,
            auth_hosts: default_auth_hosts(),
            connections: default_connections(),
            chunk_size_mb: default_chunk_size_mb(),
            overwrite: false,
            assets: Vec::new(),
        }
    }
}

impl DownloadsConfig {
    /// Token with empty expansions (unset env vars) treated as absent.
    pub fn effective_token(&self) -> Option<String> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    }
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct AssetConfig {
    pub url: String,

    /// Destination directory, relative to the workspace unless absolute
    pub dir: PathBuf,

    /// Destination file name; derived from the URL when omitted
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct BuildConfig {
    /// Build command, e.g. a pip install of an attention kernel
    pub command: String,

    /// Working directory for the build, relative to the workspace
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Minimum GPU compute capability; probe failure or a lower capability
    /// skips the build
    #[serde(default)]
    pub min_compute_cap: Option<f32>,

    /// Seconds to wait at the join point before reporting the build as timed
    /// out; unset waits indefinitely
    #[serde(default)]
    pub join_timeout_secs: Option<u64>,

    #[serde(default = "default_build_log")]
    pub log_name: String,
}

#[derive(Debug, Deserialize, Clone, JsonSchema)]
pub struct ServerConfig {
    pub command: String,

    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_server_log")]
    pub log_name: String,
}

fn default_workspace() -> PathBuf {
    DirUtils::default_workspace()
}

fn default_skip_marker() -> String {
    ".no_provisioning".to_owned()
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_pip_command() -> String {
    "pip install -r".to_owned()
}

fn default_auth_hosts() -> Vec<String> {
    vec!["huggingface.co".to_owned()]
}

fn default_connections() -> usize {
    8
}

fn default_chunk_size_mb() -> u64 {
    16
}

fn default_build_log() -> String {
    "kernel-build.log".to_owned()
}

fn default_server_log() -> String {
    "server.log".to_owned()
}
