use std::path::{Path, PathBuf};

use crate::utils::errors::{ResultTrait, ResultWithError};

pub struct DirUtils;

impl DirUtils {
    pub fn curr_dir() -> ResultWithError<PathBuf> {
        std::env::current_dir().auto_err("Could not read current directory")
    }

    /// Default workspace root when the config does not name one. Cloud images
    /// mount the persistent volume at /workspace; fall back to the home
    /// directory for local runs.
    pub fn default_workspace() -> PathBuf {
        let mounted = PathBuf::from("/workspace");
        if mounted.is_dir() {
            return mounted;
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rigup")
    }

    pub fn logs_dir(workspace: &Path) -> PathBuf {
        workspace.join("logs")
    }

    /// Resolves a config-relative directory against the workspace root.
    /// Absolute paths are taken as-is.
    pub fn resolve(workspace: &Path, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            workspace.join(dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_against_workspace() {
        let ws = Path::new("/workspace");
        assert_eq!(
            DirUtils::resolve(ws, Path::new("models/vae")),
            PathBuf::from("/workspace/models/vae")
        );
        assert_eq!(
            DirUtils::resolve(ws, Path::new("/opt/models")),
            PathBuf::from("/opt/models")
        );
    }
}
