use std::path::PathBuf;

use reqwest::Url;

use crate::downloader::error::{FetchError, FetchResult};

/// One model-weight file to fetch. Consumed once; the only persistent trace
/// is the artifact it writes to disk.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub dest_dir: PathBuf,
    pub filename: Option<String>,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, dest_dir: impl Into<PathBuf>) -> Self {
        DownloadTask {
            url: url.into(),
            dest_dir: dest_dir.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Destination file name: the explicit one, or the final URL path
    /// segment with query string and fragment stripped.
    pub fn file_name(&self) -> FetchResult<String> {
        if let Some(name) = &self.filename {
            return Ok(name.clone());
        }
        derive_filename(&self.url).ok_or_else(|| FetchError::NoFilename(self.url.clone()))
    }

    pub fn dest_path(&self) -> FetchResult<PathBuf> {
        Ok(self.dest_dir.join(self.file_name()?))
    }
}

pub fn derive_filename(url: &str) -> Option<String> {
    let last_segment = url.rsplit('/').next()?;
    let clean = last_segment.split('?').next()?.split('#').next()?.trim();
    if clean.is_empty() {
        None
    } else {
        Some(clean.to_string())
    }
}

/// True when the URL's host equals one of the suffixes or is a subdomain of
/// one, e.g. "cdn-lfs.huggingface.co" matches "huggingface.co".
pub fn host_matches(url: &str, suffixes: &[String]) -> FetchResult<bool> {
    let parsed =
        Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    let Some(host) = parsed.host_str() else {
        return Ok(false);
    };

    Ok(suffixes
        .iter()
        .any(|s| host == s.as_str() || host.ends_with(&format!(".{s}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_strips_query_string() {
        assert_eq!(
            derive_filename("https://huggingface.co/repo/resolve/main/wan_vae.safetensors?download=true"),
            Some("wan_vae.safetensors".to_string())
        );
    }

    #[test]
    fn filename_strips_fragment() {
        assert_eq!(
            derive_filename("https://example.com/a/b/model.bin#section"),
            Some("model.bin".to_string())
        );
    }

    #[test]
    fn filename_rejects_trailing_slash() {
        assert_eq!(derive_filename("https://example.com/a/b/"), None);
        assert_eq!(derive_filename("https://example.com/a/b/?q=1"), None);
    }

    #[test]
    fn explicit_filename_wins() {
        let task = DownloadTask::new("https://example.com/x/weights.bin", "/tmp/models")
            .with_filename("renamed.bin");
        assert_eq!(task.file_name().unwrap(), "renamed.bin");
        assert_eq!(
            task.dest_path().unwrap(),
            PathBuf::from("/tmp/models/renamed.bin")
        );
    }

    #[test]
    fn auth_host_matches_subdomains_only() {
        let hosts = vec!["huggingface.co".to_string()];
        assert!(host_matches("https://huggingface.co/m.bin", &hosts).unwrap());
        assert!(host_matches("https://cdn-lfs.huggingface.co/m.bin", &hosts).unwrap());
        assert!(!host_matches("https://nothuggingface.co/m.bin", &hosts).unwrap());
        assert!(!host_matches("https://example.com/m.bin", &hosts).unwrap());
    }
}
