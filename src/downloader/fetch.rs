use std::{
    fs::{self, File, OpenOptions},
    io::Write as _,
    path::Path,
};

use futures::StreamExt as _;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{
    Client,
    header::{ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, RANGE},
};
use tracing::{debug, info, warn};

use crate::downloader::{
    error::{FetchError, FetchResult},
    task::{DownloadTask, host_matches},
};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Concurrent ranged connections per file
    pub connections: usize,
    pub chunk_size: u64,
    /// Re-fetch even when a complete file already exists
    pub overwrite: bool,
    pub token: Option<String>,
    pub auth_hosts: Vec<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            connections: 8,
            chunk_size: 16 * 1024 * 1024,
            overwrite: false,
            token: None,
            auth_hosts: vec!["huggingface.co".to_owned()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    Resumed { bytes: u64 },
    AlreadyComplete,
}

/// Inclusive byte range for a single chunk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeSpec {
    start: u64,
    end: u64,
}

impl RangeSpec {
    fn to_header_value(self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    fn len(self) -> u64 {
        self.end - self.start + 1
    }
}

#[derive(Debug, Default)]
struct Probe {
    len: Option<u64>,
    accept_ranges: bool,
}

/// Resumable bulk downloader. One file at a time, a bounded pipeline of
/// ranged connections inside each file. Chunks are appended strictly in
/// order, so the destination file length is always the contiguous completed
/// prefix and a truncated file resumes from its own length.
pub struct Fetcher {
    client: Client,
    opts: FetchOptions,
}

impl Fetcher {
    pub fn new(opts: FetchOptions) -> FetchResult<Self> {
        let client = Client::builder().build()?;
        Ok(Fetcher { client, opts })
    }

    pub async fn fetch(&self, task: &DownloadTask) -> FetchResult<FetchOutcome> {
        let dest = task.dest_path()?;
        fs::create_dir_all(&task.dest_dir)?;

        let authed = self.opts.token.is_some() && host_matches(&task.url, &self.opts.auth_hosts)?;
        let probe = self.probe(&task.url, authed).await.unwrap_or_else(|e| {
            debug!("HEAD probe failed for {}: {e}", task.url);
            Probe::default()
        });

        let existing = fs::metadata(&dest).map(|m| m.len()).ok();

        if let Some(existing) = existing {
            if self.opts.overwrite {
                info!("Overwrite enabled, discarding existing {:?}", dest);
                fs::remove_file(&dest)?;
            } else if probe.len == Some(existing) {
                info!("{:?} already complete ({existing} bytes), skipping", dest);
                return Ok(FetchOutcome::AlreadyComplete);
            }
        }
        let existing = if self.opts.overwrite { None } else { existing };

        match (probe.accept_ranges, probe.len) {
            (true, Some(total)) => self.fetch_ranged(task, &dest, total, existing, authed).await,
            _ => self.fetch_streamed(task, &dest, existing, authed).await,
        }
    }

    /// Ordered pipeline of ranged chunk requests with a bounded number in
    /// flight. Appending in order keeps the file a contiguous prefix.
    async fn fetch_ranged(
        &self,
        task: &DownloadTask,
        dest: &Path,
        total: u64,
        existing: Option<u64>,
        authed: bool,
    ) -> FetchResult<FetchOutcome> {
        let start = match existing {
            Some(len) if len > total => {
                warn!(
                    "{:?} is larger ({len}) than the remote file ({total}), restarting",
                    dest
                );
                fs::remove_file(dest)?;
                0
            }
            Some(len) => {
                if len > 0 {
                    info!("Resuming {:?} from byte {len}", dest);
                }
                len
            }
            None => 0,
        };

        if start == total {
            return Ok(FetchOutcome::AlreadyComplete);
        }

        let mut file = OpenOptions::new().create(true).append(true).open(dest)?;
        let pb = Self::byte_progress(task.file_name()?, total, start);

        let ranges = Self::chunk_ranges(start, total, self.opts.chunk_size);
        let mut chunks = futures::stream::iter(
            ranges
                .into_iter()
                .map(|range| self.get_chunk(&task.url, range, authed)),
        )
        .buffered(self.opts.connections.max(1));

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            pb.inc(chunk.len() as u64);
        }
        drop(chunks);
        file.flush()?;
        pb.finish_and_clear();

        let written = fs::metadata(dest)?.len();
        if written != total {
            return Err(FetchError::SizeMismatch {
                path: dest.display().to_string(),
                expected: total,
                actual: written,
            });
        }

        Ok(if start > 0 {
            FetchOutcome::Resumed {
                bytes: total - start,
            }
        } else {
            FetchOutcome::Downloaded { bytes: total }
        })
    }

    /// Fallback for hosts without range support: one streamed request from
    /// byte zero. An unresumable partial file is restarted with a warning.
    async fn fetch_streamed(
        &self,
        task: &DownloadTask,
        dest: &Path,
        existing: Option<u64>,
        authed: bool,
    ) -> FetchResult<FetchOutcome> {
        if let Some(len) = existing {
            warn!(
                "{:?} has {len} bytes but the host does not support ranges, restarting from zero",
                dest
            );
        }

        let resp = self.request(&task.url, authed).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: task.url.clone(),
                status: status.as_u16(),
            });
        }

        let total = resp.content_length();
        let pb = Self::byte_progress(task.file_name()?, total.unwrap_or(0), 0);

        let mut file = File::create(dest)?;
        let mut bytes = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            bytes += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }
        file.flush()?;
        pb.finish_and_clear();

        if let Some(total) = total
            && bytes != total
        {
            return Err(FetchError::SizeMismatch {
                path: dest.display().to_string(),
                expected: total,
                actual: bytes,
            });
        }

        Ok(FetchOutcome::Downloaded { bytes })
    }

    async fn get_chunk(
        &self,
        url: &str,
        range: RangeSpec,
        authed: bool,
    ) -> FetchResult<bytes::Bytes> {
        let resp = self
            .request(url, authed)
            .header(RANGE, range.to_header_value())
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() != 206 {
            return Err(FetchError::RangeNotHonored {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        if body.len() as u64 != range.len() {
            return Err(FetchError::SizeMismatch {
                path: url.to_owned(),
                expected: range.len(),
                actual: body.len() as u64,
            });
        }
        Ok(body)
    }

    async fn probe(&self, url: &str, authed: bool) -> FetchResult<Probe> {
        let resp = self.client_head(url, authed).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let accept_ranges = resp
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

        // HEAD responses have no body, so the length must come from the
        // header itself.
        let len = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(Probe { len, accept_ranges })
    }

    fn request(&self, url: &str, authed: bool) -> reqwest::RequestBuilder {
        self.apply_auth(self.client.get(url), authed)
    }

    fn client_head(&self, url: &str, authed: bool) -> reqwest::RequestBuilder {
        self.apply_auth(self.client.head(url), authed)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder, authed: bool) -> reqwest::RequestBuilder {
        match (&self.opts.token, authed) {
            (Some(token), true) => req.header(AUTHORIZATION, format!("Bearer {}", token)),
            _ => req,
        }
    }

    fn chunk_ranges(start: u64, total: u64, chunk_size: u64) -> Vec<RangeSpec> {
        let chunk_size = chunk_size.max(1);
        let mut ranges = Vec::new();
        let mut pos = start;
        while pos < total {
            let end = (pos + chunk_size).min(total) - 1;
            ranges.push(RangeSpec { start: pos, end });
            pos = end + 1;
        }
        ranges
    }

    fn byte_progress(name: String, total: u64, position: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template("{bar:30.green} {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message(name);
        pb.set_position(position);
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ranges_cover_contiguously() {
        let ranges = Fetcher::chunk_ranges(0, 100, 40);
        assert_eq!(
            ranges,
            vec![
                RangeSpec { start: 0, end: 39 },
                RangeSpec { start: 40, end: 79 },
                RangeSpec { start: 80, end: 99 },
            ]
        );
        assert_eq!(ranges.iter().map(|r| r.len()).sum::<u64>(), 100);
    }

    #[test]
    fn chunk_ranges_resume_from_offset() {
        let ranges = Fetcher::chunk_ranges(64, 100, 40);
        assert_eq!(ranges[0], RangeSpec { start: 64, end: 99 });
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn range_header_is_inclusive() {
        let range = RangeSpec { start: 16, end: 31 };
        assert_eq!(range.to_header_value(), "bytes=16-31");
        assert_eq!(range.len(), 16);
    }
}
