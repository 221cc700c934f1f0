use std::{
    collections::HashMap,
    fs,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;

use crate::{
    downloader::{DownloadTask, FetchError, FetchOptions, FetchOutcome, Fetcher},
    steps::kernel_build,
};

const BLOB_LEN: usize = 8000;
const TOKEN: &str = "sekrit-token";

struct ServerState {
    blob: Vec<u8>,
    /// Non-HEAD request count per path
    data_requests: Mutex<HashMap<String, usize>>,
    /// Observed Range starts per path
    range_starts: Mutex<Vec<u64>>,
}

struct TestServer {
    base_url: String,
    state: Arc<ServerState>,
}

impl TestServer {
    async fn new() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://127.0.0.1:{}", addr.port());

        let state = Arc::new(ServerState {
            blob: test_blob(),
            data_requests: Mutex::new(HashMap::new()),
            range_starts: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/models/model.bin", get(ranged_endpoint))
            .route("/auth/secret.bin", get(auth_endpoint))
            .route("/plain/blob.bin", get(plain_endpoint))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn data_request_count(&self, path: &str) -> usize {
        self.state
            .data_requests
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    fn min_range_start(&self) -> Option<u64> {
        self.state.range_starts.lock().unwrap().iter().min().copied()
    }
}

fn test_blob() -> Vec<u8> {
    (0..BLOB_LEN).map(|i| (i % 251) as u8).collect()
}

fn count_request(state: &ServerState, method: &Method, path: &str) {
    if method != Method::HEAD {
        *state
            .data_requests
            .lock()
            .unwrap()
            .entry(path.to_owned())
            .or_insert(0) += 1;
    }
}

fn serve_ranged(state: &ServerState, headers: &HeaderMap) -> Response {
    if let Some(range) = headers.get(header::RANGE) {
        let range = range.to_str().unwrap();
        let value = range.strip_prefix("bytes=").unwrap();
        let (start, end) = value.split_once('-').unwrap();
        let start: u64 = start.parse().unwrap();
        let end: u64 = end.parse().unwrap();
        state.range_starts.lock().unwrap().push(start);

        let body = state.blob[start as usize..=end as usize].to_vec();
        (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::ACCEPT_RANGES, "bytes".to_owned()),
                (
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{}", state.blob.len()),
                ),
            ],
            body,
        )
            .into_response()
    } else {
        (
            StatusCode::OK,
            [
                (header::ACCEPT_RANGES, "bytes".to_owned()),
                (header::CONTENT_LENGTH, state.blob.len().to_string()),
            ],
            state.blob.clone(),
        )
            .into_response()
    }
}

async fn ranged_endpoint(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    count_request(&state, &method, "/models/model.bin");
    serve_ranged(&state, &headers)
}

async fn auth_endpoint(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let expected = format!("Bearer {TOKEN}");
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    count_request(&state, &method, "/auth/secret.bin");
    serve_ranged(&state, &headers)
}

/// No Accept-Ranges header, Range requests ignored.
async fn plain_endpoint(State(state): State<Arc<ServerState>>, method: Method) -> Response {
    count_request(&state, &method, "/plain/blob.bin");
    (
        StatusCode::OK,
        [(header::CONTENT_LENGTH, state.blob.len().to_string())],
        state.blob.clone(),
    )
        .into_response()
}

fn small_chunk_options() -> FetchOptions {
    FetchOptions {
        connections: 4,
        chunk_size: 1024,
        ..FetchOptions::default()
    }
}

#[tokio::test]
async fn downloads_in_ordered_chunks_and_derives_filename() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();

    let task = DownloadTask::new(server.url("/models/model.bin?download=true"), dir.path());
    let outcome = fetcher.fetch(&task).await.unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Downloaded {
            bytes: BLOB_LEN as u64
        }
    );
    let written = fs::read(dir.path().join("model.bin")).unwrap();
    assert_eq!(written, test_blob());
    // 8000 bytes at 1 KiB per chunk
    assert_eq!(server.data_request_count("/models/model.bin"), 8);
}

#[tokio::test]
async fn complete_file_is_never_refetched() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();

    let task = DownloadTask::new(server.url("/models/model.bin"), dir.path());
    fetcher.fetch(&task).await.unwrap();
    let requests_after_first = server.data_request_count("/models/model.bin");

    let outcome = fetcher.fetch(&task).await.unwrap();

    assert_eq!(outcome, FetchOutcome::AlreadyComplete);
    assert_eq!(
        server.data_request_count("/models/model.bin"),
        requests_after_first
    );
}

#[tokio::test]
async fn truncated_file_resumes_from_its_offset() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();

    let blob = test_blob();
    fs::write(dir.path().join("model.bin"), &blob[..3000]).unwrap();

    let task = DownloadTask::new(server.url("/models/model.bin"), dir.path());
    let outcome = fetcher.fetch(&task).await.unwrap();

    assert_eq!(outcome, FetchOutcome::Resumed { bytes: 5000 });
    assert_eq!(fs::read(dir.path().join("model.bin")).unwrap(), blob);
    // No request may reach back before the existing prefix.
    assert_eq!(server.min_range_start(), Some(3000));
}

#[tokio::test]
async fn overwrite_refetches_a_complete_file() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();

    let task = DownloadTask::new(server.url("/models/model.bin"), dir.path());
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();
    fetcher.fetch(&task).await.unwrap();

    let fetcher = Fetcher::new(FetchOptions {
        overwrite: true,
        ..small_chunk_options()
    })
    .unwrap();
    let outcome = fetcher.fetch(&task).await.unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Downloaded {
            bytes: BLOB_LEN as u64
        }
    );
    assert_eq!(fs::read(dir.path().join("model.bin")).unwrap(), test_blob());
}

#[tokio::test]
async fn unreachable_url_does_not_stop_the_remaining_tasks() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();

    let tasks = vec![
        DownloadTask::new(server.url("/models/model.bin"), dir.path().join("a")),
        DownloadTask::new(server.url("/missing/gone.bin"), dir.path().join("b")),
        DownloadTask::new(server.url("/plain/blob.bin"), dir.path().join("c")),
    ];

    let mut outcomes = Vec::new();
    for task in &tasks {
        outcomes.push(fetcher.fetch(task).await);
    }

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_err());
    assert!(outcomes[2].is_ok());
    assert!(dir.path().join("a/model.bin").exists());
    assert!(!dir.path().join("b/gone.bin").exists());
    assert!(dir.path().join("c/blob.bin").exists());
}

#[tokio::test]
async fn bearer_token_is_sent_to_matching_hosts_only() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let task = DownloadTask::new(server.url("/auth/secret.bin"), dir.path());

    let fetcher = Fetcher::new(FetchOptions {
        token: Some(TOKEN.to_owned()),
        auth_hosts: vec!["127.0.0.1".to_owned()],
        ..small_chunk_options()
    })
    .unwrap();
    fetcher.fetch(&task).await.unwrap();
    assert_eq!(fs::read(dir.path().join("secret.bin")).unwrap(), test_blob());

    // Same token, non-matching host list: the header must not be attached.
    let fetcher = Fetcher::new(FetchOptions {
        token: Some(TOKEN.to_owned()),
        auth_hosts: vec!["huggingface.co".to_owned()],
        overwrite: true,
        ..small_chunk_options()
    })
    .unwrap();
    match fetcher.fetch(&task).await {
        Err(FetchError::HttpStatus { status: 401, .. }) => {}
        other => panic!("expected a 401, got {other:?}"),
    }
}

#[tokio::test]
async fn host_without_ranges_falls_back_to_one_stream() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();

    // A stale partial that cannot be resumed is restarted from zero.
    fs::write(dir.path().join("blob.bin"), [0xAAu8; 100]).unwrap();

    let task = DownloadTask::new(server.url("/plain/blob.bin"), dir.path());
    let outcome = fetcher.fetch(&task).await.unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Downloaded {
            bytes: BLOB_LEN as u64
        }
    );
    assert_eq!(fs::read(dir.path().join("blob.bin")).unwrap(), test_blob());
    assert_eq!(server.data_request_count("/plain/blob.bin"), 1);
}

#[tokio::test]
async fn background_build_overlaps_the_downloads() {
    let server = TestServer::new().await;
    let dir = tempfile::tempdir().unwrap();
    let flag = dir.path().join("built.flag");

    let build_config = crate::models::config::BuildConfig {
        command: format!("sh -c 'sleep 0.2 && touch {}'", flag.display()),
        cwd: None,
        min_compute_cap: None,
        join_timeout_secs: None,
        log_name: "build.log".to_owned(),
    };
    let launch = kernel_build::spawn(&build_config, dir.path(), dir.path()).unwrap();
    let kernel_build::BuildLaunch::Started(handle) = launch else {
        panic!("build should have started");
    };

    // Downloads run while the build is still in flight; the join comes last.
    let fetcher = Fetcher::new(small_chunk_options()).unwrap();
    let task = DownloadTask::new(server.url("/models/model.bin"), dir.path());
    fetcher.fetch(&task).await.unwrap();

    let joined = tokio::task::spawn_blocking(move || handle.join(None))
        .await
        .unwrap();
    match joined {
        kernel_build::BuildOutcome::Completed(code) => assert_eq!(code, 0),
        _ => panic!("expected the build to complete"),
    }
    assert!(flag.exists());
    assert!(dir.path().join("model.bin").exists());
}
