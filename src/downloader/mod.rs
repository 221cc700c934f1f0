pub mod error;
pub mod fetch;
#[cfg(test)]
mod fetch_tests;
pub mod task;

pub use error::FetchError;
pub use fetch::{FetchOptions, FetchOutcome, Fetcher};
pub use task::DownloadTask;
