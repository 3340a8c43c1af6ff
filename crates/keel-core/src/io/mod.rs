//! Fetch, verify and unpack source artifacts.

pub mod extract;
pub mod fetch;
pub mod verify;

pub use extract::{ExtractError, unpack};
#[cfg(feature = "network")]
pub use fetch::HttpFetcher;
pub use fetch::{DefaultFetcher, FetchError, Fetcher, FileFetcher, RetryPolicy, fetch_with_retry};
pub use verify::{Sha256Verifier, Verifier};
