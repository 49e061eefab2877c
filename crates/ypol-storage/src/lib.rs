//! Upstream HTTP transport plus the relational policy store and its lifecycle sweeper.

pub mod http;
pub mod repository;
pub mod sweeper;

pub use http::{BackoffPolicy, FetchError, HttpClientConfig, HttpFetcher};
pub use repository::{Dialect, NewComment, PolicyRef, PolicyRepository, RepositoryError, StoredPolicy};
pub use sweeper::{LifecycleSweeper, DEFAULT_SWEEP_BATCH_SIZE};

pub const CRATE_NAME: &str = "ypol-storage";
