pub mod api;
pub mod archive;
pub mod error;
pub mod fetcher;
pub mod git;
pub mod host;
pub mod http_client;
pub mod reference;

pub use error::FetchError;
pub use fetcher::{ExtractedTree, Fetcher, GitFetcher};
pub use reference::{RefKind, RefTarget, ResolvedRef};
