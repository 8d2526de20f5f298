//! Error types for distrocache-core.

use std::sync::Arc;

use distrocache_config::error::ConfigError;
use distrocache_db::error::DbError;
use distrocache_fetch::FetchError;
use miette::Diagnostic;
use thiserror::Error;

use crate::{discovery::DiscoveryError, model::ManifestEntry};

/// Core error type for snapshot resolution.
#[derive(Error, Diagnostic, Debug)]
pub enum DistroError {
    #[error("Failed to resolve `{reference}` in {url}")]
    #[diagnostic(
        code(distrocache::ref_resolution),
        help("Check that the branch or tag exists on the remote")
    )]
    RefResolution {
        url: String,
        reference: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to fetch {name} at {version}")]
    #[diagnostic(code(distrocache::fetch))]
    Fetch {
        name: String,
        version: String,
        #[source]
        source: FetchError,
    },

    #[error("Package discovery failed for {name} at {version}")]
    #[diagnostic(code(distrocache::discovery))]
    Discovery {
        name: String,
        version: String,
        #[source]
        source: DiscoveryError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid distribution manifest: {0}")]
    #[diagnostic(
        code(distrocache::manifest),
        help("Check the distribution file in the distro repository")
    )]
    Manifest(String),

    #[error("Distribution `{0}` is not served here")]
    #[diagnostic(
        code(distrocache::unknown_distribution),
        help("Add it to `distro.distributions` in the configuration")
    )]
    UnknownDistribution(String),

    #[error("Error while {action}")]
    #[diagnostic(code(distrocache::io), help("Check file permissions and disk space"))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    #[diagnostic(code(distrocache::task))]
    Task(String),
}

impl DistroError {
    /// Short machine-readable label for the failure class.
    pub fn category(&self) -> &'static str {
        match self {
            DistroError::RefResolution { .. } => "ref_resolution",
            DistroError::Fetch { .. } => "fetch",
            DistroError::Discovery { .. } => "discovery",
            DistroError::Store(_) => "store",
            DistroError::Config(_) => "config",
            DistroError::Manifest(_) => "manifest",
            DistroError::UnknownDistribution(_) => "unknown_distribution",
            DistroError::Io { .. } => "io",
            DistroError::Task(_) => "task",
        }
    }

    /// Whether the error means the requested thing does not exist, as opposed
    /// to a failure while producing it.
    pub fn is_not_found(&self) -> bool {
        match self {
            DistroError::UnknownDistribution(_) => true,
            DistroError::RefResolution { source, .. } | DistroError::Fetch { source, .. } => {
                matches!(
                    source,
                    FetchError::RefNotFound { .. } | FetchError::NotFound { .. }
                )
            }
            _ => false,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DistroError::RefResolution { source, .. } | DistroError::Fetch { source, .. } => {
                source.is_retryable()
            }
            DistroError::Io { .. } | DistroError::Task(_) => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for DistroError {
    fn from(err: tokio::task::JoinError) -> Self {
        DistroError::Task(err.to_string())
    }
}

/// One manifest entry that could not be turned into a repository state.
#[derive(Error, Diagnostic, Debug, Clone)]
#[error("{name}: {error}")]
#[diagnostic(code(distrocache::entry))]
pub struct EntryFailure {
    pub name: String,
    pub kind: String,
    pub url: String,
    pub reference: String,
    /// Shared with every other caller that waited on the same work.
    pub error: Arc<DistroError>,
}

impl EntryFailure {
    pub fn new(entry: &ManifestEntry, error: Arc<DistroError>) -> Self {
        Self {
            name: entry.name.clone(),
            kind: entry.kind.clone(),
            url: entry.url.clone(),
            reference: entry.reference.clone(),
            error,
        }
    }
}

/// Failure of a whole resolution request.
#[derive(Error, Diagnostic, Debug)]
pub enum ResolveError {
    #[error("{} of {total} repositories could not be resolved", .failures.len())]
    #[diagnostic(
        code(distrocache::resolve::entries),
        help("Repositories that did resolve are cached; retrying only refetches the failures")
    )]
    Entries {
        #[related]
        failures: Vec<EntryFailure>,
        total: usize,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Distro(#[from] DistroError),
}

impl From<DbError> for ResolveError {
    fn from(err: DbError) -> Self {
        ResolveError::Distro(DistroError::Store(err))
    }
}

pub type Result<T> = std::result::Result<T, DistroError>;
