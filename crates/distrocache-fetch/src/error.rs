use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum FetchError {
    #[error("Unsupported source type `{0}`")]
    #[diagnostic(
        code(distrocache_fetch::unsupported_type),
        help("Only `git` sources can be fetched")
    )]
    UnsupportedType(String),

    #[error("Invalid repository URL: {url}")]
    #[diagnostic(code(distrocache_fetch::invalid_url))]
    InvalidUrl { url: String },

    #[error("Reference `{reference}` not found in {url}")]
    #[diagnostic(
        code(distrocache_fetch::ref_not_found),
        help("Check that the branch or tag exists on the remote")
    )]
    RefNotFound { url: String, reference: String },

    #[error("Not found: {url}")]
    #[diagnostic(code(distrocache_fetch::not_found))]
    NotFound { url: String },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(distrocache_fetch::http_error))]
    HttpError { status: u16, url: String },

    #[error(transparent)]
    #[diagnostic(
        code(distrocache_fetch::network),
        help("Check your internet connection or try again later")
    )]
    Network(#[from] Box<ureq::Error>),

    #[error("Archive from {url} is corrupt or incomplete")]
    #[diagnostic(code(distrocache_fetch::corrupt_archive))]
    CorruptArchive {
        url: String,
        #[source]
        source: compak::error::ArchiveError,
    },

    #[error("Archive from {url} contained no files")]
    #[diagnostic(code(distrocache_fetch::empty_archive))]
    EmptyArchive { url: String },

    #[error("`{command}` failed: {stderr}")]
    #[diagnostic(code(distrocache_fetch::git))]
    Git { command: String, stderr: String },

    #[error("Failed to run git")]
    #[diagnostic(
        code(distrocache_fetch::git_unavailable),
        help("Make sure `git` is installed and on PATH")
    )]
    GitUnavailable(#[source] std::io::Error),

    #[error("Invalid response from {url}")]
    #[diagnostic(code(distrocache_fetch::invalid_response))]
    InvalidResponse { url: String },

    #[error(transparent)]
    #[diagnostic(code(distrocache_fetch::io))]
    Io(#[from] std::io::Error),
}

impl From<ureq::Error> for FetchError {
    fn from(e: ureq::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

impl FetchError {
    /// Maps a request failure for `url`, turning status codes into
    /// [`FetchError::NotFound`] or [`FetchError::HttpError`].
    pub fn from_request(err: ureq::Error, url: &str) -> Self {
        match err {
            ureq::Error::StatusCode(404) => {
                Self::NotFound {
                    url: url.to_string(),
                }
            }
            ureq::Error::StatusCode(status) => {
                Self::HttpError {
                    status,
                    url: url.to_string(),
                }
            }
            other => Self::from(other),
        }
    }

    /// Whether a later attempt may succeed without anything changing on the
    /// caller's side. Nothing is retried internally.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            Self::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_http_error() {
        let err = FetchError::HttpError {
            status: 503,
            url: "https://example.com/archive.tar.gz".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("HTTP 503"));
        assert!(msg.contains("https://example.com/archive.tar.gz"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_request_maps_status() {
        let err = FetchError::from_request(ureq::Error::StatusCode(404), "https://x/a");
        assert!(matches!(err, FetchError::NotFound { ref url } if url == "https://x/a"));
        assert!(!err.is_retryable());

        let err = FetchError::from_request(ureq::Error::StatusCode(429), "https://x/a");
        assert!(matches!(err, FetchError::HttpError { status: 429, .. }));
        assert!(err.is_retryable());

        let err = FetchError::from_request(ureq::Error::StatusCode(403), "https://x/a");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = FetchError::from_request(ureq::Error::ConnectionFailed, "https://x/a");
        assert!(matches!(err, FetchError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ref_not_found_display() {
        let err = FetchError::RefNotFound {
            url: "https://github.com/ros/rosdistro".into(),
            reference: "nope".into(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("`nope`"));
        assert!(!err.is_retryable());
    }
}
