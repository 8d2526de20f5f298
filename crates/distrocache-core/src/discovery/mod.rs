//! Package discovery over an extracted repository tree.
//!
//! The backend is chosen once from configuration:
//!
//! - [`package_xml::PackageXmlDiscoverer`] - walks the tree for `package.xml`
//! - [`command::CommandDiscoverer`] - delegates to an external program

pub mod command;
pub mod package_xml;

use std::{path::PathBuf, sync::Arc};

use distrocache_config::{
    discovery::{DiscoveryBackend, DiscoverySettings},
    error::ConfigError,
};
use thiserror::Error;

pub use command::CommandDiscoverer;
pub use package_xml::PackageXmlDiscoverer;

use crate::model::PackageDescriptor;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {root}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Invalid package manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("Failed to start discovery command `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Discovery command `{program}` exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Discovery command `{program}` printed invalid descriptors")]
    InvalidOutput {
        program: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Finds the packages contained in a repository tree.
pub trait Discoverer: Send + Sync {
    fn discover(&self, root: &std::path::Path) -> Result<Vec<PackageDescriptor>, DiscoveryError>;
}

/// Builds the configured discovery backend.
pub fn from_settings(settings: &DiscoverySettings) -> Result<Arc<dyn Discoverer>, ConfigError> {
    match settings.backend() {
        DiscoveryBackend::PackageXml => Ok(Arc::new(PackageXmlDiscoverer)),
        DiscoveryBackend::Command => {
            let argv = settings.command.clone().unwrap_or_default();
            let discoverer =
                CommandDiscoverer::new(argv).ok_or(ConfigError::MissingDiscoveryCommand)?;
            Ok(Arc::new(discoverer))
        }
    }
}
