use distrocache_config::error::ConfigError;
use distrocache_core::{DistroError, ResolveError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Distro(#[from] DistroError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Failed to listen on {addr}")]
    #[diagnostic(
        code(distrocache::cli::bind),
        help("Check that the address is valid and the port is free")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed")]
    #[diagnostic(code(distrocache::cli::serve))]
    Serve(#[source] std::io::Error),

    #[error("Failed to encode snapshot: {0}")]
    #[diagnostic(code(distrocache::cli::encode))]
    Encode(String),

    #[error("Set {distribution}/{name} does not exist")]
    #[diagnostic(
        code(distrocache::cli::no_such_set),
        help("Run `distrocache sets` to list stored sets")
    )]
    NoSuchSet { distribution: String, name: String },
}

pub type CliResult<T> = std::result::Result<T, CliError>;
