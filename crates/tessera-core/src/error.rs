//! Unified Error Model
//!
//! Fatal errors for work that happens outside a render: loading site
//! configuration and reading template or asset files. Inside a render these
//! are turned into diagnostics.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("LOAD/NOT_FOUND: template '{0}' not found")]
    NotFound(String),

    #[error("LOAD/UNKNOWN_HOST: no site configured for host '{0}'")]
    UnknownHost(String),

    #[error("LOAD/PATH_ESCAPE: path '{0}' resolves outside the site root")]
    PathEscape(String),

    #[error("LOAD/IO: failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG/READ: failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CONFIG/PARSE: {0}")]
    Parse(String),

    #[error("CONFIG/INVALID: {field}: {reason}")]
    Invalid { field: String, reason: String },
}
