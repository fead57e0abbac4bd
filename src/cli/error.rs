//! CLI error types and conversions

use crate::relay::{ConfigError, RelayError};

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid argument combination or value
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Run aborted before delivering anything
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}
