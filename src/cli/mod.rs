//! Command-line surface

pub mod error;
pub mod relay;

pub use error::CliError;
pub use relay::Cli;
