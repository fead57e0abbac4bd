//! Relay command

use crate::fetcher::EndpointKind;
use crate::identifier::RunIdentifier;
use crate::logging::LogLevel;
use crate::relay::config::{
    BATCH_SIZE_RANGE, DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_TIMEOUT_SECS, MAX_POLL_INTERVAL_MS, TIMEOUT_SECS_RANGE,
};
use crate::relay::{ConfigError, RelayConfig, RelayExecutor, RunReport};
use crate::shutdown::SharedShutdown;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use super::CliError;

/// Parse a chunk or page size within [`BATCH_SIZE_RANGE`]
fn parse_batch_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !BATCH_SIZE_RANGE.contains(&value) {
        return Err(format!(
            "{value} is out of range ({}-{})",
            BATCH_SIZE_RANGE.start(),
            BATCH_SIZE_RANGE.end()
        ));
    }
    Ok(value)
}

/// Usage event relay CLI
#[derive(Parser, Debug)]
#[command(name = "usage-relay")]
#[command(about = "Relay isolation usage events to an HTTP callback", long_about = None)]
#[command(version, arg_required_else_help = true)]
pub struct Cli {
    /// Reporting endpoint: WEB or URL
    #[arg(short = 'e', long)]
    pub endpoint: EndpointKind,

    /// API key for the reporting API
    #[arg(short = 'k', long = "apikey")]
    pub api_key: String,

    /// Unique identifier of this relay; names the checkpoint and log files
    #[arg(short = 'i', long)]
    pub identifier: String,

    /// Callback URL receiving the events
    #[arg(short = 't', long)]
    pub target: String,

    /// Log level: CRITICAL, ERROR, WARNING, INFO or DEBUG
    #[arg(short = 'l', long = "loglevel", value_enum, ignore_case = true, default_value = "INFO")]
    pub log_level: LogLevel,

    /// Records per delivery chunk (1-10000)
    #[arg(short = 'c', long = "chunk", default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_batch_size)]
    pub chunk_size: usize,

    /// Records requested per page (1-10000)
    #[arg(long = "pagesize", default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_batch_size)]
    pub page_size: usize,

    /// HTTP timeout in seconds (1-3600)
    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(TIMEOUT_SECS_RANGE)
    )]
    pub timeout: u64,

    /// Directory for the checkpoint and log files
    #[arg(long, default_value = ".")]
    pub checkpoint_dir: PathBuf,

    /// Delay between polls of a job that is still processing, in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(0..=MAX_POLL_INTERVAL_MS)
    )]
    pub poll_interval_ms: u64,

    /// Override the reporting API URL of the selected endpoint
    #[arg(long)]
    pub api_url: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Validate the identifier separately so logging can start before the
    /// rest of the configuration is checked
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidIdentifier`] for unusable identifiers.
    pub fn run_identifier(&self) -> Result<RunIdentifier, ConfigError> {
        Ok(RunIdentifier::parse(&self.identifier)?)
    }

    /// Build and run the relay
    ///
    /// # Errors
    /// Returns [`CliError`] when the configuration is invalid or the run
    /// aborts before delivering anything.
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<RunReport, CliError> {
        let config = RelayConfig::from_cli(self)?;
        let executor = RelayExecutor::new(config)?.with_shutdown(shutdown);
        Ok(executor.run().await?)
    }
}

impl RelayConfig {
    /// Validated configuration from parsed arguments
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut builder = RelayConfig::builder(
            cli.endpoint,
            cli.api_key.clone(),
            cli.run_identifier()?,
            cli.target.clone(),
        )
        .chunk_size(cli.chunk_size)
        .page_size(cli.page_size)
        .timeout_secs(cli.timeout)
        .poll_interval_ms(cli.poll_interval_ms)
        .checkpoint_dir(cli.checkpoint_dir.clone());

        if let Some(url) = &cli.api_url {
            builder = builder.base_url(url.clone());
        }

        builder.build()
    }
}
