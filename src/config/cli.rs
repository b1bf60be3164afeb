use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the quire binary.
#[derive(Debug, Parser)]
#[command(name = "quire", version, about = "Quire admin API server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the admin API.
    Serve(Box<ServeArgs>),
    /// Validate a routes document and print its content hash.
    #[command(name = "check-routes")]
    CheckRoutes(CheckRoutesArgs),
    /// Create an integration API key and print the token once.
    #[command(name = "issue-api-key")]
    IssueApiKey(IssueApiKeyArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the public site URL used for absolute links.
    #[arg(long = "site-url", value_name = "URL")]
    pub site_url: Option<String>,

    /// Override the directory holding `routes.yaml`.
    #[arg(long = "routes-directory", value_name = "PATH")]
    pub routes_directory: Option<PathBuf>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override the API rate limit window size.
    #[arg(long = "api-rate-limit-window-seconds", value_name = "SECONDS")]
    pub api_rate_limit_window_seconds: Option<u64>,

    /// Override the API rate limit request ceiling.
    #[arg(long = "api-rate-limit-max-requests", value_name = "COUNT")]
    pub api_rate_limit_max_requests: Option<u64>,

    /// Override the purge webhook URL.
    #[arg(long = "cache-purge-url", value_name = "URL")]
    pub cache_purge_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct CheckRoutesArgs {
    /// Path to the routes document to check.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct IssueApiKeyArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Display name of the key.
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Integration the key acts for; a new id is generated when omitted.
    #[arg(long = "integration-id", value_name = "UUID")]
    pub integration_id: Option<uuid::Uuid>,

    /// Expire the key after this many days.
    #[arg(long = "expires-in-days", value_name = "DAYS")]
    pub expires_in_days: Option<u32>,
}
