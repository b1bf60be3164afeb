//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CheckRoutesArgs, CliArgs, Command, DatabaseOverride, IssueApiKeyArgs, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quire";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 2368;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SITE_URL: &str = "http://localhost:2368/";
const DEFAULT_ROUTES_DIR: &str = "content/settings";
const DEFAULT_API_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_API_RATE_LIMIT_MAX_REQUESTS: u64 = 120;
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 1024 * 1024;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_AUTO_CONSUME_INTERVAL_MS: u64 = 2000;
const DEFAULT_CACHE_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_CACHE_REQUEST_TIMEOUT_MS: u64 = 5000;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/";
const DEFAULT_STRIPE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_KEY_VERIFICATION_VALIDITY_SECS: u64 = 24 * 60 * 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub site: SiteSettings,
    pub auth: AuthSettings,
    pub routes: RoutesSettings,
    pub uploads: UploadSettings,
    pub api_rate_limit: ApiRateLimitSettings,
    pub cache: CacheSettings,
    pub stripe: StripeSettings,
    pub key_verification: KeyVerificationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub url: Url,
}

/// Staff identity is supplied by a trusted upstream (the admin frontend or
/// an authenticating proxy). Without a header name only API keys are accepted.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub trusted_user_header: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoutesSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
    /// Staging directory for uploaded files; the system temp dir when unset.
    pub staging_directory: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ApiRateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub purge_url: Option<Url>,
    pub consume_immediately: bool,
    pub auto_consume_interval_ms: u64,
    pub consume_batch_limit: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub api_base: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct KeyVerificationSettings {
    pub validity: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("QUIRE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::IssueApiKey(args)) => raw.apply_database_override(&args.database),
        Some(Command::CheckRoutes(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    site: RawSiteSettings,
    auth: RawAuthSettings,
    routes: RawRoutesSettings,
    uploads: RawUploadSettings,
    api_rate_limit: RawApiRateLimitSettings,
    cache: RawCacheSettings,
    stripe: RawStripeSettings,
    key_verification: RawKeyVerificationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.site_url.as_ref() {
            self.site.url = Some(url.clone());
        }
        if let Some(directory) = overrides.routes_directory.as_ref() {
            self.routes.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(window) = overrides.api_rate_limit_window_seconds {
            self.api_rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.api_rate_limit_max_requests {
            self.api_rate_limit.max_requests = Some(max);
        }
        if let Some(url) = overrides.cache_purge_url.as_ref() {
            self.cache.purge_url = Some(url.clone());
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            site,
            auth,
            routes,
            uploads,
            api_rate_limit,
            cache,
            stripe,
            key_verification,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            site: build_site_settings(site)?,
            auth: build_auth_settings(auth),
            routes: build_routes_settings(routes)?,
            uploads: build_upload_settings(uploads)?,
            api_rate_limit: build_api_rate_limit_settings(api_rate_limit)?,
            cache: build_cache_settings(cache)?,
            stripe: build_stripe_settings(stripe)?,
            key_verification: build_key_verification_settings(key_verification)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let raw = non_blank(site.url).unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let mut url = parse_url(&raw, "site.url")?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(SiteSettings { url })
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    AuthSettings {
        trusted_user_header: non_blank(auth.trusted_user_header)
            .map(|header| header.to_ascii_lowercase()),
    }
}

fn build_routes_settings(routes: RawRoutesSettings) -> Result<RoutesSettings, LoadError> {
    let directory = routes
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROUTES_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "routes.directory",
            "path must not be empty",
        ));
    }
    Ok(RoutesSettings { directory })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings {
        max_request_bytes,
        staging_directory: uploads.staging_directory,
    })
}

fn build_api_rate_limit_settings(
    rate_limit: RawApiRateLimitSettings,
) -> Result<ApiRateLimitSettings, LoadError> {
    let window_seconds_val = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_API_RATE_LIMIT_WINDOW_SECS);
    let window_seconds = non_zero_u32(window_seconds_val, "api_rate_limit.window_seconds")?;

    let max_requests_val = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_API_RATE_LIMIT_MAX_REQUESTS);
    let max_requests = non_zero_u32(max_requests_val, "api_rate_limit.max_requests")?;

    Ok(ApiRateLimitSettings {
        window_seconds,
        max_requests,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let purge_url = non_blank(cache.purge_url)
        .map(|raw| parse_url(&raw, "cache.purge_url"))
        .transpose()?;

    let auto_consume_interval_ms = cache
        .auto_consume_interval_ms
        .unwrap_or(DEFAULT_CACHE_AUTO_CONSUME_INTERVAL_MS);
    if auto_consume_interval_ms == 0 {
        return Err(LoadError::invalid(
            "cache.auto_consume_interval_ms",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        purge_url,
        consume_immediately: cache.consume_immediately.unwrap_or(false),
        auto_consume_interval_ms,
        consume_batch_limit: cache
            .consume_batch_limit
            .unwrap_or(DEFAULT_CACHE_CONSUME_BATCH_LIMIT),
        request_timeout_ms: cache
            .request_timeout_ms
            .unwrap_or(DEFAULT_CACHE_REQUEST_TIMEOUT_MS),
    })
}

fn build_stripe_settings(stripe: RawStripeSettings) -> Result<StripeSettings, LoadError> {
    let raw = non_blank(stripe.api_base).unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string());
    let api_base = parse_url(&raw, "stripe.api_base")?;
    let timeout_secs = stripe.timeout_seconds.unwrap_or(DEFAULT_STRIPE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "stripe.timeout_seconds",
            "must be greater than zero",
        ));
    }
    Ok(StripeSettings {
        api_base,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_key_verification_settings(
    settings: RawKeyVerificationSettings,
) -> Result<KeyVerificationSettings, LoadError> {
    let seconds = settings
        .validity_seconds
        .unwrap_or(DEFAULT_KEY_VERIFICATION_VALIDITY_SECS);
    if seconds == 0 {
        return Err(LoadError::invalid(
            "key_verification.validity_seconds",
            "must be greater than zero",
        ));
    }
    Ok(KeyVerificationSettings {
        validity: Duration::from_secs(seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    trusted_user_header: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRoutesSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
    staging_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    purge_url: Option<String>,
    consume_immediately: Option<bool>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<usize>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStripeSettings {
    api_base: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKeyVerificationSettings {
    validity_seconds: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_url(raw: &str, key: &'static str) -> Result<Url, LoadError> {
    Url::parse(raw).map_err(|err| LoadError::invalid(key, format!("invalid URL `{raw}`: {err}")))
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
