use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL. When unset, an empty in-memory store is used,
    /// which only serves anonymous connections.
    #[arg(long = "database-url", env = "PARLEY_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long = "db-max-connections", env = "PARLEY_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept in the pool
    #[arg(long = "db-min-connections", env = "PARLEY_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[arg(long = "db-acquire-timeout-secs", env = "PARLEY_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Idle connections are closed after this many seconds
    #[arg(long = "db-idle-timeout-secs", env = "PARLEY_DB_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Connections are recycled after this many seconds
    #[arg(long = "db-max-lifetime-secs", env = "PARLEY_DB_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "PARLEY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Port for the management (health) server
    #[arg(long, env = "PARLEY_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for in-flight work during shutdown
    #[arg(long, env = "PARLEY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000, mgmt_port: 9090, shutdown_timeout_secs: 5 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the per-connection outbound event buffer
    #[arg(
        long,
        env = "PARLEY_WS_OUTBOUND_BUFFER_SIZE",
        default_value_t = 64,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub outbound_buffer_size: usize,

    /// How often the server pings each connection
    #[arg(
        long,
        env = "PARLEY_WS_PING_INTERVAL_SECS",
        default_value_t = 25,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub ping_interval_secs: u64,

    /// Grace period after a ping before a silent connection is closed
    #[arg(long, env = "PARLEY_WS_PING_TIMEOUT_SECS", default_value_t = 20)]
    pub ping_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { outbound_buffer_size: 64, ping_interval_secs: 25, ping_timeout_secs: 20 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct StoreConfig {
    /// Upper bound for a single persistence call
    #[arg(long = "store-timeout-ms", env = "PARLEY_STORE_TIMEOUT_MS", default_value_t = 3000)]
    pub timeout_ms: u64,

    /// Retries for idempotent reads that fail with a retryable error
    #[arg(long = "store-read-retries", env = "PARLEY_STORE_READ_RETRIES", default_value_t = 3)]
    pub read_retries: usize,

    /// Initial backoff between read retries
    #[arg(long = "store-min-backoff-ms", env = "PARLEY_STORE_MIN_BACKOFF_MS", default_value_t = 50)]
    pub min_backoff_ms: u64,

    /// Maximum backoff between read retries
    #[arg(long = "store-max-backoff-ms", env = "PARLEY_STORE_MAX_BACKOFF_MS", default_value_t = 1000)]
    pub max_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 3000, read_retries: 3, min_backoff_ms: 50, max_backoff_ms: 1000 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Maximum length of a chat message in characters
    #[arg(long, env = "PARLEY_MAX_TEXT_LENGTH", default_value_t = 4096)]
    pub max_text_length: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_text_length: 4096 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "PARLEY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; telemetry export is disabled when unset
    #[arg(long, env = "PARLEY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}
