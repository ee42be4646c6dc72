use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the podfeeds binary.
#[derive(Debug, Parser)]
#[command(
    name = "podfeeds",
    version,
    about = "Caching proxy that serves podcast feeds as plain HTML"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PODFEEDS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP proxy (default).
    Serve(Box<ServeArgs>),
    /// Rebuild the whole cache once from the subscription list and exit.
    Rebuild(StoreArgs),
    /// Re-fetch one feed unconditionally and overwrite its cached page.
    Refresh(FeedArgs),
    /// Remove one feed's cached page.
    Evict(FeedArgs),
    /// Remove every cached page, the index included.
    Clear(StoreArgs),
}

/// Overrides shared by every command that touches the page store.
#[derive(Debug, Args, Default, Clone)]
pub struct StoreOverrides {
    /// Override the subscription list path.
    #[arg(long = "subscriptions-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub subscriptions_path: Option<PathBuf>,

    /// Override the cache backend (memory|sqlite).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the SQLite database path.
    #[arg(long = "cache-sqlite-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub cache_sqlite_path: Option<PathBuf>,

    /// Override the origin request timeout.
    #[arg(long = "origin-timeout-seconds", value_name = "SECONDS")]
    pub origin_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StoreArgs {
    #[command(flatten)]
    pub overrides: StoreOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub overrides: StoreOverrides,

    /// Feed URL exactly as listed in the subscription file.
    #[arg(long, value_name = "URL")]
    pub url: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub store: StoreOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port; 0 picks a free port.
    #[arg(long = "port", alias = "server-port", value_name = "PORT")]
    pub port: Option<u16>,

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

    /// Override how often the subscription list is checked for changes.
    #[arg(long = "poll-interval-seconds", value_name = "SECONDS")]
    pub poll_interval_seconds: Option<u64>,

    /// Override the cache-miss policy (not_found|fetch_on_demand).
    #[arg(long = "miss-policy", value_name = "POLICY")]
    pub miss_policy: Option<String>,
}
