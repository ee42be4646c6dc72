//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::revalidate::MissPolicy;

pub use cli::{
    CliArgs, Command, FeedArgs, ServeArgs, ServeOverrides, StoreArgs, StoreOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "podfeeds";
const ENV_PREFIX: &str = "PODFEEDS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_SUBSCRIPTIONS_PATH: &str = "podcasts.toml";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_ORIGIN_TIMEOUT_SECS: u64 = 20;
const DEFAULT_USER_AGENT: &str = concat!("podfeeds/", env!("CARGO_PKG_VERSION"));
const DEFAULT_SQLITE_PATH: &str = "cache.sqlite3";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub subscriptions: SubscriptionSettings,
    pub origin: OriginSettings,
    pub cache: CacheSettings,
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port 0 asks the OS for a free port.
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
pub struct SubscriptionSettings {
    pub path: PathBuf,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub miss_policy: MissPolicy,
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

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Rebuild(args)) | Some(Command::Clear(args)) => {
            raw.apply_store_overrides(&args.overrides)
        }
        Some(Command::Refresh(args)) | Some(Command::Evict(args)) => {
            raw.apply_store_overrides(&args.overrides)
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    subscriptions: RawSubscriptionSettings,
    origin: RawOriginSettings,
    cache: RawCacheSettings,
    proxy: RawProxySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
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
        if let Some(seconds) = overrides.poll_interval_seconds {
            self.subscriptions.poll_interval_seconds = Some(seconds);
        }
        if let Some(policy) = overrides.miss_policy.as_ref() {
            self.proxy.miss_policy = Some(policy.clone());
        }

        self.apply_store_overrides(&overrides.store);
    }

    fn apply_store_overrides(&mut self, overrides: &StoreOverrides) {
        if let Some(path) = overrides.subscriptions_path.as_ref() {
            self.subscriptions.path = Some(path.clone());
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(path) = overrides.cache_sqlite_path.as_ref() {
            self.cache.sqlite_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.origin_timeout_seconds {
            self.origin.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            subscriptions,
            origin,
            cache,
            proxy,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            subscriptions: build_subscription_settings(subscriptions)?,
            origin: build_origin_settings(origin)?,
            cache: build_cache_settings(cache)?,
            proxy: build_proxy_settings(proxy)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

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

fn build_subscription_settings(
    subscriptions: RawSubscriptionSettings,
) -> Result<SubscriptionSettings, LoadError> {
    let path = non_empty_path(subscriptions.path, "subscriptions.path")?
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SUBSCRIPTIONS_PATH));
    let poll_interval = positive_seconds(
        subscriptions.poll_interval_seconds,
        DEFAULT_POLL_INTERVAL_SECS,
        "subscriptions.poll_interval_seconds",
    )?;

    Ok(SubscriptionSettings {
        path,
        poll_interval,
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let timeout = positive_seconds(
        origin.timeout_seconds,
        DEFAULT_ORIGIN_TIMEOUT_SECS,
        "origin.timeout_seconds",
    )?;

    let user_agent = match origin.user_agent {
        Some(agent) if agent.trim().is_empty() => {
            return Err(LoadError::invalid("origin.user_agent", "must not be blank"));
        }
        Some(agent) => agent.trim().to_string(),
        None => DEFAULT_USER_AGENT.to_string(),
    };

    Ok(OriginSettings {
        timeout,
        user_agent,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = cache
        .backend
        .as_deref()
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "memory".to_string());

    let backend = match backend.as_str() {
        "memory" => CacheBackend::Memory,
        "sqlite" => CacheBackend::Sqlite {
            path: non_empty_path(cache.sqlite_path, "cache.sqlite_path")?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
        },
        other => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected memory or sqlite)"),
            ));
        }
    };

    Ok(CacheSettings { backend })
}

fn build_proxy_settings(proxy: RawProxySettings) -> Result<ProxySettings, LoadError> {
    let miss_policy = match proxy.miss_policy {
        Some(value) => MissPolicy::from_str(&value)
            .map_err(|reason| LoadError::invalid("proxy.miss_policy", reason))?,
        None => MissPolicy::default(),
    };
    Ok(ProxySettings { miss_policy })
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
struct RawSubscriptionSettings {
    path: Option<PathBuf>,
    poll_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProxySettings {
    miss_policy: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_seconds(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value.unwrap_or(default) {
        0 => Err(LoadError::invalid(key, "must be greater than zero")),
        seconds => Ok(Duration::from_secs(seconds)),
    }
}

fn non_empty_path(value: Option<PathBuf>, key: &'static str) -> Result<Option<PathBuf>, LoadError> {
    match value {
        Some(path) if path.as_os_str().is_empty() => {
            Err(LoadError::invalid(key, "path must not be empty"))
        }
        other => Ok(other),
    }
}
