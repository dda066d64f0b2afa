//! Server configuration.
//!
//! Evaluation order per setting: CLI flag, then environment variable, then
//! the optional TOML config file, then the built-in default. The file is
//! found via `FOREMAN_CONFIG_PATH` or the conventional candidates
//! (`foreman.toml`, `config/foreman.toml`).

use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// How requests authenticate.
///
/// `os-integrated` deployments terminate authentication in front of the
/// server (reverse proxy / gateway); selecting it here is a configuration
/// error rather than a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Token,
}

impl std::str::FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(AuthMode::None),
            "token" => Ok(AuthMode::Token),
            "os-integrated" => Err(anyhow!(
                "auth_mode 'os-integrated' is delegated to deployment infrastructure; \
                 configure 'none' or 'token' on the server"
            )),
            other => Err(anyhow!("unknown auth_mode: {other}")),
        }
    }
}

/// Settings the server runs with, resolved from CLI/env/file/defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub db_connection: Option<String>,
    pub heartbeat_timeout: Duration,
    pub lock_ttl: Duration,
    pub node_sweep_interval: Duration,
    pub lock_sweep_interval: Duration,
    pub request_deadline: Duration,
    pub allowed_origins: Vec<String>,
    pub auth_mode: AuthMode,
    pub token_secret: Option<String>,
    pub log_level: String,
    pub log_directory: Option<PathBuf>,
    pub dev_mode: bool,
}

/// CLI-level overrides collected by the binary.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub bind_address: Option<SocketAddr>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub dev_mode: bool,
}

impl Config {
    pub fn load(cli: CliOverrides) -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let file = FileConfig::discover(cli.config_path.as_deref())?;

        let bind_address = if let Some(addr) = cli.bind_address {
            addr
        } else if let Some(raw) = env_string("BIND_ADDRESS").or(file.bind_address.clone()) {
            raw.parse()
                .with_context(|| format!("invalid bind_address: {raw}"))?
        } else {
            SocketAddr::from(([0, 0, 0, 0], 8080))
        };

        let dev_mode = cli.dev_mode
            || env_bool("DEV_MODE")?.unwrap_or(false)
            || file.dev_mode.unwrap_or(false);

        let auth_mode = match env_string("AUTH_MODE").or_else(|| file.auth_mode.clone()) {
            Some(raw) => raw.parse()?,
            None => AuthMode::None,
        };

        let config = Config {
            bind_address,
            tls_cert: cli
                .tls_cert
                .or_else(|| env_string("TLS_CERT_PATH").map(PathBuf::from))
                .or(file.tls_cert),
            tls_key: cli
                .tls_key
                .or_else(|| env_string("TLS_KEY_PATH").map(PathBuf::from))
                .or(file.tls_key),
            db_connection: env_string("DATABASE_URL").or(file.db_connection),
            heartbeat_timeout: resolve_duration(
                "HEARTBEAT_TIMEOUT",
                file.heartbeat_timeout.as_deref(),
                Duration::from_secs(2 * 60),
            )?,
            lock_ttl: resolve_duration(
                "LOCK_TTL",
                file.lock_ttl.as_deref(),
                Duration::from_secs(10 * 60),
            )?,
            node_sweep_interval: resolve_duration(
                "NODE_SWEEP_INTERVAL",
                file.node_sweep_interval.as_deref(),
                Duration::from_secs(30),
            )?,
            lock_sweep_interval: resolve_duration(
                "LOCK_SWEEP_INTERVAL",
                file.lock_sweep_interval.as_deref(),
                Duration::from_secs(60),
            )?,
            request_deadline: resolve_duration(
                "REQUEST_DEADLINE",
                file.request_deadline.as_deref(),
                Duration::from_secs(30),
            )?,
            allowed_origins: env_string("ALLOWED_ORIGINS")
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .or(file.allowed_origins)
                .unwrap_or_else(|| vec!["*".to_string()]),
            auth_mode,
            token_secret: env_string("TOKEN_SECRET").or(file.token_secret),
            log_level: env_string("LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
            log_directory: env_string("LOG_DIRECTORY")
                .map(PathBuf::from)
                .or(file.log_directory),
            dev_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.auth_mode == AuthMode::Token
            && self.token_secret.as_deref().unwrap_or("").is_empty()
        {
            bail!("auth_mode 'token' requires a non-empty TOKEN_SECRET");
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            bail!("TLS requires both TLS_CERT_PATH and TLS_KEY_PATH (or neither)");
        }
        if !self.dev_mode && self.db_connection.is_none() {
            bail!("DATABASE_URL is required outside dev mode");
        }
        Ok(())
    }
}

/// File-level settings; every field optional so the file can be partial.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_address: Option<String>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
    db_connection: Option<String>,
    heartbeat_timeout: Option<String>,
    lock_ttl: Option<String>,
    node_sweep_interval: Option<String>,
    lock_sweep_interval: Option<String>,
    request_deadline: Option<String>,
    allowed_origins: Option<Vec<String>>,
    auth_mode: Option<String>,
    token_secret: Option<String>,
    log_level: Option<String>,
    log_directory: Option<PathBuf>,
    dev_mode: Option<bool>,
}

impl FileConfig {
    /// Evaluation order: explicit CLI path, `$FOREMAN_CONFIG_PATH`, then the
    /// conventional candidates; defaults if nothing is found.
    fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        if let Ok(path) = env::var("FOREMAN_CONFIG_PATH") {
            return Self::load_from_file(Path::new(&path));
        }

        if let Some(path) = Self::find_default_file() {
            return Self::load_from_file(&path);
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        parse_file_config(&contents)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &["foreman.toml", "config/foreman.toml"];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}

fn parse_file_config(contents: &str) -> anyhow::Result<FileConfig> {
    toml::from_str(contents).map_err(|err| anyhow!("{err}"))
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_bool(name: &str) -> anyhow::Result<Option<bool>> {
    env_string(name)
        .map(|raw| {
            raw.parse::<bool>()
                .with_context(|| format!("{name} must be true or false"))
        })
        .transpose()
}

/// Durations accept humantime forms ("2m", "90s", "1h30m").
fn resolve_duration(
    env_name: &str,
    file_value: Option<&str>,
    default: Duration,
) -> anyhow::Result<Duration> {
    let raw = env_string(env_name).or_else(|| file_value.map(str::to_string));
    match raw {
        Some(raw) => humantime::parse_duration(&raw)
            .with_context(|| format!("{env_name} has an invalid duration: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_config_parses_partial_toml() {
        let file = parse_file_config(
            r#"
            bind_address = "127.0.0.1:9000"
            lock_ttl = "5m"
            allowed_origins = ["https://ops.example.com"]
            auth_mode = "token"
            token_secret = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(file.bind_address.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(file.lock_ttl.as_deref(), Some("5m"));
        assert_eq!(file.auth_mode.as_deref(), Some("token"));
        assert!(file.db_connection.is_none());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(parse_file_config("surprise = true").is_err());
    }

    #[test]
    fn auth_mode_parsing() {
        assert_eq!("none".parse::<AuthMode>().unwrap(), AuthMode::None);
        assert_eq!("token".parse::<AuthMode>().unwrap(), AuthMode::Token);
        assert!("os-integrated".parse::<AuthMode>().is_err());
        assert!("jwt".parse::<AuthMode>().is_err());
    }

    #[test]
    fn durations_use_humantime_forms() {
        let parsed = resolve_duration("NO_SUCH_ENV_VAR", Some("1h30m"), Duration::ZERO).unwrap();
        assert_eq!(parsed, Duration::from_secs(90 * 60));
        let defaulted = resolve_duration("NO_SUCH_ENV_VAR", None, Duration::from_secs(7)).unwrap();
        assert_eq!(defaulted, Duration::from_secs(7));
        assert!(resolve_duration("NO_SUCH_ENV_VAR", Some("not-a-duration"), Duration::ZERO).is_err());
    }
}
