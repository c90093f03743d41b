use crate::{
    auth::{AccessTokens, TokenParseError},
    mount::view::FileLayout,
    services::{
        bucket_resolver::{BucketConfigError, BucketResolver, MAX_KEY_SIZE},
        download_service::DownloadConfig,
        part_calculator::{DEFAULT_PART_SIZE, PartCalculator, PartError},
    },
};
use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::{env, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid url expiration `{0}`, expected <n>h, <n>d or a number of days")]
    InvalidExpiration(String),
    #[error("url expiration must be longer than one hour, got {0} hour(s)")]
    ExpirationTooShort(i64),
    #[error(transparent)]
    Buckets(#[from] BucketConfigError),
    #[error(transparent)]
    Parts(#[from] PartError),
    #[error("url signing secret must not be empty")]
    EmptySigningSecret,
    #[error(transparent)]
    Tokens(#[from] TokenParseError),
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub data_bucket: String,
    pub state_bucket: String,
    pub data_dir: String,
    pub pool_size: i32,
    pub key_size: usize,
    pub url_expiration: TimeDelta,
    pub part_size: u64,
    pub signing_secret: String,
    pub public_url: String,
    /// Raw `token=scope,scope;...` list.
    pub access_tokens: String,
    pub download_scope: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Download gateway for partitioned genomic object storage"
)]
pub struct Cli {
    #[command(flatten)]
    pub args: Args,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the gateway (default)
    Serve,
    /// Create the metadata schema and exit
    Migrate,
    /// Browse a running gateway through the mount view
    Browse(BrowseArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct BrowseArgs {
    /// Gateway base URL (overrides OBJECT_GATEWAY_URL)
    #[arg(long)]
    pub gateway_url: Option<String>,

    /// Bearer token (overrides OBJECT_GATEWAY_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    #[arg(long, value_enum, default_value_t = FileLayout::Bundle)]
    pub layout: FileLayout,

    /// Print the signed URL of the file instead of listing
    #[arg(long)]
    pub url: bool,

    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Host to bind to (overrides OBJECT_GATEWAY_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_GATEWAY_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Root of the local object store (overrides OBJECT_GATEWAY_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_GATEWAY_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Base data bucket (overrides OBJECT_GATEWAY_DATA_BUCKET)
    #[arg(long, global = true)]
    pub data_bucket: Option<String>,

    /// Base state bucket (overrides OBJECT_GATEWAY_STATE_BUCKET)
    #[arg(long, global = true)]
    pub state_bucket: Option<String>,

    /// Key prefix of data objects (overrides OBJECT_GATEWAY_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Number of bucket partitions, 0 disables (overrides OBJECT_GATEWAY_POOL_SIZE)
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub pool_size: Option<i32>,

    /// Digits in a partition suffix (overrides OBJECT_GATEWAY_KEY_SIZE)
    #[arg(long, global = true)]
    pub key_size: Option<usize>,

    /// Signed URL lifetime: <n>h, <n>d or days (overrides OBJECT_GATEWAY_URL_EXPIRATION)
    #[arg(long, global = true)]
    pub url_expiration: Option<String>,

    /// Download part size in bytes (overrides OBJECT_GATEWAY_PART_SIZE)
    #[arg(long, global = true)]
    pub part_size: Option<u64>,

    /// Secret for URL signatures (overrides OBJECT_GATEWAY_SIGNING_SECRET)
    #[arg(long, global = true)]
    pub signing_secret: Option<String>,

    /// Base URL written into signed URLs (overrides OBJECT_GATEWAY_PUBLIC_URL)
    #[arg(long, global = true)]
    pub public_url: Option<String>,

    /// `token=scope,scope;...` (overrides OBJECT_GATEWAY_ACCESS_TOKENS)
    #[arg(long, global = true)]
    pub access_tokens: Option<String>,

    /// Scope required on the download API (overrides OBJECT_GATEWAY_DOWNLOAD_SCOPE)
    #[arg(long, global = true)]
    pub download_scope: Option<String>,
}

/// Read `name`, parsing it when present.
fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok()
}

/// `"24h"` → 24 hours, `"2d"` or `"2"` → 2 days.
pub fn parse_expiration(raw: &str) -> Result<TimeDelta, ConfigError> {
    let raw = raw.trim();
    let invalid = || ConfigError::InvalidExpiration(raw.to_string());
    let (digits, hours_per_unit) = if let Some(hours) = raw.strip_suffix(['h', 'H']) {
        (hours, 1)
    } else if let Some(days) = raw.strip_suffix(['d', 'D']) {
        (days, 24)
    } else {
        (raw, 24)
    };
    let count = digits.trim().parse::<i64>().map_err(|_| invalid())?;
    count
        .checked_mul(hours_per_unit)
        .and_then(TimeDelta::try_hours)
        .ok_or_else(invalid)
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        // Parse CLI once
        let cli = Cli::parse();
        let args = cli.args;

        // --- Environment fallback ---
        let env_host = env_string("OBJECT_GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = env_parsed::<u16>("OBJECT_GATEWAY_PORT")?.unwrap_or(3000);
        let env_storage =
            env_string("OBJECT_GATEWAY_STORAGE_DIR").unwrap_or_else(|| "./data/objects".into());
        let env_db = env_string("OBJECT_GATEWAY_DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/object_gateway.db".into());
        let env_expiration =
            env_string("OBJECT_GATEWAY_URL_EXPIRATION").unwrap_or_else(|| "1d".into());

        let port = args.port.unwrap_or(env_port);
        let url_expiration = args.url_expiration.unwrap_or(env_expiration);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            data_bucket: args
                .data_bucket
                .or_else(|| env_string("OBJECT_GATEWAY_DATA_BUCKET"))
                .unwrap_or_else(|| "data".into()),
            state_bucket: args
                .state_bucket
                .or_else(|| env_string("OBJECT_GATEWAY_STATE_BUCKET"))
                .unwrap_or_else(|| "state".into()),
            data_dir: args
                .data_dir
                .or_else(|| env_string("OBJECT_GATEWAY_DATA_DIR"))
                .unwrap_or_else(|| "data".into()),
            pool_size: match args.pool_size {
                Some(pool_size) => pool_size,
                None => env_parsed("OBJECT_GATEWAY_POOL_SIZE")?.unwrap_or(0),
            },
            key_size: match args.key_size {
                Some(key_size) => key_size,
                None => env_parsed("OBJECT_GATEWAY_KEY_SIZE")?.unwrap_or(2),
            },
            url_expiration: parse_expiration(&url_expiration)?,
            part_size: match args.part_size {
                Some(part_size) => part_size,
                None => env_parsed("OBJECT_GATEWAY_PART_SIZE")?.unwrap_or(DEFAULT_PART_SIZE),
            },
            signing_secret: args
                .signing_secret
                .or_else(|| env_string("OBJECT_GATEWAY_SIGNING_SECRET"))
                .unwrap_or_default(),
            public_url: args
                .public_url
                .or_else(|| env_string("OBJECT_GATEWAY_PUBLIC_URL"))
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            access_tokens: args
                .access_tokens
                .or_else(|| env_string("OBJECT_GATEWAY_ACCESS_TOKENS"))
                .unwrap_or_default(),
            download_scope: args
                .download_scope
                .or_else(|| env_string("OBJECT_GATEWAY_DOWNLOAD_SCOPE"))
                .unwrap_or_else(|| "download".into()),
        };

        Ok((cfg, cli.command.unwrap_or(Command::Serve)))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks that make the gateway refuse to start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_size > MAX_KEY_SIZE {
            return Err(BucketConfigError::KeySizeTooLarge {
                key_size: self.key_size,
                max: MAX_KEY_SIZE,
            }
            .into());
        }
        if self.part_size == 0 {
            return Err(PartError::ZeroPartSize.into());
        }
        if self.url_expiration <= TimeDelta::hours(1) {
            return Err(ConfigError::ExpirationTooShort(self.url_expiration.num_hours()));
        }
        if self.signing_secret.is_empty() {
            return Err(ConfigError::EmptySigningSecret);
        }
        self.tokens()?;
        self.resolver()?;
        Ok(())
    }

    pub fn resolver(&self) -> Result<BucketResolver, ConfigError> {
        Ok(BucketResolver::new(self.pool_size, self.key_size)?)
    }

    pub fn part_calculator(&self) -> Result<PartCalculator, ConfigError> {
        Ok(PartCalculator::new(self.part_size)?)
    }

    pub fn tokens(&self) -> Result<AccessTokens, ConfigError> {
        Ok(self.access_tokens.parse()?)
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            data_bucket: self.data_bucket.clone(),
            state_bucket: self.state_bucket.clone(),
            data_dir: self.data_dir.clone(),
            url_expiration: self.url_expiration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            storage_dir: "./data/objects".into(),
            database_url: "sqlite::memory:".into(),
            data_bucket: "data".into(),
            state_bucket: "state".into(),
            data_dir: "data".into(),
            pool_size: 16,
            key_size: 2,
            url_expiration: TimeDelta::days(1),
            part_size: DEFAULT_PART_SIZE,
            signing_secret: "secret".into(),
            public_url: "http://localhost:3000".into(),
            access_tokens: "alice=download".into(),
            download_scope: "download".into(),
        }
    }

    #[test]
    fn parses_expirations() {
        assert_eq!(parse_expiration("24h"), Ok(TimeDelta::hours(24)));
        assert_eq!(parse_expiration("2d"), Ok(TimeDelta::days(2)));
        assert_eq!(parse_expiration("7"), Ok(TimeDelta::days(7)));
        assert_eq!(
            parse_expiration("soon"),
            Err(ConfigError::InvalidExpiration("soon".into()))
        );
    }

    #[test]
    fn accepts_a_sane_config() {
        assert_eq!(config().validate(), Ok(()));
    }

    #[test]
    fn rejects_fatal_settings() {
        let mut cfg = config();
        cfg.key_size = MAX_KEY_SIZE + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Buckets(BucketConfigError::KeySizeTooLarge { .. }))
        ));

        let mut cfg = config();
        cfg.part_size = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::Parts(PartError::ZeroPartSize)));

        let mut cfg = config();
        cfg.url_expiration = TimeDelta::hours(1);
        assert_eq!(cfg.validate(), Err(ConfigError::ExpirationTooShort(1)));

        let mut cfg = config();
        cfg.signing_secret.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptySigningSecret));

        let mut cfg = config();
        cfg.pool_size = 1000;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Buckets(BucketConfigError::PoolTooLarge { .. }))
        ));
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from([
            "object-gateway",
            "--pool-size",
            "4",
            "browse",
            "--layout",
            "object-id",
            "--url",
            "/obj-a",
        ])
        .unwrap();
        assert_eq!(cli.args.pool_size, Some(4));
        let Some(Command::Browse(browse)) = cli.command else {
            panic!("expected browse");
        };
        assert_eq!(browse.layout, FileLayout::ObjectId);
        assert!(browse.url);
        assert_eq!(browse.path, "/obj-a");
    }
}
