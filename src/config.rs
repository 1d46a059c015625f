use std::{str::FromStr, time::Duration};

use anyhow::{Context, Result};
use sqlx::postgres::PgConnectOptions;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Service configuration, read from the environment.
///
/// Every key has a default suitable for local development, so a bare
/// `cargo run` against local Postgres and InfluxDB instances works.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database: DatabaseConfig,
    pub influx: InfluxConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full connection string. When set, the individual `DB_*` parts are ignored.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection.
    pub acquire_timeout: Duration,
    /// Server-side `statement_timeout` applied to every connection.
    pub statement_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Per-request timeout for writes.
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);

        let server_port = match lookup("SERVER_PORT").or_else(|| lookup("PORT")) {
            Some(raw) => raw
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            None => 5000,
        };

        Ok(Self {
            server_host: env.optional("SERVER_HOST", "0.0.0.0"),
            server_port,
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
                host: env.optional("DB_HOST", "localhost"),
                port: env.parse("DB_PORT", "5432", "a valid port number")?,
                user: env.optional("DB_USER", "postgres"),
                password: env.optional("DB_PASSWORD", "password"),
                database: env.optional("DB_DATABASE", "devices_db"),
                max_connections: env.parse("DB_MAX_CONNECTIONS", "10", "a positive integer")?,
                acquire_timeout: Duration::from_secs(env.parse(
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    "5",
                    "a positive integer",
                )?),
                statement_timeout: Duration::from_millis(env.parse(
                    "DB_STATEMENT_TIMEOUT_MS",
                    "5000",
                    "a positive integer",
                )?),
            },
            influx: InfluxConfig {
                url: env.optional("INFLUX_URL", "http://localhost:8086"),
                token: env.optional("INFLUX_TOKEN", "my-token"),
                org: env.optional("INFLUX_ORG", "my-org"),
                bucket: env.optional("INFLUX_BUCKET", "sensor_bucket"),
                timeout: Duration::from_secs(env.parse(
                    "INFLUX_TIMEOUT_SECS",
                    "5",
                    "a positive integer",
                )?),
            },
        })
    }
}

impl DatabaseConfig {
    /// Connection options for the pool, including the per-connection
    /// `statement_timeout`.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let options = match &self.url {
            Some(url) => PgConnectOptions::from_str(url)
                .context("DATABASE_URL is not a valid Postgres URL")?,
            None => PgConnectOptions::new()
                .host(&self.host)
                .port(self.port)
                .username(&self.user)
                .password(&self.password)
                .database(&self.database),
        };

        Ok(options.options([(
            "statement_timeout",
            self.statement_timeout.as_millis().to_string(),
        )]))
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_owned())
    }

    fn parse<T>(&self, key: &str, default: &str, expected: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.optional(key, default)
            .trim()
            .parse()
            .with_context(|| format!("{key} must be {expected}"))
    }
}
