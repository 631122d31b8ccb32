//! Configuration for Gatehouse
//!
//! CLI arguments and environment variable handling using clap.

use chrono::Duration;
use clap::{ArgAction, Parser};
use std::net::SocketAddr;

use crate::accounts::TokenTtls;
use crate::limiter::LimiterConfig;
use crate::types::GatehouseError;

/// Environments the service knows how to run in
const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

/// Longest token lifetime accepted, one year
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;

/// Gatehouse - request pipeline for a token-authenticated JSON API
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse")]
#[command(about = "Token-authenticated, rate-limited JSON API with versioned writes")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:4000")]
    pub listen: SocketAddr,

    /// Environment (development|staging|production)
    #[arg(long = "env", env = "APP_ENV", default_value = "development")]
    pub environment: String,

    /// Sustained requests per second per client
    #[arg(long, env = "LIMITER_RPS", default_value = "2.0")]
    pub limiter_rps: f64,

    /// Burst capacity per client
    #[arg(long, env = "LIMITER_BURST", default_value = "4")]
    pub limiter_burst: u32,

    /// Enable per-client rate limiting
    #[arg(long, env = "LIMITER_ENABLED", default_value = "true", action = ArgAction::Set)]
    pub limiter_enabled: bool,

    /// Take the client address from X-Real-IP / X-Forwarded-For
    #[arg(long, env = "TRUST_PROXY_HEADERS", default_value = "true", action = ArgAction::Set)]
    pub trust_proxy_headers: bool,

    /// MongoDB connection URI. Without one, state is kept in memory.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "gatehouse")]
    pub mongodb_db: String,

    /// Authentication token lifetime in hours
    #[arg(long, env = "AUTH_TOKEN_TTL_HOURS", default_value = "24")]
    pub auth_token_ttl_hours: i64,

    /// Activation token lifetime in hours
    #[arg(long, env = "ACTIVATION_TOKEN_TTL_HOURS", default_value = "72")]
    pub activation_token_ttl_hours: i64,

    /// Space separated origins allowed to make cross-origin requests
    #[arg(long, env = "CORS_TRUSTED_ORIGINS", default_value = "")]
    pub cors_trusted_origins: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl Args {
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            enabled: self.limiter_enabled,
            rps: self.limiter_rps,
            burst: self.limiter_burst,
        }
    }

    pub fn token_ttls(&self) -> TokenTtls {
        TokenTtls {
            authentication: Duration::hours(self.auth_token_ttl_hours),
            activation: Duration::hours(self.activation_token_ttl_hours),
        }
    }

    pub fn trusted_origins(&self) -> Vec<String> {
        self.cors_trusted_origins
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), GatehouseError> {
        if !ENVIRONMENTS.contains(&self.environment.as_str()) {
            return Err(GatehouseError::Config(format!(
                "APP_ENV must be one of {}",
                ENVIRONMENTS.join("|")
            )));
        }

        if self.limiter_enabled {
            if !(self.limiter_rps > 0.0) {
                return Err(GatehouseError::Config(
                    "LIMITER_RPS must be greater than zero".to_string(),
                ));
            }
            if self.limiter_burst == 0 {
                return Err(GatehouseError::Config(
                    "LIMITER_BURST must be at least 1".to_string(),
                ));
            }
        }

        for (name, hours) in [
            ("AUTH_TOKEN_TTL_HOURS", self.auth_token_ttl_hours),
            ("ACTIVATION_TOKEN_TTL_HOURS", self.activation_token_ttl_hours),
        ] {
            if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
                return Err(GatehouseError::Config(format!(
                    "{name} must be between 1 and {MAX_TOKEN_TTL_HOURS}"
                )));
            }
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(GatehouseError::Config(
                "LOG_FORMAT must be pretty or json".to_string(),
            ));
        }

        Ok(())
    }
}
