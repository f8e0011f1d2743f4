//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;

/// Whether balance-funded order creation is gated on the live balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalancePolicy {
    /// Reject authenticated orders whose snapshot price exceeds the balance.
    #[default]
    Enforce,
    /// Original behavior: no pre-check, balance may go negative.
    Allow,
}

/// Configuration for the API binary: HTTP listeners, database, auth secret,
/// and the balance policy knob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    jwt_secret: String,
    frontend_url: String,
    balance_policy: BalancePolicy,
}

impl ApiConfig {
    /// Loads the environment variables required by the API binary,
    /// hydrating `.env` first (if present).
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let balance_policy = match get_optional_var("BALANCE_POLICY").as_deref() {
            None | Some("enforce") => BalancePolicy::Enforce,
            Some("allow") => BalancePolicy::Allow,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "BALANCE_POLICY",
                    value: other.to_owned(),
                })
            }
        };

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            jwt_secret: get_required_var("JWT_SECRET")?,
            frontend_url: get_required_var("FRONTEND_URL")?
                .trim_end_matches('/')
                .to_owned(),
            balance_policy,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    /// Base URL for checkout success/cancel redirects, without a trailing
    /// slash.
    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }

    pub fn balance_policy(&self) -> BalancePolicy {
        self.balance_policy
    }
}

/// Credentials for the hosted checkout provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeConfig {
    secret_key: String,
    webhook_secret: String,
}

impl StripeConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        Ok(Self {
            secret_key: get_required_var("STRIPE_SECRET_KEY")?,
            webhook_secret: get_required_var("STRIPE_WEBHOOK_SECRET")?,
        })
    }

    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }
}

/// Endpoint and credentials for the third-party IMEI verification API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl VerifierConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;
        let timeout = match get_optional_var("VERIFY_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().map_err(|source| {
                ConfigError::InvalidNumber {
                    key: "VERIFY_TIMEOUT_SECS",
                    source,
                }
            })?),
            None => Self::DEFAULT_TIMEOUT,
        };

        Ok(Self {
            api_url: get_required_var("IMEI_API_URL")?,
            api_key: get_required_var("IMEI_API_KEY")?,
            timeout,
        })
    }

    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            timeout,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// SMTP settings for outbound notifications. Absent `SMTP_HOST` disables
/// email entirely (dev/test).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl MailerConfig {
    pub fn load_from_env() -> Result<Option<Self>, ConfigError> {
        hydrate_env_file()?;
        let Some(host) = get_optional_var("SMTP_HOST") else {
            return Ok(None);
        };
        let port = match get_optional_var("SMTP_PORT") {
            Some(raw) => raw.parse().map_err(|source| ConfigError::InvalidNumber {
                key: "SMTP_PORT",
                source,
            })?,
            None => 587,
        };

        Ok(Some(Self {
            host,
            port,
            username: get_required_var("SMTP_USERNAME")?,
            password: get_required_var("SMTP_PASSWORD")?,
            from_address: get_required_var("SMTP_FROM")?,
        }))
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub(crate) fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("IMEICHECK_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        source: std::num::ParseIntError,
    },
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn set_env() {
        env::set_var("IMEICHECK_SKIP_DOTENV", "1");
        env::set_var("DATABASE_URL", "sqlite::memory:");
        env::set_var("API_BIND_ADDRESS", "127.0.0.1:8080");
        env::set_var("JWT_SECRET", "test-secret");
        env::set_var("FRONTEND_URL", "https://shop.example.com/");
        env::remove_var("API_UNIX_SOCKET");
        env::remove_var("API_INTERNAL_BIND_ADDRESS");
        env::remove_var("API_INTERNAL_UNIX_SOCKET");
        env::remove_var("BALANCE_POLICY");
    }

    #[test]
    fn api_config_loads_and_strips_trailing_slash() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.database_url(), "sqlite::memory:");
        assert_eq!(config.frontend_url(), "https://shop.example.com");
        assert_eq!(config.balance_policy(), BalancePolicy::Enforce);
        assert!(!config.has_internal_listener());
    }

    #[test]
    fn balance_policy_parses_allow_and_rejects_garbage() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::set_var("BALANCE_POLICY", "allow");
        let config = ApiConfig::load_from_env().expect("config loads");
        assert_eq!(config.balance_policy(), BalancePolicy::Allow);

        env::set_var("BALANCE_POLICY", "maybe");
        assert!(matches!(
            ApiConfig::load_from_env(),
            Err(ConfigError::InvalidValue { key: "BALANCE_POLICY", .. })
        ));
        env::remove_var("BALANCE_POLICY");
    }

    #[test]
    fn verifier_config_defaults_timeout() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::set_var("IMEI_API_URL", "https://verify.example.com/api");
        env::set_var("IMEI_API_KEY", "key-123");
        env::remove_var("VERIFY_TIMEOUT_SECS");
        let config = VerifierConfig::load_from_env().expect("config loads");
        assert_eq!(config.timeout(), VerifierConfig::DEFAULT_TIMEOUT);

        env::set_var("VERIFY_TIMEOUT_SECS", "5");
        let config = VerifierConfig::load_from_env().expect("config loads");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        env::remove_var("VERIFY_TIMEOUT_SECS");
    }

    #[test]
    fn mailer_config_is_optional() {
        let _guard = ENV_GUARD.lock().unwrap();
        set_env();
        env::remove_var("SMTP_HOST");
        assert!(MailerConfig::load_from_env().expect("loads").is_none());

        env::set_var("SMTP_HOST", "smtp.example.com");
        env::set_var("SMTP_USERNAME", "mailer");
        env::set_var("SMTP_PASSWORD", "hunter2");
        env::set_var("SMTP_FROM", "no-reply@example.com");
        env::remove_var("SMTP_PORT");
        let config = MailerConfig::load_from_env()
            .expect("loads")
            .expect("present");
        assert_eq!(config.port, 587);
        for key in ["SMTP_HOST", "SMTP_USERNAME", "SMTP_PASSWORD", "SMTP_FROM"] {
            env::remove_var(key);
        }
    }
}
