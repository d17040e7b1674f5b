use jenizo_common::email::config::{
    DEFAULT_SENDGRID_BASE_URL, DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT,
};
use jenizo_common::email::{MailConfig, RunMode, SendGridConfig, SmtpConfig};

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;
use zeroize::{Zeroize, Zeroizing};

pub static CONF: Lazy<Config> = Lazy::new(|| Config::from_env().expect("Failed to load config"));

const RUN_MODE_VAR: &str = "JENIZO_ENV";
const PORT_VAR: &str = "JENIZO_PORT";
const BIND_ADDR_VAR: &str = "JENIZO_BIND_ADDR";
const ACTIX_WORKER_COUNT_VAR: &str = "JENIZO_ACTIX_WORKER_COUNT";
const LOG_LEVEL_VAR: &str = "JENIZO_LOG_LEVEL";
const LOG_DIR_VAR: &str = "JENIZO_LOG_DIR";

const ALLOWED_ORIGINS_VAR: &str = "JENIZO_ALLOWED_ORIGINS";
const TRUST_PROXY_VAR: &str = "JENIZO_TRUST_PROXY";
const RATE_LIMIT_MAX_VAR: &str = "JENIZO_RATE_LIMIT_MAX";
const RATE_LIMIT_WINDOW_SECS_VAR: &str = "JENIZO_RATE_LIMIT_WINDOW_SECS";
const MAX_BODY_BYTES_VAR: &str = "JENIZO_MAX_BODY_BYTES";

const SENDGRID_API_KEY_VAR: &str = "JENIZO_SENDGRID_API_KEY";
const SENDGRID_BASE_URL_VAR: &str = "JENIZO_SENDGRID_BASE_URL";
const SENDGRID_TIMEOUT_SECS_VAR: &str = "JENIZO_SENDGRID_TIMEOUT_SECS";

const SMTP_HOST_VAR: &str = "JENIZO_SMTP_HOST";
const SMTP_PORT_VAR: &str = "JENIZO_SMTP_PORT";
const SMTP_USERNAME_VAR: &str = "JENIZO_SMTP_USERNAME";
const SMTP_PASSWORD_VAR: &str = "JENIZO_SMTP_PASSWORD";
const SMTP_SECURE_VAR: &str = "JENIZO_SMTP_SECURE";
const SMTP_CONN_TIMEOUT_MS_VAR: &str = "JENIZO_SMTP_CONN_TIMEOUT_MS";

const EMAIL_FROM_ADDR_VAR: &str = "JENIZO_EMAIL_FROM_ADDR";
const EMAIL_TO_ADDR_VAR: &str = "JENIZO_EMAIL_TO_ADDR";
const MAIL_SANDBOX_VAR: &str = "JENIZO_MAIL_SANDBOX";

const TOKEN_SIGNING_KEY_VAR: &str = "JENIZO_TOKEN_SIGNING_KEY_B64";
const TOKEN_LIFETIME_DAYS_VAR: &str = "JENIZO_TOKEN_LIFETIME_DAYS";

const HASH_LENGTH_VAR: &str = "JENIZO_HASH_LENGTH";
const HASH_ITERATIONS_VAR: &str = "JENIZO_HASH_ITERATIONS";
const HASH_MEM_COST_KIB_VAR: &str = "JENIZO_HASH_MEM_COST_KIB";
const HASH_THREADS_VAR: &str = "JENIZO_HASH_THREADS";
const HASH_SALT_LENGTH_VAR: &str = "JENIZO_HASH_SALT_LENGTH";

const MIN_TOKEN_SIGNING_KEY_SIZE: usize = 32;
const DEV_ORIGIN: &str = "http://localhost:3000";

#[derive(Zeroize)]
pub struct ConfigInner {
    #[zeroize(skip)]
    pub run_mode: RunMode,
    #[zeroize(skip)]
    pub port: u16,
    #[zeroize(skip)]
    pub bind_addr: String,
    #[zeroize(skip)]
    pub actix_worker_count: usize,
    #[zeroize(skip)]
    pub log_level: String,
    #[zeroize(skip)]
    pub log_dir: String,

    #[zeroize(skip)]
    pub allowed_origins: Vec<String>,
    #[zeroize(skip)]
    pub trust_proxy: bool,
    #[zeroize(skip)]
    pub rate_limit_max: u64,
    #[zeroize(skip)]
    pub rate_limit_window: Duration,
    #[zeroize(skip)]
    pub max_body_bytes: usize,

    pub mail: MailConfig,

    pub token_signing_key: Vec<u8>,
    #[zeroize(skip)]
    pub token_lifetime: Duration,

    pub hash_length: u32,
    pub hash_iterations: u32,
    pub hash_mem_cost_kib: u32,
    pub hash_threads: u32,
    pub hash_salt_length: u32,
}

pub struct Config {
    inner: UnsafeCell<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        // Safe as long as `unsafe Config::zeroize()` hasn't been called
        unsafe { &*self.inner.get() }
    }
}

// Safe to be shared across threads as long as `unsafe Config::zeroize()` hasn't been called
unsafe impl Sync for Config {}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let run_mode = if cfg!(test) {
            RunMode::Test
        } else {
            env_var_or(RUN_MODE_VAR, RunMode::Development)
        };

        let allowed_origins = match optional_env_var(ALLOWED_ORIGINS_VAR) {
            Some(origins) => parse_origins(&origins),
            None if run_mode.is_production() => Vec::new(),
            None => vec![String::from(DEV_ORIGIN)],
        };

        let inner = ConfigInner {
            run_mode,
            port: env_var_or(PORT_VAR, 8080),
            bind_addr: env_var_or(BIND_ADDR_VAR, String::from("0.0.0.0")),
            actix_worker_count: env_var_or(ACTIX_WORKER_COUNT_VAR, num_cpus::get()),
            log_level: env_var_or(LOG_LEVEL_VAR, String::from("info")),
            log_dir: env_var_or(LOG_DIR_VAR, String::from("./logs")),

            allowed_origins,
            trust_proxy: env_var_or(TRUST_PROXY_VAR, false),
            rate_limit_max: env_var_or(RATE_LIMIT_MAX_VAR, 12),
            rate_limit_window: Duration::from_secs(env_var_or(RATE_LIMIT_WINDOW_SECS_VAR, 60)),
            max_body_bytes: env_var_or(MAX_BODY_BYTES_VAR, 150 * 1024),

            mail: mail_config_from_env(run_mode)?,

            token_signing_key: token_signing_key_from_env(run_mode)?,
            token_lifetime: Duration::from_secs(env_var_or(TOKEN_LIFETIME_DAYS_VAR, 7) * 86400),

            hash_length: env_var_or(HASH_LENGTH_VAR, 32),
            hash_iterations: env_var_or(HASH_ITERATIONS_VAR, if cfg!(test) { 1 } else { 3 }),
            hash_mem_cost_kib: env_var_or(
                HASH_MEM_COST_KIB_VAR,
                if cfg!(test) { 64 } else { 65536 },
            ),
            hash_threads: env_var_or(HASH_THREADS_VAR, if cfg!(test) { 1 } else { 2 }),
            hash_salt_length: env_var_or(HASH_SALT_LENGTH_VAR, 16),
        };

        Ok(Config {
            inner: UnsafeCell::new(inner),
        })
    }

    /// # Safety
    ///
    /// Safe only if the Config isn't being used by other threads or across an async
    /// boundary. Generally, this should only be used at the end of the main function once
    /// all threads have been joined.
    pub unsafe fn zeroize(&self) {
        unsafe {
            (*self.inner.get()).zeroize();
        }
    }
}

fn mail_config_from_env(run_mode: RunMode) -> Result<MailConfig, ConfigError> {
    let sendgrid = optional_env_var(SENDGRID_API_KEY_VAR).map(|api_key| SendGridConfig {
        api_key,
        base_url: env_var_or(
            SENDGRID_BASE_URL_VAR,
            String::from(DEFAULT_SENDGRID_BASE_URL),
        ),
        timeout: Duration::from_secs(env_var_or(SENDGRID_TIMEOUT_SECS_VAR, 30)),
    });

    let smtp_host = optional_env_var(SMTP_HOST_VAR);
    let smtp_username = optional_env_var(SMTP_USERNAME_VAR);
    let smtp_password = optional_env_var(SMTP_PASSWORD_VAR);

    // SMTP counts as configured with an explicit host or with a full set of credentials
    let smtp = if smtp_host.is_some() || (smtp_username.is_some() && smtp_password.is_some()) {
        Some(SmtpConfig {
            host: smtp_host.unwrap_or_else(|| String::from(DEFAULT_SMTP_HOST)),
            port: optional_env_var(SMTP_PORT_VAR)
                .map(|p| p.parse().map_err(|_| ConfigError::invalid(SMTP_PORT_VAR)))
                .transpose()?
                .unwrap_or(DEFAULT_SMTP_PORT),
            username: smtp_username,
            password: smtp_password,
            secure: env_var_or(SMTP_SECURE_VAR, false),
            connection_timeout: Duration::from_millis(env_var_or(SMTP_CONN_TIMEOUT_MS_VAR, 15000)),
        })
    } else {
        None
    };

    Ok(MailConfig {
        sendgrid,
        smtp,
        from_address: optional_env_var(EMAIL_FROM_ADDR_VAR),
        to_address: optional_env_var(EMAIL_TO_ADDR_VAR),
        mode: run_mode,
        sandbox_enabled: env_var_or(MAIL_SANDBOX_VAR, true),
    })
}

fn token_signing_key_from_env(run_mode: RunMode) -> Result<Vec<u8>, ConfigError> {
    let Some(encoded) = optional_env_var(TOKEN_SIGNING_KEY_VAR) else {
        if run_mode.is_production() {
            return Err(ConfigError::missing(TOKEN_SIGNING_KEY_VAR));
        }

        // Tokens signed with this key do not survive a switch to a real key
        return Ok(Sha256::digest(b"jenizo development token signing key").to_vec());
    };

    let encoded = Zeroizing::new(encoded);
    let key = b64
        .decode(encoded.as_bytes())
        .map_err(|_| ConfigError::invalid(TOKEN_SIGNING_KEY_VAR))?;

    if key.len() < MIN_TOKEN_SIGNING_KEY_SIZE {
        return Err(ConfigError::invalid(TOKEN_SIGNING_KEY_VAR));
    }

    Ok(key)
}

/// Splits a comma-separated origin list, dropping blanks and trailing slashes.
pub fn parse_origins(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

fn optional_env_var(key: &'static str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| String::from(v.trim()))
        .filter(|v| !v.is_empty())
}

fn env_var_or<T: FromStr>(key: &'static str, default: T) -> T {
    let Some(var) = optional_env_var(key) else {
        return default;
    };

    var.parse().unwrap_or(default)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar(&'static str),
}

impl ConfigError {
    fn missing(var_name: &'static str) -> Self {
        Self::MissingVar(var_name)
    }

    fn invalid(var_name: &'static str) -> Self {
        Self::InvalidVar(var_name)
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(key) => write!(f, "Missing environment variable '{}'", key),
            Self::InvalidVar(key) => write!(f, "Environment variable '{}' is invalid", key),
        }
    }
}

#[cfg(test)]
pub mod testing {
    use jenizo_common::email::senders::MockSender;
    use jenizo_common::email::{MailDefaults, ProviderHandle};

    use std::sync::Arc;

    pub const TO_ADDR: &str = "hello@jenizo.example";
    pub const FROM_ADDR: &str = "noreply@jenizo.example";

    pub fn mail_defaults() -> MailDefaults {
        MailDefaults {
            from: Some(FROM_ADDR.parse().unwrap()),
            to: Some(TO_ADDR.parse().unwrap()),
        }
    }

    /// A ready provider backed by `sender`, with both default addresses set.
    pub fn ready_provider(sender: Arc<MockSender>) -> ProviderHandle {
        ProviderHandle::from_sender(sender, mail_defaults(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(" https://jenizo.com/, https://www.jenizo.com ,,"),
            vec!["https://jenizo.com", "https://www.jenizo.com"],
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_conf_loads_with_defaults() {
        assert_eq!(CONF.run_mode, RunMode::Test);
        assert!(CONF.token_signing_key.len() >= MIN_TOKEN_SIGNING_KEY_SIZE);
        assert!(CONF.rate_limit_max > 0);
        assert!(CONF.max_body_bytes > 0);
    }

    #[test]
    fn test_production_requires_signing_key() {
        if std::env::var(TOKEN_SIGNING_KEY_VAR).is_ok() {
            return;
        }

        assert_eq!(
            token_signing_key_from_env(RunMode::Production).unwrap_err(),
            ConfigError::MissingVar(TOKEN_SIGNING_KEY_VAR),
        );
        assert!(token_signing_key_from_env(RunMode::Development).is_ok());
    }
}
