use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroize;

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Development,
    Test,
}

impl RunMode {
    pub fn is_production(&self) -> bool {
        matches!(self, RunMode::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Production => "production",
            RunMode::Development => "development",
            RunMode::Test => "test",
        }
    }
}

impl FromStr for RunMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(RunMode::Production),
            "development" | "dev" => Ok(RunMode::Development),
            "test" => Ok(RunMode::Test),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Zeroize)]
pub struct SendGridConfig {
    pub api_key: String,
    #[zeroize(skip)]
    pub base_url: String,
    #[zeroize(skip)]
    pub timeout: Duration,
}

#[derive(Clone, Zeroize)]
pub struct SmtpConfig {
    #[zeroize(skip)]
    pub host: String,
    #[zeroize(skip)]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Implicit TLS from the first byte. When false the connection is upgraded with
    /// STARTTLS.
    #[zeroize(skip)]
    pub secure: bool,
    #[zeroize(skip)]
    pub connection_timeout: Duration,
}

impl SmtpConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

/// Everything the provider selector needs. Read once at startup and never mutated.
#[derive(Clone, Zeroize)]
pub struct MailConfig {
    pub sendgrid: Option<SendGridConfig>,
    pub smtp: Option<SmtpConfig>,
    #[zeroize(skip)]
    pub from_address: Option<String>,
    #[zeroize(skip)]
    pub to_address: Option<String>,
    #[zeroize(skip)]
    pub mode: RunMode,
    #[zeroize(skip)]
    pub sandbox_enabled: bool,
}

impl MailConfig {
    /// A configuration with no provider at all.
    pub fn empty(mode: RunMode) -> Self {
        Self {
            sendgrid: None,
            smtp: None,
            from_address: None,
            to_address: None,
            mode,
            sandbox_enabled: false,
        }
    }
}
