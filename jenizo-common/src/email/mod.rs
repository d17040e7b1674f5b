pub mod config;
pub mod dispatcher;
pub mod provider;
pub mod senders;
pub mod templates;

pub use config::{MailConfig, RunMode, SendGridConfig, SmtpConfig};
pub use dispatcher::send;
pub use provider::{MailDefaults, ProviderHandle};
pub use templates::{compose, kolkata_now};

use async_trait::async_trait;
use lettre::message::Mailbox;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    HttpApi,
    Smtp,
    Sandbox,
    None,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::HttpApi => "sendgrid",
            ProviderKind::Smtp => "smtp",
            ProviderKind::Sandbox => "sandbox",
            ProviderKind::None => "none",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: Mailbox,
    pub from: Mailbox,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub reply_to: Option<Mailbox>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendResult {
    pub provider_used: ProviderKind,
    pub message_id: Option<String>,
    pub raw: Option<String>,
}

/// What a provider hands back after accepting a message, before the dispatcher tags it
/// with the provider that was used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub message_id: Option<String>,
    pub raw: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub detail: String,
}

impl ProviderError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            detail: detail.into(),
        }
    }

    pub fn with_status(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            detail: detail.into(),
        }
    }
}

impl std::error::Error for ProviderError {}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "status {status}: {}", self.detail),
            None => write!(f, "{}", self.detail),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailError {
    Unavailable,
    Configuration(String),
    SendFailed {
        provider: ProviderKind,
        detail: String,
    },
}

impl std::error::Error for MailError {}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailError::Unavailable => write!(f, "MailError: No mail provider is ready"),
            MailError::Configuration(msg) => write!(f, "MailError: Misconfiguration: {msg}"),
            MailError::SendFailed { provider, detail } => {
                write!(f, "MailError: Failed to send via {provider}: {detail}")
            }
        }
    }
}

#[async_trait]
pub trait SendEmail: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError>;

    /// Health check run once at startup. Providers that can only fail at send time report
    /// themselves as reachable.
    async fn verify(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

pub type EmailSender = std::sync::Arc<dyn SendEmail>;
