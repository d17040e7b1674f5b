use lettre::message::Mailbox;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::email::config::MailConfig;
use crate::email::senders::{SandboxSender, SendGridSender, SmtpSender};
use crate::email::{EmailSender, ProviderKind};

/// Addresses used when composing outbound mail. `to` is the company inbox.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailDefaults {
    pub from: Option<Mailbox>,
    pub to: Option<Mailbox>,
}

impl MailDefaults {
    /// Falls back to the SMTP username for the from-address. Unparseable addresses are
    /// logged and dropped so the misconfiguration surfaces when a message is composed.
    pub fn from_config(config: &MailConfig) -> Self {
        let from = config
            .from_address
            .as_deref()
            .or_else(|| config.smtp.as_ref().and_then(|s| s.username.as_deref()))
            .and_then(|addr| parse_mailbox(addr, "from"));

        let to = config
            .to_address
            .as_deref()
            .and_then(|addr| parse_mailbox(addr, "destination"));

        if to.is_none() {
            log::warn!("Destination email address is not configured; submissions will fail");
        }

        Self { from, to }
    }
}

fn parse_mailbox(addr: &str, role: &str) -> Option<Mailbox> {
    let addr = addr.trim();
    if addr.is_empty() {
        return None;
    }

    match addr.parse::<Mailbox>() {
        Ok(m) => Some(m),
        Err(e) => {
            log::error!("Configured {role} email address '{addr}' is invalid: {e}");
            None
        }
    }
}

/// The single mail provider chosen at startup, shared by every request handler.
///
/// Cloning is cheap and clones share the readiness flag.
#[derive(Clone)]
pub struct ProviderHandle {
    sender: Option<EmailSender>,
    kind: ProviderKind,
    ready: Arc<AtomicBool>,
    defaults: MailDefaults,
}

impl ProviderHandle {
    /// Picks the first usable provider in priority order: HTTP API, SMTP, development
    /// sandbox, none. A provider that fails to construct is logged and skipped.
    ///
    /// The HTTP API provider is ready immediately. The SMTP provider becomes ready only
    /// once a background handshake succeeds, so this must be called from within a Tokio
    /// runtime for SMTP to ever become ready.
    pub fn initialize(config: &MailConfig) -> Self {
        let defaults = MailDefaults::from_config(config);
        let handle = Self::select(config, defaults);

        log::info!(
            "Mail provider: {}, ready: {}",
            handle.kind(),
            handle.is_ready()
        );

        handle
    }

    fn select(config: &MailConfig, defaults: MailDefaults) -> Self {
        if let Some(sendgrid_config) = &config.sendgrid {
            if sendgrid_config.api_key.trim().is_empty() {
                log::warn!("SendGrid API key is blank; skipping SendGrid");
            } else {
                match SendGridSender::new(sendgrid_config) {
                    Ok(sender) => {
                        log::info!("SendGrid API client configured");
                        return Self::from_sender(Arc::new(sender), defaults, true);
                    }
                    Err(e) => log::warn!("SendGrid client failed to initialize: {e}"),
                }
            }
        }

        if let Some(smtp_config) = &config.smtp {
            match SmtpSender::new(smtp_config) {
                Ok(sender) => {
                    log::info!(
                        "SMTP transport configured for {}:{}; verifying connection in the \
                         background",
                        smtp_config.host,
                        smtp_config.port,
                    );

                    let handle = Self::from_sender(Arc::new(sender), defaults, false);
                    handle.spawn_readiness_check();
                    return handle;
                }
                Err(e) => log::warn!("Failed to set up SMTP transport: {e}"),
            }
        }

        if !config.mode.is_production() && config.sandbox_enabled {
            log::info!(
                "No mail credentials configured. Using sandbox sender; emails will be logged, \
                 not delivered."
            );
            return Self::from_sender(Arc::new(SandboxSender::new()), defaults, true);
        }

        Self::none(defaults)
    }

    pub fn from_sender(sender: EmailSender, defaults: MailDefaults, ready: bool) -> Self {
        Self {
            kind: sender.kind(),
            sender: Some(sender),
            ready: Arc::new(AtomicBool::new(ready)),
            defaults,
        }
    }

    pub fn none(defaults: MailDefaults) -> Self {
        Self {
            sender: None,
            kind: ProviderKind::None,
            ready: Arc::new(AtomicBool::new(false)),
            defaults,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn is_ready(&self) -> bool {
        self.sender.is_some() && self.ready.load(Ordering::Acquire)
    }

    pub fn defaults(&self) -> &MailDefaults {
        &self.defaults
    }

    pub(crate) fn sender(&self) -> Option<&EmailSender> {
        self.sender.as_ref()
    }

    /// Runs the provider's health check now and records the outcome.
    pub async fn verify_now(&self) -> bool {
        let Some(sender) = self.sender.clone() else {
            return false;
        };

        check_readiness(sender, Arc::clone(&self.ready)).await
    }

    fn spawn_readiness_check(&self) {
        let Some(sender) = self.sender.clone() else {
            return;
        };

        let ready = Arc::clone(&self.ready);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(check_readiness(sender, ready));
            }
            Err(_) => {
                log::warn!("No async runtime available; {} readiness check skipped", self.kind);
            }
        }
    }
}

async fn check_readiness(sender: EmailSender, ready: Arc<AtomicBool>) -> bool {
    let is_ready = match sender.verify().await {
        Ok(true) => {
            log::info!("{} provider verified and ready", sender.kind());
            true
        }
        Ok(false) => {
            log::warn!("{} provider verification was refused", sender.kind());
            false
        }
        Err(e) => {
            log::warn!("{} provider verification failed: {e}", sender.kind());
            false
        }
    };

    ready.store(is_ready, Ordering::Release);
    is_ready
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::email::config::{RunMode, SendGridConfig, SmtpConfig};
    use crate::email::senders::MockSender;

    fn sendgrid_config(api_key: &str) -> SendGridConfig {
        SendGridConfig {
            api_key: String::from(api_key),
            base_url: String::from("http://127.0.0.1:1"),
            timeout: Duration::from_secs(2),
        }
    }

    fn closed_port_smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: String::from("127.0.0.1"),
            port: 1,
            username: Some(String::from("mailer@example.com")),
            password: Some(String::from("secret")),
            secure: false,
            connection_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_http_api_preferred_and_optimistically_ready() {
        let mut config = MailConfig::empty(RunMode::Production);
        config.sendgrid = Some(sendgrid_config("SG.test-key"));
        config.smtp = Some(closed_port_smtp_config());

        let handle = ProviderHandle::initialize(&config);

        assert_eq!(handle.kind(), ProviderKind::HttpApi);
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_blank_api_key_falls_through_to_smtp() {
        let mut config = MailConfig::empty(RunMode::Production);
        config.sendgrid = Some(sendgrid_config("   "));
        config.smtp = Some(closed_port_smtp_config());

        let handle = ProviderHandle::initialize(&config);

        assert_eq!(handle.kind(), ProviderKind::Smtp);
    }

    #[tokio::test]
    async fn test_smtp_not_ready_until_handshake_succeeds() {
        let mut config = MailConfig::empty(RunMode::Production);
        config.smtp = Some(closed_port_smtp_config());

        let handle = ProviderHandle::initialize(&config);

        assert_eq!(handle.kind(), ProviderKind::Smtp);
        assert!(!handle.is_ready());

        // Nothing listens on port 1, so the handshake fails and the flag stays down
        assert!(!handle.verify_now().await);
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_smtp_without_runtime_stays_unready() {
        let mut config = MailConfig::empty(RunMode::Production);
        config.smtp = Some(closed_port_smtp_config());

        let handle = ProviderHandle::initialize(&config);

        assert_eq!(handle.kind(), ProviderKind::Smtp);
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_sandbox_only_outside_production() {
        let mut config = MailConfig::empty(RunMode::Development);
        config.sandbox_enabled = true;

        let handle = ProviderHandle::initialize(&config);
        assert_eq!(handle.kind(), ProviderKind::Sandbox);
        assert!(handle.is_ready());

        config.mode = RunMode::Production;

        let handle = ProviderHandle::initialize(&config);
        assert_eq!(handle.kind(), ProviderKind::None);
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_no_provider_is_never_ready() {
        let handle = ProviderHandle::initialize(&MailConfig::empty(RunMode::Development));

        assert_eq!(handle.kind(), ProviderKind::None);
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn test_verify_now_flips_ready() {
        let handle = ProviderHandle::from_sender(
            Arc::new(MockSender::new()),
            MailDefaults::default(),
            false,
        );
        assert!(!handle.is_ready());

        let clone = handle.clone();
        assert!(handle.verify_now().await);

        // Clones share the flag
        assert!(clone.is_ready());

        let handle = ProviderHandle::none(MailDefaults::default());
        assert!(!handle.verify_now().await);
        assert!(!handle.is_ready());
    }

    #[test]
    fn test_defaults_from_config() {
        let mut config = MailConfig::empty(RunMode::Production);
        config.smtp = Some(closed_port_smtp_config());
        config.to_address = Some(String::from("Jenizo <hello@jenizo.example>"));

        let defaults = MailDefaults::from_config(&config);

        assert_eq!(
            defaults.from.unwrap().email.to_string(),
            "mailer@example.com"
        );
        assert_eq!(defaults.to.unwrap().email.to_string(), "hello@jenizo.example");

        config.from_address = Some(String::from("noreply@jenizo.example"));
        config.to_address = Some(String::from("not an address"));

        let defaults = MailDefaults::from_config(&config);

        assert_eq!(
            defaults.from.unwrap().email.to_string(),
            "noreply@jenizo.example"
        );
        assert!(defaults.to.is_none());
    }
}
