use async_trait::async_trait;

use crate::email::senders::generate_message_id;
use crate::email::{OutboundMessage, ProviderError, ProviderKind, ProviderReceipt, SendEmail};

/// Development stand-in for a real provider. Messages are written to the log instead of
/// being delivered.
#[derive(Default)]
pub struct SandboxSender {}

impl SandboxSender {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl SendEmail for SandboxSender {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sandbox
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        let message_id = generate_message_id("sandbox.invalid");

        log::info!(
            "Sandbox email {message_id}\nTo: {}\nFrom: {}\nReply-To: {}\nSubject: {}\n\n{}",
            message.to,
            message.from,
            message
                .reply_to
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_default(),
            message.subject,
            message.text,
        );

        Ok(ProviderReceipt {
            message_id: Some(message_id),
            raw: None,
        })
    }
}
