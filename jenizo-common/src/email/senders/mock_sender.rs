use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::email::senders::generate_message_id;
use crate::email::{OutboundMessage, ProviderError, ProviderKind, ProviderReceipt, SendEmail};

/// Records what it is asked to send. Can be told to fail every send.
pub struct MockSender {
    kind: ProviderKind,
    failure: Option<ProviderError>,
    calls: AtomicUsize,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl Default for MockSender {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            kind: ProviderKind::Smtp,
            failure: None,
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            ..Self::new()
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SendEmail for MockSender {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(e) = &self.failure {
            return Err(e.clone());
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }

        Ok(ProviderReceipt {
            message_id: Some(generate_message_id("mock.invalid")),
            raw: Some(String::from("250 OK")),
        })
    }
}
