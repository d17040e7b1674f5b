use async_trait::async_trait;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::email::config::SmtpConfig;
use crate::email::senders::generate_message_id;
use crate::email::{OutboundMessage, ProviderError, ProviderKind, ProviderReceipt, SendEmail};

pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    connection_timeout: Duration,
}

impl SmtpSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, ProviderError> {
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| ProviderError::new(format!("Invalid SMTP relay '{}': {e}", config.host)))?;

        let mut builder = builder
            .port(config.port)
            .timeout(Some(config.connection_timeout));

        if let Some((username, password)) = config.credentials() {
            builder = builder.credentials(Credentials::new(
                String::from(username),
                String::from(password),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            connection_timeout: config.connection_timeout,
        })
    }

    fn build_message(message: &OutboundMessage, message_id: &str) -> Result<Message, ProviderError> {
        let mut builder = Message::builder()
            .from(message.from.clone())
            .to(message.to.clone())
            .subject(message.subject.as_str())
            .message_id(Some(String::from(message_id)));

        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .map_err(|e| ProviderError::new(format!("Invalid message: {e}")))
    }
}

#[async_trait]
impl SendEmail for SmtpSender {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Smtp
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        let message_id = generate_message_id(message.from.email.domain());
        let email = Self::build_message(message, &message_id)?;

        let response = self.transport.send(email).await.map_err(|e| {
            let status = e
                .status()
                .and_then(|code| code.to_string().parse::<u16>().ok());
            let detail = format!("SMTP send failed: {e}");

            match status {
                Some(s) => ProviderError::with_status(s, detail),
                None => ProviderError::new(detail),
            }
        })?;

        let reply = response
            .message()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(ProviderReceipt {
            message_id: Some(message_id),
            raw: Some(format!("{} {}", response.code(), reply)),
        })
    }

    async fn verify(&self) -> Result<bool, ProviderError> {
        match tokio::time::timeout(self.connection_timeout, self.transport.test_connection()).await
        {
            Ok(Ok(connected)) => Ok(connected),
            Ok(Err(e)) => Err(ProviderError::new(format!("SMTP handshake failed: {e}"))),
            Err(_) => Err(ProviderError::new(format!(
                "SMTP handshake timed out after {}ms",
                self.connection_timeout.as_millis()
            ))),
        }
    }
}
