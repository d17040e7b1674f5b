use crate::email::{MailError, OutboundMessage, ProviderHandle, SendResult};

/// Sends through whichever provider the handle selected. Exactly one provider call is made
/// when the provider is ready and none otherwise. Failures are not retried here.
pub async fn send(
    message: &OutboundMessage,
    provider: &ProviderHandle,
) -> Result<SendResult, MailError> {
    let Some(sender) = provider.sender() else {
        return Err(MailError::Unavailable);
    };

    if !provider.is_ready() {
        return Err(MailError::Unavailable);
    }

    let kind = provider.kind();

    match sender.send(message).await {
        Ok(receipt) => {
            log::info!(
                "Message '{}' sent via {kind}, message ID: {}",
                message.subject,
                receipt.message_id.as_deref().unwrap_or("<none>"),
            );

            Ok(SendResult {
                provider_used: kind,
                message_id: receipt.message_id,
                raw: receipt.raw,
            })
        }
        Err(e) => Err(MailError::SendFailed {
            provider: kind,
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use lettre::message::Mailbox;
    use std::sync::Arc;

    use crate::email::senders::MockSender;
    use crate::email::{MailDefaults, ProviderError, ProviderKind};

    fn message() -> OutboundMessage {
        OutboundMessage {
            to: "inbox@jenizo.example".parse::<Mailbox>().unwrap(),
            from: "noreply@jenizo.example".parse::<Mailbox>().unwrap(),
            subject: String::from("Contact Form — Jo"),
            text: String::from("hello!"),
            html: String::from("<p>hello!</p>"),
            reply_to: Some("jo@x.com".parse::<Mailbox>().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_send_through_ready_provider() {
        let sender = Arc::new(MockSender::new());
        let handle = ProviderHandle::from_sender(sender.clone(), MailDefaults::default(), true);

        let result = send(&message(), &handle).await.unwrap();

        assert_eq!(result.provider_used, ProviderKind::Smtp);
        assert!(!result.message_id.unwrap().is_empty());
        assert_eq!(sender.calls(), 1);
        assert_eq!(sender.sent()[0], message());
    }

    #[tokio::test]
    async fn test_no_provider_is_unavailable() {
        let handle = ProviderHandle::none(MailDefaults::default());

        let err = send(&message(), &handle).await.unwrap_err();
        assert_eq!(err, MailError::Unavailable);
    }

    #[tokio::test]
    async fn test_unready_provider_is_never_called() {
        let sender = Arc::new(MockSender::new());
        let handle = ProviderHandle::from_sender(sender.clone(), MailDefaults::default(), false);

        let err = send(&message(), &handle).await.unwrap_err();

        assert_eq!(err, MailError::Unavailable);
        assert_eq!(sender.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_send_failed() {
        let sender = Arc::new(MockSender::failing(ProviderError::with_status(
            401,
            "The provided authorization grant is invalid",
        )));
        let handle = ProviderHandle::from_sender(sender.clone(), MailDefaults::default(), true);

        let err = send(&message(), &handle).await.unwrap_err();

        assert_eq!(
            err,
            MailError::SendFailed {
                provider: ProviderKind::Smtp,
                detail: String::from("status 401: The provided authorization grant is invalid"),
            }
        );
        assert_eq!(sender.calls(), 1);
    }
}
