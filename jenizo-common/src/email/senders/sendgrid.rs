use async_trait::async_trait;
use lettre::message::Mailbox;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::email::config::SendGridConfig;
use crate::email::{OutboundMessage, ProviderError, ProviderKind, ProviderReceipt, SendEmail};

const MESSAGE_ID_HEADER: &str = "x-message-id";

pub struct SendGridSender {
    client: Client,
    api_key: Zeroizing<String>,
    endpoint: String,
}

impl SendGridSender {
    pub fn new(config: &SendGridConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::new(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: Zeroizing::new(String::from(config.api_key.trim())),
            endpoint: format!("{}/v3/mail/send", config.base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct MailSendRequest<'a> {
    personalizations: [Personalization; 1],
    from: EmailAddress<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<EmailAddress<'a>>,
    subject: &'a str,
    content: [Content<'a>; 2],
}

#[derive(Serialize)]
struct Personalization {
    to: [EmailAddress<'static>; 1],
}

#[derive(Serialize)]
struct EmailAddress<'a> {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

impl<'a> From<&'a Mailbox> for EmailAddress<'a> {
    fn from(mailbox: &'a Mailbox) -> Self {
        Self {
            email: mailbox.email.to_string(),
            name: mailbox.name.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    message: Option<String>,
    field: Option<String>,
}

/// Flattens SendGrid's `{"errors": [...]}` body into one line. Anything else is returned
/// as-is.
fn describe_error_body(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let described = parsed
            .errors
            .iter()
            .filter_map(|e| {
                let message = e.message.as_deref()?;
                Some(match e.field.as_deref() {
                    Some(field) => format!("{message} (field: {field})"),
                    None => String::from(message),
                })
            })
            .collect::<Vec<_>>();

        if !described.is_empty() {
            return described.join("; ");
        }
    }

    if body.trim().is_empty() {
        String::from("empty response body")
    } else {
        String::from(body.trim())
    }
}

#[async_trait]
impl SendEmail for SendGridSender {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HttpApi
    }

    async fn send(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        let request = MailSendRequest {
            personalizations: [Personalization {
                to: [EmailAddress {
                    email: message.to.email.to_string(),
                    name: None,
                }],
            }],
            from: (&message.from).into(),
            reply_to: message.reply_to.as_ref().map(EmailAddress::from),
            subject: &message.subject,
            content: [
                Content {
                    content_type: "text/plain",
                    value: &message.text,
                },
                Content {
                    content_type: "text/html",
                    value: &message.html,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("SendGrid request failed: {e}")))?;

        let status = response.status();
        let message_id = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if status.is_success() {
            return Ok(ProviderReceipt {
                message_id,
                raw: Some(status.as_u16().to_string()),
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::with_status(
            status.as_u16(),
            describe_error_body(&body),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender_for(server: &MockServer) -> SendGridSender {
        SendGridSender::new(&SendGridConfig {
            api_key: String::from(" SG.test-key "),
            base_url: format!("{}/", server.uri()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            to: "inbox@jenizo.example".parse().unwrap(),
            from: "Jenizo <noreply@jenizo.example>".parse().unwrap(),
            subject: String::from("Contact Form — Jo"),
            text: String::from("hello!"),
            html: String::from("<p>hello!</p>"),
            reply_to: Some("Jo <jo@x.com>".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.test-key"))
            .and(body_json(json!({
                "personalizations": [{ "to": [{ "email": "inbox@jenizo.example" }] }],
                "from": { "email": "noreply@jenizo.example", "name": "Jenizo" },
                "reply_to": { "email": "jo@x.com", "name": "Jo" },
                "subject": "Contact Form — Jo",
                "content": [
                    { "type": "text/plain", "value": "hello!" },
                    { "type": "text/html", "value": "<p>hello!</p>" },
                ],
            })))
            .respond_with(ResponseTemplate::new(202).insert_header("X-Message-Id", "sg-abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = sender_for(&server).send(&message()).await.unwrap();

        assert_eq!(receipt.message_id.as_deref(), Some("sg-abc123"));
        assert_eq!(receipt.raw.as_deref(), Some("202"));
    }

    #[tokio::test]
    async fn test_reply_to_omitted_when_absent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut message = message();
        message.reply_to = None;

        let receipt = sender_for(&server).send(&message).await.unwrap();
        assert_eq!(receipt.message_id, None);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("reply_to").is_none());
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "errors": [{
                    "message": "The from address does not match a verified Sender Identity",
                    "field": "from",
                    "help": null,
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = sender_for(&server).send(&message()).await.unwrap_err();

        assert_eq!(err.status, Some(403));
        assert_eq!(
            err.detail,
            "The from address does not match a verified Sender Identity (field: from)"
        );
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let sender = SendGridSender::new(&SendGridConfig {
            api_key: String::from("SG.test-key"),
            base_url: String::from("http://127.0.0.1:1"),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = sender.send(&message()).await.unwrap_err();

        assert_eq!(err.status, None);
        assert!(err.detail.starts_with("SendGrid request failed"));
    }

    #[test]
    fn test_describe_error_body() {
        assert_eq!(
            describe_error_body(r#"{"errors":[{"message":"Maximum credits exceeded"}]}"#),
            "Maximum credits exceeded"
        );
        assert_eq!(
            describe_error_body(
                r#"{"errors":[{"message":"a","field":"x"},{"message":"b","field":null}]}"#
            ),
            "a (field: x); b"
        );
        assert_eq!(describe_error_body("Bad Gateway"), "Bad Gateway");
        assert_eq!(describe_error_body("  "), "empty response body");
    }
}
