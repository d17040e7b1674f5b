use jenizo_common::email::{self, MailError, ProviderHandle};
use jenizo_common::validators::{self, FormKind};

use actix_web::{web, HttpRequest, HttpResponse};
use lettre::message::Mailbox;
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;

use crate::handlers::error::HttpErrorResponse;

#[derive(Serialize)]
struct SubmissionAccepted {
    ok: bool,
    message: &'static str,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

pub async fn contact(
    provider: web::Data<ProviderHandle>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, HttpErrorResponse> {
    submit(FormKind::Contact, &provider, &req, &body).await
}

pub async fn inquiry(
    provider: web::Data<ProviderHandle>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, HttpErrorResponse> {
    submit(FormKind::Inquiry, &provider, &req, &body).await
}

async fn submit(
    kind: FormKind,
    provider: &ProviderHandle,
    req: &HttpRequest,
    body: &[u8],
) -> Result<HttpResponse, HttpErrorResponse> {
    let raw = parse_submission(body)?;
    let fields = validators::validate(kind, &raw).into_result()?;

    if !provider.is_ready() {
        log::warn!(
            "Rejecting {kind:?} submission; mail provider '{}' is not ready",
            provider.kind()
        );
        return Err(MailError::Unavailable.into());
    }

    let Some(to) = provider.defaults().to.clone() else {
        let err = MailError::Configuration(String::from("destination email address missing"));
        log::error!("{err}");
        return Err(err.into());
    };

    let from = match &provider.defaults().from {
        Some(from) => from.clone(),
        None => fallback_from_address(req).map_err(|err| {
            log::error!("{err}");
            HttpErrorResponse::from(err)
        })?,
    };

    let message = email::compose(&fields, to, from, &email::kolkata_now());

    let result = match email::send(&message, provider).await {
        Ok(r) => r,
        Err(e) => {
            log::error!("{kind:?} submission from {}: {e}", fields.submitter_email());
            return Err(e.into());
        }
    };

    let message = match kind {
        FormKind::Contact => "Contact message sent",
        FormKind::Inquiry => "Inquiry sent",
    };

    Ok(HttpResponse::Ok().json(SubmissionAccepted {
        ok: true,
        message,
        message_id: result.message_id,
    }))
}

/// An empty body or a JSON value that isn't an object is an empty submission. Malformed
/// JSON is rejected outright.
fn parse_submission(body: &[u8]) -> Result<Map<String, Value>, HttpErrorResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(raw)) => Ok(raw),
        Ok(_) => Ok(Map::new()),
        Err(_) => Err(HttpErrorResponse::IncorrectlyFormed(Cow::Borrowed(
            "Invalid JSON body",
        ))),
    }
}

/// `no-reply@{host}`, with the port stripped from the request's host.
fn fallback_from_address(req: &HttpRequest) -> Result<Mailbox, MailError> {
    let conn_info = req.connection_info();
    let host = strip_port(conn_info.host());

    format!("no-reply@{host}").parse::<Mailbox>().map_err(|e| {
        MailError::Configuration(format!(
            "No from address configured and '{host}' can't be used as a mail domain: {e}"
        ))
    })
}

fn strip_port(host: &str) -> &str {
    if let Some(bracketed) = host.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or(bracketed);
    }

    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
