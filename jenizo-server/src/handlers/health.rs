use jenizo_common::email::{ProviderHandle, ProviderKind};

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::env;

pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Jenizo backend running. Use /api endpoints.")
}

pub async fn heartbeat() -> impl Responder {
    HttpResponse::Ok()
}

/// `provider` is `null` when no mail provider is configured.
pub async fn health(provider: web::Data<ProviderHandle>) -> impl Responder {
    let provider_name = match provider.kind() {
        ProviderKind::None => None,
        kind => Some(kind.as_str()),
    };

    HttpResponse::Ok().json(json!({
        "ok": true,
        "env": env::CONF.run_mode.as_str(),
        "mailReady": provider.is_ready(),
        "provider": provider_name,
    }))
}
