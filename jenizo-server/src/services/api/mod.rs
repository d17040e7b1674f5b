use std::borrow::Cow;
use std::time::Duration;

use actix_web::error::JsonPayloadError;
use actix_web::web::*;
use actix_web::HttpRequest;

use crate::env;
use crate::handlers::error::HttpErrorResponse;
use crate::middleware::Limiter;

mod auth;
mod health;
mod submission;

#[derive(Clone)]
pub struct RouteLimiters {
    pub submissions: Limiter,
}

impl Default for RouteLimiters {
    fn default() -> Self {
        const CLEAR_FREQUENCY: Duration = Duration::from_secs(3600 * 24);

        Self {
            submissions: Limiter::new(
                env::CONF.rate_limit_max,
                env::CONF.rate_limit_window,
                CLEAR_FREQUENCY.max(env::CONF.rate_limit_window),
                env::CONF.trust_proxy,
            ),
        }
    }
}

pub fn configure(cfg: &mut ServiceConfig, limiters: RouteLimiters) {
    cfg.service(
        scope("/api")
            .app_data(
                JsonConfig::default()
                    .limit(env::CONF.max_body_bytes)
                    .error_handler(json_error_handler),
            )
            .app_data(PayloadConfig::new(env::CONF.max_body_bytes))
            .configure(health::configure)
            .configure(|cfg| submission::configure(cfg, limiters))
            .configure(auth::configure),
    );
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let resp = match err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            HttpErrorResponse::InputTooLarge(Cow::Borrowed("Request body is too large"))
        }
        JsonPayloadError::ContentType => HttpErrorResponse::IncorrectlyFormed(Cow::Borrowed(
            "Content type must be application/json",
        )),
        _ => HttpErrorResponse::IncorrectlyFormed(Cow::Borrowed("Invalid JSON body")),
    };

    resp.into()
}
