use jenizo_common::token::auth_token::{AuthToken, AuthTokenClaims};
use jenizo_common::token::TokenError;

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{FromRequest, HttpRequest};
use futures::future;

use crate::env;
use crate::handlers::error::HttpErrorResponse;

/// Claims of a valid, unexpired access token sent as `Authorization: Bearer <token>`.
#[derive(Debug)]
pub struct VerifiedToken {
    pub claims: AuthTokenClaims,
}

impl FromRequest for VerifiedToken {
    type Error = HttpErrorResponse;
    type Future = future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = bearer_token(req).and_then(|token| {
            AuthToken::verify_access(token, &env::CONF.token_signing_key)
        });

        match claims {
            Ok(claims) => future::ok(VerifiedToken { claims }),
            Err(e) => future::err(e.into()),
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Result<&str, TokenError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(TokenError::TokenMissing)?;

    let (scheme, token) = value.trim().split_once(' ').ok_or(TokenError::TokenMissing)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::TokenMissing);
    }

    Ok(token.trim())
}
