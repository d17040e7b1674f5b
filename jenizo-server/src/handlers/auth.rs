use jenizo_common::db::{self, DaoError, UserStore};
use jenizo_common::models::user::{NewUser, PublicUser, User};
use jenizo_common::token::auth_token::{AuthToken, NewAuthTokenClaims};
use jenizo_common::validators;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;
use tokio::sync::oneshot;
use zeroize::Zeroizing;

use crate::env;
use crate::handlers::error::HttpErrorResponse;
use crate::middleware::auth::VerifiedToken;

const MAX_PASSWORD_BYTES: usize = 512;
const MAX_NAME_CHARS: usize = 200;

#[derive(Deserialize)]
pub struct CredentialPair {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize)]
struct SignedIn {
    ok: bool,
    token: String,
    user: PublicUser,
}

pub async fn register(
    user_store: web::Data<UserStore>,
    credentials: web::Json<CredentialPair>,
) -> Result<HttpResponse, HttpErrorResponse> {
    let credentials = credentials.into_inner();
    let (email, password) = required_credentials(&credentials)?;

    if validators::parse_email_address(&email).is_none() {
        return Err(HttpErrorResponse::IncorrectlyFormed(Cow::Borrowed(
            "Invalid email address",
        )));
    }

    let name = credentials.name.as_deref().unwrap_or_default().trim();
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(HttpErrorResponse::InputTooLarge(Cow::Borrowed(
            "Name is too long",
        )));
    }

    let user_dao = db::user::Dao::new(&user_store);
    if user_dao.get_user_by_email(&email).is_ok() {
        return Err(HttpErrorResponse::ConflictWithExisting(Cow::Borrowed(
            "User exists",
        )));
    }

    let password_hash = hash_password(password).await?;

    let user = match user_dao.create_user(NewUser {
        name,
        email: &email,
        password_hash: &password_hash,
    }) {
        Ok(u) => u,
        Err(DaoError::AlreadyExists) => {
            // Registered by a concurrent request while the password was being hashed
            return Err(DaoError::AlreadyExists.into());
        }
        Err(e) => {
            log::error!("{e}");
            return Err(e.into());
        }
    };

    log::info!("Registered user {}", user.id);

    Ok(HttpResponse::Ok().json(signed_in(&user)))
}

pub async fn login(
    user_store: web::Data<UserStore>,
    credentials: web::Json<CredentialPair>,
) -> Result<HttpResponse, HttpErrorResponse> {
    const INVALID_CREDENTIALS_MSG: &str = "Invalid credentials";

    let credentials = credentials.into_inner();
    let (email, password) = required_credentials(&credentials)?;

    let user_dao = db::user::Dao::new(&user_store);
    let user = match user_dao.get_user_by_email(&email) {
        Ok(u) => u,
        Err(DaoError::NotFound) => {
            return Err(HttpErrorResponse::IncorrectCredential(Cow::Borrowed(
                INVALID_CREDENTIALS_MSG,
            )));
        }
        Err(e) => {
            log::error!("{e}");
            return Err(e.into());
        }
    };

    let password_hash = user.password_hash.clone();
    let (sender, receiver) = oneshot::channel();

    rayon::spawn(move || {
        let hash = match argon2_kdf::Hash::from_str(&password_hash) {
            Ok(h) => h,
            Err(e) => {
                let _ = sender.send(Err(e));
                return;
            }
        };

        let _ = sender.send(Ok(hash.verify(password.as_bytes())));
    });

    match receiver.await? {
        Ok(true) => (),
        Ok(false) => {
            return Err(HttpErrorResponse::IncorrectCredential(Cow::Borrowed(
                INVALID_CREDENTIALS_MSG,
            )));
        }
        Err(e) => {
            log::error!("Stored password hash for user {} is unreadable: {e}", user.id);
            return Err(HttpErrorResponse::InternalError(Cow::Borrowed(
                "Failed to validate password",
            )));
        }
    }

    Ok(HttpResponse::Ok().json(signed_in(&user)))
}

pub async fn me(
    user_store: web::Data<UserStore>,
    token: VerifiedToken,
) -> Result<HttpResponse, HttpErrorResponse> {
    let user_dao = db::user::Dao::new(&user_store);
    let user = user_dao.get_user_by_id(token.claims.user_id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "user": PublicUser::from(&user),
    })))
}

fn required_credentials(
    credentials: &CredentialPair,
) -> Result<(String, Zeroizing<String>), HttpErrorResponse> {
    let email = credentials.email.as_deref().unwrap_or_default().trim();
    let password = credentials.password.as_deref().unwrap_or_default();

    if email.is_empty() || password.is_empty() {
        return Err(HttpErrorResponse::IncorrectlyFormed(Cow::Borrowed(
            "Email and password required",
        )));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(HttpErrorResponse::InputTooLarge(Cow::Borrowed(
            "Provided password is too long. Max: 512 bytes",
        )));
    }

    Ok((db::normalize_email(email), Zeroizing::new(String::from(password))))
}

async fn hash_password(password: Zeroizing<String>) -> Result<String, HttpErrorResponse> {
    let (sender, receiver) = oneshot::channel();

    rayon::spawn(move || {
        let hash_result = argon2_kdf::Hasher::default()
            .algorithm(argon2_kdf::Algorithm::Argon2id)
            .salt_length(env::CONF.hash_salt_length)
            .hash_length(env::CONF.hash_length)
            .iterations(env::CONF.hash_iterations)
            .memory_cost_kib(env::CONF.hash_mem_cost_kib)
            .threads(env::CONF.hash_threads)
            .hash(password.as_bytes());

        let _ = sender.send(hash_result.map(|h| h.to_string()));
    });

    match receiver.await? {
        Ok(h) => Ok(h),
        Err(e) => {
            log::error!("{e}");
            Err(HttpErrorResponse::InternalError(Cow::Borrowed(
                "Failed to hash password",
            )))
        }
    }
}

fn signed_in(user: &User) -> SignedIn {
    let claims = NewAuthTokenClaims::access(user.id, &user.email, env::CONF.token_lifetime);

    SignedIn {
        ok: true,
        token: AuthToken::sign_new(claims, &env::CONF.token_signing_key),
        user: user.into(),
    }
}
