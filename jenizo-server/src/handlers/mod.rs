pub mod auth;
pub mod health;
pub mod submission;

pub mod error {
    use jenizo_common::db::DaoError;
    use jenizo_common::email::MailError;
    use jenizo_common::token::TokenError;
    use jenizo_common::validators::FieldErrors;

    use actix_web::http::StatusCode;
    use actix_web::{HttpResponse, HttpResponseBuilder};
    use serde_json::json;
    use std::borrow::Cow;
    use std::fmt;
    use tokio::sync::oneshot;

    pub const MAIL_UNAVAILABLE_MSG: &str = "Email service unavailable. Please try again later.";
    pub const SEND_FAILED_MSG: &str = "Failed to send email";
    pub const INTERNAL_ERROR_MSG: &str = "Internal server error";
    pub const TOO_MANY_REQUESTS_MSG: &str = "Too many requests, please try again later.";

    #[derive(Debug)]
    pub enum HttpErrorResponse {
        // 400
        IncorrectlyFormed(Cow<'static, str>),
        InvalidFields(FieldErrors),

        // 401
        IncorrectCredential(Cow<'static, str>),
        BadToken(Cow<'static, str>),
        TokenExpired(Cow<'static, str>),
        TokenMissing(Cow<'static, str>),
        WrongTokenType(Cow<'static, str>),

        // 403
        OriginDisallowed(Cow<'static, str>),

        // 404
        DoesNotExist(Cow<'static, str>),

        // 409
        ConflictWithExisting(Cow<'static, str>),

        // 413
        InputTooLarge(Cow<'static, str>),

        // 429
        TooManyRequests(Cow<'static, str>),

        // 500
        InternalError(Cow<'static, str>),

        // 503
        ServiceUnavailable(Cow<'static, str>),
    }

    impl HttpErrorResponse {
        fn message(&self) -> Option<&str> {
            match self {
                HttpErrorResponse::InvalidFields(_) => None,
                HttpErrorResponse::IncorrectlyFormed(msg)
                | HttpErrorResponse::IncorrectCredential(msg)
                | HttpErrorResponse::BadToken(msg)
                | HttpErrorResponse::TokenExpired(msg)
                | HttpErrorResponse::TokenMissing(msg)
                | HttpErrorResponse::WrongTokenType(msg)
                | HttpErrorResponse::OriginDisallowed(msg)
                | HttpErrorResponse::DoesNotExist(msg)
                | HttpErrorResponse::ConflictWithExisting(msg)
                | HttpErrorResponse::InputTooLarge(msg)
                | HttpErrorResponse::TooManyRequests(msg)
                | HttpErrorResponse::InternalError(msg)
                | HttpErrorResponse::ServiceUnavailable(msg) => Some(msg),
            }
        }
    }

    impl std::error::Error for HttpErrorResponse {}

    impl fmt::Display for HttpErrorResponse {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                HttpErrorResponse::InvalidFields(errors) => {
                    write!(f, "Invalid fields: ")?;
                    for (i, (field, msg)) in errors.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{field} ({msg})")?;
                    }
                    Ok(())
                }
                e => write!(f, "{}", e.message().unwrap_or_default()),
            }
        }
    }

    impl actix_web::error::ResponseError for HttpErrorResponse {
        fn error_response(&self) -> HttpResponse {
            let body = match self {
                HttpErrorResponse::InvalidFields(errors) => json!({
                    "ok": false,
                    "errors": errors,
                }),
                // Browser clients read `message`; API clients read `error`
                e => {
                    let msg = e.message().unwrap_or_default();
                    json!({
                        "ok": false,
                        "error": msg,
                        "message": msg,
                    })
                }
            };

            HttpResponseBuilder::new(self.status_code()).json(body)
        }

        fn status_code(&self) -> StatusCode {
            match *self {
                HttpErrorResponse::IncorrectlyFormed(_) | HttpErrorResponse::InvalidFields(_) => {
                    StatusCode::BAD_REQUEST
                }
                HttpErrorResponse::IncorrectCredential(_)
                | HttpErrorResponse::BadToken(_)
                | HttpErrorResponse::TokenExpired(_)
                | HttpErrorResponse::TokenMissing(_)
                | HttpErrorResponse::WrongTokenType(_) => StatusCode::UNAUTHORIZED,
                HttpErrorResponse::OriginDisallowed(_) => StatusCode::FORBIDDEN,
                HttpErrorResponse::DoesNotExist(_) => StatusCode::NOT_FOUND,
                HttpErrorResponse::ConflictWithExisting(_) => StatusCode::CONFLICT,
                HttpErrorResponse::InputTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                HttpErrorResponse::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
                HttpErrorResponse::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                HttpErrorResponse::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            }
        }
    }

    impl From<oneshot::error::RecvError> for HttpErrorResponse {
        fn from(_err: oneshot::error::RecvError) -> Self {
            HttpErrorResponse::InternalError(Cow::Borrowed("Rayon thread pool failure"))
        }
    }

    impl From<FieldErrors> for HttpErrorResponse {
        fn from(errors: FieldErrors) -> Self {
            HttpErrorResponse::InvalidFields(errors)
        }
    }

    /// Provider details are never returned to the client. Callers log the `MailError`
    /// before converting it.
    impl From<MailError> for HttpErrorResponse {
        fn from(err: MailError) -> Self {
            match err {
                MailError::Unavailable => {
                    HttpErrorResponse::ServiceUnavailable(Cow::Borrowed(MAIL_UNAVAILABLE_MSG))
                }
                MailError::Configuration(_) => {
                    HttpErrorResponse::InternalError(Cow::Borrowed(INTERNAL_ERROR_MSG))
                }
                MailError::SendFailed { .. } => {
                    HttpErrorResponse::InternalError(Cow::Borrowed(SEND_FAILED_MSG))
                }
            }
        }
    }

    impl From<DaoError> for HttpErrorResponse {
        fn from(err: DaoError) -> Self {
            match err {
                DaoError::AlreadyExists => {
                    HttpErrorResponse::ConflictWithExisting(Cow::Borrowed("User exists"))
                }
                DaoError::NotFound => {
                    HttpErrorResponse::DoesNotExist(Cow::Borrowed("User not found"))
                }
                DaoError::LockPoisoned => {
                    HttpErrorResponse::InternalError(Cow::Borrowed(INTERNAL_ERROR_MSG))
                }
            }
        }
    }

    impl From<TokenError> for HttpErrorResponse {
        fn from(err: TokenError) -> Self {
            match err {
                TokenError::TokenInvalid => {
                    HttpErrorResponse::BadToken(Cow::Borrowed("Invalid token"))
                }
                TokenError::TokenExpired => {
                    HttpErrorResponse::TokenExpired(Cow::Borrowed("Token expired"))
                }
                TokenError::TokenMissing => {
                    HttpErrorResponse::TokenMissing(Cow::Borrowed("No token provided"))
                }
                TokenError::WrongTokenType => {
                    HttpErrorResponse::WrongTokenType(Cow::Borrowed("Wrong token type"))
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        use actix_web::body::to_bytes;
        use actix_web::ResponseError;
        use jenizo_common::email::ProviderKind;
        use jenizo_common::validators::{validate, FormKind};
        use serde_json::{Map, Value};

        async fn body_json(err: HttpErrorResponse) -> (StatusCode, Value) {
            let resp = err.error_response();
            let status = resp.status();
            let body = to_bytes(resp.into_body()).await.unwrap();
            (status, serde_json::from_slice(&body).unwrap())
        }

        #[actix_web::test]
        async fn test_mail_errors_hide_details() {
            let (status, body) = body_json(MailError::Unavailable.into()).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(body["error"], MAIL_UNAVAILABLE_MSG);
            assert_eq!(body["ok"], false);

            let (status, body) = body_json(
                MailError::SendFailed {
                    provider: ProviderKind::HttpApi,
                    detail: String::from("status 401: bad key SG.secret"),
                }
                .into(),
            )
            .await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], SEND_FAILED_MSG);
            assert!(!body.to_string().contains("SG.secret"));

            let (status, body) = body_json(
                MailError::Configuration(String::from("destination missing")).into(),
            )
            .await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], INTERNAL_ERROR_MSG);
        }

        #[actix_web::test]
        async fn test_field_errors_body() {
            let errors = validate(FormKind::Contact, &Map::new())
                .into_result()
                .unwrap_err();

            let (status, body) = body_json(errors.into()).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["ok"], false);
            assert!(body.get("error").is_none());
            assert!(body.get("message").is_none());
            assert_eq!(body["errors"]["name"], "Name is required.");
        }

        #[actix_web::test]
        async fn test_dao_and_token_errors() {
            let (status, body) = body_json(DaoError::AlreadyExists.into()).await;
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(body["error"], "User exists");
            assert_eq!(body["message"], "User exists");

            let (status, _) = body_json(TokenError::TokenExpired.into()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }
}
