use crate::token::{Expiring, HmacSha256Verifier, Token, TokenError};

use base64::engine::general_purpose::URL_SAFE as b64_urlsafe;
use base64::Engine;
use hmac::Mac;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::HmacSha256;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AuthTokenType {
    Access,
}

impl std::convert::TryFrom<u8> for AuthTokenType {
    type Error = TokenError;

    fn try_from(value: u8) -> Result<Self, TokenError> {
        match value {
            1 => Ok(AuthTokenType::Access),
            _ => Err(TokenError::WrongTokenType),
        }
    }
}

impl std::convert::From<AuthTokenType> for u8 {
    fn from(token_type: AuthTokenType) -> Self {
        match token_type {
            AuthTokenType::Access => 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthTokenClaims {
    #[serde(rename = "uid")]
    pub user_id: Uuid,
    #[serde(rename = "eml")]
    pub user_email: String,
    #[serde(rename = "exp")]
    pub expiration: u64,
    #[serde(rename = "typ")]
    pub token_type: AuthTokenType,
}

#[derive(Clone, Debug, Serialize)]
pub struct NewAuthTokenClaims<'a> {
    #[serde(rename = "uid")]
    pub user_id: Uuid,
    #[serde(rename = "eml")]
    pub user_email: &'a str,
    #[serde(rename = "exp")]
    pub expiration: u64,
    #[serde(rename = "typ")]
    pub token_type: AuthTokenType,
}

impl<'a> NewAuthTokenClaims<'a> {
    pub fn access(user_id: Uuid, user_email: &'a str, lifetime: Duration) -> Self {
        let expiration = (SystemTime::now() + lifetime)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            user_id,
            user_email,
            expiration,
            token_type: AuthTokenType::Access,
        }
    }
}

impl Expiring for AuthTokenClaims {
    fn expiration(&self) -> u64 {
        self.expiration
    }
}

pub struct AuthToken {}

impl AuthToken {
    pub fn sign_new(claims: NewAuthTokenClaims, signing_key: &[u8]) -> String {
        let mut token_unencoded =
            serde_json::to_vec(&claims).expect("Failed to transform claims into JSON");

        let mut mac = HmacSha256::new_from_slice(signing_key).expect("HMAC key should not fail");
        mac.update(&token_unencoded);
        let signature = mac.finalize();
        token_unencoded.extend_from_slice(&signature.into_bytes());

        b64_urlsafe.encode(&token_unencoded)
    }

    /// Decodes and verifies an access token, returning its claims.
    pub fn verify_access(token: &str, signing_key: &[u8]) -> Result<AuthTokenClaims, TokenError> {
        let decoded = Self::decode(token)?;
        let claims = decoded.verify(signing_key)?;

        if claims.token_type != AuthTokenType::Access {
            return Err(TokenError::WrongTokenType);
        }

        Ok(claims.clone())
    }
}

impl Token for AuthToken {
    type Claims = AuthTokenClaims;
    type Verifier = HmacSha256Verifier;

    fn token_name() -> &'static str {
        "AuthToken"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let user_id = Uuid::now_v7();
        let user_email = "test1234@example.com";
        let signing_key = [9; 64];

        let claims = NewAuthTokenClaims::access(user_id, user_email, Duration::from_secs(10));
        let exp = claims.expiration;

        let token = AuthToken::sign_new(claims, &signing_key);
        let claims = AuthToken::verify_access(&token, &signing_key).unwrap();

        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.user_email, user_email);
        assert_eq!(claims.expiration, exp);
        assert_eq!(claims.token_type, AuthTokenType::Access);

        assert!(String::from_utf8_lossy(&b64_urlsafe.decode(&token).unwrap())
            .contains(&format!("\"exp\":{exp}")));

        let mut t = b64_urlsafe.decode(token).unwrap();

        // Make the signature invalid
        let last_byte = t.pop().unwrap();
        if last_byte == 0x01 {
            t.push(0x02);
        } else {
            t.push(0x01);
        }

        let t = b64_urlsafe.encode(t);

        assert_eq!(
            AuthToken::verify_access(&t, &signing_key).unwrap_err(),
            TokenError::TokenInvalid
        );
    }

    #[test]
    fn test_expired_token() {
        let exp = (SystemTime::now() - Duration::from_secs(10))
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let claims = NewAuthTokenClaims {
            user_id: Uuid::now_v7(),
            user_email: "test1234@example.com",
            expiration: exp,
            token_type: AuthTokenType::Access,
        };

        let token = AuthToken::sign_new(claims, &[9; 64]);
        assert_eq!(
            AuthToken::verify_access(&token, &[9; 64]).unwrap_err(),
            TokenError::TokenExpired
        );
    }

    #[test]
    fn test_unknown_token_type_is_rejected() {
        let json = format!(
            r#"{{"uid":"{}","eml":"a@b.co","exp":{},"typ":7}}"#,
            Uuid::now_v7(),
            u64::MAX,
        );
        let key = [4; 64];

        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(json.as_bytes());
        let mut token = json.into_bytes();
        token.extend_from_slice(&mac.finalize().into_bytes());

        let token = b64_urlsafe.encode(token);

        // The claims can't be parsed at all with an unknown type
        assert_eq!(
            AuthToken::verify_access(&token, &key).unwrap_err(),
            TokenError::TokenInvalid
        );
    }
}
