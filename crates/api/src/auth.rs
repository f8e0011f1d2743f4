//! Bearer-token authentication: HS256 JWTs carrying the user id and tier,
//! Argon2id password hashing, and the request extractors handlers take as
//! arguments.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use imeicheck_domain::model::{UserRecord, UserTier};

use crate::handlers::ApiError;
use crate::state::AppState;

const TOKEN_LIFETIME_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub tier: UserTier,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(secret: &str, user: &UserRecord) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.user_id,
        tier: user.tier,
        iat: now.timestamp(),
        exp: (now + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| ApiError::Internal(err.to_string()))
}

fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApiError::Internal(err.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// An authenticated caller, extracted from the `Authorization: Bearer`
/// header. Rejects the request with 401 when the token is missing or bad.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser {
    pub user_id: i64,
    pub tier: UserTier,
}

impl AuthedUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.tier.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

fn extract_authed(req: &HttpRequest) -> Result<AuthedUser, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state missing".to_owned()))?;

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode_token(state.jwt_secret(), token)?;
    Ok(AuthedUser {
        user_id: claims.sub,
        tier: claims.tier,
    })
}

impl FromRequest for AuthedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_authed(req))
    }
}

/// Optional authentication for endpoints guests may call. A present but
/// invalid token is still a 401; only a missing header means guest.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<AuthedUser>);

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if req.headers().get("Authorization").is_none() {
            return ready(Ok(MaybeUser(None)));
        }
        ready(extract_authed(req).map(|user| MaybeUser(Some(user))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn token_round_trips_claims() {
        let user = UserRecord {
            user_id: 42,
            username: "u".into(),
            email: "u@example.com".into(),
            password_hash: String::new(),
            tier: UserTier::Premium,
            full_name: None,
            country: None,
            phone: None,
            email_verified: true,
            email_verification_code: None,
            email_verification_expires: None,
            reset_code: None,
            reset_code_expires: None,
            created_at: Utc::now(),
        };
        let token = issue_token("secret", &user).unwrap();
        let claims = decode_token("secret", &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.tier, UserTier::Premium);

        assert!(decode_token("other-secret", &token).is_err());
        assert!(decode_token("secret", "garbage").is_err());
    }
}
