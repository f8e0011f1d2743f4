//! Registration, login, email verification, password management, and the
//! admin user endpoints.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use imeicheck_domain::balance::balance_for;
use imeicheck_domain::model::{normalize_email, NewUser, ProfileChanges, UserRecord, UserTier};
use imeicheck_domain::storage::{StorageError, UserStore};
use imeicheck_gateway::Mail;

use crate::auth::{hash_password, issue_token, verify_password, AuthedUser};
use crate::handlers::ApiError;
use crate::state::AppState;

const VERIFICATION_CODE_HOURS: i64 = 24;
const RESET_CODE_HOURS: i64 = 1;
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Serialize)]
pub struct UserView {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub tier: UserTier,
    pub full_name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserView {
    fn from(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            tier: user.tier,
            full_name: user.full_name,
            country: user.country,
            phone: user.phone,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

fn six_digit_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

pub async fn register_handler(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let username = body.username.trim().to_owned();
    if username.is_empty() {
        return Err(ApiError::Validation("username must not be empty".to_owned()));
    }
    let email = normalize_email(&body.email);
    if !email.contains('@') {
        return Err(ApiError::Validation("invalid email address".to_owned()));
    }
    if body.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let code = six_digit_code();
    let user = NewUser {
        username,
        email: email.clone(),
        password_hash: hash_password(&body.password)?,
        tier: UserTier::Pending,
        full_name: body.full_name,
        country: body.country,
        phone: body.phone,
        email_verification_code: Some(code.clone()),
        email_verification_expires: Some(Utc::now() + Duration::hours(VERIFICATION_CODE_HOURS)),
    };

    let user = match state.storage().insert_user(user).await {
        Ok(user) => user,
        Err(StorageError::Duplicate) => {
            return Err(ApiError::Conflict(
                "email or username already registered".to_owned(),
            ))
        }
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = state
        .notifier()
        .send(Mail::verification_code(&email, &code))
        .await
    {
        warn!(user_id = user.user_id, error = %err, "verification email failed");
    }

    Ok(HttpResponse::Created().json(json!({
        "user": UserView::from(user),
        "message": "verification code sent",
    })))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login_handler(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email);
    let Some(user) = state.storage().find_user_by_email(&email).await? else {
        return Err(ApiError::Unauthorized);
    };
    if !verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    if !user.email_verified {
        return Err(ApiError::Validation(
            "email address not verified".to_owned(),
        ));
    }

    let token = issue_token(state.jwt_secret(), &user)?;
    let balance = balance_for(state.storage(), user.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "balance": balance,
        "user": UserView::from(user),
    })))
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

pub async fn verify_email_handler(
    state: web::Data<AppState>,
    body: web::Json<VerifyEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email);
    let Some(user) = state.storage().find_user_by_email(&email).await? else {
        return Err(ApiError::NotFound);
    };

    let valid = user.email_verification_code.as_deref() == Some(body.code.trim())
        && user
            .email_verification_expires
            .is_some_and(|expires| expires > Utc::now());
    if !valid {
        return Err(ApiError::Validation(
            "invalid or expired verification code".to_owned(),
        ));
    }

    // Verification promotes a pending account; already-promoted tiers keep
    // whatever an admin assigned.
    let tier = if user.tier == UserTier::Pending {
        UserTier::Registered
    } else {
        user.tier
    };
    state
        .storage()
        .mark_email_verified(user.user_id, tier)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "email verified" })))
}

#[derive(Deserialize)]
pub struct EmailOnlyRequest {
    pub email: String,
}

pub async fn resend_verification_handler(
    state: web::Data<AppState>,
    body: web::Json<EmailOnlyRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email);
    // Same response whether or not the account exists.
    if let Some(user) = state.storage().find_user_by_email(&email).await? {
        if !user.email_verified {
            let code = six_digit_code();
            state
                .storage()
                .set_verification_code(
                    user.user_id,
                    &code,
                    Utc::now() + Duration::hours(VERIFICATION_CODE_HOURS),
                )
                .await?;
            if let Err(err) = state
                .notifier()
                .send(Mail::verification_code(&email, &code))
                .await
            {
                warn!(user_id = user.user_id, error = %err, "verification email failed");
            }
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "verification code sent" })))
}

pub async fn request_password_reset_handler(
    state: web::Data<AppState>,
    body: web::Json<EmailOnlyRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = normalize_email(&body.email);
    if let Some(user) = state.storage().find_user_by_email(&email).await? {
        let code = six_digit_code();
        state
            .storage()
            .set_reset_code(
                user.user_id,
                &code,
                Utc::now() + Duration::hours(RESET_CODE_HOURS),
            )
            .await?;
        if let Err(err) = state.notifier().send(Mail::password_reset(&email, &code)).await {
            warn!(user_id = user.user_id, error = %err, "reset email failed");
        }
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "reset code sent" })))
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

pub async fn reset_password_handler(
    state: web::Data<AppState>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let email = normalize_email(&body.email);
    let Some(user) = state.storage().find_user_by_email(&email).await? else {
        return Err(ApiError::NotFound);
    };

    let valid = user.reset_code.as_deref() == Some(body.code.trim())
        && user
            .reset_code_expires
            .is_some_and(|expires| expires > Utc::now());
    if !valid {
        return Err(ApiError::Validation(
            "invalid or expired reset code".to_owned(),
        ));
    }

    let hash = hash_password(&body.new_password)?;
    state
        .storage()
        .set_password_hash(user.user_id, &hash)
        .await?;
    state.storage().clear_reset_code(user.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "password updated" })))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    body: web::Json<ChangePasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let Some(user) = state.storage().find_user(caller.user_id).await? else {
        return Err(ApiError::NotFound);
    };
    if !verify_password(&body.current_password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let hash = hash_password(&body.new_password)?;
    state
        .storage()
        .set_password_hash(user.user_id, &hash)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "password updated" })))
}

pub async fn me_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let Some(user) = state.storage().find_user(caller.user_id).await? else {
        return Err(ApiError::NotFound);
    };
    let balance = balance_for(state.storage(), user.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "balance": balance,
        "user": UserView::from(user),
    })))
}

pub async fn update_me_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    body: web::Json<ProfileChanges>,
) -> Result<HttpResponse, ApiError> {
    let updated = state
        .storage()
        .update_profile(caller.user_id, body.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(HttpResponse::Ok().json(UserView::from(updated)))
}

pub async fn admin_list_users_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let users = state.storage().list_users().await?;
    let views: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn admin_get_user_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let user = state
        .storage()
        .find_user(path.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;
    let balance = balance_for(state.storage(), user.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "balance": balance,
        "user": UserView::from(user),
    })))
}

pub async fn admin_update_user_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
    body: web::Json<ProfileChanges>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let updated = state
        .storage()
        .update_profile(path.into_inner(), body.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(HttpResponse::Ok().json(UserView::from(updated)))
}

#[derive(Deserialize)]
pub struct SetTierRequest {
    pub tier: UserTier,
}

pub async fn admin_set_tier_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
    body: web::Json<SetTierRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let updated = state
        .storage()
        .set_tier(path.into_inner(), body.tier)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(HttpResponse::Ok().json(UserView::from(updated)))
}

pub async fn admin_delete_user_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    if !state.storage().delete_user(path.into_inner()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::NoContent().finish())
}
