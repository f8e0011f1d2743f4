//! Checkout session creation, payment lookups, and the admin ledger
//! endpoints. Ledger rows are only ever created here or by the webhook
//! reconciler; the balance itself is always derived.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use imeicheck_domain::balance::balance_for;
use imeicheck_domain::model::{
    normalize_email, Imei, NewPayment, OrderParty, PaymentRecord, PaymentStatus, UserTier,
};
use imeicheck_domain::storage::{PaymentStore, ServiceStore, UserStore};

use crate::auth::{AuthedUser, MaybeUser};
use crate::handlers::ApiError;
use crate::state::AppState;

const DEFAULT_CURRENCY: &str = "usd";
const MIN_TOPUP_CENTS: i64 = 100;

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub payment_id: i64,
    pub order_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: i64,
    pub credited_amount: Option<i64>,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: String,
    pub reference: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub balance_before: Option<i64>,
    pub balance_after: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRecord> for PaymentView {
    fn from(payment: PaymentRecord) -> Self {
        Self {
            payment_id: payment.payment_id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            credited_amount: payment.credited_amount,
            currency: payment.currency,
            status: payment.status,
            method: payment.method,
            reference: payment.reference,
            checkout_session_id: payment.checkout_session_id,
            payment_intent_id: payment.payment_intent_id,
            balance_before: payment.balance_before,
            balance_after: payment.balance_after,
            error_message: payment.error_message,
            created_at: payment.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct TopUpSessionRequest {
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

pub async fn create_topup_session_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    body: web::Json<TopUpSessionRequest>,
) -> Result<HttpResponse, ApiError> {
    if body.amount < MIN_TOPUP_CENTS {
        return Err(ApiError::Validation(format!(
            "top-up amount must be at least {MIN_TOPUP_CENTS} cents"
        )));
    }
    let currency = body
        .currency
        .clone()
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_owned());

    let session = state
        .checkout()
        .create_topup_session(caller.user_id, body.amount, &currency)
        .await
        .map_err(|err| ApiError::Gateway(err.to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "session_id": session.id,
        "checkout_url": session.url,
    })))
}

#[derive(Deserialize)]
pub struct ImeiSessionRequest {
    pub imei: String,
    pub service_id: i64,
    #[serde(default)]
    pub guest_email: Option<String>,
}

pub async fn create_imei_session_handler(
    state: web::Data<AppState>,
    caller: MaybeUser,
    body: web::Json<ImeiSessionRequest>,
) -> Result<HttpResponse, ApiError> {
    let imei =
        Imei::parse(&body.imei).map_err(|err| ApiError::Validation(err.to_string()))?;

    let (actor, tier) = match caller.0 {
        Some(authed) => {
            let user = state
                .storage()
                .find_user(authed.user_id)
                .await?
                .ok_or(ApiError::Unauthorized)?;
            (OrderParty::User(user.user_id), user.tier)
        }
        None => {
            let email = body
                .guest_email
                .as_deref()
                .map(normalize_email)
                .filter(|email| email.contains('@'))
                .ok_or_else(|| {
                    ApiError::Validation("guest checkout requires a contact email".to_owned())
                })?;
            (OrderParty::Guest { email }, UserTier::Guest)
        }
    };

    let service = state
        .storage()
        .find_service(body.service_id)
        .await?
        .filter(|service| service.active)
        .ok_or(ApiError::NotFound)?;
    let price = service.price_for(tier);

    let session = state
        .checkout()
        .create_imei_session(
            &imei,
            service.service_id,
            &service.service_name,
            price,
            DEFAULT_CURRENCY,
            &actor,
        )
        .await
        .map_err(|err| ApiError::Gateway(err.to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "session_id": session.id,
        "checkout_url": session.url,
        "amount": price,
    })))
}

pub async fn payment_by_session_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let payment = state
        .storage()
        .find_payment_by_session(&path.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(PaymentView::from(payment)))
}

pub async fn list_my_payments_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let payments = state.storage().list_payments_for_user(caller.user_id).await?;
    let views: Vec<PaymentView> = payments.into_iter().map(PaymentView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn admin_list_payments_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let payments = state.storage().list_payments().await?;
    let views: Vec<PaymentView> = payments.into_iter().map(PaymentView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn admin_get_payment_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let payment = state
        .storage()
        .find_payment(path.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(PaymentView::from(payment)))
}

#[derive(Deserialize)]
pub struct SetPaymentStatusRequest {
    pub status: PaymentStatus,
}

pub async fn admin_set_payment_status_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
    body: web::Json<SetPaymentStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let updated = state
        .storage()
        .set_payment_status(path.into_inner(), body.status)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(PaymentView::from(updated)))
}

pub async fn admin_delete_payment_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    if !state.storage().delete_payment(path.into_inner()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Deserialize)]
pub struct ManualCreditRequest {
    pub email: String,
    pub amount: i64,
    #[serde(default)]
    pub note: Option<String>,
}

/// Writes an approved ledger entry by hand. The balance stays derived; this
/// only adds a credit row.
pub async fn admin_manual_credit_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    body: web::Json<ManualCreditRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    if body.amount <= 0 {
        return Err(ApiError::Validation("credit amount must be positive".to_owned()));
    }

    let email = normalize_email(&body.email);
    let user = state
        .storage()
        .find_user_by_email(&email)
        .await?
        .ok_or(ApiError::NotFound)?;

    let balance_before = balance_for(state.storage(), user.user_id).await?;
    let payment = state
        .storage()
        .insert_payment(NewPayment {
            order_id: None,
            user_id: Some(user.user_id),
            amount: body.amount,
            credited_amount: Some(body.amount),
            currency: DEFAULT_CURRENCY.to_owned(),
            status: PaymentStatus::Approved,
            method: "manual".to_owned(),
            reference: body.note.clone(),
            checkout_session_id: None,
            payment_intent_id: None,
            balance_before: Some(balance_before),
            balance_after: Some(balance_before + body.amount),
            error_message: None,
        })
        .await?;

    Ok(HttpResponse::Created().json(PaymentView::from(payment)))
}
