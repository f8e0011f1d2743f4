//! Order submission (the synchronous, balance-funded path), order lookups,
//! and the admin order endpoints.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use imeicheck_domain::balance::balance_for;
use imeicheck_domain::config::BalancePolicy;
use imeicheck_domain::model::{
    normalize_email, parse_imei_batch, NewOrder, OrderParty, OrderRecord, OrderStatus,
    OrderValidationError, UserTier,
};
use imeicheck_domain::storage::{OrderStore, PaymentStore, ServiceStore, UserStore};
use imeicheck_gateway::fulfill_order;

use crate::auth::{AuthedUser, MaybeUser};
use crate::handlers::ApiError;
use crate::state::AppState;

const DEFAULT_CURRENCY: &str = "usd";

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order_id: i64,
    pub user_id: Option<i64>,
    pub guest_email: Option<String>,
    pub imeis: Vec<String>,
    pub service_id: i64,
    pub service_name: String,
    pub status: OrderStatus,
    pub result: Option<String>,
    pub price_used: i64,
    pub currency: String,
    pub tier_at_order: UserTier,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<OrderRecord> for OrderView {
    fn from(order: OrderRecord) -> Self {
        Self {
            order_id: order.order_id,
            user_id: order.user_id,
            guest_email: order.guest_email,
            imeis: order.imeis,
            service_id: order.service_id,
            service_name: order.service_name_at_order,
            status: order.status,
            result: order.result,
            price_used: order.price_used,
            currency: order.currency,
            tier_at_order: order.tier_at_order,
            payment_intent_id: order.payment_intent_id,
            created_at: order.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub imeis: Vec<String>,
    pub service_id: i64,
    #[serde(default)]
    pub guest_email: Option<String>,
}

pub async fn create_order_handler(
    state: web::Data<AppState>,
    caller: MaybeUser,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let imeis = parse_imei_batch(&body.imeis)?;

    let (party, tier, recipient) = match caller.0 {
        Some(authed) => {
            let user = state
                .storage()
                .find_user(authed.user_id)
                .await?
                .ok_or(ApiError::Unauthorized)?;
            (
                OrderParty::User(user.user_id),
                user.tier,
                Some(user.email),
            )
        }
        None => {
            let email = body
                .guest_email
                .as_deref()
                .map(normalize_email)
                .filter(|email| email.contains('@'))
                .ok_or(OrderValidationError::MissingGuestEmail)?;
            (
                OrderParty::Guest {
                    email: email.clone(),
                },
                UserTier::Guest,
                Some(email),
            )
        }
    };

    let service = state
        .storage()
        .find_service(body.service_id)
        .await?
        .filter(|service| service.active)
        .ok_or(ApiError::NotFound)?;
    // The snapshot is the tier price for the service, not a per-IMEI total.
    let price = service.price_for(tier);

    // Guests pay per checkout session, never from a balance.
    if let OrderParty::User(user_id) = party {
        if state.balance_policy() == BalancePolicy::Enforce {
            let balance = balance_for(state.storage(), user_id).await?;
            if price > balance {
                return Err(ApiError::InsufficientBalance);
            }
        }
    }

    let order = state
        .storage()
        .insert_order(NewOrder {
            placed_by: party,
            imeis,
            service_id: service.service_id,
            price_used: price,
            currency: DEFAULT_CURRENCY.to_owned(),
            tier_at_order: tier,
            service_name_at_order: service.service_name.clone(),
            payment_intent_id: None,
        })
        .await?;

    let outcome = fulfill_order(
        state.storage(),
        state.verifier(),
        state.notifier(),
        &order,
        recipient.as_deref(),
    )
    .await?;

    Ok(HttpResponse::Created().json(OrderView::from(OrderRecord {
        status: outcome.status,
        result: Some(outcome.result_json),
        ..order
    })))
}

pub async fn list_my_orders_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let orders = state.storage().list_orders_for_user(caller.user_id).await?;
    let views: Vec<OrderView> = orders.into_iter().map(OrderView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

/// Serves the verification result for a paid checkout session: the cached
/// copy on the first poll, the persisted order afterwards.
pub async fn order_by_session_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session_id = path.into_inner();

    if let Some(result) = state.result_cache().take(&session_id) {
        return Ok(HttpResponse::Ok().json(json!({ "result": result })));
    }

    let payment = state
        .storage()
        .find_payment_by_session(&session_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let order_id = payment.order_id.ok_or(ApiError::NotFound)?;
    let order = state
        .storage()
        .find_order(order_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(HttpResponse::Ok().json(OrderView::from(order)))
}

pub async fn admin_list_orders_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let orders = state.storage().list_orders().await?;
    let views: Vec<OrderView> = orders.into_iter().map(OrderView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn admin_get_order_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let order = state
        .storage()
        .find_order(path.into_inner())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(OrderView::from(order)))
}

#[derive(Deserialize)]
pub struct SetOrderStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub result: Option<String>,
}

/// Admins may overwrite even terminal statuses; this is the manual
/// correction tool, not part of the reconciliation flow.
pub async fn admin_set_order_status_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
    body: web::Json<SetOrderStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let order_id = path.into_inner();
    let order = state
        .storage()
        .find_order(order_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let result = body
        .result
        .clone()
        .or(order.result)
        .unwrap_or_else(|| "null".to_owned());
    state
        .storage()
        .set_order_outcome(order_id, body.status, &result)
        .await?;

    let updated = state
        .storage()
        .find_order(order_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(OrderView::from(updated)))
}
