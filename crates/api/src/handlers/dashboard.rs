//! Admin dashboard aggregates.

use actix_web::{web, HttpResponse};
use serde_json::json;

use imeicheck_domain::storage::{OrderStore, PaymentStore, UserStore};

use crate::auth::AuthedUser;
use crate::handlers::ApiError;
use crate::state::AppState;

pub async fn dashboard_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let storage = state.storage();

    let users = storage.count_users().await?;
    let orders = storage.count_orders().await?;
    let payments = storage.count_payments().await?;
    let revenue = storage.total_approved_amount().await?;

    let orders_by_status: Vec<_> = storage
        .count_orders_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| json!({ "status": status, "orders": count }))
        .collect();
    let service_usage = storage.service_usage().await?;

    Ok(HttpResponse::Ok().json(json!({
        "totals": {
            "users": users,
            "orders": orders,
            "payments": payments,
            "approved_revenue": revenue,
        },
        "orders_by_status": orders_by_status,
        "service_usage": service_usage,
    })))
}
