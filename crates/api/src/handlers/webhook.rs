//! The payment provider webhook. The body must stay raw bytes: the
//! signature covers the exact payload, and any re-serialization breaks it.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use imeicheck_gateway::event::decode_event;
use imeicheck_gateway::reconcile::process_notification;
use imeicheck_gateway::stripe::verify_signature_at;

use crate::handlers::ApiError;
use crate::state::AppState;

pub async fn webhook_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let header = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::BadSignature)?;

    verify_signature_at(
        state.webhook_secret().as_bytes(),
        &body,
        header,
        Utc::now().timestamp(),
    )
    .map_err(|_| ApiError::BadSignature)?;

    // A signed but unparseable body is still acknowledged; the provider
    // retries nothing we could handle better later.
    let notification = match decode_event(&body) {
        Ok(Some(notification)) => notification,
        Ok(None) => {
            debug!("ignoring unhandled webhook event type");
            return Ok(HttpResponse::Ok().json(json!({ "received": true })));
        }
        Err(err) => {
            debug!(error = %err, "ignoring undecodable webhook body");
            return Ok(HttpResponse::Ok().json(json!({ "received": true })));
        }
    };

    process_notification(
        state.storage(),
        state.verifier(),
        state.notifier(),
        state.result_cache(),
        notification,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}
