//! Decoding and classification of provider webhook events.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use imeicheck_domain::model::{Imei, OrderParty};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("webhook payload was not valid json: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: EventObject,
}

#[derive(Deserialize)]
struct EventObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

/// One actionable payment event, normalized across the two event types the
/// reconciler handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Parses the raw webhook body. Returns `None` for event types the
/// reconciler ignores.
pub fn decode_event(raw: &[u8]) -> Result<Option<PaymentNotification>, EventError> {
    let envelope: Envelope =
        serde_json::from_slice(raw).map_err(|err| EventError::Decode(err.to_string()))?;

    let object = envelope.data.object;
    let notification = match envelope.kind.as_str() {
        "checkout.session.completed" => PaymentNotification {
            checkout_session_id: Some(object.id),
            payment_intent_id: object.payment_intent,
            amount_cents: object.amount_total.unwrap_or(0),
            currency: object.currency.unwrap_or_else(|| "usd".to_owned()),
            customer_email: object.customer_details.and_then(|details| details.email),
            metadata: object.metadata,
        },
        "payment_intent.succeeded" => PaymentNotification {
            checkout_session_id: None,
            payment_intent_id: Some(object.id),
            amount_cents: object.amount.unwrap_or(0),
            currency: object.currency.unwrap_or_else(|| "usd".to_owned()),
            customer_email: None,
            metadata: object.metadata,
        },
        _ => return Ok(None),
    };

    Ok(Some(notification))
}

/// What the metadata bag says this payment was for. The shapes are mutually
/// exclusive on the session-creation side; a bag carrying both is reported
/// as `Ambiguous` and never acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutEvent {
    ImeiPurchase {
        imei: Imei,
        service_id: i64,
        actor: OrderParty,
    },
    TopUp {
        user_id: i64,
        credit_cents: i64,
    },
    Ambiguous,
    Unrecognized,
}

pub fn classify(notification: &PaymentNotification) -> CheckoutEvent {
    let meta = &notification.metadata;
    let has_purchase = meta.contains_key("imei") && meta.contains_key("service_id");
    let has_topup = meta.contains_key("user_id");

    match (has_purchase, has_topup) {
        (true, true) => CheckoutEvent::Ambiguous,
        (true, false) => classify_purchase(notification),
        (false, true) => classify_topup(notification),
        (false, false) => CheckoutEvent::Unrecognized,
    }
}

fn classify_purchase(notification: &PaymentNotification) -> CheckoutEvent {
    let meta = &notification.metadata;

    let Ok(imei) = Imei::parse(&meta["imei"]) else {
        return CheckoutEvent::Unrecognized;
    };
    let Ok(service_id) = meta["service_id"].parse::<i64>() else {
        return CheckoutEvent::Unrecognized;
    };

    let actor = if let Some(user_id) = meta.get("order_user_id").and_then(|v| v.parse().ok()) {
        OrderParty::User(user_id)
    } else if let Some(email) = meta
        .get("guest_email")
        .or(notification.customer_email.as_ref())
    {
        OrderParty::Guest {
            email: email.clone(),
        }
    } else {
        return CheckoutEvent::Unrecognized;
    };

    CheckoutEvent::ImeiPurchase {
        imei,
        service_id,
        actor,
    }
}

fn classify_topup(notification: &PaymentNotification) -> CheckoutEvent {
    let meta = &notification.metadata;

    let Some(user_id) = meta.get("user_id").and_then(|v| v.parse::<i64>().ok()) else {
        return CheckoutEvent::Unrecognized;
    };

    // `original_amount` overrides the credit (promotional top-ups credit
    // more than was charged); `recharge_amount` mirrors the charge.
    let credit_cents = meta
        .get("original_amount")
        .or(meta.get("recharge_amount"))
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(notification.amount_cents);

    CheckoutEvent::TopUp {
        user_id,
        credit_cents,
    }
}
