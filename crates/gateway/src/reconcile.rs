//! Webhook reconciliation: turns a verified payment notification into at
//! most one order/ledger mutation plus one outbound email. Duplicate
//! deliveries are absorbed by the unique indexes on the provider ids.

use metrics::counter;
use tracing::{info, warn};

use imeicheck_domain::balance::balance_for;
use imeicheck_domain::model::{
    Imei, NewOrder, NewPayment, OrderParty, PaymentStatus, UserTier,
};
use imeicheck_domain::services::ResultCache;
use imeicheck_domain::storage::{
    OrderStore, PaymentStore, ServiceStore, StorageError, StorageResult, UserStore,
};

use crate::event::{classify, CheckoutEvent, PaymentNotification};
use crate::fulfill::fulfill_order;
use crate::mailer::{Mail, Notifier};
use crate::verifier::VerificationClient;

const PAYMENT_METHOD: &str = "stripe";

/// Applies one notification. Everything classifiable-but-unactionable is
/// acknowledged without effect; only storage failures propagate, and the
/// webhook endpoint maps those to a retryable 500.
pub async fn process_notification<S, V, N>(
    store: &S,
    verifier: &V,
    notifier: &N,
    cache: &ResultCache,
    notification: PaymentNotification,
) -> StorageResult<()>
where
    S: UserStore + ServiceStore + OrderStore + PaymentStore + ?Sized,
    V: VerificationClient + ?Sized,
    N: Notifier + ?Sized,
{
    match classify(&notification) {
        CheckoutEvent::ImeiPurchase {
            imei,
            service_id,
            actor,
        } => {
            counter!("webhook_events_total", "kind" => "imei_purchase").increment(1);
            process_purchase(store, verifier, notifier, cache, &notification, imei, service_id, actor)
                .await
        }
        CheckoutEvent::TopUp {
            user_id,
            credit_cents,
        } => {
            counter!("webhook_events_total", "kind" => "topup").increment(1);
            process_topup(store, notifier, &notification, user_id, credit_cents).await
        }
        CheckoutEvent::Ambiguous => {
            counter!("webhook_events_total", "kind" => "ambiguous").increment(1);
            warn!(
                session = notification.checkout_session_id.as_deref().unwrap_or("-"),
                "metadata carries both purchase and top-up shapes, not acting"
            );
            Ok(())
        }
        CheckoutEvent::Unrecognized => {
            counter!("webhook_events_total", "kind" => "unrecognized").increment(1);
            process_unattributed(store, &notification).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_purchase<S, V, N>(
    store: &S,
    verifier: &V,
    notifier: &N,
    cache: &ResultCache,
    notification: &PaymentNotification,
    imei: Imei,
    service_id: i64,
    actor: OrderParty,
) -> StorageResult<()>
where
    S: UserStore + ServiceStore + OrderStore + PaymentStore + ?Sized,
    V: VerificationClient + ?Sized,
    N: Notifier + ?Sized,
{
    let Some(service) = store.find_service(service_id).await? else {
        warn!(service_id, "paid order references a missing service");
        return Ok(());
    };
    if !service.active {
        warn!(service_id, "paid order references an inactive service");
        return Ok(());
    }

    let (tier, recipient) = match &actor {
        OrderParty::User(user_id) => {
            let Some(user) = store.find_user(*user_id).await? else {
                warn!(user_id, "paid order references a missing user");
                return Ok(());
            };
            (user.tier, Some(user.email))
        }
        OrderParty::Guest { email } => (UserTier::Guest, Some(email.clone())),
    };

    let price = service.price_for(tier);
    let order = NewOrder {
        placed_by: actor,
        imeis: vec![imei],
        service_id: service.service_id,
        price_used: price,
        currency: notification.currency.clone(),
        tier_at_order: tier,
        service_name_at_order: service.service_name.clone(),
        payment_intent_id: notification.payment_intent_id.clone(),
    };
    let payment = NewPayment {
        order_id: None,
        user_id: order.placed_by.user_id(),
        amount: notification.amount_cents,
        // The payment funds exactly this order, so the credit mirrors the
        // snapshotted price and the derived balance nets to zero.
        credited_amount: Some(price),
        currency: notification.currency.clone(),
        status: PaymentStatus::Approved,
        method: PAYMENT_METHOD.to_owned(),
        reference: None,
        checkout_session_id: notification.checkout_session_id.clone(),
        payment_intent_id: notification.payment_intent_id.clone(),
        balance_before: None,
        balance_after: None,
        error_message: None,
    };

    let (order, _payment) = match store.insert_order_with_payment(order, payment).await {
        Ok(pair) => pair,
        Err(StorageError::Duplicate) => {
            info!(
                session = notification.checkout_session_id.as_deref().unwrap_or("-"),
                "duplicate delivery, already reconciled"
            );
            counter!("webhook_duplicates_total").increment(1);
            return Ok(());
        }
        Err(err) => return Err(err),
    };

    let outcome = fulfill_order(store, verifier, notifier, &order, recipient.as_deref()).await?;

    if let Some(session_id) = &notification.checkout_session_id {
        cache.insert(session_id, outcome.result_json);
    }

    Ok(())
}

async fn process_topup<S, N>(
    store: &S,
    notifier: &N,
    notification: &PaymentNotification,
    user_id: i64,
    credit_cents: i64,
) -> StorageResult<()>
where
    S: UserStore + OrderStore + PaymentStore + ?Sized,
    N: Notifier + ?Sized,
{
    let Some(user) = store.find_user(user_id).await? else {
        warn!(user_id, "top-up references a missing user");
        return Ok(());
    };

    // Audit snapshots only; the authoritative balance stays derived.
    let balance_before = balance_for(store, user_id).await?;
    let payment = NewPayment {
        order_id: None,
        user_id: Some(user_id),
        amount: notification.amount_cents,
        credited_amount: Some(credit_cents),
        currency: notification.currency.clone(),
        status: PaymentStatus::Approved,
        method: PAYMENT_METHOD.to_owned(),
        reference: None,
        checkout_session_id: notification.checkout_session_id.clone(),
        payment_intent_id: notification.payment_intent_id.clone(),
        balance_before: Some(balance_before),
        balance_after: Some(balance_before + credit_cents),
        error_message: None,
    };

    match store.insert_payment(payment).await {
        Ok(_) => {}
        Err(StorageError::Duplicate) => {
            info!(
                session = notification.checkout_session_id.as_deref().unwrap_or("-"),
                "duplicate top-up delivery, already credited"
            );
            counter!("webhook_duplicates_total").increment(1);
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    let mail = Mail::topup_confirmation(&user.email, credit_cents, &notification.currency);
    if let Err(err) = notifier.send(mail).await {
        warn!(user_id, error = %err, "top-up confirmation email failed");
    }

    Ok(())
}

/// A succeeded intent that no session-level metadata claims. The charge is
/// still recorded so the ledger matches the provider, unattributed.
async fn process_unattributed<S>(
    store: &S,
    notification: &PaymentNotification,
) -> StorageResult<()>
where
    S: PaymentStore + ?Sized,
{
    let Some(intent_id) = &notification.payment_intent_id else {
        return Ok(());
    };
    if notification.checkout_session_id.is_some() {
        // Session events without a recognizable shape were never created by
        // this backend; leave them alone.
        return Ok(());
    }

    let payment = NewPayment {
        order_id: None,
        user_id: None,
        amount: notification.amount_cents,
        credited_amount: None,
        currency: notification.currency.clone(),
        status: PaymentStatus::Approved,
        method: PAYMENT_METHOD.to_owned(),
        reference: None,
        checkout_session_id: None,
        payment_intent_id: Some(intent_id.clone()),
        balance_before: None,
        balance_after: None,
        error_message: None,
    };

    match store.insert_payment(payment).await {
        Ok(_) => Ok(()),
        Err(StorageError::Duplicate) => {
            counter!("webhook_duplicates_total").increment(1);
            Ok(())
        }
        Err(err) => Err(err),
    }
}
