//! The fulfillment loop shared by the synchronous order path and the
//! webhook reconciler: one verification call per IMEI, aggregate the batch
//! into a terminal status, persist, and notify.

use metrics::counter;
use serde_json::json;
use tracing::warn;

use imeicheck_domain::model::{aggregate_order_status, Imei, OrderRecord, OrderStatus};
use imeicheck_domain::storage::{OrderStore, StorageResult};

use crate::mailer::{Mail, Notifier};
use crate::verifier::VerificationClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentOutcome {
    pub status: OrderStatus,
    pub result_json: String,
}

/// Runs every IMEI on the order through the verifier and writes the terminal
/// outcome. Verification failures land in the order's result, never in the
/// returned error; only storage failures propagate.
pub async fn fulfill_order<S, V, N>(
    store: &S,
    verifier: &V,
    notifier: &N,
    order: &OrderRecord,
    recipient: Option<&str>,
) -> StorageResult<FulfillmentOutcome>
where
    S: OrderStore + ?Sized,
    V: VerificationClient + ?Sized,
    N: Notifier + ?Sized,
{
    let mut entries = Vec::with_capacity(order.imeis.len());
    let mut succeeded = 0usize;

    for raw in &order.imeis {
        let entry = match Imei::parse(raw) {
            Ok(imei) => match verifier.verify(&imei, order.service_id).await {
                Ok(outcome) => {
                    if outcome.success {
                        succeeded += 1;
                    }
                    counter!("imei_checks_total", "outcome" => if outcome.success { "success" } else { "failed" })
                        .increment(1);
                    json!({
                        "imei": raw,
                        "success": outcome.success,
                        "result": outcome.result,
                    })
                }
                Err(err) => {
                    warn!(order_id = order.order_id, imei = %raw, error = %err, "verification call failed");
                    counter!("imei_checks_total", "outcome" => "error").increment(1);
                    json!({
                        "imei": raw,
                        "success": false,
                        "error": err.to_string(),
                    })
                }
            },
            // Stored orders only ever carry validated IMEIs; a corrupt row
            // is reported instead of crashing the batch.
            Err(err) => json!({
                "imei": raw,
                "success": false,
                "error": err.to_string(),
            }),
        };
        entries.push(entry);
    }

    let status = aggregate_order_status(succeeded, order.imeis.len());
    let result_json = json!(entries).to_string();

    store
        .set_order_outcome(order.order_id, status, &result_json)
        .await?;
    counter!("orders_fulfilled_total", "status" => status.as_ref().to_owned()).increment(1);

    if status != OrderStatus::Failed {
        if let Some(to) = recipient {
            let mail = Mail::order_result(to, &order.service_name_at_order, status, &result_json);
            if let Err(err) = notifier.send(mail).await {
                warn!(order_id = order.order_id, error = %err, "result email failed");
            }
        }
    }

    Ok(FulfillmentOutcome {
        status,
        result_json,
    })
}
