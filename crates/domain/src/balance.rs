//! Read-time balance derivation. Balance is never persisted as truth; it is
//! recomputed from the ledger and order history on every read.

use crate::storage::{OrderStore, PaymentStore, StorageResult};

/// Authoritative available balance for one user, in cents:
/// Σ approved credited amounts − Σ completed order charges.
/// Zero rows on either side count as zero; the result may be negative when
/// the permissive balance policy is active.
pub async fn balance_for<S>(storage: &S, user_id: i64) -> StorageResult<i64>
where
    S: PaymentStore + OrderStore + ?Sized,
{
    let credits = storage.sum_approved_credits(user_id).await?;
    let charges = storage.sum_completed_charges(user_id).await?;
    Ok(credits - charges)
}
