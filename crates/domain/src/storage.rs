//! Storage trait contracts implemented by the SeaORM adapters and by test
//! doubles. All money values are i64 cents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    NewOrder, NewPayment, NewService, NewUser, OrderRecord, OrderStatus, PaymentRecord,
    PaymentStatus, ProfileChanges, ServiceChanges, ServiceRecord, UserRecord, UserTier,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    /// A unique-key collision. Surfaced by the payment stores so duplicate
    /// webhook deliveries can be acknowledged without side effects.
    #[error("duplicate row for unique key")]
    Duplicate,
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Per-service order counts for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceUsage {
    pub service_name: String,
    pub orders: u64,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StorageResult<UserRecord>;
    async fn find_user(&self, user_id: i64) -> StorageResult<Option<UserRecord>>;
    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>>;
    async fn list_users(&self) -> StorageResult<Vec<UserRecord>>;
    async fn count_users(&self) -> StorageResult<u64>;
    async fn set_tier(&self, user_id: i64, tier: UserTier) -> StorageResult<Option<UserRecord>>;
    async fn set_password_hash(&self, user_id: i64, hash: &str) -> StorageResult<()>;
    /// Marks the address verified and clears any outstanding code.
    async fn mark_email_verified(&self, user_id: i64, tier: UserTier) -> StorageResult<()>;
    async fn set_verification_code(
        &self,
        user_id: i64,
        code: &str,
        expires: DateTime<Utc>,
    ) -> StorageResult<()>;
    async fn set_reset_code(
        &self,
        user_id: i64,
        code: &str,
        expires: DateTime<Utc>,
    ) -> StorageResult<()>;
    async fn clear_reset_code(&self, user_id: i64) -> StorageResult<()>;
    async fn update_profile(
        &self,
        user_id: i64,
        changes: ProfileChanges,
    ) -> StorageResult<Option<UserRecord>>;
    async fn delete_user(&self, user_id: i64) -> StorageResult<bool>;
}

#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceRecord>;
    async fn find_service(&self, service_id: i64) -> StorageResult<Option<ServiceRecord>>;
    async fn list_services(&self, active_only: bool) -> StorageResult<Vec<ServiceRecord>>;
    async fn update_service(
        &self,
        service_id: i64,
        changes: ServiceChanges,
    ) -> StorageResult<Option<ServiceRecord>>;
    async fn delete_service(&self, service_id: i64) -> StorageResult<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: NewOrder) -> StorageResult<OrderRecord>;
    async fn find_order(&self, order_id: i64) -> StorageResult<Option<OrderRecord>>;
    async fn list_orders_for_user(&self, user_id: i64) -> StorageResult<Vec<OrderRecord>>;
    async fn list_orders(&self) -> StorageResult<Vec<OrderRecord>>;
    async fn count_orders(&self) -> StorageResult<u64>;
    /// Writes the terminal outcome of the verification loop.
    async fn set_order_outcome(
        &self,
        order_id: i64,
        status: OrderStatus,
        result: &str,
    ) -> StorageResult<()>;
    /// Σ price_used over completed orders for one user.
    async fn sum_completed_charges(&self, user_id: i64) -> StorageResult<i64>;
    async fn count_orders_by_status(&self) -> StorageResult<Vec<(OrderStatus, u64)>>;
    async fn service_usage(&self) -> StorageResult<Vec<ServiceUsage>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts one ledger entry. A unique collision on the provider's
    /// session/intent identifier surfaces as `StorageError::Duplicate`.
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<PaymentRecord>;
    /// Inserts the order and its funding ledger entry atomically: either
    /// both rows persist or neither does. Duplicate provider identifiers
    /// roll the pair back and surface as `StorageError::Duplicate`.
    async fn insert_order_with_payment(
        &self,
        order: NewOrder,
        payment: NewPayment,
    ) -> StorageResult<(OrderRecord, PaymentRecord)>;
    async fn find_payment(&self, payment_id: i64) -> StorageResult<Option<PaymentRecord>>;
    async fn find_payment_by_session(
        &self,
        session_id: &str,
    ) -> StorageResult<Option<PaymentRecord>>;
    async fn find_payment_by_intent(
        &self,
        intent_id: &str,
    ) -> StorageResult<Option<PaymentRecord>>;
    async fn list_payments_for_user(&self, user_id: i64) -> StorageResult<Vec<PaymentRecord>>;
    async fn list_payments(&self) -> StorageResult<Vec<PaymentRecord>>;
    async fn count_payments(&self) -> StorageResult<u64>;
    async fn set_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> StorageResult<Option<PaymentRecord>>;
    async fn delete_payment(&self, payment_id: i64) -> StorageResult<bool>;
    /// Σ credited_amount over approved payments for one user.
    async fn sum_approved_credits(&self, user_id: i64) -> StorageResult<i64>;
    /// Σ amount over all approved payments (dashboard revenue figure).
    async fn total_approved_amount(&self) -> StorageResult<i64>;
}
