use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};

use imeicheck_domain::model::{NewOrder, NewPayment, OrderRecord, PaymentRecord, PaymentStatus};
use imeicheck_domain::storage::{PaymentStore, StorageResult};

use crate::entity::{payments, PaymentStatusDb};
use crate::errors::map_db_err;
use crate::order_store::{insert_order_on, SumRow};
use crate::SeaOrmStorage;

fn to_record(model: payments::Model) -> PaymentRecord {
    PaymentRecord {
        payment_id: model.payment_id,
        order_id: model.order_id,
        user_id: model.user_id,
        amount: model.amount,
        credited_amount: model.credited_amount,
        currency: model.currency,
        status: model.status.into(),
        method: model.method,
        reference: model.reference,
        checkout_session_id: model.checkout_session_id,
        payment_intent_id: model.payment_intent_id,
        balance_before: model.balance_before,
        balance_after: model.balance_after,
        error_message: model.error_message,
        created_at: model.created_at,
    }
}

async fn insert_payment_on<C: ConnectionTrait>(
    conn: &C,
    payment: NewPayment,
) -> StorageResult<PaymentRecord> {
    let model = payments::ActiveModel {
        order_id: Set(payment.order_id),
        user_id: Set(payment.user_id),
        amount: Set(payment.amount),
        credited_amount: Set(payment.credited_amount),
        currency: Set(payment.currency),
        status: Set(payment.status.into()),
        method: Set(payment.method),
        reference: Set(payment.reference),
        checkout_session_id: Set(payment.checkout_session_id),
        payment_intent_id: Set(payment.payment_intent_id),
        balance_before: Set(payment.balance_before),
        balance_after: Set(payment.balance_after),
        error_message: Set(payment.error_message),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(map_db_err)?;

    Ok(to_record(model))
}

#[async_trait]
impl PaymentStore for SeaOrmStorage {
    async fn insert_payment(&self, payment: NewPayment) -> StorageResult<PaymentRecord> {
        insert_payment_on(self.connection(), payment).await
    }

    async fn insert_order_with_payment(
        &self,
        order: NewOrder,
        payment: NewPayment,
    ) -> StorageResult<(OrderRecord, PaymentRecord)> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;

        let order_record = insert_order_on(&txn, order).await?;
        let payment_record = insert_payment_on(
            &txn,
            NewPayment {
                order_id: Some(order_record.order_id),
                ..payment
            },
        )
        .await?;

        txn.commit().await.map_err(map_db_err)?;
        Ok((order_record, payment_record))
    }

    async fn find_payment(&self, payment_id: i64) -> StorageResult<Option<PaymentRecord>> {
        let model = payments::Entity::find_by_id(payment_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(model.map(to_record))
    }

    async fn find_payment_by_session(
        &self,
        session_id: &str,
    ) -> StorageResult<Option<PaymentRecord>> {
        let model = payments::Entity::find()
            .filter(payments::Column::CheckoutSessionId.eq(session_id))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(model.map(to_record))
    }

    async fn find_payment_by_intent(
        &self,
        intent_id: &str,
    ) -> StorageResult<Option<PaymentRecord>> {
        let model = payments::Entity::find()
            .filter(payments::Column::PaymentIntentId.eq(intent_id))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(model.map(to_record))
    }

    async fn list_payments_for_user(&self, user_id: i64) -> StorageResult<Vec<PaymentRecord>> {
        let models = payments::Entity::find()
            .filter(payments::Column::UserId.eq(user_id))
            .order_by_desc(payments::Column::PaymentId)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(to_record).collect())
    }

    async fn list_payments(&self) -> StorageResult<Vec<PaymentRecord>> {
        let models = payments::Entity::find()
            .order_by_desc(payments::Column::PaymentId)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(to_record).collect())
    }

    async fn count_payments(&self) -> StorageResult<u64> {
        payments::Entity::find()
            .count(self.connection())
            .await
            .map_err(map_db_err)
    }

    async fn set_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> StorageResult<Option<PaymentRecord>> {
        let Some(model) = payments::Entity::find_by_id(payment_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let mut active: payments::ActiveModel = model.into();
        active.status = Set(PaymentStatusDb::from(status));
        let updated = active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(Some(to_record(updated)))
    }

    async fn delete_payment(&self, payment_id: i64) -> StorageResult<bool> {
        let outcome = payments::Entity::delete_by_id(payment_id)
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(outcome.rows_affected > 0)
    }

    async fn sum_approved_credits(&self, user_id: i64) -> StorageResult<i64> {
        let row = payments::Entity::find()
            .select_only()
            .column_as(payments::Column::CreditedAmount.sum(), "total")
            .filter(payments::Column::UserId.eq(user_id))
            .filter(payments::Column::Status.eq(PaymentStatusDb::Approved))
            .into_model::<SumRow>()
            .one(self.connection())
            .await
            .map_err(map_db_err)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    async fn total_approved_amount(&self) -> StorageResult<i64> {
        let row = payments::Entity::find()
            .select_only()
            .column_as(payments::Column::Amount.sum(), "total")
            .filter(payments::Column::Status.eq(PaymentStatusDb::Approved))
            .into_model::<SumRow>()
            .one(self.connection())
            .await
            .map_err(map_db_err)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }
}
