use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use imeicheck_domain::model::{Imei, NewOrder, OrderRecord, OrderStatus};
use imeicheck_domain::storage::{OrderStore, ServiceUsage, StorageError, StorageResult};

use crate::entity::{imei_orders, OrderStatusDb};
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

/// Aggregate row shape for SUM queries. `None` means the filter matched no
/// rows, which callers fold to zero.
#[derive(FromQueryResult)]
pub(crate) struct SumRow {
    pub(crate) total: Option<i64>,
}

#[derive(FromQueryResult)]
struct StatusCountRow {
    status: OrderStatusDb,
    orders: i64,
}

#[derive(FromQueryResult)]
struct UsageRow {
    service_name_at_order: String,
    orders: i64,
}

fn encode_imeis(imeis: &[Imei]) -> StorageResult<String> {
    serde_json::to_string(imeis).map_err(StorageError::from_source)
}

fn decode_imeis(raw: &str) -> StorageResult<Vec<String>> {
    serde_json::from_str(raw).map_err(StorageError::from_source)
}

pub(crate) fn to_record(model: imei_orders::Model) -> StorageResult<OrderRecord> {
    Ok(OrderRecord {
        order_id: model.order_id,
        user_id: model.user_id,
        guest_email: model.guest_email,
        imeis: decode_imeis(&model.imeis)?,
        service_id: model.service_id,
        status: model.status.into(),
        result: model.result,
        price_used: model.price_used,
        currency: model.currency,
        tier_at_order: model.tier_at_order.into(),
        service_name_at_order: model.service_name_at_order,
        payment_intent_id: model.payment_intent_id,
        created_at: model.created_at,
    })
}

/// Inserts one order row on any connection, so the webhook reconciler can
/// run it inside the order+payment transaction.
pub(crate) async fn insert_order_on<C: ConnectionTrait>(
    conn: &C,
    order: NewOrder,
) -> StorageResult<OrderRecord> {
    let model = imei_orders::ActiveModel {
        user_id: Set(order.placed_by.user_id()),
        guest_email: Set(order.placed_by.guest_email().map(str::to_owned)),
        imeis: Set(encode_imeis(&order.imeis)?),
        service_id: Set(order.service_id),
        status: Set(OrderStatusDb::Pending),
        result: Set(None),
        price_used: Set(order.price_used),
        currency: Set(order.currency),
        tier_at_order: Set(order.tier_at_order.into()),
        service_name_at_order: Set(order.service_name_at_order),
        payment_intent_id: Set(order.payment_intent_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(map_db_err)?;

    to_record(model)
}

#[async_trait]
impl OrderStore for SeaOrmStorage {
    async fn insert_order(&self, order: NewOrder) -> StorageResult<OrderRecord> {
        insert_order_on(self.connection(), order).await
    }

    async fn find_order(&self, order_id: i64) -> StorageResult<Option<OrderRecord>> {
        let model = imei_orders::Entity::find_by_id(order_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        model.map(to_record).transpose()
    }

    async fn list_orders_for_user(&self, user_id: i64) -> StorageResult<Vec<OrderRecord>> {
        let models = imei_orders::Entity::find()
            .filter(imei_orders::Column::UserId.eq(user_id))
            .order_by_desc(imei_orders::Column::OrderId)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        models.into_iter().map(to_record).collect()
    }

    async fn list_orders(&self) -> StorageResult<Vec<OrderRecord>> {
        let models = imei_orders::Entity::find()
            .order_by_desc(imei_orders::Column::OrderId)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        models.into_iter().map(to_record).collect()
    }

    async fn count_orders(&self) -> StorageResult<u64> {
        imei_orders::Entity::find()
            .count(self.connection())
            .await
            .map_err(map_db_err)
    }

    async fn set_order_outcome(
        &self,
        order_id: i64,
        status: OrderStatus,
        result: &str,
    ) -> StorageResult<()> {
        let Some(model) = imei_orders::Entity::find_by_id(order_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(());
        };

        let mut active: imei_orders::ActiveModel = model.into();
        active.status = Set(OrderStatusDb::from(status));
        active.result = Set(Some(result.to_owned()));
        active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn sum_completed_charges(&self, user_id: i64) -> StorageResult<i64> {
        let row = imei_orders::Entity::find()
            .select_only()
            .column_as(imei_orders::Column::PriceUsed.sum(), "total")
            .filter(imei_orders::Column::UserId.eq(user_id))
            .filter(imei_orders::Column::Status.eq(OrderStatusDb::Completed))
            .into_model::<SumRow>()
            .one(self.connection())
            .await
            .map_err(map_db_err)?;

        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    async fn count_orders_by_status(&self) -> StorageResult<Vec<(OrderStatus, u64)>> {
        let rows = imei_orders::Entity::find()
            .select_only()
            .column(imei_orders::Column::Status)
            .column_as(imei_orders::Column::OrderId.count(), "orders")
            .group_by(imei_orders::Column::Status)
            .into_model::<StatusCountRow>()
            .all(self.connection())
            .await
            .map_err(map_db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.status.into(), row.orders as u64))
            .collect())
    }

    async fn service_usage(&self) -> StorageResult<Vec<ServiceUsage>> {
        let rows = imei_orders::Entity::find()
            .select_only()
            .column(imei_orders::Column::ServiceNameAtOrder)
            .column_as(imei_orders::Column::OrderId.count(), "orders")
            .group_by(imei_orders::Column::ServiceNameAtOrder)
            .into_model::<UsageRow>()
            .all(self.connection())
            .await
            .map_err(map_db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceUsage {
                service_name: row.service_name_at_order,
                orders: row.orders as u64,
            })
            .collect())
    }
}
