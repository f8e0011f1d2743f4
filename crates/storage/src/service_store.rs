use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use imeicheck_domain::model::{NewService, ServiceChanges, ServiceRecord};
use imeicheck_domain::storage::{ServiceStore, StorageResult};

use crate::entity::services;
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

fn to_record(model: services::Model) -> ServiceRecord {
    ServiceRecord {
        service_id: model.service_id,
        service_name: model.service_name,
        price_guest: model.price_guest,
        price_registered: model.price_registered,
        price_premium: model.price_premium,
        price_pro: model.price_pro,
        description: model.description,
        active: model.active,
    }
}

#[async_trait]
impl ServiceStore for SeaOrmStorage {
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceRecord> {
        let model = services::ActiveModel {
            service_name: Set(service.service_name),
            price_guest: Set(service.price_guest),
            price_registered: Set(service.price_registered),
            price_premium: Set(service.price_premium),
            price_pro: Set(service.price_pro),
            description: Set(service.description),
            active: Set(service.active),
            ..Default::default()
        }
        .insert(self.connection())
        .await
        .map_err(map_db_err)?;

        Ok(to_record(model))
    }

    async fn find_service(&self, service_id: i64) -> StorageResult<Option<ServiceRecord>> {
        let model = services::Entity::find_by_id(service_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(model.map(to_record))
    }

    async fn list_services(&self, active_only: bool) -> StorageResult<Vec<ServiceRecord>> {
        let mut query = services::Entity::find().order_by_asc(services::Column::ServiceId);
        if active_only {
            query = query.filter(services::Column::Active.eq(true));
        }
        let models = query.all(self.connection()).await.map_err(map_db_err)?;
        Ok(models.into_iter().map(to_record).collect())
    }

    async fn update_service(
        &self,
        service_id: i64,
        changes: ServiceChanges,
    ) -> StorageResult<Option<ServiceRecord>> {
        let Some(model) = services::Entity::find_by_id(service_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let mut active: services::ActiveModel = model.into();
        if let Some(service_name) = changes.service_name {
            active.service_name = Set(service_name);
        }
        if let Some(price) = changes.price_guest {
            active.price_guest = Set(price);
        }
        if let Some(price) = changes.price_registered {
            active.price_registered = Set(price);
        }
        if let Some(price) = changes.price_premium {
            active.price_premium = Set(price);
        }
        if let Some(price) = changes.price_pro {
            active.price_pro = Set(price);
        }
        if let Some(description) = changes.description {
            active.description = Set(Some(description));
        }
        if let Some(flag) = changes.active {
            active.active = Set(flag);
        }
        let updated = active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(Some(to_record(updated)))
    }

    async fn delete_service(&self, service_id: i64) -> StorageResult<bool> {
        let outcome = services::Entity::delete_by_id(service_id)
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(outcome.rows_affected > 0)
    }
}
