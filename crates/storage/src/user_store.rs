use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use imeicheck_domain::model::{NewUser, ProfileChanges, UserRecord, UserTier};
use imeicheck_domain::storage::{StorageResult, UserStore};

use crate::entity::{users, TierDb};
use crate::errors::map_db_err;
use crate::SeaOrmStorage;

fn to_record(model: users::Model) -> UserRecord {
    UserRecord {
        user_id: model.user_id,
        username: model.username,
        email: model.email,
        password_hash: model.password_hash,
        tier: model.tier.into(),
        full_name: model.full_name,
        country: model.country,
        phone: model.phone,
        email_verified: model.email_verified,
        email_verification_code: model.email_verification_code,
        email_verification_expires: model.email_verification_expires,
        reset_code: model.reset_code,
        reset_code_expires: model.reset_code_expires,
        created_at: model.created_at,
    }
}

#[async_trait]
impl UserStore for SeaOrmStorage {
    async fn insert_user(&self, user: NewUser) -> StorageResult<UserRecord> {
        let model = users::ActiveModel {
            username: Set(user.username),
            email: Set(user.email),
            password_hash: Set(user.password_hash),
            tier: Set(user.tier.into()),
            full_name: Set(user.full_name),
            country: Set(user.country),
            phone: Set(user.phone),
            email_verified: Set(false),
            email_verification_code: Set(user.email_verification_code),
            email_verification_expires: Set(user.email_verification_expires),
            reset_code: Set(None),
            reset_code_expires: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.connection())
        .await
        .map_err(map_db_err)?;

        Ok(to_record(model))
    }

    async fn find_user(&self, user_id: i64) -> StorageResult<Option<UserRecord>> {
        let model = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(model.map(to_record))
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<UserRecord>> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(model.map(to_record))
    }

    async fn list_users(&self) -> StorageResult<Vec<UserRecord>> {
        let models = users::Entity::find()
            .order_by_asc(users::Column::UserId)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(models.into_iter().map(to_record).collect())
    }

    async fn count_users(&self) -> StorageResult<u64> {
        users::Entity::find()
            .count(self.connection())
            .await
            .map_err(map_db_err)
    }

    async fn set_tier(&self, user_id: i64, tier: UserTier) -> StorageResult<Option<UserRecord>> {
        let Some(model) = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = model.into();
        active.tier = Set(TierDb::from(tier));
        let updated = active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(Some(to_record(updated)))
    }

    async fn set_password_hash(&self, user_id: i64, hash: &str) -> StorageResult<()> {
        users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(hash))
            .filter(users::Column::UserId.eq(user_id))
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: i64, tier: UserTier) -> StorageResult<()> {
        let Some(model) = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(());
        };

        let mut active: users::ActiveModel = model.into();
        active.email_verified = Set(true);
        active.email_verification_code = Set(None);
        active.email_verification_expires = Set(None);
        active.tier = Set(TierDb::from(tier));
        active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn set_verification_code(
        &self,
        user_id: i64,
        code: &str,
        expires: DateTime<Utc>,
    ) -> StorageResult<()> {
        let Some(model) = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(());
        };

        let mut active: users::ActiveModel = model.into();
        active.email_verification_code = Set(Some(code.to_owned()));
        active.email_verification_expires = Set(Some(expires));
        active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn set_reset_code(
        &self,
        user_id: i64,
        code: &str,
        expires: DateTime<Utc>,
    ) -> StorageResult<()> {
        let Some(model) = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(());
        };

        let mut active: users::ActiveModel = model.into();
        active.reset_code = Set(Some(code.to_owned()));
        active.reset_code_expires = Set(Some(expires));
        active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn clear_reset_code(&self, user_id: i64) -> StorageResult<()> {
        let Some(model) = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(());
        };

        let mut active: users::ActiveModel = model.into();
        active.reset_code = Set(None);
        active.reset_code_expires = Set(None);
        active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn update_profile(
        &self,
        user_id: i64,
        changes: ProfileChanges,
    ) -> StorageResult<Option<UserRecord>> {
        let Some(model) = users::Entity::find_by_id(user_id)
            .one(self.connection())
            .await
            .map_err(map_db_err)?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = model.into();
        if let Some(username) = changes.username {
            active.username = Set(username);
        }
        if let Some(full_name) = changes.full_name {
            active.full_name = Set(Some(full_name));
        }
        if let Some(country) = changes.country {
            active.country = Set(Some(country));
        }
        if let Some(phone) = changes.phone {
            active.phone = Set(Some(phone));
        }
        let updated = active.update(self.connection()).await.map_err(map_db_err)?;
        Ok(Some(to_record(updated)))
    }

    async fn delete_user(&self, user_id: i64) -> StorageResult<bool> {
        let outcome = users::Entity::delete_by_id(user_id)
            .exec(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(outcome.rows_affected > 0)
    }
}
