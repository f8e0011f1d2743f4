use sea_orm::sea_query::{
    ColumnDef, Expr, Index, IndexCreateStatement, Table, TableCreateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{imei_orders, payments, services, users};
use crate::errors::map_db_err;
use imeicheck_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let users_table = Table::create()
        .if_not_exists()
        .table(users::Entity)
        .col(
            ColumnDef::new(users::Column::UserId)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(users::Column::Username)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(users::Column::Email)
                .string_len(255)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(users::Column::PasswordHash)
                .string()
                .not_null(),
        )
        .col(ColumnDef::new(users::Column::Tier).string_len(16).not_null())
        .col(ColumnDef::new(users::Column::FullName).string().null())
        .col(ColumnDef::new(users::Column::Country).string_len(64).null())
        .col(ColumnDef::new(users::Column::Phone).string_len(32).null())
        .col(
            ColumnDef::new(users::Column::EmailVerified)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(users::Column::EmailVerificationCode)
                .string_len(16)
                .null(),
        )
        .col(
            ColumnDef::new(users::Column::EmailVerificationExpires)
                .date_time()
                .null(),
        )
        .col(ColumnDef::new(users::Column::ResetCode).string_len(16).null())
        .col(
            ColumnDef::new(users::Column::ResetCodeExpires)
                .date_time()
                .null(),
        )
        .col(
            ColumnDef::new(users::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, users_table).await?;

    let services_table = Table::create()
        .if_not_exists()
        .table(services::Entity)
        .col(
            ColumnDef::new(services::Column::ServiceId)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(services::Column::ServiceName)
                .string_len(128)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(services::Column::PriceGuest)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(services::Column::PriceRegistered)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(services::Column::PricePremium)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(
            ColumnDef::new(services::Column::PricePro)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(services::Column::Description).string().null())
        .col(
            ColumnDef::new(services::Column::Active)
                .boolean()
                .not_null()
                .default(true),
        )
        .to_owned();
    create_table(db, backend, services_table).await?;

    let orders_table = Table::create()
        .if_not_exists()
        .table(imei_orders::Entity)
        .col(
            ColumnDef::new(imei_orders::Column::OrderId)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(imei_orders::Column::UserId).big_integer().null())
        .col(
            ColumnDef::new(imei_orders::Column::GuestEmail)
                .string_len(255)
                .null(),
        )
        .col(ColumnDef::new(imei_orders::Column::Imeis).text().not_null())
        .col(
            ColumnDef::new(imei_orders::Column::ServiceId)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(imei_orders::Column::Status)
                .string_len(16)
                .not_null(),
        )
        .col(ColumnDef::new(imei_orders::Column::Result).text().null())
        .col(
            ColumnDef::new(imei_orders::Column::PriceUsed)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(imei_orders::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(
            ColumnDef::new(imei_orders::Column::TierAtOrder)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(imei_orders::Column::ServiceNameAtOrder)
                .string_len(128)
                .not_null(),
        )
        .col(
            ColumnDef::new(imei_orders::Column::PaymentIntentId)
                .string_len(255)
                .null(),
        )
        .col(
            ColumnDef::new(imei_orders::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, orders_table).await?;

    let payments_table = Table::create()
        .if_not_exists()
        .table(payments::Entity)
        .col(
            ColumnDef::new(payments::Column::PaymentId)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(payments::Column::OrderId).big_integer().null())
        .col(ColumnDef::new(payments::Column::UserId).big_integer().null())
        .col(
            ColumnDef::new(payments::Column::Amount)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::CreditedAmount)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(payments::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Status)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Method)
                .string_len(32)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Reference)
                .string_len(128)
                .null(),
        )
        .col(
            ColumnDef::new(payments::Column::CheckoutSessionId)
                .string_len(255)
                .null(),
        )
        .col(
            ColumnDef::new(payments::Column::PaymentIntentId)
                .string_len(255)
                .null(),
        )
        .col(
            ColumnDef::new(payments::Column::BalanceBefore)
                .big_integer()
                .null(),
        )
        .col(
            ColumnDef::new(payments::Column::BalanceAfter)
                .big_integer()
                .null(),
        )
        .col(ColumnDef::new(payments::Column::ErrorMessage).text().null())
        .col(
            ColumnDef::new(payments::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned();
    create_table(db, backend, payments_table).await?;

    // Unique provider identifiers make duplicate webhook deliveries a
    // constraint violation instead of a lookup race. NULLs are exempt, so
    // manual/legacy rows without provider ids coexist freely.
    let session_index = Index::create()
        .if_not_exists()
        .name("idx_payments_checkout_session_id")
        .table(payments::Entity)
        .col(payments::Column::CheckoutSessionId)
        .unique()
        .to_owned();
    create_index(db, backend, session_index).await?;

    let intent_index = Index::create()
        .if_not_exists()
        .name("idx_payments_payment_intent_id")
        .table(payments::Entity)
        .col(payments::Column::PaymentIntentId)
        .unique()
        .to_owned();
    create_index(db, backend, intent_index).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(map_db_err)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    statement: IndexCreateStatement,
) -> StorageResult<()> {
    db.execute(backend.build(&statement))
        .await
        .map_err(map_db_err)?;
    Ok(())
}
