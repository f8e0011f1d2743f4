use imeicheck_domain::model::{OrderStatus, PaymentStatus, UserTier};

pub mod users {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    use super::TierDb;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub user_id: i64,
        #[sea_orm(unique)]
        pub username: String,
        #[sea_orm(unique)]
        pub email: String,
        pub password_hash: String,
        pub tier: TierDb,
        pub full_name: Option<String>,
        pub country: Option<String>,
        pub phone: Option<String>,
        #[sea_orm(default_value = false)]
        pub email_verified: bool,
        pub email_verification_code: Option<String>,
        pub email_verification_expires: Option<DateTimeUtc>,
        pub reset_code: Option<String>,
        pub reset_code_expires: Option<DateTimeUtc>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod services {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "services")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub service_id: i64,
        #[sea_orm(unique)]
        pub service_name: String,
        pub price_guest: i64,
        pub price_registered: i64,
        pub price_premium: i64,
        pub price_pro: i64,
        pub description: Option<String>,
        #[sea_orm(default_value = true)]
        pub active: bool,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod imei_orders {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    use super::{OrderStatusDb, TierDb};

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "imei_orders")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub order_id: i64,
        pub user_id: Option<i64>,
        pub guest_email: Option<String>,
        /// JSON array of 15-digit strings.
        #[sea_orm(column_type = "Text")]
        pub imeis: String,
        pub service_id: i64,
        pub status: OrderStatusDb,
        #[sea_orm(column_type = "Text", nullable)]
        pub result: Option<String>,
        pub price_used: i64,
        pub currency: String,
        pub tier_at_order: TierDb,
        pub service_name_at_order: String,
        pub payment_intent_id: Option<String>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod payments {
    use sea_orm::entity::prelude::*;
    use sea_orm::sea_query::Expr;

    use super::PaymentStatusDb;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "payments")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub payment_id: i64,
        pub order_id: Option<i64>,
        pub user_id: Option<i64>,
        pub amount: i64,
        pub credited_amount: Option<i64>,
        pub currency: String,
        pub status: PaymentStatusDb,
        pub method: String,
        pub reference: Option<String>,
        /// Provider identifiers carry unique indexes; they are the
        /// idempotency keys for webhook deliveries.
        pub checkout_session_id: Option<String>,
        pub payment_intent_id: Option<String>,
        pub balance_before: Option<i64>,
        pub balance_after: Option<i64>,
        #[sea_orm(column_type = "Text", nullable)]
        pub error_message: Option<String>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

use sea_orm::{DeriveActiveEnum, EnumIter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum TierDb {
    #[sea_orm(string_value = "guest")]
    Guest,
    #[sea_orm(string_value = "registered")]
    Registered,
    #[sea_orm(string_value = "pro")]
    Pro,
    #[sea_orm(string_value = "premium")]
    Premium,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "superadmin")]
    Superadmin,
    #[sea_orm(string_value = "pending")]
    Pending,
}

impl From<UserTier> for TierDb {
    fn from(tier: UserTier) -> Self {
        match tier {
            UserTier::Guest => Self::Guest,
            UserTier::Registered => Self::Registered,
            UserTier::Pro => Self::Pro,
            UserTier::Premium => Self::Premium,
            UserTier::Admin => Self::Admin,
            UserTier::Superadmin => Self::Superadmin,
            UserTier::Pending => Self::Pending,
        }
    }
}

impl From<TierDb> for UserTier {
    fn from(tier: TierDb) -> Self {
        match tier {
            TierDb::Guest => Self::Guest,
            TierDb::Registered => Self::Registered,
            TierDb::Pro => Self::Pro,
            TierDb::Premium => Self::Premium,
            TierDb::Admin => Self::Admin,
            TierDb::Superadmin => Self::Superadmin,
            TierDb::Pending => Self::Pending,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum OrderStatusDb {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl From<OrderStatus> for OrderStatusDb {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => Self::Pending,
            OrderStatus::Completed => Self::Completed,
            OrderStatus::Partial => Self::Partial,
            OrderStatus::Failed => Self::Failed,
        }
    }
}

impl From<OrderStatusDb> for OrderStatus {
    fn from(status: OrderStatusDb) -> Self {
        match status {
            OrderStatusDb::Pending => Self::Pending,
            OrderStatusDb::Completed => Self::Completed,
            OrderStatusDb::Partial => Self::Partial,
            OrderStatusDb::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum PaymentStatusDb {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl From<PaymentStatus> for PaymentStatusDb {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => Self::Pending,
            PaymentStatus::Approved => Self::Approved,
            PaymentStatus::Rejected => Self::Rejected,
        }
    }
}

impl From<PaymentStatusDb> for PaymentStatus {
    fn from(status: PaymentStatusDb) -> Self {
        match status {
            PaymentStatusDb::Pending => Self::Pending,
            PaymentStatusDb::Approved => Self::Approved,
            PaymentStatusDb::Rejected => Self::Rejected,
        }
    }
}
