pub mod dashboard;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod services;
pub mod users;
pub mod webhook;

pub use metrics::metrics_handler;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use imeicheck_domain::model::OrderValidationError;
use imeicheck_domain::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidOrder(#[from] OrderValidationError),
    #[error("authentication required")]
    Unauthorized,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("admin privileges required")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("invalid webhook signature")]
    BadSignature,
    #[error("payment provider error: {0}")]
    Gateway(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidOrder(_) | ApiError::BadSignature => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
