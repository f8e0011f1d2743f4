//! The service catalog: public read access, admin CRUD. Price edits only
//! affect future orders; past orders keep their snapshots.

use actix_web::{web, HttpResponse};

use imeicheck_domain::model::{NewService, ServiceChanges};
use imeicheck_domain::storage::ServiceStore;

use crate::auth::AuthedUser;
use crate::handlers::ApiError;
use crate::state::AppState;

pub async fn list_services_handler(
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let services = state.storage().list_services(true).await?;
    Ok(HttpResponse::Ok().json(services))
}

pub async fn get_service_handler(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let service = state
        .storage()
        .find_service(path.into_inner())
        .await?
        .filter(|service| service.active)
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(service))
}

fn validate_prices(prices: [i64; 4]) -> Result<(), ApiError> {
    if prices.iter().any(|price| *price < 0) {
        return Err(ApiError::Validation("prices must not be negative".to_owned()));
    }
    Ok(())
}

pub async fn admin_create_service_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    body: web::Json<NewService>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let service = body.into_inner();
    if service.service_name.trim().is_empty() {
        return Err(ApiError::Validation("service name must not be empty".to_owned()));
    }
    validate_prices([
        service.price_guest,
        service.price_registered,
        service.price_premium,
        service.price_pro,
    ])?;

    let created = state.storage().insert_service(service).await.map_err(|err| {
        match err {
            imeicheck_domain::storage::StorageError::Duplicate => {
                ApiError::Conflict("service name already exists".to_owned())
            }
            other => ApiError::Storage(other),
        }
    })?;
    Ok(HttpResponse::Created().json(created))
}

pub async fn admin_list_services_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let services = state.storage().list_services(false).await?;
    Ok(HttpResponse::Ok().json(services))
}

pub async fn admin_update_service_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
    body: web::Json<ServiceChanges>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    let changes = body.into_inner();
    validate_prices([
        changes.price_guest.unwrap_or(0),
        changes.price_registered.unwrap_or(0),
        changes.price_premium.unwrap_or(0),
        changes.price_pro.unwrap_or(0),
    ])?;

    let updated = state
        .storage()
        .update_service(path.into_inner(), changes)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn admin_delete_service_handler(
    state: web::Data<AppState>,
    caller: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    caller.require_admin()?;
    if !state.storage().delete_service(path.into_inner()).await? {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::NoContent().finish())
}
