use actix_web::{web, Error, HttpResponse};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::catalog_db::CatalogServiceDb;
use meterbill_middleware::Identity;
use meterbill_models::{CreateFeatureRequest, UpdateFeatureRequest};

pub async fn list_features(
    identity: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    let service = CatalogServiceDb::new(pool.get_ref().clone());
    let features = service.list_features().await?;
    Ok(HttpResponse::Ok().json(features))
}

pub async fn create_feature(
    identity: Identity,
    pool: web::Data<PgPool>,
    request: web::Json<CreateFeatureRequest>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let service = CatalogServiceDb::new(pool.get_ref().clone());
    let feature = service.create_feature(&request).await?;
    Ok(HttpResponse::Created().json(feature))
}

pub async fn update_feature(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    request: web::Json<UpdateFeatureRequest>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let service = CatalogServiceDb::new(pool.get_ref().clone());
    let feature = service.update_feature(path.into_inner(), &request).await?;
    Ok(HttpResponse::Ok().json(feature))
}

pub async fn delete_feature(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    let service = CatalogServiceDb::new(pool.get_ref().clone());
    service.delete_feature(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Feature deleted successfully"
    })))
}
