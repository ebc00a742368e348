use actix_web::{web, Error, HttpResponse};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::plans_db::PlansServiceDb;
use meterbill_middleware::Identity;
use meterbill_models::{CreatePlanRequest, UpdatePlanRequest};

/// Any authenticated user may browse plans; they are the sales catalog.
pub async fn list_plans(
    _identity: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, Error> {
    let service = PlansServiceDb::new(pool.get_ref().clone());
    let plans = service.list_plans().await?;
    Ok(HttpResponse::Ok().json(plans))
}

pub async fn get_plan(
    _identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let service = PlansServiceDb::new(pool.get_ref().clone());
    let plan = service.get_plan(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(plan))
}

pub async fn create_plan(
    identity: Identity,
    pool: web::Data<PgPool>,
    request: web::Json<CreatePlanRequest>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let service = PlansServiceDb::new(pool.get_ref().clone());
    let plan = service.create_plan(&request).await?;
    Ok(HttpResponse::Created().json(plan))
}

/// Returns the updated plan together with any link-removal warnings, so the
/// caller can tell a clean update from one applied with exceptions.
pub async fn update_plan(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    request: web::Json<UpdatePlanRequest>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let service = PlansServiceDb::new(pool.get_ref().clone());
    let outcome = service.update_plan(path.into_inner(), &request).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn delete_plan(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    let service = PlansServiceDb::new(pool.get_ref().clone());
    service.delete_plan(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Plan deleted successfully"
    })))
}
