use actix_web::{web, Error, HttpResponse};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::charges_db::ChargesServiceDb;
use crate::services::usage_db::UsageServiceDb;
use meterbill_middleware::Identity;
use meterbill_models::RecordUsageRequest;

/// Admins act on any subscription; users only on their own.
fn owner_filter(identity: &Identity) -> Option<Uuid> {
    if identity.is_admin() {
        None
    } else {
        Some(identity.user_id)
    }
}

pub async fn record_usage(
    identity: Identity,
    pool: web::Data<PgPool>,
    request: web::Json<RecordUsageRequest>,
) -> Result<HttpResponse, Error> {
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let service = UsageServiceDb::new(pool.get_ref().clone());
    let usage = service
        .record_usage(&request, owner_filter(&identity))
        .await?;
    Ok(HttpResponse::Created().json(usage))
}

pub async fn list_usage(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let service = UsageServiceDb::new(pool.get_ref().clone());
    let usage = service
        .list_for_subscription(path.into_inner(), owner_filter(&identity))
        .await?;
    Ok(HttpResponse::Ok().json(usage))
}

pub async fn charge_summary(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse, Error> {
    let (subscription_id, billing_period) = path.into_inner();
    let service = ChargesServiceDb::new(pool.get_ref().clone());
    let summary = service
        .compute_period_charges(subscription_id, &billing_period, owner_filter(&identity))
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}
