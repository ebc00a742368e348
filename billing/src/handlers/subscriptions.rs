use actix_web::{web, Error, HttpResponse};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::subscriptions_db::SubscriptionsServiceDb;
use meterbill_middleware::Identity;
use meterbill_models::CreateSubscriptionRequest;

pub async fn create_subscription(
    identity: Identity,
    pool: web::Data<PgPool>,
    request: web::Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse, Error> {
    request
        .validate()
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;

    let service = SubscriptionsServiceDb::new(pool.get_ref().clone());
    let subscription = service
        .create_subscription(identity.user_id, &request)
        .await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Subscription created successfully",
        "subscription": subscription
    })))
}

/// A user may only cancel their own subscription; the service looks the
/// subscription up by (id, user) and reports `NotFound` on a mismatch.
pub async fn cancel_subscription(
    identity: Identity,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, Error> {
    let service = SubscriptionsServiceDb::new(pool.get_ref().clone());
    let subscription = service
        .cancel_subscription(path.into_inner(), identity.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Subscription cancelled successfully",
        "subscription": subscription
    })))
}

pub async fn list_subscriptions(
    identity: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, Error> {
    let service = SubscriptionsServiceDb::new(pool.get_ref().clone());
    let subscriptions = service.list_for_user(identity.user_id).await?;
    Ok(HttpResponse::Ok().json(subscriptions))
}

pub async fn list_all_subscriptions(
    identity: Identity,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, Error> {
    identity.require_admin()?;
    let service = SubscriptionsServiceDb::new(pool.get_ref().clone());
    let subscriptions = service.list_all().await?;
    Ok(HttpResponse::Ok().json(subscriptions))
}
