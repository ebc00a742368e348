use crate::errors::ServiceError;
use crate::services::calculator;
use chrono::Utc;
use meterbill_database::models::{Plan, Subscription, SubscriptionWithPlan};
use meterbill_models::CreateSubscriptionRequest;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, started_at, cancelled_at, \
     expires_at, billing_day, next_billing_date, monthly_fee_snapshot, created_at, updated_at";

// LEFT JOIN: a plan may be deleted after every subscription to it is
// cancelled; the projection still lists those subscriptions.
const WITH_PLAN_JOIN: &str = "SELECT s.id, s.user_id, s.plan_id, s.status, s.started_at, \
     s.cancelled_at, s.expires_at, s.billing_day, s.next_billing_date, s.monthly_fee_snapshot, \
     p.name AS plan_name, p.monthly_fee AS plan_monthly_fee, \
     p.billing_cycle AS plan_billing_cycle, s.created_at \
     FROM subscriptions s LEFT JOIN plans p ON p.id = s.plan_id";

/// Subscription lifecycle: create (with fee snapshot and first billing date)
/// and cancel. No operation transitions into `suspended` or `expired`, and
/// `next_billing_date` is never advanced after creation; both are reserved
/// for billing automation outside this service.
pub struct SubscriptionsServiceDb {
    pool: PgPool,
}

impl SubscriptionsServiceDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_subscription(
        &self,
        user_id: Uuid,
        request: &CreateSubscriptionRequest,
    ) -> Result<SubscriptionWithPlan, ServiceError> {
        let plan = sqlx::query_as::<_, Plan>(
            "SELECT id, name, description, monthly_fee, is_active, billing_cycle, \
                    created_at, updated_at \
             FROM plans WHERE id = $1",
        )
        .bind(request.plan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Plan not found".to_string()))?;

        let already_subscribed = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM subscriptions \
             WHERE user_id = $1 AND plan_id = $2 AND status = 'active')",
        )
        .bind(user_id)
        .bind(request.plan_id)
        .fetch_one(&self.pool)
        .await?;
        if already_subscribed {
            return Err(ServiceError::Conflict(
                "An active subscription to this plan already exists".to_string(),
            ));
        }

        let next_billing_date =
            calculator::next_billing_date(Utc::now().date_naive(), request.billing_day as u32);

        // The fee snapshot fixes what this subscriber owes per period; later
        // plan price changes never touch existing subscriptions.
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "INSERT INTO subscriptions \
                (user_id, plan_id, status, billing_day, next_billing_date, monthly_fee_snapshot) \
             VALUES ($1, $2, 'active', $3, $4, $5) \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(request.plan_id)
        .bind(request.billing_day)
        .bind(next_billing_date)
        .bind(plan.monthly_fee)
        .fetch_one(&self.pool)
        .await
        // The partial unique index closes the race two concurrent creates
        // would otherwise win together.
        .map_err(|e| {
            ServiceError::from_unique_violation(
                e,
                "An active subscription to this plan already exists",
            )
        })?;

        info!(
            subscription_id = %subscription.id,
            user_id = %user_id,
            plan_id = %request.plan_id,
            next_billing_date = %subscription.next_billing_date,
            "Subscription created"
        );

        self.get_with_plan(subscription.id).await
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
        user_id: Uuid,
    ) -> Result<Subscription, ServiceError> {
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 AND user_id = $2"
        ))
        .bind(subscription_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Subscription not found".to_string()))?;

        if subscription.status != meterbill_models::SubscriptionStatus::Active {
            return Err(ServiceError::InvalidState(
                "Subscription is not active".to_string(),
            ));
        }

        // Usage history is untouched; cancellation only closes the lifecycle.
        let cancelled = sqlx::query_as::<_, Subscription>(&format!(
            "UPDATE subscriptions \
             SET status = 'cancelled', cancelled_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'active' \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidState("Subscription is not active".to_string())
        })?;

        info!(subscription_id = %subscription_id, "Subscription cancelled");
        Ok(cancelled)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SubscriptionWithPlan>, ServiceError> {
        let subscriptions = sqlx::query_as::<_, SubscriptionWithPlan>(&format!(
            "{WITH_PLAN_JOIN} WHERE s.user_id = $1 ORDER BY s.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch subscriptions for user {}: {}", user_id, e);
            ServiceError::DatabaseError(e.to_string())
        })?;
        Ok(subscriptions)
    }

    pub async fn list_all(&self) -> Result<Vec<SubscriptionWithPlan>, ServiceError> {
        let subscriptions = sqlx::query_as::<_, SubscriptionWithPlan>(&format!(
            "{WITH_PLAN_JOIN} ORDER BY s.created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch subscriptions: {}", e);
            ServiceError::DatabaseError(e.to_string())
        })?;
        Ok(subscriptions)
    }

    async fn get_with_plan(
        &self,
        subscription_id: Uuid,
    ) -> Result<SubscriptionWithPlan, ServiceError> {
        sqlx::query_as::<_, SubscriptionWithPlan>(&format!(
            "{WITH_PLAN_JOIN} WHERE s.id = $1"
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Subscription not found".to_string()))
    }
}
