use crate::errors::ServiceError;
use crate::services::calculator;
use chrono::Utc;
use meterbill_database::models::{PlanFeature, Subscription, Usage, UsageWithFeature};
use meterbill_models::RecordUsageRequest;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

/// Usage recording and read-side listing. Usage rows are append-only:
/// no update or delete operation exists on them.
pub struct UsageServiceDb {
    pool: PgPool,
}

impl UsageServiceDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one consumption event against a subscription's plan feature.
    ///
    /// Recording is unconditional with respect to overage policy: a feature
    /// over its included units with overage disallowed still records; the
    /// block surfaces at charge computation, not here.
    pub async fn record_usage(
        &self,
        request: &RecordUsageRequest,
        owner: Option<Uuid>,
    ) -> Result<Usage, ServiceError> {
        let subscription = self
            .find_subscription(request.subscription_id, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subscription not found".to_string()))?;

        let plan_feature = sqlx::query_as::<_, PlanFeature>(
            "SELECT id, plan_id, feature_id, included_units, overage_unit_price, is_unlimited, \
                    allow_overage, sort_order, is_active, created_at, updated_at \
             FROM plan_features WHERE id = $1",
        )
        .bind(request.plan_feature_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Plan feature not found".to_string()))?;

        // Cross-plan usage is rejected, never silently reassigned.
        if plan_feature.plan_id != subscription.plan_id {
            return Err(ServiceError::InvalidArgument(
                "Feature does not belong to the subscription's plan".to_string(),
            ));
        }

        if request.units_used < 0 {
            return Err(ServiceError::InvalidArgument(
                "units_used must be a non-negative integer".to_string(),
            ));
        }

        let usage_date = request.usage_date.unwrap_or_else(|| Utc::now().date_naive());
        calculator::validate_usage_date(
            usage_date,
            subscription.started_at.date_naive(),
            Utc::now().date_naive(),
        )?;

        let billing_period = request
            .billing_period
            .clone()
            .unwrap_or_else(|| calculator::billing_period_for(usage_date));

        let usage = sqlx::query_as::<_, Usage>(
            "INSERT INTO usages \
                (subscription_id, plan_feature_id, units_used, usage_date, billing_period, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, subscription_id, plan_feature_id, units_used, usage_date, \
                       billing_period, metadata, created_at",
        )
        .bind(request.subscription_id)
        .bind(request.plan_feature_id)
        .bind(request.units_used)
        .bind(usage_date)
        .bind(&billing_period)
        .bind(request.metadata.clone())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record usage: {}", e);
            ServiceError::DatabaseError(e.to_string())
        })?;

        info!(
            usage_id = %usage.id,
            subscription_id = %usage.subscription_id,
            plan_feature_id = %usage.plan_feature_id,
            units_used = usage.units_used,
            billing_period = %usage.billing_period,
            "Usage recorded"
        );
        Ok(usage)
    }

    /// All usage for a subscription, newest usage date first, enriched with
    /// feature identity and link terms for display.
    pub async fn list_for_subscription(
        &self,
        subscription_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Vec<UsageWithFeature>, ServiceError> {
        self.find_subscription(subscription_id, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subscription not found".to_string()))?;

        let usage = sqlx::query_as::<_, UsageWithFeature>(
            "SELECT u.id, u.subscription_id, u.plan_feature_id, u.units_used, u.usage_date, \
                    u.billing_period, u.metadata, \
                    f.name AS feature_name, f.code AS feature_code, pf.included_units, \
                    u.created_at \
             FROM usages u \
             JOIN plan_features pf ON pf.id = u.plan_feature_id \
             JOIN features f ON f.id = pf.feature_id \
             WHERE u.subscription_id = $1 \
             ORDER BY u.usage_date DESC, u.created_at DESC",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch usage for {}: {}", subscription_id, e);
            ServiceError::DatabaseError(e.to_string())
        })?;

        Ok(usage)
    }

    /// Fetch a subscription, optionally constrained to an owning user.
    /// `owner = None` is the admin path.
    async fn find_subscription(
        &self,
        subscription_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Option<Subscription>, ServiceError> {
        let subscription = match owner {
            Some(user_id) => {
                sqlx::query_as::<_, Subscription>(
                    "SELECT id, user_id, plan_id, status, started_at, cancelled_at, expires_at, \
                            billing_day, next_billing_date, monthly_fee_snapshot, \
                            created_at, updated_at \
                     FROM subscriptions WHERE id = $1 AND user_id = $2",
                )
                .bind(subscription_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Subscription>(
                    "SELECT id, user_id, plan_id, status, started_at, cancelled_at, expires_at, \
                            billing_day, next_billing_date, monthly_fee_snapshot, \
                            created_at, updated_at \
                     FROM subscriptions WHERE id = $1",
                )
                .bind(subscription_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(subscription)
    }
}
