use crate::errors::ServiceError;
use crate::services::calculator;
use meterbill_database::models::{FeatureUsageTotal, PlanFeatureWithFeature, Subscription};
use meterbill_models::ChargeSummary;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

/// Read-side charge computation. Nothing here mutates: the total owed for a
/// subscription and billing period is derived from the fee snapshot plus the
/// recorded usage, and recomputing over the same rows yields the same
/// summary.
pub struct ChargesServiceDb {
    pool: PgPool,
}

impl ChargesServiceDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Charge summary for one subscription and one `YYYY-MM` period:
    /// base fee from the subscription's snapshot plus per-feature overage
    /// over the summed usage. A feature over its included units with overage
    /// disallowed fails the whole computation with `UsageBlocked`; a partial
    /// total would silently under-bill.
    pub async fn compute_period_charges(
        &self,
        subscription_id: Uuid,
        billing_period: &str,
        owner: Option<Uuid>,
    ) -> Result<ChargeSummary, ServiceError> {
        let subscription = self
            .find_subscription(subscription_id, owner)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Subscription not found".to_string()))?;

        let terms = sqlx::query_as::<_, PlanFeatureWithFeature>(
            "SELECT pf.id, pf.plan_id, pf.feature_id, pf.included_units, pf.overage_unit_price, \
                    pf.is_unlimited, pf.allow_overage, pf.sort_order, pf.is_active, \
                    f.name AS feature_name, f.code AS feature_code, f.unit_price, \
                    f.max_unit_limit \
             FROM plan_features pf JOIN features f ON f.id = pf.feature_id \
             WHERE pf.plan_id = $1 \
             ORDER BY pf.sort_order, pf.created_at",
        )
        .bind(subscription.plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch plan features: {}", e);
            ServiceError::DatabaseError(e.to_string())
        })?;

        let totals = sqlx::query_as::<_, FeatureUsageTotal>(
            "SELECT plan_feature_id, COALESCE(SUM(units_used), 0)::BIGINT AS units_used \
             FROM usages \
             WHERE subscription_id = $1 AND billing_period = $2 \
             GROUP BY plan_feature_id",
        )
        .bind(subscription_id)
        .bind(billing_period)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to sum usage: {}", e);
            ServiceError::DatabaseError(e.to_string())
        })?;

        let mut lines = Vec::with_capacity(terms.len());
        let mut overage_total = Decimal::ZERO;
        for term in &terms {
            let units_used = totals
                .iter()
                .find(|t| t.plan_feature_id == term.id)
                .map(|t| t.units_used)
                .unwrap_or(0);
            let line = calculator::compute_feature_charge(term, units_used)?;
            overage_total += line.overage_amount;
            lines.push(line);
        }

        let base_fee = subscription.monthly_fee_snapshot;
        Ok(ChargeSummary {
            subscription_id,
            billing_period: billing_period.to_string(),
            base_fee,
            overage_total,
            total: base_fee + overage_total,
            lines,
        })
    }

    async fn find_subscription(
        &self,
        subscription_id: Uuid,
        owner: Option<Uuid>,
    ) -> Result<Option<Subscription>, ServiceError> {
        let query = "SELECT id, user_id, plan_id, status, started_at, cancelled_at, expires_at, \
                            billing_day, next_billing_date, monthly_fee_snapshot, \
                            created_at, updated_at \
                     FROM subscriptions WHERE id = $1";
        let subscription = match owner {
            Some(user_id) => {
                sqlx::query_as::<_, Subscription>(&format!("{query} AND user_id = $2"))
                    .bind(subscription_id)
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as::<_, Subscription>(query)
                    .bind(subscription_id)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(subscription)
    }
}
