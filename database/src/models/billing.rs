use chrono::{DateTime, NaiveDate, Utc};
use meterbill_models::{BillingCycle, SubscriptionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A billable capability: unit price plus a hard ceiling on the units a plan
/// may include.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feature {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub unit_price: Decimal,
    pub max_unit_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub monthly_fee: Decimal,
    pub is_active: bool,
    pub billing_cycle: BillingCycle,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The plan/feature join carrying billing terms. First-class entity with its
/// own id so usage rows can reference it directly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanFeature {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub feature_id: Uuid,
    pub included_units: i64,
    pub overage_unit_price: Option<Decimal>,
    pub is_unlimited: bool,
    pub allow_overage: bool,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A plan feature joined with its feature, for plan rendering and charge
/// computation. Read-side shape, not a stored relation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanFeatureWithFeature {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub feature_id: Uuid,
    pub included_units: i64,
    pub overage_unit_price: Option<Decimal>,
    pub is_unlimited: bool,
    pub allow_overage: bool,
    pub sort_order: i32,
    pub is_active: bool,
    pub feature_name: String,
    pub feature_code: String,
    pub unit_price: Decimal,
    pub max_unit_limit: i64,
}

impl From<PlanFeatureWithFeature> for meterbill_models::PlanFeatureDetail {
    fn from(link: PlanFeatureWithFeature) -> Self {
        Self {
            id: link.id,
            feature_id: link.feature_id,
            feature_name: link.feature_name,
            feature_code: link.feature_code,
            unit_price: link.unit_price,
            max_unit_limit: link.max_unit_limit,
            included_units: link.included_units,
            overage_unit_price: link.overage_unit_price,
            is_unlimited: link.is_unlimited,
            allow_overage: link.allow_overage,
            sort_order: link.sort_order,
            is_active: link.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub billing_day: i32,
    pub next_billing_date: NaiveDate,
    pub monthly_fee_snapshot: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription joined with plan display fields for list projections.
/// Plan fields are optional: a plan may be deleted once every subscription
/// to it is cancelled, and the projection still lists those subscriptions
/// (the fee snapshot keeps their billing history intact).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionWithPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub billing_day: i32,
    pub next_billing_date: NaiveDate,
    pub monthly_fee_snapshot: Decimal,
    pub plan_name: Option<String>,
    pub plan_monthly_fee: Option<Decimal>,
    pub plan_billing_cycle: Option<BillingCycle>,
    pub created_at: DateTime<Utc>,
}

/// One immutable consumption event. No update or delete is ever issued
/// against this table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Usage {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub plan_feature_id: Uuid,
    pub units_used: i64,
    pub usage_date: NaiveDate,
    pub billing_period: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Usage row enriched with its plan-feature terms and feature identity for
/// display. Read-side join.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageWithFeature {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub plan_feature_id: Uuid,
    pub units_used: i64,
    pub usage_date: NaiveDate,
    pub billing_period: String,
    pub metadata: Option<serde_json::Value>,
    pub feature_name: String,
    pub feature_code: String,
    pub included_units: i64,
    pub created_at: DateTime<Utc>,
}

/// Aggregated units per plan feature for one billing period.
#[derive(Debug, Clone, FromRow)]
pub struct FeatureUsageTotal {
    pub plan_feature_id: Uuid,
    pub units_used: i64,
}
