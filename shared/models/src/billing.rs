use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Subscription lifecycle states. `Suspended` and `Expired` are representable
/// in storage but no exposed operation transitions into them; they are
/// reserved for billing-failure/expiry automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "subscription_status", rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Suspended,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "billing_cycle", rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

fn non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("must be non-negative"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Feature catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFeatureRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Code must be between 1 and 100 characters"))]
    pub code: String,
    #[validate(custom(function = "non_negative_decimal"))]
    pub unit_price: Decimal,
    #[validate(range(min = 0, message = "max_unit_limit must be a non-negative integer"))]
    pub max_unit_limit: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateFeatureRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    #[validate(custom(function = "non_negative_decimal"))]
    pub unit_price: Option<Decimal>,
    #[validate(range(min = 0, message = "max_unit_limit must be a non-negative integer"))]
    pub max_unit_limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Plan composer
// ---------------------------------------------------------------------------

/// One requested feature link on a plan, with its billing terms.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeatureLinkInput {
    pub feature_id: Uuid,
    #[validate(range(min = 0, message = "included_units must be a non-negative integer"))]
    pub included_units: i64,
    #[validate(custom(function = "non_negative_decimal"))]
    pub overage_unit_price: Option<Decimal>,
    #[serde(default)]
    pub is_unlimited: bool,
    #[serde(default = "default_allow_overage")]
    pub allow_overage: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_allow_overage() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom(function = "non_negative_decimal"))]
    pub monthly_fee: Decimal,
    #[serde(default)]
    #[validate(nested)]
    pub features: Vec<FeatureLinkInput>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePlanRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom(function = "non_negative_decimal"))]
    pub monthly_fee: Option<Decimal>,
    /// When present, the plan's links are reconciled against this set.
    /// When absent, links are left untouched.
    #[validate(nested)]
    pub features: Option<Vec<FeatureLinkInput>>,
}

/// A feature link the update could not remove because usage history
/// references it. The link stays on the plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemovalWarning {
    pub feature_id: Uuid,
    pub feature_name: String,
    pub feature_code: String,
    pub reason: String,
}

/// Feature link terms joined with the feature itself, as rendered on a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFeatureDetail {
    pub id: Uuid,
    pub feature_id: Uuid,
    pub feature_name: String,
    pub feature_code: String,
    pub unit_price: Decimal,
    pub max_unit_limit: i64,
    pub included_units: i64,
    pub overage_unit_price: Option<Decimal>,
    pub is_unlimited: bool,
    pub allow_overage: bool,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWithFeatures {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub monthly_fee: Decimal,
    pub is_active: bool,
    pub billing_cycle: BillingCycle,
    pub features: Vec<PlanFeatureDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a plan update. `warnings` is empty for a clean update; callers
/// can distinguish "fully applied" from "applied with exceptions" without
/// inspecting logs or response prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanUpdateOutcome {
    pub plan: PlanWithFeatures,
    pub warnings: Vec<RemovalWarning>,
}

/// The add/remove sets for reconciling a plan's links against a desired set.
/// Links present on both sides keep their existing terms untouched.
#[derive(Debug, Clone)]
pub struct LinkDiff {
    pub to_add: Vec<FeatureLinkInput>,
    pub to_remove: Vec<Uuid>,
}

/// Validate one link's billing terms against the feature's hard ceiling.
/// Returns the violation reason; the caller names the offending feature.
pub fn check_link_terms(link: &FeatureLinkInput, max_unit_limit: i64) -> Result<(), String> {
    if link.included_units < 0 {
        return Err("included_units must be a non-negative integer".to_string());
    }
    if link.included_units > max_unit_limit {
        return Err(format!(
            "included_units {} exceeds the feature's max_unit_limit {}",
            link.included_units, max_unit_limit
        ));
    }
    if let Some(price) = link.overage_unit_price {
        if price < Decimal::ZERO {
            return Err("overage_unit_price must be non-negative".to_string());
        }
    }
    Ok(())
}

/// Diff the currently linked feature ids against the desired link set.
/// Pure set difference by feature id, in input order.
pub fn diff_feature_links(current: &[Uuid], desired: &[FeatureLinkInput]) -> LinkDiff {
    let to_add = desired
        .iter()
        .filter(|link| !current.contains(&link.feature_id))
        .cloned()
        .collect();
    let to_remove = current
        .iter()
        .filter(|id| !desired.iter().any(|link| link.feature_id == **id))
        .copied()
        .collect();
    LinkDiff { to_add, to_remove }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub plan_id: Uuid,
    #[validate(range(min = 1, max = 28, message = "Billing day must be between 1 and 28"))]
    pub billing_day: i32,
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordUsageRequest {
    pub subscription_id: Uuid,
    pub plan_feature_id: Uuid,
    #[validate(range(min = 0, message = "units_used must be a non-negative integer"))]
    pub units_used: i64,
    /// Defaults to today (UTC) when omitted.
    pub usage_date: Option<NaiveDate>,
    /// Defaults to the YYYY-MM of `usage_date` when omitted.
    pub billing_period: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Charges
// ---------------------------------------------------------------------------

/// Per-feature charge breakdown for one billing period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCharge {
    pub plan_feature_id: Uuid,
    pub feature_code: String,
    pub feature_name: String,
    pub included_units: i64,
    pub units_used: i64,
    pub overage_units: i64,
    pub overage_rate: Decimal,
    pub overage_amount: Decimal,
}

/// Total owed for a subscription and billing period: the fee snapshot taken
/// at subscription time plus the sum of per-feature overage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeSummary {
    pub subscription_id: Uuid,
    pub billing_period: String,
    pub base_fee: Decimal,
    pub overage_total: Decimal,
    pub total: Decimal,
    pub lines: Vec<FeatureCharge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(feature_id: Uuid, included: i64) -> FeatureLinkInput {
        FeatureLinkInput {
            feature_id,
            included_units: included,
            overage_unit_price: None,
            is_unlimited: false,
            allow_overage: true,
            sort_order: 0,
        }
    }

    #[test]
    fn test_diff_disjoint_sets() {
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let diff = diff_feature_links(&[old], &[link(new, 10)]);
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].feature_id, new);
        assert_eq!(diff.to_remove, vec![old]);
    }

    #[test]
    fn test_diff_retained_links_are_untouched() {
        let kept = Uuid::new_v4();
        // Same feature on both sides, even with different terms: no add, no remove.
        let diff = diff_feature_links(&[kept], &[link(kept, 999)]);
        assert!(diff.to_add.is_empty());
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_diff_empty_desired_removes_all() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let diff = diff_feature_links(&[a, b], &[]);
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_remove, vec![a, b]);
    }

    #[test]
    fn test_link_terms_boundary_equality_allowed() {
        // included_units equal to the ceiling is valid.
        assert!(check_link_terms(&link(Uuid::new_v4(), 100_000), 100_000).is_ok());
    }

    #[test]
    fn test_link_terms_over_limit_rejected() {
        let err = check_link_terms(&link(Uuid::new_v4(), 100_001), 100_000).unwrap_err();
        assert!(err.contains("max_unit_limit"));
    }

    #[test]
    fn test_link_terms_negative_overage_price_rejected() {
        let mut bad = link(Uuid::new_v4(), 10);
        bad.overage_unit_price = Some(Decimal::new(-5, 2));
        assert!(check_link_terms(&bad, 100).is_err());
    }

    #[test]
    fn test_billing_day_range_enforced() {
        let bad = CreateSubscriptionRequest {
            plan_id: Uuid::new_v4(),
            billing_day: 29,
        };
        assert!(bad.validate().is_err());

        let ok = CreateSubscriptionRequest {
            plan_id: Uuid::new_v4(),
            billing_day: 28,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_negative_price_rejected() {
        let req = CreateFeatureRequest {
            name: "API Calls".into(),
            code: "api_calls".into(),
            unit_price: Decimal::new(-1, 2),
            max_unit_limit: 100_000,
        };
        assert!(req.validate().is_err());
    }
}
