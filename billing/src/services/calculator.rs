//! Pure billing arithmetic: next-billing-date computation, billing-period
//! bucketing, and per-feature overage charges.
//!
//! Everything in this module is a deterministic function of its inputs; the
//! service layer feeds it rows and sums and persists nothing here.

use chrono::{Datelike, NaiveDate};
use meterbill_database::models::PlanFeatureWithFeature;
use meterbill_models::FeatureCharge;
use rust_decimal::Decimal;

use crate::errors::ServiceError;

/// First billing date for a subscription created today: the billing day in
/// the current month, rolled into the next month when that candidate is not
/// strictly in the future. December rolls into January of the next year.
pub fn next_billing_date(today: NaiveDate, billing_day: u32) -> NaiveDate {
    debug_assert!((1..=28).contains(&billing_day));
    let candidate = NaiveDate::from_ymd_opt(today.year(), today.month(), billing_day)
        .unwrap_or(today);
    if candidate > today {
        return candidate;
    }
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    // billing_day <= 28, so the rolled date always exists
    NaiveDate::from_ymd_opt(year, month, billing_day).unwrap_or(candidate)
}

/// The `YYYY-MM` bucket a usage date belongs to.
pub fn billing_period_for(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// A usage date must fall within the subscription window: on or after the
/// start date, and not in the future. Both boundaries are inclusive.
pub fn validate_usage_date(
    usage_date: NaiveDate,
    started: NaiveDate,
    today: NaiveDate,
) -> Result<(), ServiceError> {
    if usage_date < started {
        return Err(ServiceError::InvalidState(
            "Usage date cannot be before subscription start date".to_string(),
        ));
    }
    if usage_date > today {
        return Err(ServiceError::InvalidState(
            "Usage date cannot be in the future".to_string(),
        ));
    }
    Ok(())
}

/// Charge breakdown for one plan feature over one period's summed usage.
///
/// Unlimited features never accrue overage. Otherwise overage is the units
/// beyond `included_units`, priced at the link's override rate or the
/// feature's unit price when no override is set. Overage on a link with
/// `allow_overage = false` is a policy violation surfaced to the caller, not
/// a clamped or silently charged amount.
pub fn compute_feature_charge(
    terms: &PlanFeatureWithFeature,
    units_used: i64,
) -> Result<FeatureCharge, ServiceError> {
    let (overage_units, overage_rate, overage_amount) = if terms.is_unlimited {
        (0, Decimal::ZERO, Decimal::ZERO)
    } else {
        let overage_units = (units_used - terms.included_units).max(0);
        if overage_units > 0 && !terms.allow_overage {
            return Err(ServiceError::UsageBlocked(format!(
                "Feature '{}' used {} units over the {} included and overage is not allowed",
                terms.feature_code, overage_units, terms.included_units
            )));
        }
        let rate = terms.overage_unit_price.unwrap_or(terms.unit_price);
        (overage_units, rate, Decimal::from(overage_units) * rate)
    };

    Ok(FeatureCharge {
        plan_feature_id: terms.id,
        feature_code: terms.feature_code.clone(),
        feature_name: terms.feature_name.clone(),
        included_units: terms.included_units,
        units_used,
        overage_units,
        overage_rate,
        overage_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn terms(
        included_units: i64,
        overage_unit_price: Option<Decimal>,
        is_unlimited: bool,
        allow_overage: bool,
    ) -> PlanFeatureWithFeature {
        PlanFeatureWithFeature {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            feature_id: Uuid::new_v4(),
            included_units,
            overage_unit_price,
            is_unlimited,
            allow_overage,
            sort_order: 0,
            is_active: true,
            feature_name: "API Calls".to_string(),
            feature_code: "api_calls".to_string(),
            unit_price: Decimal::new(1, 2), // 0.01
            max_unit_limit: 100_000,
        }
    }

    #[test]
    fn test_usage_within_included_units() {
        let charge = compute_feature_charge(&terms(100_000, None, false, true), 50_000).unwrap();
        assert_eq!(charge.overage_units, 0);
        assert_eq!(charge.overage_amount, Decimal::ZERO);
        assert_eq!(charge.units_used, 50_000);
    }

    #[test]
    fn test_boundary_equality_is_not_overage() {
        let charge = compute_feature_charge(&terms(100_000, None, false, false), 100_000).unwrap();
        assert_eq!(charge.overage_units, 0);
        assert_eq!(charge.overage_amount, Decimal::ZERO);
    }

    #[test]
    fn test_overage_at_feature_unit_price() {
        // No override: falls back to the feature's unit price.
        let charge = compute_feature_charge(&terms(100_000, None, false, true), 150_000).unwrap();
        assert_eq!(charge.overage_units, 50_000);
        assert_eq!(charge.overage_rate, Decimal::new(1, 2));
        assert_eq!(charge.overage_amount, Decimal::new(50_000, 2)); // 500.00
    }

    #[test]
    fn test_overage_rate_override_wins() {
        let charge =
            compute_feature_charge(&terms(100, Some(Decimal::new(5, 2)), false, true), 110)
                .unwrap();
        assert_eq!(charge.overage_rate, Decimal::new(5, 2));
        assert_eq!(charge.overage_amount, Decimal::new(50, 2));
    }

    #[test]
    fn test_unlimited_never_accrues_overage() {
        let charge = compute_feature_charge(&terms(10, None, true, false), 1_000_000).unwrap();
        assert_eq!(charge.overage_units, 0);
        assert_eq!(charge.overage_amount, Decimal::ZERO);
    }

    #[test]
    fn test_disallowed_overage_is_blocked() {
        let err = compute_feature_charge(&terms(100_000, None, false, false), 150_000).unwrap_err();
        match err {
            ServiceError::UsageBlocked(msg) => assert!(msg.contains("api_calls")),
            other => panic!("expected UsageBlocked, got {other}"),
        }
    }

    #[test]
    fn test_charge_is_deterministic() {
        let t = terms(100, None, false, true);
        let a = compute_feature_charge(&t, 250).unwrap();
        let b = compute_feature_charge(&t, 250).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_next_billing_date_strictly_future() {
        // Billing day 1 while today is the 15th: lands on the 1st of next month.
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(
            next_billing_date(today, 1),
            NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
        );
    }

    #[test]
    fn test_next_billing_date_same_day_rolls_forward() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(
            next_billing_date(today, 15),
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap()
        );
    }

    #[test]
    fn test_next_billing_date_later_this_month() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        assert_eq!(
            next_billing_date(today, 20),
            NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()
        );
    }

    #[test]
    fn test_next_billing_date_december_rolls_year() {
        let today = NaiveDate::from_ymd_opt(2026, 12, 28).unwrap();
        assert_eq!(
            next_billing_date(today, 5),
            NaiveDate::from_ymd_opt(2027, 1, 5).unwrap()
        );
    }

    #[test]
    fn test_next_billing_date_always_after_today() {
        for day in 1..=28 {
            let today = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
            assert!(next_billing_date(today, day) > today);
        }
    }

    #[test]
    fn test_usage_date_before_start_rejected() {
        let started = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        match validate_usage_date(date, started, today).unwrap_err() {
            ServiceError::InvalidState(msg) => assert!(msg.contains("start date")),
            other => panic!("expected InvalidState, got {other}"),
        }
    }

    #[test]
    fn test_usage_date_in_future_rejected() {
        let started = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 21).unwrap();
        match validate_usage_date(date, started, today).unwrap_err() {
            ServiceError::InvalidState(msg) => assert!(msg.contains("future")),
            other => panic!("expected InvalidState, got {other}"),
        }
    }

    #[test]
    fn test_usage_date_window_boundaries_inclusive() {
        let started = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        assert!(validate_usage_date(started, started, today).is_ok());
        assert!(validate_usage_date(today, started, today).is_ok());
    }

    #[test]
    fn test_billing_period_format() {
        assert_eq!(
            billing_period_for(NaiveDate::from_ymd_opt(2026, 3, 7).unwrap()),
            "2026-03"
        );
        assert_eq!(
            billing_period_for(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()),
            "2026-12"
        );
    }

    #[test]
    fn test_billing_period_of_today_is_well_formed() {
        let period = billing_period_for(Utc::now().date_naive());
        assert_eq!(period.len(), 7);
        assert_eq!(&period[4..5], "-");
    }
}
