use crate::errors::ServiceError;
use meterbill_database::models::Feature;
use meterbill_models::{CreateFeatureRequest, UpdateFeatureRequest};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

/// Feature catalog operations. A feature's code is immutable after creation;
/// its price and ceiling become immutable once usage history references the
/// feature through any plan link.
pub struct CatalogServiceDb {
    pool: PgPool,
}

impl CatalogServiceDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_features(&self) -> Result<Vec<Feature>, ServiceError> {
        let features = sqlx::query_as::<_, Feature>(
            "SELECT id, name, code, unit_price, max_unit_limit, created_at, updated_at \
             FROM features ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch features: {}", e);
            ServiceError::DatabaseError(e.to_string())
        })?;

        Ok(features)
    }

    pub async fn create_feature(
        &self,
        request: &CreateFeatureRequest,
    ) -> Result<Feature, ServiceError> {
        let code_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM features WHERE code = $1)",
        )
        .bind(&request.code)
        .fetch_one(&self.pool)
        .await?;

        if code_taken {
            return Err(ServiceError::Conflict(format!(
                "Feature code '{}' already exists",
                request.code
            )));
        }

        let feature = sqlx::query_as::<_, Feature>(
            "INSERT INTO features (name, code, unit_price, max_unit_limit) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, name, code, unit_price, max_unit_limit, created_at, updated_at",
        )
        .bind(&request.name)
        .bind(&request.code)
        .bind(request.unit_price)
        .bind(request.max_unit_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ServiceError::from_unique_violation(e, "Feature code already exists"))?;

        info!(feature_id = %feature.id, code = %feature.code, "Feature created");
        Ok(feature)
    }

    pub async fn update_feature(
        &self,
        feature_id: Uuid,
        request: &UpdateFeatureRequest,
    ) -> Result<Feature, ServiceError> {
        // Freeze check and update share one transaction with the feature row
        // locked, so usage recorded in between cannot let a term edit through.
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Feature>(
            "SELECT id, name, code, unit_price, max_unit_limit, created_at, updated_at \
             FROM features WHERE id = $1 FOR UPDATE",
        )
        .bind(feature_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Feature {} not found", feature_id)))?;

        // Billing terms freeze once usage has been recorded against the
        // feature; historical charges were priced on them.
        if changes_billing_terms(request) {
            let usage_count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM usages u \
                 JOIN plan_features pf ON pf.id = u.plan_feature_id \
                 WHERE pf.feature_id = $1",
            )
            .bind(feature_id)
            .fetch_one(&mut *tx)
            .await?;
            if usage_count > 0 {
                return Err(ServiceError::InUse(format!(
                    "Feature '{}' has recorded usage; unit_price and max_unit_limit cannot change",
                    existing.code
                )));
            }
        }

        let feature = sqlx::query_as::<_, Feature>(
            "UPDATE features SET \
                name = COALESCE($2, name), \
                unit_price = COALESCE($3, unit_price), \
                max_unit_limit = COALESCE($4, max_unit_limit), \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING id, name, code, unit_price, max_unit_limit, created_at, updated_at",
        )
        .bind(feature_id)
        .bind(request.name.as_deref())
        .bind(request.unit_price)
        .bind(request.max_unit_limit)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(feature)
    }

    pub async fn delete_feature(&self, feature_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let feature = sqlx::query_as::<_, Feature>(
            "SELECT id, name, code, unit_price, max_unit_limit, created_at, updated_at \
             FROM features WHERE id = $1 FOR UPDATE",
        )
        .bind(feature_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Feature {} not found", feature_id)))?;

        let active_subscriptions = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM subscriptions s \
             JOIN plan_features pf ON pf.plan_id = s.plan_id \
             WHERE pf.feature_id = $1 AND s.status = 'active'",
        )
        .bind(feature_id)
        .fetch_one(&mut *tx)
        .await?;

        if active_subscriptions > 0 {
            return Err(ServiceError::InUse(format!(
                "Feature '{}' belongs to a plan with {} active subscription(s)",
                feature.code, active_subscriptions
            )));
        }

        let usage_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM usages u \
             JOIN plan_features pf ON pf.id = u.plan_feature_id \
             WHERE pf.feature_id = $1",
        )
        .bind(feature_id)
        .fetch_one(&mut *tx)
        .await?;

        if usage_count > 0 {
            return Err(ServiceError::InUse(format!(
                "Feature '{}' has recorded usage; its plan links cannot be removed",
                feature.code
            )));
        }

        sqlx::query("DELETE FROM plan_features WHERE feature_id = $1")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(feature_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(feature_id = %feature_id, code = %feature.code, "Feature deleted");
        Ok(())
    }

}

/// Whether an update touches the frozen billing terms. A name-only edit is
/// always allowed, even with usage history.
fn changes_billing_terms(request: &UpdateFeatureRequest) -> bool {
    request.unit_price.is_some() || request.max_unit_limit.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_name_only_update_leaves_terms_alone() {
        let request = UpdateFeatureRequest {
            name: Some("API Requests".to_string()),
            unit_price: None,
            max_unit_limit: None,
        };
        assert!(!changes_billing_terms(&request));
    }

    #[test]
    fn test_price_or_limit_update_touches_terms() {
        let price_edit = UpdateFeatureRequest {
            name: None,
            unit_price: Some(Decimal::new(2, 2)),
            max_unit_limit: None,
        };
        assert!(changes_billing_terms(&price_edit));

        let limit_edit = UpdateFeatureRequest {
            name: None,
            unit_price: None,
            max_unit_limit: Some(200_000),
        };
        assert!(changes_billing_terms(&limit_edit));
    }
}
