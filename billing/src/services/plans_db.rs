use crate::errors::ServiceError;
use meterbill_database::models::{Plan, PlanFeatureWithFeature};
use meterbill_models::{
    check_link_terms, diff_feature_links, CreatePlanRequest, FeatureLinkInput, PlanUpdateOutcome,
    PlanWithFeatures, RemovalWarning, UpdatePlanRequest,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info, warn};
use uuid::Uuid;

const PLAN_COLUMNS: &str =
    "id, name, description, monthly_fee, is_active, billing_cycle, created_at, updated_at";

const LINK_JOIN: &str = "SELECT pf.id, pf.plan_id, pf.feature_id, pf.included_units, \
     pf.overage_unit_price, pf.is_unlimited, pf.allow_overage, pf.sort_order, pf.is_active, \
     f.name AS feature_name, f.code AS feature_code, f.unit_price, f.max_unit_limit \
     FROM plan_features pf JOIN features f ON f.id = pf.feature_id";

/// Plan composition: a plan plus its feature links with billing terms.
///
/// Link removal is the only operation here with partial-failure semantics:
/// a link referenced by usage history is kept and reported as a warning
/// instead of failing the whole update.
pub struct PlansServiceDb {
    pool: PgPool,
}

impl PlansServiceDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_plans(&self) -> Result<Vec<PlanWithFeatures>, ServiceError> {
        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch plans: {}", e);
            ServiceError::DatabaseError(e.to_string())
        })?;

        let mut result = Vec::with_capacity(plans.len());
        for plan in plans {
            let links = self.links_for_plan(plan.id).await?;
            result.push(assemble_plan(plan, links));
        }
        Ok(result)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<PlanWithFeatures, ServiceError> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))?;

        let links = self.links_for_plan(plan_id).await?;
        Ok(assemble_plan(plan, links))
    }

    pub async fn create_plan(
        &self,
        request: &CreatePlanRequest,
    ) -> Result<PlanWithFeatures, ServiceError> {
        let name_taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM plans WHERE name = $1)")
                .bind(&request.name)
                .fetch_one(&self.pool)
                .await?;
        if name_taken {
            return Err(ServiceError::Conflict(format!(
                "Plan name '{}' already exists",
                request.name
            )));
        }

        let mut tx = self.pool.begin().await?;

        // All links are validated before any row is written; the transaction
        // makes the create all-or-nothing either way.
        for link in &request.features {
            validate_link(&mut tx, link).await?;
        }

        let plan = sqlx::query_as::<_, Plan>(&format!(
            "INSERT INTO plans (name, description, monthly_fee) VALUES ($1, $2, $3) \
             RETURNING {PLAN_COLUMNS}"
        ))
        .bind(&request.name)
        .bind(request.description.as_deref())
        .bind(request.monthly_fee)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ServiceError::from_unique_violation(e, "Plan name already exists"))?;

        for link in &request.features {
            insert_link(&mut tx, plan.id, link).await?;
        }

        tx.commit().await?;
        info!(plan_id = %plan.id, name = %plan.name, "Plan created");
        self.get_plan(plan.id).await
    }

    /// Three-phase link reconciliation: diff by feature id, apply additions
    /// fail-fast, then attempt each removal individually. Removals blocked by
    /// usage history become warnings on the outcome; everything else is
    /// atomic within one transaction per plan.
    pub async fn update_plan(
        &self,
        plan_id: Uuid,
        request: &UpdatePlanRequest,
    ) -> Result<PlanUpdateOutcome, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1 FOR UPDATE"
        ))
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))?;

        if let Some(ref name) = request.name {
            if name != &plan.name {
                let name_taken = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM plans WHERE name = $1 AND id <> $2)",
                )
                .bind(name)
                .bind(plan_id)
                .fetch_one(&mut *tx)
                .await?;
                if name_taken {
                    return Err(ServiceError::Conflict(format!(
                        "Plan name '{}' already exists",
                        name
                    )));
                }
            }
        }

        sqlx::query(
            "UPDATE plans SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                monthly_fee = COALESCE($4, monthly_fee), \
                updated_at = now() \
             WHERE id = $1",
        )
        .bind(plan_id)
        .bind(request.name.as_deref())
        .bind(request.description.as_deref())
        .bind(request.monthly_fee)
        .execute(&mut *tx)
        .await
        // A rename racing past the pre-check still hits the unique
        // constraint here; report it as the same conflict.
        .map_err(|e| ServiceError::from_unique_violation(e, "Plan name already exists"))?;

        let mut warnings: Vec<RemovalWarning> = Vec::new();

        if let Some(ref desired) = request.features {
            let current = sqlx::query_as::<_, PlanFeatureWithFeature>(&format!(
                "{LINK_JOIN} WHERE pf.plan_id = $1 ORDER BY pf.sort_order, pf.created_at"
            ))
            .bind(plan_id)
            .fetch_all(&mut *tx)
            .await?;

            let current_ids: Vec<Uuid> = current.iter().map(|link| link.feature_id).collect();
            let diff = diff_feature_links(&current_ids, desired);

            // Additions first, fail-fast: adding has no destructive
            // consequence, so any validation error means bad input and the
            // whole update aborts.
            for link in &diff.to_add {
                validate_link(&mut tx, link).await?;
            }
            for link in &diff.to_add {
                insert_link(&mut tx, plan_id, link).await?;
            }

            // Removals are best-effort per link: a link with usage history
            // stays on the plan and is reported, the rest are removed.
            for feature_id in &diff.to_remove {
                let link = current
                    .iter()
                    .find(|l| l.feature_id == *feature_id)
                    .ok_or_else(|| {
                        ServiceError::InternalError("link disappeared during diff".to_string())
                    })?;

                let usage_count = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM usages WHERE plan_feature_id = $1",
                )
                .bind(link.id)
                .fetch_one(&mut *tx)
                .await?;

                if usage_count > 0 {
                    warn!(
                        plan_id = %plan_id,
                        feature_code = %link.feature_code,
                        usage_count,
                        "Skipping link removal: usage history references it"
                    );
                    warnings.push(RemovalWarning {
                        feature_id: *feature_id,
                        feature_name: link.feature_name.clone(),
                        feature_code: link.feature_code.clone(),
                        reason: format!(
                            "{} usage record(s) reference this feature link; it was kept",
                            usage_count
                        ),
                    });
                } else {
                    sqlx::query("DELETE FROM plan_features WHERE id = $1")
                        .bind(link.id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;

        let plan = self.get_plan(plan_id).await?;
        info!(plan_id = %plan_id, warnings = warnings.len(), "Plan updated");
        Ok(PlanUpdateOutcome { plan, warnings })
    }

    pub async fn delete_plan(&self, plan_id: Uuid) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1 FOR UPDATE"
        ))
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))?;

        let active_subscriptions = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM subscriptions WHERE plan_id = $1 AND status = 'active'",
        )
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await?;
        if active_subscriptions > 0 {
            return Err(ServiceError::InUse(format!(
                "Plan '{}' has {} active subscription(s)",
                plan.name, active_subscriptions
            )));
        }

        let usage_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM usages u \
             JOIN plan_features pf ON pf.id = u.plan_feature_id \
             WHERE pf.plan_id = $1",
        )
        .bind(plan_id)
        .fetch_one(&mut *tx)
        .await?;
        if usage_count > 0 {
            return Err(ServiceError::InUse(format!(
                "Plan '{}' has usage history; its feature links cannot be removed",
                plan.name
            )));
        }

        sqlx::query("DELETE FROM plan_features WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(plan_id = %plan_id, name = %plan.name, "Plan deleted");
        Ok(())
    }

    async fn links_for_plan(
        &self,
        plan_id: Uuid,
    ) -> Result<Vec<PlanFeatureWithFeature>, ServiceError> {
        let links = sqlx::query_as::<_, PlanFeatureWithFeature>(&format!(
            "{LINK_JOIN} WHERE pf.plan_id = $1 ORDER BY pf.sort_order, pf.created_at"
        ))
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch plan features for {}: {}", plan_id, e);
            ServiceError::DatabaseError(e.to_string())
        })?;
        Ok(links)
    }
}

fn assemble_plan(plan: Plan, links: Vec<PlanFeatureWithFeature>) -> PlanWithFeatures {
    PlanWithFeatures {
        id: plan.id,
        name: plan.name,
        description: plan.description,
        monthly_fee: plan.monthly_fee,
        is_active: plan.is_active,
        billing_cycle: plan.billing_cycle,
        features: links.into_iter().map(Into::into).collect(),
        created_at: plan.created_at,
        updated_at: plan.updated_at,
    }
}

/// A link is valid when its feature exists and its terms pass
/// `check_link_terms` against the feature's hard ceiling.
async fn validate_link(
    tx: &mut Transaction<'_, Postgres>,
    link: &FeatureLinkInput,
) -> Result<(), ServiceError> {
    let feature = sqlx::query_as::<_, (String, i64)>(
        "SELECT code, max_unit_limit FROM features WHERE id = $1",
    )
    .bind(link.feature_id)
    .fetch_optional(&mut **tx)
    .await?;

    let (code, max_unit_limit) = feature.ok_or_else(|| {
        ServiceError::InvalidArgument(format!("Feature {} does not exist", link.feature_id))
    })?;

    check_link_terms(link, max_unit_limit).map_err(|reason| {
        ServiceError::InvalidArgument(format!("Invalid link for feature '{}': {}", code, reason))
    })
}

async fn insert_link(
    tx: &mut Transaction<'_, Postgres>,
    plan_id: Uuid,
    link: &FeatureLinkInput,
) -> Result<(), ServiceError> {
    sqlx::query(
        "INSERT INTO plan_features \
            (plan_id, feature_id, included_units, overage_unit_price, is_unlimited, \
             allow_overage, sort_order) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(plan_id)
    .bind(link.feature_id)
    .bind(link.included_units)
    .bind(link.overage_unit_price)
    .bind(link.is_unlimited)
    .bind(link.allow_overage)
    .bind(link.sort_order)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        ServiceError::from_unique_violation(e, "Feature is already linked to this plan")
    })?;
    Ok(())
}
