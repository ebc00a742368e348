pub mod features;
pub mod plans;
pub mod subscriptions;
pub mod usage;

use actix_web::web;

pub fn configure_billing_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/billing")
            // Feature catalog (admin)
            .route("/features", web::get().to(features::list_features))
            .route("/features", web::post().to(features::create_feature))
            .route("/features/{feature_id}", web::put().to(features::update_feature))
            .route("/features/{feature_id}", web::delete().to(features::delete_feature))
            // Plan composer (list open to users, mutation admin)
            .route("/plans", web::get().to(plans::list_plans))
            .route("/plans", web::post().to(plans::create_plan))
            .route("/plans/{plan_id}", web::get().to(plans::get_plan))
            .route("/plans/{plan_id}", web::put().to(plans::update_plan))
            .route("/plans/{plan_id}", web::delete().to(plans::delete_plan))
            // Subscription lifecycle
            .route("/subscriptions", web::get().to(subscriptions::list_subscriptions))
            .route("/subscriptions", web::post().to(subscriptions::create_subscription))
            .route("/subscriptions/all", web::get().to(subscriptions::list_all_subscriptions))
            .route(
                "/subscriptions/{subscription_id}/cancel",
                web::post().to(subscriptions::cancel_subscription),
            )
            // Usage recording and read-side projections
            .route("/usage", web::post().to(usage::record_usage))
            .route(
                "/subscriptions/{subscription_id}/usage",
                web::get().to(usage::list_usage),
            )
            .route(
                "/subscriptions/{subscription_id}/charges/{billing_period}",
                web::get().to(usage::charge_summary),
            ),
    );
}
