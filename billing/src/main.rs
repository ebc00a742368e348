use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use meterbill_database::{Database, DatabaseConfig};
use meterbill_middleware::IdentityMiddlewareFactory;
use meterbill_observability::{init_tracing, TracingConfig};
use std::env;
use tracing_actix_web::TracingLogger;

use meterbill_billing::handlers;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(TracingConfig::for_service("billing-service"));

    // Load environment variables
    dotenv::dotenv().ok();

    let port = env::var("BILLING_SERVICE_PORT")
        .unwrap_or_else(|_| "3011".to_string())
        .parse::<u16>()
        .unwrap_or(3011);

    // Identity enforcement can be switched off for local development only;
    // the gateway normally resolves the principal upstream.
    let auth_enabled = env::var("AUTH_ENABLED")
        .map(|v| v != "false")
        .unwrap_or(true);
    let identity_middleware = if auth_enabled {
        IdentityMiddlewareFactory::new()
    } else {
        IdentityMiddlewareFactory::disabled()
    };

    tracing::info!("[Billing Service] Connecting to database...");
    let database = Database::new(&DatabaseConfig::from_env()).await?;
    tracing::info!("[Billing Service] Database connection established");

    if env::var("RUN_MIGRATIONS").map(|v| v == "true").unwrap_or(false) {
        database.migrate().await?;
        tracing::info!("[Billing Service] Migrations applied");
    }

    let pool = database.pool().clone();

    tracing::info!("[Billing Service] Starting on port {}", port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(database.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(identity_middleware.clone())
            .route("/health", web::get().to(health_check))
            .configure(handlers::configure_billing_routes)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}

async fn health_check(
    database: web::Data<Database>,
) -> actix_web::Result<web::Json<serde_json::Value>> {
    let db_status = match database.ping().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::error!("[Billing Service] Database health check failed: {}", e);
            "disconnected"
        }
    };

    Ok(web::Json(serde_json::json!({
        "status": "healthy",
        "service": "billing-service",
        "database": db_status,
        "timestamp": chrono::Utc::now()
    })))
}
