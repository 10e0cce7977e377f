//! Conversation quality analysis server - Main entry point.
//!
//! Starts the Actix-web server with configured routes, the schedule trigger
//! registry, and the job engine.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, web};
use sea_orm_migration::MigratorTrait;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use convlens_lib::api;
use convlens_lib::config::Config;
use convlens_lib::db::DbPool;
use convlens_lib::middleware::RequestLogger;
use convlens_lib::migration::Migrator;
use convlens_lib::services::{
    AlertDispatcher, BatchAnalyzer, CompletionClient, DbTemplateStore, JobLifecycleManager,
    ScheduleRegistry, WarehouseClient, WebhookAlertSink,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, COMPLETION_API_KEY and WAREHOUSE_URL must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  Conversation Quality Analysis Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Using development defaults for DATABASE_URL and completion credentials");
    }

    // Connect to PostgreSQL
    let pool = DbPool::connect(&config)
        .await
        .expect("Failed to connect to database");
    info!("Database connection established");

    // Run migrations
    Migrator::up(pool.connection(), None)
        .await
        .expect("Failed to run migrations");
    info!("Database migrations complete");

    // Assemble the job engine
    let completion = Arc::new(CompletionClient::new(config.completion.clone()));
    let warehouse = Arc::new(WarehouseClient::new(
        config.warehouse_url.clone(),
        config.warehouse_api_key.clone(),
    ));
    let alert_sink = config
        .alert_webhook_url
        .clone()
        .map(|url| Arc::new(WebhookAlertSink::new(url)) as Arc<dyn convlens_lib::services::AlertSink>);
    if alert_sink.is_none() {
        warn!("ALERT_WEBHOOK_URL not set - alerting is disabled");
    }
    let templates = Arc::new(DbTemplateStore::new(pool.clone()));

    let manager = Arc::new(JobLifecycleManager::new(
        pool.clone(),
        warehouse,
        BatchAnalyzer::new(completion),
        AlertDispatcher::new(alert_sink),
        templates,
    ));
    info!("Job engine ready (model: {})", config.completion.model);

    // Register schedule triggers and start the scheduler
    let registry = Arc::new(
        ScheduleRegistry::new(pool.clone(), Arc::clone(&manager))
            .await
            .expect("Failed to create schedule registry"),
    );
    match registry.register_all().await {
        Ok(count) => info!("Registered {} schedule trigger(s)", count),
        Err(e) => error!("Failed to register schedule triggers: {}", e),
    }
    registry.start().await.expect("Failed to start scheduler");

    // Prepare shared state
    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let manager_data = web::Data::from(manager);
    let registry_data = web::Data::from(registry);
    let pool_data = web::Data::new(pool);

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
                .max_age(3600)
        };

        let mut app = App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            // Add request logging middleware
            .wrap(RequestLogger)
            // Add shared state
            .app_data(pool_data.clone())
            .app_data(manager_data.clone())
            .app_data(registry_data.clone())
            // Configure API routes
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_job_routes)
                    .configure(api::configure_schedule_routes),
            );

        // Swagger UI only in development
        if is_development {
            app = app.service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
            );
        }

        app
    })
    .workers(worker_count)
    .bind(&bind_address)?
    .run()
    .await
}
