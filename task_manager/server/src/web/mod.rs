use axum::Router;
use axum::http::header;
use migration::MigratorTrait;
use sea_orm::Database;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::task::TaskState;
use crate::task::api::v1::create_task_router;
use crate::task::report::spawn_pending_report;

pub mod api;

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let task_state = Arc::new(TaskState::new(db));

    let cancel = CancellationToken::new();
    let pending_report = config
        .pending_report_enabled
        .then(|| spawn_pending_report(task_state.service.clone(), cancel.clone()));

    let app = create_app(task_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(pending_report) = pending_report {
        pending_report.await?;
    }
    tracing::info!("Web server stopped");
    Ok(())
}

/// Builds the application router: task routes, API docs and health check.
pub fn create_app(task_state: Arc<TaskState>) -> Router {
    Router::new()
        .merge(create_task_router(task_state))
        .merge(api::create_api_router())
        .route("/health", axum::routing::get(health_check_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Lets browser clients read the export file name.
                .layer(CorsLayer::new().expose_headers([header::CONTENT_DISPOSITION])),
        )
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
