use axum::{
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod allocation;
mod config;
mod db;
mod error;
mod handlers;
mod lesson_plan;
mod models;
mod reports;
mod sessions;

#[cfg(test)]
mod tests;

use config::Config;
use db::Database;
use lesson_plan::LessonPlanClient;

/// Classroom session API
/// Session reports are written once, when a session ends, and never edited
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    lesson_plans: LessonPlanClient,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Initialize state
    let state = AppState {
        db: Arc::new(Database::open(&config.database.path)?),
        lesson_plans: LessonPlanClient::new(&config.lesson_plan)?,
    };
    tracing::info!(
        database = %config.database.path.display(),
        lesson_plan_service = %config.lesson_plan.base_url,
        "state initialized"
    );

    // Run server
    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    tracing::info!(addr = %config.server.bind, "server listening");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/lesson-plans/allocate", post(handlers::allocate_plan))
        .route("/lesson-plans/generate", post(handlers::generate_plan))
        .route("/lesson-plans/:id", get(handlers::get_lesson_plan))
        .route(
            "/sessions",
            post(handlers::create_session).get(handlers::list_sessions),
        )
        .route("/sessions/:id", get(handlers::get_session))
        .route("/sessions/:id/start", post(handlers::start_session))
        .route("/sessions/:id/plan/:entry_id", put(handlers::update_plan_entry))
        .route("/sessions/:id/end", post(handlers::end_session))
        .route("/session-reports/:session_id", get(handlers::get_session_report))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> &'static str {
    "Classroom Session API v0.1.0"
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
