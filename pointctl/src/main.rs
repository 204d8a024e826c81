mod api;
mod auth;
mod config;
mod db;
mod errors;
mod openapi;
mod sweep;
mod types;
mod urlcheck;
mod workflow;

#[cfg(test)]
mod test_utils;

use crate::{
    api::models::users::Role,
    config::{Args, Config},
    db::handlers::users as user_handlers,
    db::models::users::UserCreateDBRequest,
    openapi::ApiDoc,
    urlcheck::{HttpUrlChecker, ReviewUrlChecker},
};
use axum::{
    http::{HeaderValue, Request, Response},
    routing::{get, post, put},
    Router,
};
use bon::Builder;
use clap::Parser;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, instrument, warn, Span};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

pub use types::{PlaceId, ReviewId, TransactionId, UserId};

#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub url_checker: Arc<dyn ReviewUrlChecker>,
}

/// Create the bootstrap admin user if it doesn't exist
pub async fn create_initial_admin_user(username: &str, db: &PgPool) -> Result<UserId, errors::Error> {
    let mut tx = db.begin().await.map_err(db::errors::DbError::from)?;

    if let Some(existing) = user_handlers::get_user_by_username(&mut tx, username).await? {
        tx.commit().await.map_err(db::errors::DbError::from)?;
        return Ok(existing.id);
    }

    let created = user_handlers::create_user(
        &mut tx,
        UserCreateDBRequest {
            username: username.to_string(),
            role: Role::Admin,
        },
    )
    .await?;
    tx.commit().await.map_err(db::errors::DbError::from)?;
    info!(username, "created bootstrap admin user");
    Ok(created.id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}

#[instrument(skip(state))]
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Review lifecycle
        .route("/places/{place_id}/reviews", post(api::handlers::reviews::submit_reviews))
        .route("/places/{place_id}/reviews", get(api::handlers::reviews::list_place_reviews))
        .route("/reviews/{id}", get(api::handlers::reviews::get_review))
        .route("/reviews/{id}/approve", post(api::handlers::reviews::approve_review))
        .route("/reviews/{id}/reject", post(api::handlers::reviews::reject_review))
        .route("/reviews/{id}/cancel", post(api::handlers::reviews::cancel_review))
        .route("/reviews/{id}/resubmit", post(api::handlers::reviews::resubmit_review))
        // Publication tracking
        .route("/reviews/{id}/url", put(api::handlers::reviews::register_review_url))
        .route("/reviews/{id}/url-check", post(api::handlers::reviews::check_review_url))
        .route("/reviews/{id}/delete-requests", post(api::handlers::reviews::create_delete_request))
        .route(
            "/reviews/{id}/delete-requests/approve",
            post(api::handlers::reviews::approve_delete_request),
        )
        .route(
            "/reviews/{id}/delete-requests/reject",
            post(api::handlers::reviews::reject_delete_request),
        )
        // Ledger
        .route("/balances/{user_id}", get(api::handlers::balances::get_balance))
        .route("/transactions", post(api::handlers::transactions::create_adjustment))
        .route("/transactions", get(api::handlers::transactions::list_transactions))
        .route("/transactions/{transaction_id}", get(api::handlers::transactions::get_transaction))
        // Maintenance
        .route("/sweeps/auto-refund", post(api::handlers::sweeps::run_auto_refund))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = %response.status(),
                        latency = ?latency,
                        "request completed"
                    );
                }),
        )
        .with_state(state.clone());

    let cors_layer = create_cors_layer(&state.config);

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/admin/api/v1", api_routes)
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/admin/docs"))
        .layer(cors_layer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args
    let args = Args::parse();
    debug!("{:?}", args);

    // Load configuration
    let config = Config::load(&args)?;
    debug!("Starting with configuration: {:#?}", config);

    let pool = PgPool::connect(&config.database_url).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Bootstrap admin account
    create_initial_admin_user(&config.admin_username, &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {e}"))?;

    // Background auto-refund sweep. Replicas coordinate through an advisory
    // lock, so every instance can run the daemon.
    if config.sweep.enabled {
        let sweep_pool = pool.clone();
        let sweep_config = config.sweep.clone();
        tokio::spawn(async move {
            sweep::sweep_daemon(sweep_pool, sweep_config).await;
        });
        info!(interval = ?config.sweep.interval, "auto-refund sweep daemon started");
    }

    let url_checker = Arc::new(HttpUrlChecker::new(config.url_check.timeout)?);
    let state = AppState::builder().db(pool).config(config.clone()).url_checker(url_checker).build();
    let router = build_router(state);

    let bind_addr = config.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("pointctl listening on http://{bind_addr}");

    // Run the server with graceful shutdown
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
