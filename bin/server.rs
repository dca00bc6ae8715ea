// Contractor Registry Reconciliation - Web Server
// REST surface over the reconciliation engine

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use contractor_registry::{
    CompanyIdentifier, ContractorRecord, ContractorStore, DataGovClient, EngineConfig,
    ReconcileEngine, ReconcileError, ReconcileOptions,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<ReconcileEngine<DataGovClient>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Reconciliation response body
#[derive(Serialize)]
struct ReconcileResponse {
    record: ContractorRecord,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<String>,
}

#[derive(Deserialize, Default)]
struct ReconcileParams {
    #[serde(default)]
    force: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(format!(
        "contractor-registry {}",
        contractor_registry::VERSION
    )))
}

/// GET /api/contractors/:id - Persisted record lookup (no registry calls)
async fn get_contractor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match CompanyIdentifier::parse(&id) {
        Ok(id) => id,
        Err(reason) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<ContractorRecord>::err(reason.to_string())),
            )
                .into_response();
        }
    };

    match state.engine.store().get_by_identifier(&id) {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::ok(record))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<ContractorRecord>::err("no record for identifier")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "store lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ContractorRecord>::err(e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /api/contractors/:id/reconcile?force=true - Run the engine
async fn reconcile_contractor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ReconcileParams>,
) -> impl IntoResponse {
    let opts = ReconcileOptions {
        force_refresh: params.force,
        deadline: Some(std::time::Duration::from_secs(45)),
    };

    match state.engine.reconcile(&id, &opts).await {
        Ok(Some(result)) => (
            StatusCode::OK,
            Json(ApiResponse::ok(ReconcileResponse {
                outcome: result.outcome.as_str(),
                notice: result.notice,
                record: result.record,
            })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<ReconcileResponse>::err(
                "identifier not present in either registry",
            )),
        )
            .into_response(),
        Err(ReconcileError::InvalidIdentifier(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<ReconcileResponse>::err(reason.to_string())),
        )
            .into_response(),
        Err(err @ ReconcileError::LookupFailed { .. }) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::<ReconcileResponse>::err(err.to_string())),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "reconciliation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<ReconcileResponse>::err(err.to_string())),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contractor_registry=info,registry_server=info".into()),
        )
        .init();

    println!("🌐 Contractor Registry - Reconciliation Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let cfg = EngineConfig::from_env();

    let store = match ContractorStore::open(&cfg.db_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("❌ Failed to open store at {}: {}", cfg.db_path, e);
            std::process::exit(1);
        }
    };
    println!("✓ Store opened: {}", cfg.db_path);

    let client = match DataGovClient::new(cfg) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ Failed to build registry client: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        engine: Arc::new(ReconcileEngine::new(store, client)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/contractors/:id", get(get_contractor))
        .route("/contractors/:id/reconcile", post(reconcile_contractor))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   Health:    http://localhost:3000/api/health");
    println!("   Reconcile: POST http://localhost:3000/api/contractors/<id>/reconcile");
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
