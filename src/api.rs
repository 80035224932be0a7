//! REST API for the Mint Service
//!
//! Thin HTTP surface over the mint service:
//! - GET  /api/mint   - payment-request metadata (label, icon)
//! - POST /api/mint   - build a partially signed mint transaction;
//!                      with a `reference` query, a payable mint
//! - GET  /api/health - health check
//!
//! All logic lives in the service; handlers only parse, dispatch and map
//! errors to status codes.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::common::LeafmintError;
use crate::service::MintService;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MintQuery {
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MintResponse {
    pub transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LabelResponse {
    pub label: String,
    pub icon: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
}

// =============================================================================
// Application State
// =============================================================================

pub type AppState = Arc<MintService>;

// =============================================================================
// API Handlers
// =============================================================================

/// GET /api/mint
///
/// Payment-request metadata shown by wallets before they POST back.
async fn handle_mint_label(State(service): State<AppState>) -> impl IntoResponse {
    Json(LabelResponse {
        label: service.label().to_string(),
        icon: service.icon().to_string(),
    })
}

/// POST /api/mint?reference=<marker>
///
/// Build a partially signed mint transaction for the posted account. With
/// a reference marker, the transaction also becomes locatable by the
/// payment watcher and a wallet-facing message is included.
async fn handle_mint(
    State(service): State<AppState>,
    Query(query): Query<MintQuery>,
    Json(request): Json<MintRequest>,
) -> impl IntoResponse {
    let account = request.account.as_deref();

    let result = match query.reference.as_deref() {
        Some(reference) => service
            .build_payable_mint_transaction(account, Some(reference))
            .await
            .map(|payable| MintResponse {
                transaction: payable.transaction,
                message: Some(payable.message),
            }),
        None => service
            .build_mint_transaction(account)
            .await
            .map(|transaction| MintResponse {
                transaction,
                message: None,
            }),
    };

    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => error_response(error),
    }
}

/// GET /api/health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "leafmint-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn error_response(error: LeafmintError) -> axum::response::Response {
    let status = if error.is_validation() {
        StatusCode::BAD_REQUEST
    } else if matches!(
        error,
        LeafmintError::Rpc(_) | LeafmintError::Provider(_)
    ) {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(%error, "mint request failed");
    } else {
        tracing::warn!(%error, code = error.error_code(), "mint request rejected");
    }

    let body = ErrorResponse {
        error: error.to_string(),
        code: error.error_code(),
        retryable: error.is_retryable(),
    };
    (status, Json(body)).into_response()
}

// =============================================================================
// Router Setup
// =============================================================================

/// Create the API router with all endpoints
pub fn create_router(service: MintService) -> Router {
    let state: AppState = Arc::new(service);

    // CORS configuration - wallets and the frontend POST from anywhere
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/mint", get(handle_mint_label).post(handle_mint))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(service: MintService, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(service);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== leafmint API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  GET  /api/mint    - Payment-request metadata");
    println!("  POST /api/mint    - Build mint transaction");
    println!("  GET  /api/health  - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================
