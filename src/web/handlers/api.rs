use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::marshal::ResponseEnvelope;
use crate::pipeline::{Disposition, TranslationRequest};
use crate::schema::SchemaDescription;
use crate::web::state::AppState;

// Request types

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GenerateSqlRequest {
    pub question: String,
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct QueryRequest {
    pub prompt: String,
    pub database_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HealthParams {
    pub test_llm: bool,
}

// Health

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub llm_configured: bool,
    pub database_configured: bool,
    pub schema_version: String,
    pub timestamp: String,
    pub uptime_seconds: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_test: Option<String>,
}

// API Implementations

pub async fn service_info() -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "schema": "/schema",
            "generate_sql": "/generate-sql (POST)",
            "query": "/query (POST)"
        }
    }))
}

pub async fn health(
    state: State<Arc<AppState>>,
    Query(params): Query<HealthParams>,
) -> Json<HealthStatus> {
    let pipeline = &state.pipeline;
    let now = chrono::Utc::now();

    let mut health = HealthStatus {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        llm_configured: pipeline.translator().is_configured(),
        database_configured: !pipeline.database_target().is_empty(),
        schema_version: pipeline.schema().version.clone(),
        timestamp: now.to_rfc3339(),
        uptime_seconds: now.signed_duration_since(state.startup_time).num_seconds(),
        llm_test: None,
    };

    if params.test_llm {
        match pipeline.translator().ping().await {
            Ok(()) => health.llm_test = Some("passed".to_string()),
            Err(e) => {
                warn!("LLM health check failed: {}", e);
                health.llm_test = Some(format!("failed: {}", e));
                health.status = "degraded";
            }
        }
    }

    Json(health)
}

pub async fn get_schema(state: State<Arc<AppState>>) -> Json<SchemaDescription> {
    Json(state.pipeline.schema().clone())
}

pub async fn generate_sql(
    state: State<Arc<AppState>>,
    Json(request): Json<GenerateSqlRequest>,
) -> (StatusCode, Json<ResponseEnvelope>) {
    answer(
        &state,
        TranslationRequest {
            question: request.question,
            database_target: request.database_url,
        },
    )
    .await
}

pub async fn query(
    state: State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> (StatusCode, Json<ResponseEnvelope>) {
    answer(
        &state,
        TranslationRequest {
            question: request.prompt,
            database_target: request.database_url,
        },
    )
    .await
}

async fn answer(state: &AppState, request: TranslationRequest) -> (StatusCode, Json<ResponseEnvelope>) {
    debug!("Request payload: {:?}", request);

    let response = state.pipeline.run(&request).await;
    let status = match response.disposition {
        Disposition::Answered => StatusCode::OK,
        Disposition::Rejected => StatusCode::BAD_REQUEST,
        Disposition::LlmUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        Disposition::ExecutionFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match &response.envelope.error {
        Some(e) if status.is_server_error() => error!("Question failed ({}): {}", status, e),
        Some(e) => info!("Question rejected: {}", e),
        None => {}
    }

    (status, Json(response.envelope))
}
