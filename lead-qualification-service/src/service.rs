use anyhow::Context as _;
use axum::{
    Router,
    extract::{Path, Request, State, rejection::JsonRejection},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use lead_flow::{
    BlobStorage, ConversationEngine, ConversationStorage, FlowError, InMemoryBlobStorage,
    InMemoryStorage, LeadFlowRunner, LeadStorage, PostgresStorage, RestStorage,
    SampleContractorMatcher, StepTable,
};
use serde::Serialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    config::{Backend, ServiceConfig},
    models::{ChatTurnRequest, PhotoUploadRequest, QualifyLeadRequest, SessionResponse},
};

const CORRELATION_ID: &str = "x-correlation-id";

/// Failure returned by every handler as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(FlowError::InvalidPayload(rejection.body_text()))
    }
}

pub fn status_for(err: &FlowError) -> StatusCode {
    match err {
        FlowError::MissingRequiredField(_) | FlowError::InvalidPayload(_) => {
            StatusCode::BAD_REQUEST
        }
        FlowError::UnknownStep(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::ConversationCompleted(_) => StatusCode::CONFLICT,
        FlowError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        FlowError::InvalidStepTable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        FlowError::UpstreamPersistenceFailure(_) | FlowError::UpstreamStorageFailure(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        error!(code = self.0.code(), status = %status, error = %self.0, "Request failed");
        (
            status,
            Json(json!({
                "error": {
                    "code": self.0.code(),
                    "message": self.0.to_string(),
                }
            })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn data<T: Serialize>(payload: T) -> ApiResult {
    let value = serde_json::to_value(payload).map_err(FlowError::from)?;
    Ok(Json(json!({ "data": value })))
}

#[derive(Clone)]
pub struct AppState {
    pub runner: LeadFlowRunner,
}

impl AppState {
    /// Everything in memory, with the built-in step table.
    pub fn in_memory(photo_bucket: &str) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        Self {
            runner: LeadFlowRunner::new(
                ConversationEngine::default(),
                storage.clone(),
                storage,
                Arc::new(InMemoryBlobStorage::new(photo_bucket)),
                Arc::new(SampleContractorMatcher::new()),
            ),
        }
    }
}

pub async fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let app_state = create_app_state(config).await?;
    Ok(build_router(app_state))
}

async fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let engine = ConversationEngine::new(load_step_table(config)?);

    let (conversations, leads, blobs): (
        Arc<dyn ConversationStorage>,
        Arc<dyn LeadStorage>,
        Arc<dyn BlobStorage>,
    ) = match &config.backend {
        Backend::Hosted { url, service_key } => {
            info!(url = %url, bucket = %config.photo_bucket, "Using hosted REST storage");
            let storage = Arc::new(RestStorage::new(
                url.as_str(),
                service_key.as_str(),
                config.photo_bucket.as_str(),
            ));
            (storage.clone(), storage.clone(), storage)
        }
        Backend::Postgres { database_url } => {
            info!("Using PostgreSQL storage");
            let storage = Arc::new(
                PostgresStorage::connect(database_url)
                    .await
                    .context("Failed to connect to PostgreSQL")?,
            );
            warn!("Photos are kept in memory when only DATABASE_URL is configured");
            (
                storage.clone(),
                storage,
                Arc::new(InMemoryBlobStorage::new(config.photo_bucket.as_str())),
            )
        }
        Backend::InMemory => {
            info!("Using in-memory storage (set SUPABASE_URL or DATABASE_URL to persist leads)");
            let storage = Arc::new(InMemoryStorage::new());
            (
                storage.clone(),
                storage,
                Arc::new(InMemoryBlobStorage::new(config.photo_bucket.as_str())),
            )
        }
    };

    Ok(AppState {
        runner: LeadFlowRunner::new(
            engine,
            conversations,
            leads,
            blobs,
            Arc::new(SampleContractorMatcher::new()),
        ),
    })
}

fn load_step_table(config: &ServiceConfig) -> anyhow::Result<Arc<StepTable>> {
    match &config.step_table_path {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read step table from {path}"))?;
            let table = StepTable::from_yaml_str(&yaml)
                .with_context(|| format!("Invalid step table in {path}"))?;
            info!(path = %path, steps = table.len(), "Loaded step table override");
            Ok(Arc::new(table))
        }
        None => Ok(StepTable::standard()),
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            HeaderName::from_static("content-type"),
        ])
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .max_age(Duration::from_secs(86400))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(start_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/chatbot-conversation", post(chatbot_conversation))
        .route("/lead-qualification", post(lead_qualification))
        .route("/photo-upload", post(photo_upload))
        .layer(from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(app_state)
}

/// Tag the request with a fresh correlation id and run it inside a span
/// carrying that id.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header_value {
        request.headers_mut().insert(CORRELATION_ID, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(CORRELATION_ID, value);
    }
    response
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn start_session(State(state): State<AppState>) -> ApiResult {
    let record = state.runner.start_session().await?;
    data(SessionResponse::from(record))
}

async fn get_session(State(state): State<AppState>, Path(session_id): Path<String>) -> ApiResult {
    let record = state.runner.get_session(&session_id).await?;
    data(SessionResponse::from(record))
}

async fn chatbot_conversation(
    State(state): State<AppState>,
    payload: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;

    if let Some(echoed) = request.current_step.as_deref() {
        let stored = state.runner.get_session(&request.session_id).await?;
        if stored.current_step != echoed {
            warn!(
                session_id = %request.session_id,
                echoed_step = %echoed,
                stored_step = %stored.current_step,
                "Client step differs from stored step, using stored step"
            );
        }
    }
    if request.conversation_data.is_some() {
        info!(
            session_id = %request.session_id,
            "Ignoring client-supplied conversation data"
        );
    }

    let outcome = state
        .runner
        .take_turn(&request.session_id, &request.user_message)
        .await?;
    data(outcome)
}

async fn lead_qualification(
    State(state): State<AppState>,
    payload: Result<Json<QualifyLeadRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let outcome = state
        .runner
        .qualify_lead(&request.session_id, request.lead_data)
        .await?;
    data(outcome)
}

async fn photo_upload(
    State(state): State<AppState>,
    payload: Result<Json<PhotoUploadRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    if request.image_data.trim().is_empty() {
        return Err(FlowError::MissingRequiredField("imageData".to_string()).into());
    }
    let upload = state
        .runner
        .upload_photo(&request.session_id, &request.image_data, &request.file_name)
        .await?;
    data(upload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_maps_to_its_status() {
        let cases = [
            (FlowError::MissingRequiredField("x".into()), 400),
            (FlowError::InvalidPayload("x".into()), 400),
            (FlowError::UnknownStep("x".into()), 422),
            (FlowError::ConversationCompleted("x".into()), 409),
            (FlowError::SessionNotFound("x".into()), 404),
            (FlowError::InvalidStepTable("x".into()), 500),
            (FlowError::UpstreamPersistenceFailure("x".into()), 502),
            (FlowError::UpstreamStorageFailure("x".into()), 502),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).as_u16(), status, "{err}");
        }
    }
}
