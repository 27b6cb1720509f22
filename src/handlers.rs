use crate::accumulator::{self, DashboardSnapshot, SessionStore};
use crate::analytics::{self, EnergyAnalytics};
use crate::config::Config;
use crate::errors::AppError;
use crate::export;
use crate::models::*;
use crate::provider_store::{ProviderStore, ResolvedProvider};
use crate::services::InferenceService;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Prompt building and provider dispatch.
    pub inference: InferenceService,
    /// Persisted provider selection.
    pub providers: ProviderStore,
    /// Dashboard sessions (lead list, in-flight guards, chat history).
    pub sessions: SessionStore,
}

impl AppState {
    /// Resolves the provider to use for one request from a fresh snapshot.
    async fn resolve_provider(&self) -> Result<ResolvedProvider, AppError> {
        let snapshot = self.providers.snapshot().await;
        ResolvedProvider::resolve(&snapshot, &self.config.gemini_api_key)
    }
}

/// Runs an operation on its own task so that a client hanging up mid-call
/// cannot leave a session guard set.
async fn spawn_operation<T, F>(operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| AppError::InternalError(format!("Operation task failed: {}", e)))?
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lombardy-energy-leads",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/provinces
pub async fn list_provinces() -> Json<Vec<&'static str>> {
    Json(Province::ALL.iter().map(Province::display_name).collect())
}

// ============ Provider config ============

/// GET /api/v1/config
///
/// Returns the active provider. The stored key is masked.
pub async fn get_provider_config(State(state): State<Arc<AppState>>) -> Json<ProviderConfigView> {
    let config = state.providers.snapshot().await;
    Json(ProviderConfigView::from(&config))
}

/// PUT /api/v1/config
///
/// Switches provider and optionally replaces the stored key. Takes effect
/// for the next request; calls already in flight keep their provider.
pub async fn put_provider_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ProviderConfigUpdate>,
) -> Result<Json<ProviderConfigView>, AppError> {
    tracing::info!("PUT /config - provider: {}", update.provider);

    let current = state.providers.snapshot().await;
    let saved = state.providers.save(update.apply_to(&current)).await?;

    if saved.provider == ProviderKind::Cerebras && saved.api_key.is_empty() {
        tracing::warn!("Cerebras selected without an API key; requests will be rejected");
    }

    Ok(Json(ProviderConfigView::from(&saved)))
}

// ============ Sessions ============

/// POST /api/v1/sessions
///
/// Opens an empty dashboard session. Sessions expire after a period of
/// inactivity.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DashboardSnapshot>) {
    let session = state.sessions.create().await;
    let snapshot = session.lock().await.snapshot();
    (StatusCode::CREATED, Json(snapshot))
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot))
}

/// POST /api/v1/sessions/:id/search
///
/// Primary search: clears the list, asks the active provider for a fresh
/// batch of leads for the given province/city and replaces the list with it.
///
/// # Returns
///
/// * `409 Conflict` if a primary search is already running on this session.
/// * `429` / `401` / `502` when the provider fails; the error is also kept
///   as the session notice.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    let filters = request.into_filters();
    tracing::info!(
        "POST /sessions/{}/search - {} ({})",
        id,
        filters.city,
        filters.province
    );

    let session = state.sessions.get(id).await?;
    let provider = state.resolve_provider().await?;

    let snapshot = spawn_operation(accumulator::run_search(
        session,
        state.inference.clone(),
        provider,
        filters,
    ))
    .await?;

    Ok(Json(snapshot))
}

/// POST /api/v1/sessions/:id/more
///
/// Appends another batch for the last filters, excluding every company
/// already in the list. Does nothing when no search was run yet or another
/// follow-up is in flight; provider errors only surface when a follow-up
/// runs.
pub async fn search_more(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!("POST /sessions/{}/more", id);

    let session = state.sessions.get(id).await?;
    let provider = state.resolve_provider().await;

    let (outcome, snapshot) = spawn_operation(accumulator::run_more(
        session,
        state.inference.clone(),
        provider,
    ))
    .await?;

    Ok(Json(json!({
        "result": outcome,
        "session": snapshot,
    })))
}

/// POST /api/v1/sessions/:id/raw
///
/// Extracts companies from pasted free text and replaces the list.
pub async fn process_raw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RawDataRequest>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    tracing::info!("POST /sessions/{}/raw - {} chars", id, request.text.len());

    let session = state.sessions.get(id).await?;
    let provider = state.resolve_provider().await?;

    let snapshot = spawn_operation(accumulator::run_raw(
        session,
        state.inference.clone(),
        provider,
        request.text,
    ))
    .await?;

    Ok(Json(snapshot))
}

/// GET /api/v1/sessions/:id/analytics
pub async fn session_analytics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EnergyAnalytics>, AppError> {
    let session = state.sessions.get(id).await?;
    let guard = session.lock().await;
    Ok(Json(analytics::summarize(guard.companies())))
}

/// GET /api/v1/sessions/:id/export.csv
///
/// Downloads the current list as CSV, named after the last searched city.
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let session = state.sessions.get(id).await?;
    let (body, filename) = {
        let guard = session.lock().await;
        (
            export::companies_to_csv(guard.companies()),
            export::export_filename(guard.last_filters()),
        )
    };

    tracing::info!("Exporting session {} as {}", id, filename);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, export::content_disposition(&filename)),
        ],
        body,
    )
        .into_response())
}

// ============ Chat ============

/// GET /api/v1/sessions/:id/chat
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let session = state.sessions.get(id).await?;
    let history = session.lock().await.chat_history().to_vec();
    Ok(Json(history))
}

/// POST /api/v1/sessions/:id/chat
///
/// Sends one message to the assistant and returns its reply. With Gemini
/// the answer is grounded on web search and carries its sources.
pub async fn send_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatMessage>, AppError> {
    tracing::info!("POST /sessions/{}/chat", id);

    let session = state.sessions.get(id).await?;
    let provider = state.resolve_provider().await?;

    let reply = spawn_operation(accumulator::run_chat(
        session,
        state.inference.clone(),
        provider,
        request.message,
    ))
    .await?;

    Ok(Json(reply))
}
