use axum::http::StatusCode;
use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dataset::{CategoryTotal, ColumnStats, CorrelationMatrix, Dataset};
use crate::engine::run_turn;
use crate::models::LanguageModel;
use crate::session::{ChatMessage, Session};
use crate::settings::{
    GlobalConfigDefaults, RequestOverrides, SessionSettings, SessionSettingsPatch,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<Vec<Session>>>,
    pub global: Arc<GlobalConfigDefaults>,
    pub model: Arc<dyn LanguageModel>,
}

impl AppState {
    pub fn new(global: GlobalConfigDefaults, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
            global: Arc::new(global),
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub client_id: Option<String>,
    pub settings: Option<SessionSettings>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
}

async fn create_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Json<CreateSessionResponse> {
    let settings = body.settings.unwrap_or_default();
    let mut sessions = state.sessions.write().await;
    let session = Session::new(body.client_id, settings);
    let id = session.id;
    sessions.push(session);
    info!(session = %id, "session created");
    Json(CreateSessionResponse { id })
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Uuid>,
}

async fn list_sessions(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<ListSessionsResponse> {
    let sessions = state.sessions.read().await;
    let ids = sessions.iter().map(|s| s.id).collect();
    Json(ListSessionsResponse { sessions: ids })
}

async fn delete_session(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut sessions = state.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|s| s.id != id);
    if sessions.len() < before {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
struct SessionSettingsResponse {
    settings: SessionSettings,
}

async fn get_session_settings(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<SessionSettingsResponse>, StatusCode> {
    let sessions = state.sessions.read().await;
    if let Some(s) = sessions.iter().find(|s| s.id == id) {
        Ok(Json(SessionSettingsResponse { settings: s.settings.clone() }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn patch_session_settings(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
    Json(patch): Json<SessionSettingsPatch>,
) -> Result<Json<SessionSettingsResponse>, StatusCode> {
    let mut sessions = state.sessions.write().await;
    if let Some(s) = sessions.iter_mut().find(|s| s.id == id) {
        s.settings.apply_patch(patch);
        Ok(Json(SessionSettingsResponse { settings: s.settings.clone() }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub rows: usize,
    pub columns: Vec<String>,
}

async fn upload_dataset(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
    body: String,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;
    match Dataset::parse(body.as_bytes()) {
        Ok(dataset) => {
            let resp = UploadResponse {
                rows: dataset.row_count(),
                columns: dataset.columns().to_vec(),
            };
            info!(session = %id, rows = resp.rows, columns = resp.columns.len(), "dataset loaded");
            session.dataset = Some(dataset);
            Ok(Json(resp))
        }
        Err(e) => {
            warn!(session = %id, error = %e, "dataset upload rejected");
            Err((StatusCode::BAD_REQUEST, format!("Error reading CSV file: {e:#}")))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub rows: usize,
    pub correlation_available: bool,
    pub revenue_chart_available: bool,
}

fn with_dataset<T>(
    sessions: &[Session],
    id: Uuid,
    f: impl FnOnce(&Dataset) -> T,
) -> Result<T, (StatusCode, String)> {
    let session = sessions
        .iter()
        .find(|s| s.id == id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;
    let dataset = session
        .dataset
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "no dataset loaded".to_string()))?;
    Ok(f(dataset))
}

async fn dataset_summary(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<DatasetSummary>, (StatusCode, String)> {
    let sessions = state.sessions.read().await;
    let summary = with_dataset(&sessions, id, |ds| {
        let numeric_columns = ds.numeric_columns();
        DatasetSummary {
            columns: ds.columns().to_vec(),
            rows: ds.row_count(),
            correlation_available: numeric_columns.len() >= 2,
            revenue_chart_available: ds.has_column("Revenue") && ds.has_column("Product"),
            numeric_columns,
        }
    })?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    rows: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

async fn dataset_preview(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
    axum::extract::Query(query): axum::extract::Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>, (StatusCode, String)> {
    let n = query.rows.unwrap_or(10);
    let sessions = state.sessions.read().await;
    let preview = with_dataset(&sessions, id, |ds| PreviewResponse {
        columns: ds.columns().to_vec(),
        rows: ds.preview(n).to_vec(),
    })?;
    Ok(Json(preview))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: Vec<ColumnStats>,
}

async fn dataset_stats(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<StatsResponse>, (StatusCode, String)> {
    let sessions = state.sessions.read().await;
    let stats = with_dataset(&sessions, id, |ds| StatsResponse { stats: ds.describe() })?;
    Ok(Json(stats))
}

async fn dataset_correlation(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<CorrelationMatrix>, (StatusCode, String)> {
    let sessions = state.sessions.read().await;
    let matrix = with_dataset(&sessions, id, |ds| ds.correlation())?;
    match matrix {
        Some(m) => Ok(Json(m)),
        None => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Not enough numeric columns to create a correlation heatmap.".to_string(),
        )),
    }
}

#[derive(Debug, Serialize)]
pub struct RevenueResponse {
    pub items: Vec<CategoryTotal>,
}

async fn dataset_revenue(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<RevenueResponse>, (StatusCode, String)> {
    let sessions = state.sessions.read().await;
    let totals = with_dataset(&sessions, id, |ds| ds.category_totals("Product", "Revenue"))?;
    match totals {
        Some(items) => Ok(Json(RevenueResponse { items })),
        None => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "dataset has no Product and Revenue columns".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub content: String,
    pub overrides: Option<RequestOverrides>,
}

async fn chat(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatMessage>, (StatusCode, String)> {
    if body.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message content must not be empty".to_string()));
    }
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;
    if session.dataset.is_none() {
        return Err((
            StatusCode::CONFLICT,
            "Please upload a CSV file before chatting.".to_string(),
        ));
    }
    let reply = run_turn(
        session,
        state.model.as_ref(),
        &state.global,
        body.content,
        body.overrides.unwrap_or_default(),
    )
    .await;
    Ok(Json(reply))
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub messages: Vec<ChatMessage>,
}

async fn list_messages(
    axum::extract::State(state): axum::extract::State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> Result<Json<TranscriptResponse>, StatusCode> {
    let sessions = state.sessions.read().await;
    if let Some(s) = sessions.iter().find(|s| s.id == id) {
        Ok(Json(TranscriptResponse { messages: s.conversation.snapshot().to_vec() }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route("/v1/sessions/:id", delete(delete_session))
        .route(
            "/v1/sessions/:id/settings",
            get(get_session_settings).patch(patch_session_settings),
        )
        .route("/v1/sessions/:id/dataset", put(upload_dataset).get(dataset_summary))
        .route("/v1/sessions/:id/dataset/preview", get(dataset_preview))
        .route("/v1/sessions/:id/dataset/stats", get(dataset_stats))
        .route("/v1/sessions/:id/dataset/correlation", get(dataset_correlation))
        .route("/v1/sessions/:id/dataset/revenue", get(dataset_revenue))
        .route("/v1/sessions/:id/chat", post(chat))
        .route("/v1/sessions/:id/messages", get(list_messages))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
