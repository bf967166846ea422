use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use icmd_core::hierarchy::{self, HierarchyResponse};
use icmd_core::tag::{self, GeneratedTag, SavedTag, TagFieldValues, TagInfo, TagInput};
use icmd_core::{ApiResponse, ParentKind, ProjectData, Store};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

pub struct AppState {
    store: Store,
    /// Serialises read-modify-write cycles on project documents.
    writes: Mutex<()>,
}

impl AppState {
    pub fn new(store: Store) -> Arc<Self> {
        Arc::new(Self {
            store,
            writes: Mutex::new(()),
        })
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/Tag/GenerateTag", post(generate_tag))
        .route("/Tag/CreateOrEditTag", post(create_or_edit_tag))
        .route("/Tag/GetTag/:project_id/:id", get(get_tag))
        .route("/Tag/DeleteTag/:project_id/:id", delete(delete_tag))
        .route("/Hierarchy/GetHierarchyData", post(get_hierarchy_data))
        .route("/Hierarchy/SetParent", post(set_parent))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Errors ---

/// Store failures. Business failures never get here; they are `200`s with
/// `isSucceeded: false`.
#[derive(Debug)]
pub struct AppError(icmd_core::Error);

impl From<icmd_core::Error> for AppError {
    fn from(err: icmd_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            icmd_core::Error::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                error!(error = %self.0, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ApiResponse::<()>::failure(status.as_u16(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}

// --- Request types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTagRequest {
    pub project_id: Uuid,
    #[serde(flatten)]
    pub fields: TagFieldValues,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrEditTagRequest {
    pub project_id: Uuid,
    #[serde(flatten)]
    pub tag: TagInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyRequest {
    pub project_id: Uuid,
    #[serde(default = "default_option")]
    pub option: String,
    // The misspelling is part of the published API.
    #[serde(rename = "hieararchyType", alias = "hierarchyType")]
    pub hierarchy_type: String,
}

fn default_option() -> String {
    "All".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetParentRequest {
    pub project_id: Uuid,
    pub child_device_id: Uuid,
    #[serde(default)]
    pub parent_device_id: Option<Uuid>,
    /// Instrument parent when true, connection parent otherwise.
    #[serde(default)]
    pub instrument: bool,
}

// --- Handlers ---

/// Read a project, apply `op`, and write it back if `op` succeeded.
async fn update_project<T>(
    state: &AppState,
    project_id: Uuid,
    op: impl FnOnce(&mut ProjectData) -> ApiResponse<T>,
) -> Result<ApiResponse<T>, AppError> {
    let _guard = state.writes.lock().await;
    let mut data = state.store.read_project(project_id)?;
    let resp = op(&mut data);
    if resp.is_succeeded {
        state.store.write_project(&data)?;
    }
    Ok(resp)
}

async fn generate_tag(
    State(state): State<SharedState>,
    Json(req): Json<GenerateTagRequest>,
) -> Result<Json<ApiResponse<GeneratedTag>>, AppError> {
    let data = state.store.read_project(req.project_id)?;
    Ok(Json(tag::generate_tag(&data, &req.fields)))
}

async fn create_or_edit_tag(
    State(state): State<SharedState>,
    Json(req): Json<CreateOrEditTagRequest>,
) -> Result<Json<ApiResponse<SavedTag>>, AppError> {
    let input = req.tag;
    let resp = update_project(&state, req.project_id, |data| {
        tag::create_or_edit_tag(data, input)
    })
    .await?;
    Ok(Json(resp))
}

async fn get_tag(
    State(state): State<SharedState>,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<TagInfo>>, AppError> {
    let data = state.store.read_project(project_id)?;
    Ok(Json(tag::tag_info(&data, id)))
}

async fn delete_tag(
    State(state): State<SharedState>,
    Path((project_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let resp = update_project(&state, project_id, |data| tag::delete_tag(data, id)).await?;
    Ok(Json(resp))
}

async fn get_hierarchy_data(
    State(state): State<SharedState>,
    Json(req): Json<HierarchyRequest>,
) -> Result<Json<HierarchyResponse>, AppError> {
    let data = state.store.read_project(req.project_id)?;
    Ok(Json(hierarchy::get_hierarchy_data(
        &data,
        &req.option,
        &req.hierarchy_type,
    )))
}

async fn set_parent(
    State(state): State<SharedState>,
    Json(req): Json<SetParentRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let kind = ParentKind::from_instrument_flag(req.instrument);
    let resp = update_project(&state, req.project_id, |data| {
        hierarchy::set_device_parent(data, req.child_device_id, req.parent_device_id, kind)
    })
    .await?;
    Ok(Json(resp))
}
