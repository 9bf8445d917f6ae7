//! HTTP API exposing the Template Store contract.
//!
//! Every response uses the store envelope: `{"success": true, "data": ...}`
//! or `{"success": false, "error": "message"}`.
//!
//! # Endpoints
//!
//! All routes are nested under `/api/certificates`.
//!
//! - `GET /templates` - List templates
//! - `POST /templates` - Create a template, optionally with courses
//! - `PUT /templates/:id` - Replace a template's fields
//! - `DELETE /templates/:id` - Delete a template and its assignments
//! - `POST /templates/:id/activate` - Make a template the default
//! - `POST /templates/:id/courses` - Activate a template for courses
//! - `GET /templates/:id/availability` - Course picker view
//! - `GET /templates/:id/preview` - Preview URL
//! - `POST /templates/:id/background` - Upload the background image
//! - `POST /templates/:id/signature` - Upload the signature image
//! - `GET /active` - The default template
//! - `GET /assignments` - Full assignment table
//! - `GET /courses` - Known courses
//! - `GET /courses/:id/template` - Resolve a course
//!
//! # Example
//!
//! ```no_run
//! use certify_engine::{create_router, AppState, Config, MemoryStore};
//!
//! # async fn example() {
//! let state = AppState::new(MemoryStore::empty(), Config::default());
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use certify_store::{
    AssetRef, Assignment, Course, CourseId, CourseRegistry, StoreEnvelope, StoreError, Template,
    TemplateFields, TemplateId, TemplateStore, UploadFile,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::activation::ActivationReport;
use crate::config::Config;
use crate::eligibility::CourseAvailability;
use crate::error::CertifyError;
use crate::lifecycle::{CreatedTemplate, DeletedTemplate, NewTemplate};
use crate::memory::MemoryStore;
use crate::resolver::Resolution;

// ============================================================================
// Request Types
// ============================================================================

/// Request body for the bulk activation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateCoursesRequest {
    /// Courses to activate the template for.
    pub course_ids: Vec<CourseId>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The authoritative store.
    pub store: MemoryStore,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Creates the state from a store and configuration.
    #[must_use]
    pub const fn new(store: MemoryStore, config: Config) -> Self {
        Self { store, config }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Store failure rendered as an error envelope.
#[derive(Debug)]
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self(error)
    }
}

impl From<CertifyError> for ApiError {
    fn from(error: CertifyError) -> Self {
        Self(error.into_store_error())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = Json(StoreEnvelope::<()>::err(self.0.message));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<StoreEnvelope<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(StoreEnvelope::ok(data)))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all certificate endpoints.
///
/// Routes live under `/api/certificates`, with permissive CORS and request
/// tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let certificate_routes = Router::new()
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/:id", put(update_template).delete(delete_template))
        .route("/templates/:id/activate", post(activate_template))
        .route("/templates/:id/courses", post(activate_for_courses))
        .route("/templates/:id/availability", get(availability))
        .route("/templates/:id/preview", get(preview))
        .route("/templates/:id/background", post(upload_background))
        .route("/templates/:id/signature", post(upload_signature))
        .route("/active", get(active_template))
        .route("/assignments", get(assignments))
        .route("/courses", get(courses))
        .route("/courses/:id/template", get(resolve_course));

    Router::new()
        .nest("/api/certificates", certificate_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_templates(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Template>> {
    ok(state.store.get_all().await?)
}

async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewTemplate>,
) -> Result<(StatusCode, Json<StoreEnvelope<CreatedTemplate>>), ApiError> {
    let created = state.store.shared().lock().await.create_template(request)?;
    info!(template_id = %created.template.id, "Template created via API");
    Ok((StatusCode::CREATED, Json(StoreEnvelope::ok(created))))
}

async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
    Json(fields): Json<TemplateFields>,
) -> ApiResult<Template> {
    ok(state.store.update(id, fields).await?)
}

async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
) -> ApiResult<DeletedTemplate> {
    let promote = state.config.promote_default_on_delete;
    let deleted = state.store.shared().lock().await.delete_template(id, promote)?;
    ok(deleted)
}

async fn activate_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
) -> ApiResult<Template> {
    ok(state.store.activate(id).await?)
}

async fn activate_for_courses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
    Json(request): Json<ActivateCoursesRequest>,
) -> ApiResult<ActivationReport> {
    let report = state
        .store
        .shared()
        .lock()
        .await
        .activate_for_courses(id, &request.course_ids)?;
    ok(report)
}

async fn availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
) -> ApiResult<Vec<CourseAvailability>> {
    ok(state.store.shared().lock().await.availability_for(id)?)
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
) -> ApiResult<String> {
    ok(state.store.get_preview(id).await?)
}

fn upload_from(headers: &HeaderMap, body: Bytes, fallback_name: &str) -> UploadFile {
    let file_name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback_name);
    let mut file = UploadFile::new(file_name, body.to_vec());
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        file.content_type = content_type.to_string();
    }
    file
}

async fn upload_background(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AssetRef> {
    let file = upload_from(&headers, body, "background");
    ok(state.store.upload_background(id, file).await?)
}

async fn upload_signature(
    State(state): State<Arc<AppState>>,
    Path(id): Path<TemplateId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<AssetRef> {
    let file = upload_from(&headers, body, "signature");
    ok(state.store.upload_signature(id, file).await?)
}

async fn active_template(State(state): State<Arc<AppState>>) -> ApiResult<Option<Template>> {
    ok(state.store.get_active().await?)
}

async fn assignments(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Assignment>> {
    ok(state.store.get_active_per_course().await?)
}

async fn courses(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Course>> {
    ok(state.store.get_all_courses().await?)
}

async fn resolve_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CourseId>,
) -> ApiResult<Resolution> {
    ok(state.store.shared().lock().await.resolve_detailed(id))
}
