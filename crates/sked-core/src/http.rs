//! JSON API over axum.
//!
//! Routes mirror the task operations one to one; every handler resolves
//! "now" as the local calendar date at request time.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::datastore::StoreError;
use crate::datetime::{parse_compact_date, today};
use crate::service::{ServiceError, TaskService};
use crate::task::Task;

#[derive(Clone)]
pub struct ApiState {
    pub service: TaskService,
    pub list_limit: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextDateQuery {
    #[serde(default)]
    pub now: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub repeat: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(err) => Self::BadRequest(err.to_string()),
            ServiceError::Store(StoreError::NotFound { .. }) => {
                Self::NotFound("task not found".to_string())
            }
            ServiceError::Recurrence { .. } => {
                error!(error = %err, "stored repeat rule no longer evaluates");
                Self::Internal("failed to compute next date".to_string())
            }
            ServiceError::Store(_) => {
                error!(error = %err, "datastore failure");
                Self::Internal("internal server error".to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/nextdate", get(next_date_handler))
        .route(
            "/api/task",
            get(get_task_handler)
                .post(add_task_handler)
                .put(update_task_handler)
                .delete(delete_task_handler),
        )
        .route("/api/tasks", get(list_tasks_handler))
        .route("/api/task/done", post(complete_task_handler))
        .with_state(state)
}

pub async fn serve(service: TaskService, port: u16, list_limit: usize) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let app = router(ApiState {
        service,
        list_limit,
    });

    info!("task api listening on http://{local_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("task api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

// Store calls touch the filesystem, so they run off the async workers.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            error!(error = %err, "blocking task failed");
            Err(ApiError::Internal("internal server error".to_string()))
        }
    }
}

fn required_id(query: IdQuery) -> ApiResult<String> {
    query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("task id is required".to_string()))
}

fn json_body(payload: Result<Json<Task>, JsonRejection>) -> ApiResult<Task> {
    payload.map(|Json(task)| task).map_err(|rejection| {
        warn!(error = %rejection, "rejected task payload");
        ApiError::BadRequest("invalid JSON".to_string())
    })
}

pub async fn next_date_handler(
    State(state): State<ApiState>,
    Query(query): Query<NextDateQuery>,
) -> Response {
    let now = match query.now.as_deref().filter(|raw| !raw.is_empty()) {
        Some(raw) => match parse_compact_date(raw) {
            Ok(date) => date,
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid now format").into_response(),
        },
        None => today(),
    };

    match state.service.next_date(now, &query.date, &query.repeat) {
        Ok(next) => ([(header::CONTENT_TYPE, "text/plain")], next).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    }
}

pub async fn list_tasks_handler(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let service = state.service.clone();
    let limit = state.list_limit;
    let tasks = blocking(move || service.list_tasks(limit)).await?;
    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn get_task_handler(
    State(state): State<ApiState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<Task>> {
    let id = required_id(query)?;
    let service = state.service.clone();
    let task = blocking(move || service.get_task(&id)).await?;
    Ok(Json(task))
}

pub async fn add_task_handler(
    State(state): State<ApiState>,
    payload: Result<Json<Task>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = json_body(payload)?;
    let service = state.service.clone();
    let id = blocking(move || service.add_task(task, today())).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn update_task_handler(
    State(state): State<ApiState>,
    payload: Result<Json<Task>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = json_body(payload)?;
    let service = state.service.clone();
    blocking(move || service.update_task(task, today())).await?;
    Ok(Json(json!({})))
}

pub async fn delete_task_handler(
    State(state): State<ApiState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = required_id(query)?;
    let service = state.service.clone();
    blocking(move || service.delete_task(&id)).await?;
    Ok(Json(json!({})))
}

pub async fn complete_task_handler(
    State(state): State<ApiState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = required_id(query)?;
    let service = state.service.clone();
    blocking(move || service.complete_task(&id, today())).await?;
    Ok(Json(json!({})))
}
