use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::authz;
use crate::error::Result;
use crate::models::{CreateTaskRequest, Task, TaskPatch, TaskReport};
use crate::tasks;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list).post(create))
        .route("/tasks/:id", get(retrieve).patch(update).delete(destroy))
        .route("/tasks/:id/report", get(report))
}

async fn list(State(state): State<Arc<AppState>>, current: CurrentUser) -> Result<Json<Vec<Task>>> {
    Ok(Json(tasks::list_tasks(&state.store, &current.user).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    payload: std::result::Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>)> {
    let Json(req) = payload?;
    let task = tasks::create_task(&state.store, &current.user, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn retrieve(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Task>> {
    let Path(id) = path?;
    Ok(Json(tasks::get_task(&state.store, &current.user, id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<Task>> {
    let Path(id) = path?;
    let Json(patch) = payload?;
    Ok(Json(tasks::update_task(&state.store, &current.user, id, patch).await?))
}

async fn destroy(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode> {
    let Path(id) = path?;
    tasks::delete_task(&state.store, &current.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Completion report. Served to admins only.
async fn report(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<TaskReport>> {
    authz::require_admin(&current.user)?;
    let Path(id) = path?;
    Ok(Json(tasks::get_report(&state.store, &current.user, id).await?))
}
