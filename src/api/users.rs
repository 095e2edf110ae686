use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{self, CurrentUser};
use crate::error::Result;
use crate::identity;
use crate::models::{
    AccessToken, CreateUserRequest, LoginRequest, LoginResponse, RefreshRequest,
    UpdateUserRequest, User,
};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/token/refresh", post(refresh))
        .route("/users/me", get(me))
        .route("/users/admins", get(list_admins))
        .route("/users", get(list).post(create))
        .route("/users/:id", get(retrieve).patch(update).delete(destroy))
}

async fn login(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let Json(req) = payload?;
    let response = auth::login(&state.store, &state.tokens, &req.username, &req.password).await?;
    Ok(Json(response))
}

async fn logout(State(state): State<Arc<AppState>>, current: CurrentUser) -> Result<Json<Value>> {
    auth::logout(&state.store, current.session_id).await?;
    Ok(Json(json!({ "message": "Successfully logged out" })))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<AccessToken>> {
    let Json(req) = payload?;
    Ok(Json(auth::refresh(&state.store, &state.tokens, &req.refresh).await?))
}

async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

async fn list(State(state): State<Arc<AppState>>, current: CurrentUser) -> Result<Json<Vec<User>>> {
    Ok(Json(identity::list_users(&state.store, &current.user).await?))
}

async fn list_admins(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(identity::list_admins(&state.store, &current.user).await?))
}

async fn create(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    payload: std::result::Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>)> {
    let Json(req) = payload?;
    let user = identity::create_user(&state.store, &current.user, req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn retrieve(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<User>> {
    let Path(id) = path?;
    Ok(Json(identity::get_user(&state.store, &current.user, id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>> {
    let Path(id) = path?;
    let Json(req) = payload?;
    Ok(Json(identity::update_user(&state.store, &current.user, id, req).await?))
}

async fn destroy(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode> {
    let Path(id) = path?;
    identity::delete_user(&state.store, &current.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
