use axum::extract::{Multipart, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::assets::is_uploaded_background;
use crate::auth::{password, TokenResponse};
use crate::db::models::{User, DEFAULT_BACKGROUND};
use crate::db::{groups, settings, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::multipart::UploadForm;
use crate::state::AppState;

const DEFAULT_GROUP_NAME: &str = "Default";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/user/me", get(me).put(update_me))
        .route("/api/upload-bg", post(upload_background))
        .route("/api/user/background", post(upload_background))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<Value>> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("Username is required"));
    }
    password::check_complexity(&req.password)?;
    let hashed = password::hash_password(&req.password, state.config.auth.bcrypt_cost)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = users::count(&tx)?;
    if existing > 0 && !settings::registration_open(&tx)? {
        return Err(AppError::forbidden("Registration is closed"));
    }
    if users::find_by_username(&tx, username)?.is_some() {
        return Err(AppError::bad_request("Username is already taken"));
    }

    let is_admin = existing == 0;
    let user_id = users::insert(&tx, username, &hashed, is_admin, Some(DEFAULT_BACKGROUND))?;
    groups::create(&tx, user_id, DEFAULT_GROUP_NAME)?;
    tx.commit()?;

    tracing::info!(user_id, is_admin, "Registered user {}", username);
    Ok(Json(json!({ "msg": "Registered with a default group" })))
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Checks credentials. `None` means unknown user or wrong password.
pub(crate) fn authenticate(state: &AppState, form: &LoginForm) -> AppResult<Option<User>> {
    let conn = state.db.get()?;
    let user = users::find_by_username(&conn, &form.username)?
        .filter(|u| password::verify_password(&form.password, &u.hashed_password));
    Ok(user)
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<TokenResponse>> {
    let user = authenticate(&state, &form)?
        .ok_or_else(|| AppError::bad_request("Incorrect username or password"))?;
    if !user.is_active {
        return Err(AppError::forbidden("Account is disabled"));
    }
    Ok(Json(state.keys.issue(&user.username)?))
}

async fn me(user: CurrentUser) -> Json<User> {
    Json(user.0)
}

#[derive(Deserialize)]
struct ProfileUpdate {
    custom_bg: Option<String>,
    hidden_groups: Option<String>,
}

async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<User>> {
    if let Some(bg) = &update.custom_bg {
        if is_uploaded_background(bg) && user.custom_bg.as_deref() != Some(bg.as_str()) {
            return Err(AppError::bad_request("Backgrounds must be uploaded"));
        }
    }

    let conn = state.db.get()?;
    if let Some(bg) = &update.custom_bg {
        users::set_custom_bg(&conn, user.id, Some(bg))?;
    }
    if let Some(hidden) = &update.hidden_groups {
        users::set_hidden_groups(&conn, user.id, hidden)?;
    }
    let refreshed = users::find_by_id(&conn, user.id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(refreshed))
}

async fn upload_background(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    if !file.is_image() {
        return Err(AppError::bad_request("Only images can be uploaded"));
    }

    let url = state
        .assets
        .save_background(&file.bytes, &file.extension())
        .await?;
    let stale = {
        let conn = state.db.get()?;
        users::set_custom_bg(&conn, user.id, Some(&url))?;
        match user.custom_bg.as_deref() {
            Some(previous) if !users::background_in_use(&conn, previous)? => {
                Some(previous.to_string())
            }
            _ => None,
        }
    };
    if let Some(previous) = stale {
        state.assets.remove_background(&previous).await;
    }

    Ok(Json(json!({ "msg": "Background updated", "url": url })))
}
