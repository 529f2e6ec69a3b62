use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::password;
use crate::db::models::DEFAULT_BACKGROUND;
use crate::db::{groups, settings, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const INIT_GROUP_NAME: &str = "Favorites";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/system/config", get(public_config))
        .route("/api/system/status", get(status))
        .route("/api/system/init", post(init_admin))
}

async fn public_config(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    Ok(Json(json!(settings::all(&conn)?)))
}

async fn status(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let initialized = users::admin_exists(&conn)?;
    Ok(Json(json!({
        "is_initialized": initialized,
        "status": "running",
    })))
}

#[derive(Deserialize)]
struct InitParams {
    username: String,
    password: String,
}

/// First-run setup: creates the administrator while none exists.
async fn init_admin(
    State(state): State<AppState>,
    Query(params): Query<InitParams>,
) -> AppResult<Json<Value>> {
    let username = params.username.trim();
    if username.is_empty() {
        return Err(AppError::bad_request("Username is required"));
    }
    password::check_complexity(&params.password)?;
    let hashed = password::hash_password(&params.password, state.config.auth.bcrypt_cost)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if users::admin_exists(&tx)? {
        return Err(AppError::bad_request("System is already initialized"));
    }
    if users::find_by_username(&tx, username)?.is_some() {
        return Err(AppError::bad_request("Username is already taken"));
    }

    let user_id = users::insert(&tx, username, &hashed, true, Some(DEFAULT_BACKGROUND))?;
    groups::create(&tx, user_id, INIT_GROUP_NAME)?;
    tx.commit()?;

    tracing::info!("Initialized administrator {} (id {})", username, user_id);
    Ok(Json(json!({ "msg": "Initialization complete" })))
}
