use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::assets::{SiteAsset, UnusedIcon};
use crate::auth::{password, TokenResponse};
use crate::db::models::{Page, User, ROOT_USER_ID};
use crate::db::{links, settings, users};
use crate::error::{AppError, AppResult};
use crate::extractors::AdminUser;
use crate::risk::{RiskLevel, RiskPolicy};
use crate::routes::auth::{authenticate, LoginForm};
use crate::routes::multipart::UploadForm;
use crate::routes::{paginate, PageQuery};
use crate::state::AppState;

const USERS_PAGE_SIZE: i64 = 10;
const LINKS_PAGE_SIZE: i64 = 7;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/login", post(admin_login))
        .route("/api/admin/config", get(get_config))
        .route("/api/admin/config/registration", post(set_registration))
        .route("/api/admin/config/site-info", post(update_site_info))
        .route("/api/admin/config/assets", post(replace_asset))
        .route(
            "/api/admin/config/risk-keywords",
            get(get_risk_keywords).post(set_risk_keywords),
        )
        .route(
            "/api/admin/config/custom-code",
            get(get_custom_code).post(save_custom_code),
        )
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{id}", axum::routing::delete(delete_user))
        .route("/api/admin/users/{id}/action", post(user_action))
        .route("/api/admin/users/{id}/reset-password", post(reset_password))
        .route("/api/admin/links", get(list_links))
        .route(
            "/api/admin/unused-icons",
            get(unused_icons).delete(delete_unused_icons),
        )
}

async fn admin_login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<TokenResponse>> {
    let user = authenticate(&state, &form)?
        .ok_or_else(|| AppError::unauthorized("Incorrect administrator credentials"))?;
    if !user.is_admin {
        return Err(AppError::forbidden("This account is not an administrator"));
    }
    if !user.is_active {
        return Err(AppError::forbidden("Account is disabled"));
    }
    Ok(Json(state.keys.issue(&user.username)?))
}

async fn get_config(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    Ok(Json(json!({
        "registration_open": settings::registration_open(&conn)?,
        "site_title": settings::get(&conn, settings::SITE_TITLE)?.unwrap_or_default(),
        "favicon_api": settings::get(&conn, settings::FAVICON_API)?.unwrap_or_default(),
    })))
}

#[derive(Deserialize)]
struct RegistrationParams {
    open: bool,
}

async fn set_registration(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(params): Query<RegistrationParams>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let value = if params.open { "true" } else { "false" };
    settings::set(&conn, settings::REGISTRATION_OPEN, value)?;
    tracing::info!(admin = %admin.username, open = params.open, "Registration toggled");
    Ok(Json(json!({ "status": "success", "registration_open": params.open })))
}

#[derive(Deserialize)]
struct SiteInfo {
    site_title: Option<String>,
    favicon_api: Option<String>,
}

async fn update_site_info(
    State(state): State<AppState>,
    _admin: AdminUser,
    Form(info): Form<SiteInfo>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let updates = [
        (settings::SITE_TITLE, info.site_title),
        (settings::FAVICON_API, info.favicon_api),
    ];
    for (key, value) in updates {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            settings::set(&conn, key, &value)?;
        }
    }
    Ok(Json(json!({ "msg": "Site info updated" })))
}

async fn replace_asset(
    State(state): State<AppState>,
    admin: AdminUser,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart).await?;
    let asset = form
        .field("asset_type")
        .and_then(SiteAsset::parse)
        .ok_or_else(|| AppError::bad_request("Unsupported asset type"))?;
    let file = form.require_file()?;
    if !file.is_image() {
        return Err(AppError::bad_request("Only images can be uploaded"));
    }

    let url = state.assets.replace_site_asset(asset, &file.bytes).await?;
    let version: [u8; 4] = rand::thread_rng().gen();
    tracing::info!(admin = %admin.username, "Replaced site asset {}", asset.file_name());

    Ok(Json(json!({
        "msg": format!("{} replaced", asset.file_name()),
        "url": format!("{}?v={}", url, hex::encode(version)),
    })))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<User>>> {
    let (page, size, offset) = paginate(&query, USERS_PAGE_SIZE);
    let conn = state.db.get()?;
    let (items, total) = users::search(&conn, query.q.as_deref().unwrap_or_default(), size, offset)?;
    Ok(Json(Page {
        items,
        total,
        page,
        size,
    }))
}

#[derive(Deserialize)]
struct ActionForm {
    action: String,
}

async fn user_action(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    Form(form): Form<ActionForm>,
) -> AppResult<Json<Value>> {
    if id == ROOT_USER_ID {
        return Err(AppError::forbidden(
            "The initial administrator cannot be modified",
        ));
    }
    let conn = state.db.get()?;
    let target = users::find_by_id(&conn, id)?.ok_or_else(|| AppError::not_found("User not found"))?;

    let action = form.action.as_str();
    if target.id == admin.id && matches!(action, "disable" | "unset_admin") {
        return Err(AppError::bad_request("You cannot do this to your own account"));
    }

    match action {
        "enable" => users::set_active(&conn, id, true)?,
        "disable" => users::set_active(&conn, id, false)?,
        "set_admin" => users::set_admin(&conn, id, true)?,
        "unset_admin" => users::set_admin(&conn, id, false)?,
        _ => return Err(AppError::bad_request("Unknown action")),
    }

    tracing::info!(admin = %admin.username, "Applied {} to user {}", action, target.username);
    Ok(Json(json!({ "msg": "Done" })))
}

#[derive(Deserialize)]
struct ResetPasswordForm {
    new_password: String,
}

async fn reset_password(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    Form(form): Form<ResetPasswordForm>,
) -> AppResult<Json<Value>> {
    if id == ROOT_USER_ID && !admin.is_root() {
        return Err(AppError::forbidden(
            "Only the initial administrator can change this password",
        ));
    }
    password::check_length(&form.new_password)?;

    let conn = state.db.get()?;
    let target = users::find_by_id(&conn, id)?.ok_or_else(|| AppError::not_found("User not found"))?;
    let hashed = password::hash_password(&form.new_password, state.config.auth.bcrypt_cost)?;
    users::set_password(&conn, id, &hashed)?;

    tracing::info!(admin = %admin.username, "Reset password of {}", target.username);
    Ok(Json(json!({
        "msg": format!("Password of {} has been reset", target.username)
    })))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    if id == ROOT_USER_ID {
        return Err(AppError::forbidden(
            "The initial administrator cannot be deleted",
        ));
    }
    let conn = state.db.get()?;
    let target = users::find_by_id(&conn, id)?.ok_or_else(|| AppError::not_found("User not found"))?;
    if target.id == admin.id {
        return Err(AppError::bad_request("You cannot delete your own account"));
    }
    users::delete(&conn, id)?;

    tracing::info!(admin = %admin.username, "Deleted user {}", target.username);
    Ok(Json(json!({ "msg": "User deleted" })))
}

#[derive(Serialize)]
struct ModeratedLink {
    id: i64,
    title: String,
    url: String,
    http_title: Option<String>,
    owner: String,
    risk_score: RiskLevel,
}

async fn list_links(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<ModeratedLink>>> {
    let (page, size, offset) = paginate(&query, LINKS_PAGE_SIZE);
    let conn = state.db.get()?;
    let policy = RiskPolicy::parse(
        &settings::get(&conn, settings::RISK_KEYWORDS)?.unwrap_or_default(),
    );
    let (rows, total) =
        links::search_with_owner(&conn, query.q.as_deref().unwrap_or_default(), size, offset)?;

    let items = rows
        .into_iter()
        .map(|row| ModeratedLink {
            risk_score: policy.classify(&row.title, &row.url, row.http_title.as_deref()),
            id: row.id,
            title: row.title,
            url: row.url,
            http_title: row.http_title,
            owner: row.owner,
        })
        .collect();

    Ok(Json(Page {
        items,
        total,
        page,
        size,
    }))
}

async fn get_risk_keywords(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let keywords = settings::get(&conn, settings::RISK_KEYWORDS)?.unwrap_or_default();
    Ok(Json(json!({ "keywords": keywords })))
}

#[derive(Deserialize)]
struct RiskKeywords {
    #[serde(default)]
    keywords: String,
}

async fn set_risk_keywords(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<RiskKeywords>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    settings::set(&conn, settings::RISK_KEYWORDS, &req.keywords)?;
    tracing::info!(admin = %admin.username, "Risk keyword policy updated");
    Ok(Json(json!({ "msg": "Risk policy saved" })))
}

async fn unused_icons(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<UnusedIcon>>> {
    let referenced = {
        let conn = state.db.get()?;
        links::referenced_icon_names(&conn)?
    };
    Ok(Json(state.assets.list_unused_icons(&referenced).await?))
}

#[derive(Deserialize)]
struct IconNames {
    #[serde(default)]
    filenames: Vec<String>,
}

async fn delete_unused_icons(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<IconNames>,
) -> AppResult<Json<Value>> {
    let removed = state.assets.delete_icons(&req.filenames).await;
    tracing::info!(admin = %admin.username, "Removed {} unused icons", removed);
    Ok(Json(json!({ "detail": format!("Removed {} unused files", removed) })))
}

async fn get_custom_code(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Map<String, Value>>> {
    let conn = state.db.get()?;
    let mut code = Map::new();
    for key in settings::CUSTOM_CODE_KEYS {
        if let Some(value) = settings::get(&conn, key)? {
            code.insert(key.to_string(), Value::String(value));
        }
    }
    Ok(Json(code))
}

#[derive(Deserialize)]
struct CustomCode {
    custom_styles: Option<String>,
    custom_scripts: Option<String>,
}

async fn save_custom_code(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(code): Json<CustomCode>,
) -> AppResult<Json<Value>> {
    if !admin.is_root() {
        return Err(AppError::forbidden(
            "Custom code injection is reserved for the initial administrator",
        ));
    }
    let conn = state.db.get()?;
    if let Some(styles) = &code.custom_styles {
        settings::set(&conn, settings::CUSTOM_STYLES, styles)?;
    }
    if let Some(scripts) = &code.custom_scripts {
        settings::set(&conn, settings::CUSTOM_SCRIPTS, scripts)?;
    }
    tracing::info!(admin = %admin.username, "Custom code saved");
    Ok(Json(json!({ "msg": "Saved" })))
}
