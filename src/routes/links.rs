use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::{Form, Json, Router};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::links::{self, NewLink};
use crate::db::models::{Link, User, PUBLIC_GROUP_ID};
use crate::db::groups;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::fetch::icon_extension;
use crate::routes::groups::can_edit_group;
use crate::routes::multipart::UploadForm;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/links", get(list_links).post(create_link))
        .route("/api/links/", get(list_links).post(create_link))
        .route("/api/links/upload-icon", post(upload_icon))
        .route("/api/links/download-icon", post(download_icon))
        .route("/api/links/reorder", put(reorder_links))
        .route("/api/links/{id}/move", put(move_link))
        .route("/api/links/{id}", delete(delete_link))
}

fn can_edit_link(user: &User, link: &Link, owner_id: i64) -> bool {
    owner_id == user.id || (link.group_id == PUBLIC_GROUP_ID && user.is_root())
}

/// Loads a link the caller may edit: 404 if missing, 403 if not theirs.
fn editable_link(conn: &Connection, user: &User, id: i64) -> AppResult<Link> {
    let (link, owner) =
        links::find_with_owner(conn, id)?.ok_or_else(|| AppError::not_found("Link not found"))?;
    if !can_edit_link(user, &link, owner) {
        return Err(AppError::forbidden("You cannot modify this link"));
    }
    Ok(link)
}

/// Rejects writes into a group the caller does not control.
fn check_target_group(conn: &Connection, user: &User, group_id: i64) -> AppResult<()> {
    if group_id == PUBLIC_GROUP_ID && !user.is_root() {
        return Err(AppError::forbidden("The public group is read-only"));
    }
    match groups::find(conn, group_id)? {
        Some(group) if can_edit_group(user, &group) => Ok(()),
        _ => Err(AppError::forbidden(
            "Target group does not exist or is not yours",
        )),
    }
}

async fn list_links(State(state): State<AppState>, user: MaybeUser) -> AppResult<Json<Vec<Link>>> {
    let Some(user) = user.0 else {
        return Ok(Json(Vec::new()));
    };
    let conn = state.db.get()?;
    Ok(Json(links::list_visible(&conn, user.id)?))
}

#[derive(Deserialize)]
struct CreateLink {
    title: String,
    url: String,
    group_id: i64,
    icon: Option<String>,
}

fn validate_url(raw: &str) -> AppResult<()> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(AppError::bad_request("URL must be an absolute http(s) address")),
    }
}

async fn create_link(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateLink>,
) -> AppResult<Json<Link>> {
    {
        let conn = state.db.get()?;
        check_target_group(&conn, &user, req.group_id)?;
    }

    let title = req.title.trim();
    let url = req.url.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("Title is required"));
    }
    validate_url(url)?;

    let http_title = state.fetcher.page_title(url).await;

    let conn = state.db.get()?;
    let link = links::create(
        &conn,
        &NewLink {
            title,
            url,
            icon: req.icon.as_deref().filter(|i| !i.is_empty()),
            http_title: Some(http_title.as_str()).filter(|t| !t.is_empty()),
            group_id: req.group_id,
        },
    )?;
    Ok(Json(link))
}

/// Icons from `icons` that no link points at any more.
pub(crate) fn unreferenced_icons(
    conn: &Connection,
    icons: impl IntoIterator<Item = String>,
) -> AppResult<Vec<String>> {
    let mut stale = Vec::new();
    for icon in icons {
        if !links::icon_in_use(conn, &icon)? {
            stale.push(icon);
        }
    }
    Ok(stale)
}

/// Points `link` (if any) at a freshly stored icon. The old file goes only
/// once nothing else uses it.
async fn attach_icon(state: &AppState, link: Option<Link>, icon_url: &str) -> AppResult<()> {
    let Some(link) = link else {
        return Ok(());
    };
    let stale = {
        let conn = state.db.get()?;
        links::set_icon(&conn, link.id, icon_url)?;
        unreferenced_icons(&conn, link.icon)?
    };
    for icon in &stale {
        state.assets.remove_icon(icon).await;
    }
    Ok(())
}

fn link_for_icon(state: &AppState, user: &User, link_id: Option<i64>) -> AppResult<Option<Link>> {
    link_id
        .map(|id| {
            let conn = state.db.get()?;
            editable_link(&conn, user, id)
        })
        .transpose()
}

async fn upload_icon(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.require_file()?;
    if !file.is_image() {
        return Err(AppError::bad_request("Only images can be uploaded"));
    }
    let link = link_for_icon(&state, &user, form.int_field("link_id")?)?;

    let icon_url = state.assets.save_icon(&file.bytes, &file.extension()).await?;
    attach_icon(&state, link, &icon_url).await?;

    Ok(Json(json!({ "icon_url": icon_url })))
}

#[derive(Deserialize)]
struct DownloadIcon {
    url: String,
    link_id: Option<i64>,
}

async fn download_icon(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(req): Form<DownloadIcon>,
) -> AppResult<Json<Value>> {
    let link = link_for_icon(&state, &user, req.link_id)?;

    let asset = state
        .fetcher
        .download(&req.url)
        .await
        .map_err(|e| AppError::bad_request(format!("Failed to fetch icon: {e}")))?;

    let icon_url = state
        .assets
        .save_icon(&asset.bytes, icon_extension(&asset.content_type))
        .await?;
    attach_icon(&state, link, &icon_url).await?;

    Ok(Json(json!({ "icon_url": icon_url })))
}

#[derive(Deserialize)]
struct ReorderLinks {
    link_ids: Vec<i64>,
    group_id: i64,
}

async fn reorder_links(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ReorderLinks>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    check_target_group(&conn, &user, req.group_id)?;
    links::reorder_into_group(&mut conn, user.id, req.group_id, &req.link_ids)?;
    Ok(Json(json!({ "status": "success" })))
}

#[derive(Deserialize)]
struct MoveParams {
    target_group_id: i64,
    new_order: i64,
}

async fn move_link(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(params): Query<MoveParams>,
) -> AppResult<Json<Value>> {
    if params.target_group_id == PUBLIC_GROUP_ID && !user.is_root() {
        return Err(AppError::forbidden("Links cannot be moved into the public group"));
    }

    let mut conn = state.db.get()?;
    let link = match links::find_with_owner(&conn, id)? {
        Some((link, owner)) if can_edit_link(&user, &link, owner) => link,
        _ => return Err(AppError::not_found("Link not found")),
    };
    check_target_group(&conn, &user, params.target_group_id)?;

    links::move_to(&mut conn, &link, params.target_group_id, params.new_order)?;
    Ok(Json(json!({ "msg": "Link moved" })))
}

async fn delete_link(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let stale = {
        let mut conn = state.db.get()?;
        let link = editable_link(&conn, &user, id)?;
        links::delete(&mut conn, &link)?;
        unreferenced_icons(&conn, link.icon)?
    };

    for icon in &stale {
        state.assets.remove_icon(icon).await;
    }
    Ok(Json(json!({ "msg": "Link deleted" })))
}
