use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{
    toggle_hidden_group, Group, GroupWithLinks, User, PUBLIC_GROUP_ID, ROOT_USER_ID,
};
use crate::db::{groups, links, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::links::unreferenced_icons;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/", get(list_groups).post(create_group))
        .route("/api/groups/public", get(public_groups))
        .route("/api/groups/selectable", get(selectable_groups))
        .route("/api/groups/reorder", put(reorder_groups))
        .route("/api/groups/reset-hidden", post(reset_hidden))
        .route("/api/groups/{id}", put(rename_group).delete(delete_group))
        .route("/api/groups/{id}/toggle-visibility", post(toggle_visibility))
}

/// Whether `user` may change the group's contents.
pub(crate) fn can_edit_group(user: &User, group: &Group) -> bool {
    group.user_id == user.id || (group.id == PUBLIC_GROUP_ID && user.is_root())
}

fn public_group(conn: &Connection) -> AppResult<Option<GroupWithLinks>> {
    let Some(group) = groups::find(conn, PUBLIC_GROUP_ID)?
        .filter(|g| g.user_id == ROOT_USER_ID)
    else {
        return Ok(None);
    };
    let links = links::list_in_group(conn, group.id)?;
    Ok(Some(GroupWithLinks {
        group,
        is_readonly: true,
        links,
    }))
}

/// The public group first (unless hidden), then the caller's own groups.
async fn list_groups(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<GroupWithLinks>>> {
    let conn = state.db.get()?;
    let mut result = Vec::new();

    if let Some(public) = public_group(&conn)? {
        let hidden = user.hidden_group_ids().contains(&PUBLIC_GROUP_ID);
        if !hidden || user.is_root() {
            result.push(public);
        }
    }

    for group in groups::list_for_user(&conn, user.id)? {
        if group.id == PUBLIC_GROUP_ID {
            continue;
        }
        let links = links::list_in_group(&conn, group.id)?;
        result.push(GroupWithLinks {
            group,
            is_readonly: false,
            links,
        });
    }

    Ok(Json(result))
}

async fn public_groups(State(state): State<AppState>) -> AppResult<Json<Vec<GroupWithLinks>>> {
    let conn = state.db.get()?;
    Ok(Json(public_group(&conn)?.into_iter().collect()))
}

async fn selectable_groups(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Group>>> {
    let conn = state.db.get()?;
    Ok(Json(groups::list_for_user(&conn, user.id)?))
}

#[derive(Deserialize)]
struct NameParam {
    name: String,
}

fn required_name(param: &NameParam) -> AppResult<&str> {
    let name = param.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Group name is required"));
    }
    Ok(name)
}

async fn create_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(param): Query<NameParam>,
) -> AppResult<Json<GroupWithLinks>> {
    let name = required_name(&param)?;
    let conn = state.db.get()?;
    let group = groups::create(&conn, user.id, name)?;
    Ok(Json(GroupWithLinks {
        group,
        is_readonly: false,
        links: Vec::new(),
    }))
}

async fn reorder_groups(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(ids): Json<Vec<i64>>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    groups::reorder(&mut conn, user.id, &ids)?;
    Ok(Json(json!({ "status": "success" })))
}

/// Loads a group the caller may modify, applying the public-group rule first.
fn owned_group(conn: &Connection, user: &User, id: i64) -> AppResult<Group> {
    if id == PUBLIC_GROUP_ID && !user.is_root() {
        return Err(AppError::forbidden("The public group cannot be modified"));
    }
    groups::find_owned(conn, id, user.id)?.ok_or_else(|| AppError::not_found("Group not found"))
}

async fn rename_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(param): Query<NameParam>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let group = owned_group(&conn, &user, id)?;
    let name = required_name(&param)?;
    groups::rename(&conn, group.id, name)?;
    Ok(Json(json!({ "msg": "Group renamed", "name": name })))
}

async fn delete_group(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let stale = {
        let mut conn = state.db.get()?;
        let group = owned_group(&conn, &user, id)?;
        let icons = links::icons_in_group(&conn, group.id)?;
        groups::delete(&mut conn, &group)?;
        unreferenced_icons(&conn, icons)?
    };

    for icon in &stale {
        state.assets.remove_icon(icon).await;
    }
    Ok(Json(json!({ "msg": "Group and its links deleted" })))
}

async fn toggle_visibility(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let hidden = toggle_hidden_group(&user.hidden_groups, id);
    let conn = state.db.get()?;
    users::set_hidden_groups(&conn, user.id, &hidden)?;
    Ok(Json(json!({ "hidden_groups": hidden })))
}

async fn reset_hidden(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    users::set_hidden_groups(&conn, user.id, "")?;
    Ok(Json(json!({ "msg": "All groups are visible again" })))
}
