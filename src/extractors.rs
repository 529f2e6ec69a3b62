use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::db::models::User;
use crate::db::users;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated, active account behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

/// Resolves the bearer token to a user row, active or not.
fn resolve_token(parts: &Parts, state: &AppState) -> Result<User, AppError> {
    let token = extract_bearer_token(parts)
        .ok_or_else(|| AppError::unauthorized("Not authenticated"))?;

    let claims = state
        .keys
        .verify(token)
        .map_err(|_| AppError::unauthorized("Could not validate credentials"))?;

    let conn = state.db.get()?;
    users::find_by_username(&conn, &claims.sub)?
        .ok_or_else(|| AppError::unauthorized("Could not validate credentials"))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = resolve_token(parts, state)?;
        if !user.is_active {
            return Err(AppError::forbidden("Account is disabled"));
        }
        Ok(CurrentUser(user))
    }
}

/// Optional user extractor: anonymous instead of an error when the token is
/// missing, invalid or belongs to an unknown or disabled account.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve_token(parts, state) {
            Ok(user) if user.is_active => Ok(MaybeUser(Some(user))),
            Ok(_) | Err(AppError::Unauthorized(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// An active administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl std::ops::Deref for AdminUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::forbidden("Administrator privileges required"));
        }
        Ok(AdminUser(user))
    }
}

fn extract_bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}
