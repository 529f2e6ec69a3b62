pub mod admin;
pub mod auth;
pub mod groups;
pub mod links;
pub mod multipart;
pub mod system;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use serde::Deserialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::assets::STATIC_PREFIX;
use crate::state::AppState;

const MAX_PAGE_SIZE: i64 = 100;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    let static_files = ServeDir::new(state.assets.root());
    let body_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .merge(system::router())
        .merge(auth::router())
        .merge(groups::router())
        .merge(links::router())
        .merge(admin::router())
        .nest_service(STATIC_PREFIX, static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// Returns `(page, size, offset)` with `page >= 1` and `size` in `1..=100`.
pub(crate) fn paginate(query: &PageQuery, default_size: i64) -> (i64, i64, i64) {
    let page = query.page.unwrap_or(1).max(1);
    let size = query.size.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE);
    (page, size, (page - 1) * size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<i64>, size: Option<i64>) -> PageQuery {
        PageQuery {
            q: None,
            page,
            size,
        }
    }

    #[test]
    fn paginate_defaults() {
        assert_eq!(paginate(&query(None, None), 10), (1, 10, 0));
        assert_eq!(paginate(&query(Some(3), None), 7), (3, 7, 14));
    }

    #[test]
    fn paginate_clamps_out_of_range_values() {
        assert_eq!(paginate(&query(Some(0), Some(0)), 10), (1, 1, 0));
        assert_eq!(paginate(&query(Some(-4), Some(5000)), 10), (1, 100, 0));
    }
}
