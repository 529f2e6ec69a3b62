use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::assets::AssetStore;
use crate::auth::JwtKeys;
use crate::config::Config;
use crate::fetch::RemoteFetcher;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub keys: Arc<JwtKeys>,
    pub assets: Arc<AssetStore>,
    pub fetcher: Arc<dyn RemoteFetcher>,
}
