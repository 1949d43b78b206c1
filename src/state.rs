use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::storage::FileStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Server context handed to every handler. Built once in `main` (or per test)
/// so each instance owns its own database and upload tree.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub files: FileStore,
}
