//! SQLite-backed persistence: Post Store (§4.C), Link Catalog (§4.D), and
//! Profile Store, all sharing one database file and connection-opening
//! convention (WAL + busy timeout), mirroring the teacher crate's
//! `rate_limiter::persistence::open_db`.

mod link_store;
mod post_store;
mod profile_store;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

pub use link_store::{LinkStore, SqliteLinkStore};
pub use post_store::{PostStore, SqlitePostStore};
pub use profile_store::{ProfileStore, SqliteProfileStore};

use crate::error::RepoResult;

/// Open a connection with the concurrency settings every store relies on.
fn open_db(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 30000;
        "#,
    )?;
    Ok(conn)
}

/// Shared handle used by all three stores; cheap to clone, one SQLite
/// connection guarded by a mutex (matching the teacher's synchronous
/// `rusqlite::Connection` usage — no `spawn_blocking` wrapper).
#[derive(Clone)]
pub struct Db {
    conn: std::sync::Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let conn = open_db(path)?;
        Ok(Self {
            conn: std::sync::Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: std::sync::Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> RepoResult<T>) -> RepoResult<T> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        f(&conn)
    }

    pub fn init_schema(&self) -> RepoResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS posts (
                    id TEXT PRIMARY KEY,
                    slug TEXT NOT NULL,
                    profile_id TEXT,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS profiles (
                    id TEXT PRIMARY KEY,
                    data TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS links (
                    id TEXT PRIMARY KEY,
                    profile_id TEXT NOT NULL,
                    url TEXT NOT NULL,
                    data TEXT NOT NULL,
                    UNIQUE(profile_id, url)
                );
                "#,
            )?;
            Ok(())
        })
    }
}
