//! Profile Store: CRUD over `Profile`, one JSON blob per row.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::Db;
use crate::error::{RepoResult, RepositoryError};
use crate::models::Profile;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn create(&self, profile: &Profile) -> RepoResult<()>;
    async fn get(&self, id: Uuid) -> RepoResult<Profile>;
    async fn save(&self, profile: &Profile) -> RepoResult<()>;
    async fn list(&self) -> RepoResult<Vec<Profile>>;
}

#[derive(Clone)]
pub struct SqliteProfileStore {
    db: Db,
}

impl SqliteProfileStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_profile(data: String) -> RepoResult<Profile> {
    serde_json::from_str(&data).map_err(RepositoryError::from)
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn create(&self, profile: &Profile) -> RepoResult<()> {
        self.save(profile).await
    }

    async fn get(&self, id: Uuid) -> RepoResult<Profile> {
        self.db.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM profiles WHERE id = ?", params![id.to_string()], |row| {
                    row.get(0)
                })
                .optional()?;
            match data {
                Some(data) => row_to_profile(data),
                None => Err(RepositoryError::NotFound(format!("profile {id}"))),
            }
        })
    }

    async fn save(&self, profile: &Profile) -> RepoResult<()> {
        let data = serde_json::to_string(profile)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, data) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                params![profile.id.to_string(), data],
            )?;
            Ok(())
        })
    }

    async fn list(&self) -> RepoResult<Vec<Profile>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT data FROM profiles")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(row_to_profile).collect()
        })
    }
}
