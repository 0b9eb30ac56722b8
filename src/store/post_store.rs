//! Post Store (§4.C): CRUD over `Post`, one JSON blob per row. The runner
//! reads fresh state at the start of every stage iteration and writes back
//! after each stage — no long-lived in-memory copy (§2 data flow note).

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::Db;
use crate::error::{RepoResult, RepositoryError};
use crate::models::Post;

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: &Post) -> RepoResult<()>;
    async fn get(&self, id: Uuid) -> RepoResult<Post>;
    async fn save(&self, post: &Post) -> RepoResult<()>;
    async fn list(&self) -> RepoResult<Vec<Post>>;
}

#[derive(Clone)]
pub struct SqlitePostStore {
    db: Db,
}

impl SqlitePostStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_post(data: String) -> RepoResult<Post> {
    serde_json::from_str(&data).map_err(RepositoryError::from)
}

#[async_trait]
impl PostStore for SqlitePostStore {
    async fn create(&self, post: &Post) -> RepoResult<()> {
        self.save(post).await
    }

    async fn get(&self, id: Uuid) -> RepoResult<Post> {
        self.db.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM posts WHERE id = ?", params![id.to_string()], |row| {
                    row.get(0)
                })
                .optional()?;
            match data {
                Some(data) => row_to_post(data),
                None => Err(RepositoryError::NotFound(format!("post {id}"))),
            }
        })
    }

    async fn save(&self, post: &Post) -> RepoResult<()> {
        let data = serde_json::to_string(post)?;
        let profile_id = post.profile_id.map(|id| id.to_string());
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, slug, profile_id, data, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET slug = excluded.slug, profile_id = excluded.profile_id,
                     data = excluded.data, updated_at = excluded.updated_at",
                params![post.id.to_string(), post.slug, profile_id, data, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    async fn list(&self) -> RepoResult<Vec<Post>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT data FROM posts ORDER BY updated_at DESC")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(row_to_post).collect()
        })
    }
}
