//! Link Catalog (§4.D): per-profile set of internal URLs, `UNIQUE(profile_id, url)`.
//!
//! Upserts from the crawl worker preserve any existing `source = generated`
//! row's provenance — an upsert only touches `title`/`slug`, never
//! downgrades `source` (§4.D).

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::Db;
use crate::error::{RepoResult, RepositoryError};
use crate::models::{Link, LinkSource};

#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Insert `link` if no row exists yet for `(profile_id, url)`. Used by
    /// the completion hook (§4.H) to register a freshly-generated post.
    async fn insert_if_absent(&self, link: &Link) -> RepoResult<()>;

    /// Upsert a sitemap-sourced entry: if an existing row's source is
    /// `generated`, leave it untouched; otherwise insert/update with
    /// `source = sitemap` (§4.D, §4.I).
    async fn upsert_from_crawl(&self, link: &Link) -> RepoResult<()>;

    async fn exists(&self, profile_id: Uuid, url: &str) -> RepoResult<bool>;

    async fn by_profile(&self, profile_id: Uuid) -> RepoResult<Vec<Link>>;
}

#[derive(Clone)]
pub struct SqliteLinkStore {
    db: Db,
}

impl SqliteLinkStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn row_to_link(data: String) -> RepoResult<Link> {
    serde_json::from_str(&data).map_err(RepositoryError::from)
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn insert_if_absent(&self, link: &Link) -> RepoResult<()> {
        let data = serde_json::to_string(link)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO links (id, profile_id, url, data) VALUES (?1, ?2, ?3, ?4)",
                params![link.id.to_string(), link.profile_id.to_string(), link.url, data],
            )?;
            Ok(())
        })
    }

    async fn upsert_from_crawl(&self, link: &Link) -> RepoResult<()> {
        self.db.with_conn(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT data FROM links WHERE profile_id = ?1 AND url = ?2",
                    params![link.profile_id.to_string(), link.url],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_data) = existing {
                let existing_link = row_to_link(existing_data)?;
                if existing_link.source == LinkSource::Generated {
                    return Ok(());
                }
                let mut merged = existing_link;
                merged.title = link.title.clone();
                merged.slug = link.slug.clone();
                merged.source = LinkSource::Sitemap;
                let data = serde_json::to_string(&merged)?;
                conn.execute(
                    "UPDATE links SET data = ?1 WHERE profile_id = ?2 AND url = ?3",
                    params![data, link.profile_id.to_string(), link.url],
                )?;
            } else {
                let data = serde_json::to_string(link)?;
                conn.execute(
                    "INSERT INTO links (id, profile_id, url, data) VALUES (?1, ?2, ?3, ?4)",
                    params![link.id.to_string(), link.profile_id.to_string(), link.url, data],
                )?;
            }
            Ok(())
        })
    }

    async fn exists(&self, profile_id: Uuid, url: &str) -> RepoResult<bool> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM links WHERE profile_id = ?1 AND url = ?2",
                params![profile_id.to_string(), url],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    async fn by_profile(&self, profile_id: Uuid) -> RepoResult<Vec<Link>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT data FROM links WHERE profile_id = ?1")?;
            let rows = stmt
                .query_map(params![profile_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(row_to_link).collect()
        })
    }
}
