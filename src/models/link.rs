//! Link: one entry in a Profile's internal Link Catalog (§3, §4.D).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Sitemap,
    Generated,
    Manual,
}

impl LinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sitemap => "sitemap",
            Self::Generated => "generated",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sitemap" => Some(Self::Sitemap),
            "generated" => Some(Self::Generated),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub source: LinkSource,
    pub generated_by_post_id: Option<Uuid>,
}

impl Link {
    pub fn new(profile_id: Uuid, url: impl Into<String>, source: LinkSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            url: url.into(),
            title: None,
            slug: None,
            source,
            generated_by_post_id: None,
        }
    }

    /// Derive a slug from the tail of a URL path, as the crawl worker does
    /// when upserting sitemap entries (§4.I).
    pub fn slug_from_url(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let path = parsed.path().trim_matches('/');
        if path.is_empty() {
            return None;
        }
        path.rsplit('/').next().map(|s| s.to_string())
    }
}
