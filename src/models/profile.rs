//! Profile: per-site defaults plus a Link Catalog and crawl cadence (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecrawlInterval {
    Weekly,
    Monthly,
    Disabled,
}

impl RecrawlInterval {
    /// Minimum elapsed time before a recrawl is due, per §4.J.
    pub fn due_after(&self) -> Option<chrono::Duration> {
        match self {
            Self::Weekly => Some(chrono::Duration::days(7)),
            Self::Monthly => Some(chrono::Duration::days(30)),
            Self::Disabled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    Pending,
    Crawling,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub website_url: String,
    pub recrawl_interval: RecrawlInterval,
    pub crawl_status: CrawlStatus,
    pub last_crawled_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(name: impl Into<String>, website_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            website_url: website_url.into(),
            recrawl_interval: RecrawlInterval::Disabled,
            crawl_status: CrawlStatus::Pending,
            last_crawled_at: None,
        }
    }

    /// Derive a Post's canonical URL under this profile (§4.H completion hook).
    pub fn canonical_url_for_slug(&self, slug: &str) -> String {
        format!("{}/{}/", self.website_url.trim_end_matches('/'), slug)
    }

    /// Whether this profile is due for a recrawl, given `now` (§4.J, §8 S6).
    pub fn recrawl_due(&self, now: DateTime<Utc>) -> bool {
        if self.crawl_status == CrawlStatus::Crawling {
            return false;
        }
        match self.recrawl_interval.due_after() {
            None => false,
            Some(interval) => match self.last_crawled_at {
                None => true,
                Some(last) => now - last >= interval,
            },
        }
    }
}
