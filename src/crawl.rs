//! Crawl Worker (§4.I): fetches a profile's sitemap tree and upserts
//! discovered URLs into its Link Catalog.
//!
//! Sitemap/robots.txt fetching and `<loc>` extraction follow the teacher
//! crate's `discovery::sources::sitemap::SitemapSource` (string-based `<loc>`
//! scraping rather than a full XML parser, gzip-aware, sitemap-index
//! recursion via a work queue rather than true recursion).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::{Link, LinkSource};
use crate::store::{LinkStore, ProfileStore};

const STANDARD_SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml"];
const MAX_SITEMAP_DEPTH: u32 = 3;
const MAX_SITEMAPS_PROCESSED: usize = 100;

pub struct CrawlWorker {
    pub profile_store: Arc<dyn ProfileStore>,
    pub link_store: Arc<dyn LinkStore>,
    client: reqwest::Client,
}

impl CrawlWorker {
    pub fn new(profile_store: Arc<dyn ProfileStore>, link_store: Arc<dyn LinkStore>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; postforge/1.0)")
            .timeout(timeout)
            .build()
            .expect("building the crawl HTTP client never fails on a valid config");
        Self { profile_store, link_store, client }
    }

    /// Crawl `profile_id`'s sitemap tree, upserting every discovered URL
    /// into the Link Catalog. Any failure is logged and recorded on the
    /// profile as `crawl_status = failed`, never propagated (§4.I).
    pub async fn crawl(&self, profile_id: Uuid) -> EngineResult<()> {
        let mut profile = self.profile_store.get(profile_id).await?;
        profile.crawl_status = crate::models::CrawlStatus::Crawling;
        self.profile_store.save(&profile).await?;

        match self.discover_urls(&profile.website_url).await {
            Ok(urls) => {
                for url in urls {
                    let slug = Link::slug_from_url(&url);
                    let mut link = Link::new(profile_id, url, LinkSource::Sitemap);
                    link.slug = slug;
                    if let Err(e) = self.link_store.upsert_from_crawl(&link).await {
                        warn!(profile_id = %profile_id, error = %e, "failed to upsert crawled link");
                    }
                }
                profile.crawl_status = crate::models::CrawlStatus::Complete;
                profile.last_crawled_at = Some(chrono::Utc::now());
            }
            Err(e) => {
                warn!(profile_id = %profile_id, error = %e, "crawl failed");
                profile.crawl_status = crate::models::CrawlStatus::Failed;
            }
        }

        self.profile_store.save(&profile).await?;
        Ok(())
    }

    /// Returns `Err` only when the host could not be reached at all (every
    /// top-level request failed at the connection level) — a 404 on every
    /// candidate path is a normal "no sitemap" outcome, not a crawl failure.
    async fn discover_urls(&self, website_url: &str) -> Result<Vec<String>, String> {
        let base_url = website_url.trim_end_matches('/').to_string();
        let mut all_urls = Vec::new();
        let mut attempts = 0u32;
        let mut connection_failures = 0u32;

        let (robots_sitemaps, robots_reached) = self.parse_robots_txt(&base_url).await;
        attempts += 1;
        if !robots_reached {
            connection_failures += 1;
        }
        for sitemap_url in robots_sitemaps {
            all_urls.extend(self.parse_sitemap_tree(&sitemap_url).await);
        }

        for path in STANDARD_SITEMAP_PATHS {
            let sitemap_url = format!("{base_url}{path}");
            attempts += 1;
            match self.client.get(&sitemap_url).send().await {
                Ok(_) => {
                    let found = self.parse_sitemap_tree(&sitemap_url).await;
                    if !found.is_empty() {
                        all_urls.extend(found);
                        break;
                    }
                }
                Err(_) => connection_failures += 1,
            }
        }

        if attempts > 0 && connection_failures == attempts {
            return Err(format!("could not reach {base_url}"));
        }

        all_urls.sort();
        all_urls.dedup();
        Ok(all_urls)
    }

    /// Returns the robots.txt's `Sitemap:` directives plus whether the host
    /// was reachable at all (a 404/error response still counts as reached).
    async fn parse_robots_txt(&self, base_url: &str) -> (Vec<String>, bool) {
        let robots_url = format!("{base_url}/robots.txt");
        let response = match self.client.get(&robots_url).send().await {
            Ok(r) => r,
            Err(_) => return (Vec::new(), false),
        };
        if !response.status().is_success() {
            return (Vec::new(), true);
        }
        let text = match response.text().await {
            Ok(t) => t,
            Err(_) => return (Vec::new(), true),
        };

        let sitemaps = text
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                line.to_lowercase()
                    .starts_with("sitemap:")
                    .then(|| line[8..].trim().to_string())
            })
            .collect();
        (sitemaps, true)
    }

    /// Fetch and parse a sitemap, recursing into sitemap indexes via a work
    /// queue bounded by `MAX_SITEMAP_DEPTH` and `MAX_SITEMAPS_PROCESSED`.
    async fn parse_sitemap_tree(&self, url: &str) -> Vec<String> {
        let mut all_urls = Vec::new();
        let mut pending = vec![(url.to_string(), 0u32)];
        let mut processed = HashSet::new();

        while let Some((sitemap_url, depth)) = pending.pop() {
            if processed.contains(&sitemap_url) || processed.len() >= MAX_SITEMAPS_PROCESSED || depth > MAX_SITEMAP_DEPTH {
                continue;
            }
            processed.insert(sitemap_url.clone());

            let bytes = match self.fetch_bytes(&sitemap_url).await {
                Some(b) => b,
                None => continue,
            };
            let text = decompress_if_gzip(bytes);

            if text.contains("<sitemapindex") {
                for loc in extract_locs(&text) {
                    if !processed.contains(&loc) {
                        pending.push((loc, depth + 1));
                    }
                }
            } else {
                all_urls.extend(extract_locs(&text));
            }
        }

        all_urls
    }

    async fn fetch_bytes(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!(url, status = %r.status(), "sitemap fetch non-success");
                return None;
            }
            Err(e) => {
                debug!(url, error = %e, "sitemap fetch failed");
                return None;
            }
        };
        response.bytes().await.ok().map(|b| b.to_vec())
    }
}

/// Gzip-aware decompression with a raw-bytes fallback (§4.I).
fn decompress_if_gzip(bytes: Vec<u8>) -> String {
    use std::io::Read;
    let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
    let mut decompressed = String::new();
    if decoder.read_to_string(&mut decompressed).is_ok() {
        return decompressed;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extract `<loc>` values, unescaping XML entities (grounded on the
/// teacher's `SitemapSource::extract_locs`).
fn extract_locs(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    for line in xml.lines() {
        let line = line.trim();
        if let Some(start) = line.find("<loc>") {
            if let Some(end) = line.find("</loc>") {
                let url = &line[start + 5..end];
                locs.push(
                    url.replace("&amp;", "&")
                        .replace("&lt;", "<")
                        .replace("&gt;", ">")
                        .replace("&quot;", "\"")
                        .replace("&apos;", "'"),
                );
            }
        }
    }
    locs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_locs_parses_plain_sitemap() {
        let xml = r#"<urlset>
  <url><loc>https://example.com/a/</loc></url>
  <url><loc>https://example.com/b/</loc></url>
</urlset>"#;
        assert_eq!(extract_locs(xml), vec!["https://example.com/a/", "https://example.com/b/"]);
    }

    #[test]
    fn extract_locs_unescapes_entities() {
        let xml = r#"<url><loc>https://example.com/search?q=a&amp;b=c</loc></url>"#;
        assert_eq!(extract_locs(xml), vec!["https://example.com/search?q=a&b=c"]);
    }

    #[test]
    fn decompress_if_gzip_falls_back_to_raw_bytes() {
        let plain = b"<urlset><url><loc>https://example.com/</loc></url></urlset>".to_vec();
        assert!(decompress_if_gzip(plain).contains("<loc>"));
    }

    #[tokio::test]
    async fn crawl_upserts_discovered_links_and_marks_failed_on_unreachable_host() {
        use crate::models::Profile;
        use crate::store::{Db, SqliteLinkStore, SqliteProfileStore};

        let db = Db::open_in_memory().unwrap();
        db.init_schema().unwrap();
        let profile_store: Arc<dyn ProfileStore> = Arc::new(SqliteProfileStore::new(db.clone()));
        let link_store: Arc<dyn LinkStore> = Arc::new(SqliteLinkStore::new(db));

        let profile = Profile::new("unreachable", "https://postforge-test-domain-that-does-not-exist.invalid");
        profile_store.create(&profile).await.unwrap();

        let worker = CrawlWorker::new(profile_store.clone(), link_store, std::time::Duration::from_secs(2));
        worker.crawl(profile.id).await.unwrap();

        let loaded = profile_store.get(profile.id).await.unwrap();
        assert_eq!(loaded.crawl_status, crate::models::CrawlStatus::Failed);
    }
}
