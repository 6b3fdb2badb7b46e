use crate::places::SourceError;
use crate::timeout::TimeoutPolicy;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Page that links to a Commons file by id.
pub const COMMONS_PAGE_URL: &str = "https://commons.wikimedia.org/?curid=";
/// Thumbnail width requested from Commons.
pub const THUMBNAIL_WIDTH: u32 = 500;
/// Default lifetime of a cached photo result, hit or miss.
pub const DEFAULT_PHOTO_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiPhoto {
    pub image_url: String,
    pub page_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    pages: BTreeMap<String, Page>,
}

#[derive(Deserialize)]
struct Page {
    pageid: u64,
    thumbnail: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    source: String,
}

impl SearchResponse {
    fn first_photo(self) -> Option<WikiPhoto> {
        let page = self.query?.pages.into_values().next()?;
        let thumbnail = page.thumbnail?;
        Some(WikiPhoto {
            image_url: thumbnail.source,
            page_url: format!("{}{}", COMMONS_PAGE_URL, page.pageid),
        })
    }
}

/// Wikimedia Commons photo search keyed by place name.
///
/// Misses and failures are cached as `None` for the cache TTL so a name with no
/// photo is not searched again on every selection.
#[derive(Clone)]
pub struct PhotoClient {
    client: reqwest::Client,
    url: String,
    timeout: TimeoutPolicy,
    cache: Cache<String, Option<WikiPhoto>>,
}

impl std::fmt::Debug for PhotoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoClient")
            .field("url", &self.url)
            .field("cached", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl PhotoClient {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        timeout: TimeoutPolicy,
        capacity: u64,
        ttl: Duration,
    ) -> Self {
        let cache = Cache::builder().max_capacity(capacity).time_to_live(ttl).build();
        Self { client, url: url.into(), timeout, cache }
    }

    /// Cached photo for `name`.
    pub async fn photo(&self, name: &str) -> Option<WikiPhoto> {
        self.cache
            .get_with(name.to_string(), async {
                match self.lookup(name).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(target: "locus::enrich", error = %e, name, "photo lookup failed");
                        None
                    }
                }
            })
            .await
    }

    /// Uncached search: the first File-namespace hit with a thumbnail, if any.
    pub async fn lookup(&self, name: &str) -> Result<Option<WikiPhoto>, SourceError> {
        let found = self
            .timeout
            .execute(|| async move {
                let response = self
                    .client
                    .get(&self.url)
                    .query(&[
                        ("action", "query".to_string()),
                        ("generator", "search".to_string()),
                        ("gsrnamespace", "6".to_string()),
                        ("gsrsearch", name.to_string()),
                        ("gsrlimit", "1".to_string()),
                        ("prop", "pageimages".to_string()),
                        ("pithumbsize", THUMBNAIL_WIDTH.to_string()),
                        ("format", "json".to_string()),
                    ])
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(SourceError::Status(response.status().as_u16()));
                }
                let body: SearchResponse = response.json().await?;
                Ok(body.first_photo())
            })
            .await?;
        if found.is_none() {
            debug!(target: "locus::enrich", name, "no photo found");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Option<WikiPhoto> {
        serde_json::from_value::<SearchResponse>(v).unwrap().first_photo()
    }

    #[test]
    fn first_page_with_thumbnail_becomes_photo() {
        let photo = parse(json!({"query": {"pages": {"4242": {
            "pageid": 4242, "title": "File:Louvre.jpg",
            "thumbnail": {"source": "https://upload.wikimedia.org/louvre.jpg", "width": 500}
        }}}}))
        .unwrap();
        assert_eq!(photo.image_url, "https://upload.wikimedia.org/louvre.jpg");
        assert_eq!(photo.page_url, "https://commons.wikimedia.org/?curid=4242");
    }

    #[test]
    fn empty_search_or_missing_thumbnail_is_none() {
        assert_eq!(parse(json!({"batchcomplete": ""})), None);
        assert_eq!(parse(json!({"query": {"pages": {"7": {"pageid": 7}}}})), None);
    }

    #[test]
    fn photo_serializes_camel_case() {
        let photo = WikiPhoto { image_url: "i".into(), page_url: "p".into() };
        assert_eq!(serde_json::to_value(photo).unwrap(), json!({"imageUrl": "i", "pageUrl": "p"}));
    }
}
