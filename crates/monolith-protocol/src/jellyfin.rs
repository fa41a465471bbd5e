//! Jellyfin REST API: system info for health checks, item listings for
//! the change feed and suggestions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use monolith_core::{
    ContentKind, Item, MediaServerInfo, ProbeError, ProbeResult, Prober, RemoteLister, ServerInfo,
};
use serde::Deserialize;
use tracing::debug;

use crate::http::HttpClient;

const TOKEN_HEADER: &str = "X-Emby-Token";
const ITEM_FIELDS: &str = "Overview,DateCreated,ProductionYear,Artists,Album,SeriesName";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SystemInfo {
    server_name: String,
    version: String,
    #[serde(default)]
    operating_system: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    total_record_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawItem {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "Type", default)]
    item_type: Option<String>,
    #[serde(default)]
    date_created: Option<String>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    production_year: Option<i32>,
    #[serde(default)]
    series_name: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    artists: Option<Vec<String>>,
}

impl From<RawItem> for Item {
    fn from(raw: RawItem) -> Self {
        let created_at = raw.date_created.as_deref().and_then(parse_jellyfin_date);
        if created_at.is_none() && raw.date_created.is_some() {
            debug!(id = %raw.id, date = ?raw.date_created, "unparseable DateCreated");
        }
        Item {
            id: raw.id,
            name: raw.name.unwrap_or_else(|| "Unknown".to_string()),
            item_type: raw.item_type.unwrap_or_else(|| "Unknown".to_string()),
            created_at,
            overview: raw.overview,
            year: raw.production_year,
            series_name: raw.series_name,
            album: raw.album,
            artists: raw.artists.unwrap_or_default(),
        }
    }
}

/// Parse a Jellyfin timestamp.
///
/// Jellyfin emits up to seven fractional digits and sometimes omits the
/// offset; offset-less values are taken as UTC.
pub fn parse_jellyfin_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Client for one Jellyfin deployment.
///
/// Serves as both the health prober (`/System/Info`) and the item lister
/// (`/Items`). The address passed to each call is a base URL without a
/// trailing slash.
pub struct JellyfinClient {
    http: HttpClient,
    api_key: String,
    page_limit: Option<u32>,
}

impl JellyfinClient {
    pub fn new(http: HttpClient, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            page_limit: None,
        }
    }

    /// Cap the number of items requested per listing call.
    pub fn with_page_limit(mut self, limit: Option<u32>) -> Self {
        self.page_limit = limit;
        self
    }

    pub async fn system_info(&self, address: &str) -> Result<MediaServerInfo, ProbeError> {
        let info: SystemInfo = self
            .http
            .get_json(address, "/System/Info", &[(TOKEN_HEADER, &self.api_key)])
            .await?;
        Ok(MediaServerInfo {
            server_name: info.server_name,
            version: info.version,
            operating_system: info.operating_system,
        })
    }

    /// Items of `kind`, newest first as the server sorts them.
    pub async fn items(&self, address: &str, kind: ContentKind) -> Result<Vec<Item>, ProbeError> {
        self.items_since(address, kind, None).await
    }

    /// Items of `kind`, optionally only those created at or after
    /// `created_since`.
    pub async fn items_since(
        &self,
        address: &str,
        kind: ContentKind,
        created_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Item>, ProbeError> {
        let mut query = format!(
            "/Items?SortBy=DateCreated&SortOrder=Descending&IncludeItemTypes={}&Recursive=true&Fields={ITEM_FIELDS}",
            kind.api_name()
        );
        if let Some(since) = created_since {
            query.push_str(&format!("&MinDateCreated={}", since.format("%Y-%m-%dT%H:%M:%SZ")));
        }
        if let Some(limit) = self.page_limit {
            query.push_str(&format!("&Limit={limit}"));
        }

        let response: ItemsResponse = self
            .http
            .get_json(address, &query, &[(TOKEN_HEADER, &self.api_key)])
            .await?;
        debug!(
            %address,
            %kind,
            returned = response.items.len(),
            total = ?response.total_record_count,
            "listed items"
        );
        Ok(response.items.into_iter().map(Item::from).collect())
    }
}

#[async_trait]
impl Prober for JellyfinClient {
    async fn probe(&self, address: &str, _timeout: Duration) -> ProbeResult {
        let started = Instant::now();
        match self.system_info(address).await {
            Ok(info) => ProbeResult::success(address, started.elapsed(), ServerInfo::Media(info)),
            Err(e) => ProbeResult::failure(address, started.elapsed(), e),
        }
    }
}

#[async_trait]
impl RemoteLister for JellyfinClient {
    async fn list_items(&self, address: &str, kind: ContentKind) -> Result<Vec<Item>, ProbeError> {
        self.items(address, kind).await
    }

    async fn list_items_since(
        &self,
        address: &str,
        kind: ContentKind,
        created_since: DateTime<Utc>,
    ) -> Result<Vec<Item>, ProbeError> {
        self.items_since(address, kind, Some(created_since)).await
    }
}

// ── Links ─────────────────────────────────────────────────────────

/// Web UI page for an item.
pub fn item_url(address: &str, item_id: &str) -> String {
    format!("{address}/web/index.html#!/details?id={item_id}")
}

/// Scaled image for an item ("Primary", "Backdrop", "Banner", "Thumb").
pub fn image_url(address: &str, item_id: &str, image_type: &str, max_width: u32) -> String {
    format!("{address}/Items/{item_id}/Images/{image_type}?maxWidth={max_width}")
}

/// Web UI list of a kind, newest first.
pub fn recently_added_url(address: &str, kind: ContentKind) -> String {
    format!(
        "{address}/web/index.html#!/list.html?type={}&sortBy=DateCreated&sortOrder=Descending",
        kind.api_name()
    )
}
