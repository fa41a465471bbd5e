//! Windowed "recently added" queries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use monolith_core::{
    ContentBatch, ContentKind, ContentSection, Item, ProbeError, RemoteLister, ServiceId,
};
use tracing::{debug, info, warn};

/// Lookback window and per-kind cap for one content service.
///
/// Stateless across fetches: every call computes its own cutoff, so
/// consecutive windows may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeFeedCursor {
    pub lookback_window: Duration,
    pub max_items: usize,
}

pub struct ChangeFeedFetcher {
    service_id: ServiceId,
    lister: Arc<dyn RemoteLister>,
    cursor: ChangeFeedCursor,
}

impl ChangeFeedFetcher {
    pub fn new(
        service_id: impl Into<ServiceId>,
        lister: Arc<dyn RemoteLister>,
        cursor: ChangeFeedCursor,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            lister,
            cursor,
        }
    }

    pub fn cursor(&self) -> ChangeFeedCursor {
        self.cursor
    }

    /// Items of `kind` added within the lookback window, newest first.
    pub async fn fetch(&self, address: &str, kind: ContentKind) -> Result<Vec<Item>, ProbeError> {
        self.fetch_at(address, kind, Utc::now()).await
    }

    /// Same as [`fetch`](Self::fetch) with an explicit "now".
    pub async fn fetch_at(
        &self,
        address: &str,
        kind: ContentKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Item>, ProbeError> {
        let since = window_start(now, self.cursor.lookback_window);
        let raw = self.lister.list_items_since(address, kind, since).await?;
        let listed = raw.len();
        let recent = select_recent(
            raw,
            now,
            self.cursor.lookback_window,
            self.cursor.max_items,
        );
        debug!(
            service = %self.service_id,
            %address,
            %kind,
            listed,
            selected = recent.len(),
            "fetched recent items"
        );
        Ok(recent)
    }

    /// Fetch several kinds into one batch.
    ///
    /// A kind that fails is logged and left out. Kinds with nothing new are
    /// omitted. Errors only when every kind failed.
    pub async fn fetch_all(
        &self,
        address: &str,
        kinds: &[ContentKind],
    ) -> Result<ContentBatch, ProbeError> {
        let now = Utc::now();
        let mut sections = Vec::new();
        let mut last_error = None;
        let mut failed = 0;

        for &kind in kinds {
            match self.fetch_at(address, kind, now).await {
                Ok(items) if items.is_empty() => {}
                Ok(items) => sections.push(ContentSection { kind, items }),
                Err(e) => {
                    warn!(service = %self.service_id, %kind, error = %e, "failed to fetch recent items");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if failed > 0 && failed == kinds.len()
            && let Some(e) = last_error
        {
            return Err(e);
        }

        let batch = ContentBatch {
            service_id: self.service_id.clone(),
            window: self.cursor.lookback_window,
            address: address.to_string(),
            sections,
        };
        info!(service = %self.service_id, items = batch.total_items(), "content batch ready");
        Ok(batch)
    }
}

/// Oldest creation time inside `window` of `now`.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    now.checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Pick the items created within `window` of `now`, newest first, at most `cap`.
///
/// Duplicate ids keep their first occurrence. An item without a creation
/// time inherits the previous item's; with no previous item it is dropped.
pub fn select_recent(
    items: Vec<Item>,
    now: DateTime<Utc>,
    window: Duration,
    cap: usize,
) -> Vec<Item> {
    let cutoff = window_start(now, window);

    let mut seen = HashSet::new();
    let mut last_seen_at = None;
    let mut dated: Vec<(DateTime<Utc>, Item)> = Vec::new();

    for item in items {
        if !seen.insert(item.id.clone()) {
            continue;
        }
        let Some(at) = item.created_at.or(last_seen_at) else {
            continue;
        };
        last_seen_at = Some(at);
        if at >= cutoff {
            dated.push((at, item));
        }
    }

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    dated.truncate(cap);
    dated.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    fn item(id: &str, hours_ago: Option<i64>) -> Item {
        let item = Item::new(id, format!("Item {id}"), "Movie");
        match hours_ago {
            Some(h) => item.created(now() - TimeDelta::hours(h)),
            None => item,
        }
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    const DAY: Duration = Duration::from_secs(24 * 3600);

    #[test]
    fn window_keeps_recent_items_newest_first() {
        let items = vec![item("1", Some(1)), item("2", Some(30)), item("3", Some(2))];
        let selected = select_recent(items, now(), DAY, 10);
        assert_eq!(ids(&selected), vec!["1", "3"]);
    }

    #[test]
    fn cap_keeps_newest() {
        let items = vec![item("old", Some(5)), item("new", Some(1))];
        let selected = select_recent(items, now(), DAY, 1);
        assert_eq!(ids(&selected), vec!["new"]);
    }

    #[test]
    fn no_qualifying_items_is_empty() {
        let items = vec![item("1", Some(48))];
        assert!(select_recent(items, now(), DAY, 10).is_empty());
        assert!(select_recent(Vec::new(), now(), DAY, 10).is_empty());
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let mut dup = item("1", Some(3));
        dup.name = "second copy".to_string();
        let items = vec![item("1", Some(1)), dup];
        let selected = select_recent(items, now(), DAY, 10);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "Item 1");
    }

    #[test]
    fn missing_dates_inherit_previous() {
        let items = vec![item("undated-first", None), item("1", Some(2)), item("2", None)];
        let selected = select_recent(items, now(), DAY, 10);
        assert_eq!(ids(&selected), vec!["1", "2"]);
    }

    #[test]
    fn cutoff_is_inclusive() {
        let items = vec![item("edge", Some(24))];
        assert_eq!(select_recent(items, now(), DAY, 10).len(), 1);
    }

    struct FakeLister {
        items: Vec<Item>,
        failing: Vec<ContentKind>,
        calls: Mutex<Vec<ContentKind>>,
    }

    #[async_trait]
    impl RemoteLister for FakeLister {
        async fn list_items(
            &self,
            address: &str,
            kind: ContentKind,
        ) -> Result<Vec<Item>, ProbeError> {
            self.calls.lock().unwrap().push(kind);
            if self.failing.contains(&kind) {
                return Err(ProbeError::unreachable(address, "refused"));
            }
            Ok(self
                .items
                .iter()
                .filter(|i| i.item_type == kind.api_name())
                .cloned()
                .collect())
        }
    }

    fn fetcher(lister: FakeLister) -> ChangeFeedFetcher {
        ChangeFeedFetcher::new(
            "jellyfin",
            Arc::new(lister),
            ChangeFeedCursor {
                lookback_window: DAY,
                max_items: 10,
            },
        )
    }

    #[tokio::test]
    async fn fetch_all_skips_failing_and_empty_kinds() {
        let recent_movie = Item::new("m", "Movie", "Movie").created(Utc::now());
        let fetcher = fetcher(FakeLister {
            items: vec![recent_movie],
            failing: vec![ContentKind::Audio],
            calls: Mutex::new(Vec::new()),
        });

        let batch = fetcher
            .fetch_all(
                "http://jf",
                &[ContentKind::Movie, ContentKind::Series, ContentKind::Audio],
            )
            .await
            .unwrap();
        assert_eq!(batch.sections.len(), 1);
        assert_eq!(batch.sections[0].kind, ContentKind::Movie);
        assert_eq!(batch.total_items(), 1);
        assert_eq!(batch.address, "http://jf");
    }

    #[tokio::test]
    async fn fetch_all_errors_when_every_kind_fails() {
        let fetcher = fetcher(FakeLister {
            items: Vec::new(),
            failing: vec![ContentKind::Movie, ContentKind::Series],
            calls: Mutex::new(Vec::new()),
        });
        let err = fetcher
            .fetch_all("http://jf", &[ContentKind::Movie, ContentKind::Series])
            .await
            .unwrap_err();
        assert_eq!(err.address(), "http://jf");
    }

    /// Records the cutoff hint and returns stale items anyway.
    struct HintedLister {
        items: Vec<Item>,
        hints: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl RemoteLister for HintedLister {
        async fn list_items(&self, _address: &str, _kind: ContentKind) -> Result<Vec<Item>, ProbeError> {
            Ok(self.items.clone())
        }

        async fn list_items_since(
            &self,
            address: &str,
            kind: ContentKind,
            created_since: DateTime<Utc>,
        ) -> Result<Vec<Item>, ProbeError> {
            self.hints.lock().unwrap().push(created_since);
            self.list_items(address, kind).await
        }
    }

    #[tokio::test]
    async fn fetch_passes_window_start_and_still_filters() {
        let lister = Arc::new(HintedLister {
            items: vec![item("fresh", Some(1)), item("stale", Some(48))],
            hints: Mutex::new(Vec::new()),
        });
        let fetcher = ChangeFeedFetcher::new(
            "jellyfin",
            lister.clone(),
            ChangeFeedCursor {
                lookback_window: DAY,
                max_items: 10,
            },
        );

        let items = fetcher.fetch_at("http://jf", ContentKind::Movie, now()).await.unwrap();
        assert_eq!(ids(&items), vec!["fresh"]);
        assert_eq!(*lister.hints.lock().unwrap(), vec![now() - TimeDelta::hours(24)]);
    }
}
