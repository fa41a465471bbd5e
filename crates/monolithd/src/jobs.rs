//! Job bodies and their ids.
//!
//! Every body returns `anyhow::Result<()>`; the orchestrator logs failures
//! and keeps the job on its schedule.

use std::sync::Arc;

use anyhow::{Context, bail};
use monolith_core::{ContentKind, Notification};
use monolith_feed::{ChangeFeedFetcher, SuggestionPicker};
use monolith_health::{HealthState, ServiceMonitor};
use tracing::{debug, info};

pub const JELLYFIN_HEALTH: &str = "jellyfin:health";
pub const JELLYFIN_ANNOUNCE: &str = "jellyfin:announce";
pub const JELLYFIN_SUGGEST: &str = "jellyfin:suggest";

pub fn minecraft_health(server: &str) -> String {
    format!("minecraft:{server}:health")
}

pub fn minecraft_players(server: &str) -> String {
    format!("minecraft:{server}:players")
}

/// One health check for a service.
pub async fn health_check(monitor: Arc<ServiceMonitor>) -> anyhow::Result<()> {
    let Some(check) = monitor.check_health().await else {
        debug!(service = %monitor.service_id(), "monitor stopped, health check skipped");
        return Ok(());
    };
    debug!(
        service = %monitor.service_id(),
        state = ?check.state,
        address = %check.outcome.address(),
        "health check complete"
    );
    Ok(())
}

/// One player diff for a game server.
pub async fn player_check(monitor: Arc<ServiceMonitor>) -> anyhow::Result<()> {
    monitor.check_players().await;
    Ok(())
}

/// Content jobs for a media server: the periodic change feed and the
/// random suggestions.
pub struct ContentJobs {
    monitor: Arc<ServiceMonitor>,
    fetcher: ChangeFeedFetcher,
    picker: SuggestionPicker,
    content_types: Vec<ContentKind>,
    suggestion_types: Vec<ContentKind>,
}

impl ContentJobs {
    pub fn new(
        monitor: Arc<ServiceMonitor>,
        fetcher: ChangeFeedFetcher,
        picker: SuggestionPicker,
        content_types: Vec<ContentKind>,
        suggestion_types: Vec<ContentKind>,
    ) -> Self {
        Self {
            monitor,
            fetcher,
            picker,
            content_types,
            suggestion_types,
        }
    }

    /// Publish items added within the lookback window.
    pub async fn announce(&self) -> anyhow::Result<()> {
        let Some(address) = self.active_address().await? else {
            return Ok(());
        };
        let batch = self
            .fetcher
            .fetch_all(&address, &self.content_types)
            .await
            .context("listing recent items")?;

        if batch.total_items() == 0 {
            info!(service = %self.monitor.service_id(), "no new content to announce");
            return Ok(());
        }
        self.monitor.publish(Notification::NewContent(batch)).await;
        Ok(())
    }

    /// Publish one random pick per suggestion kind.
    pub async fn suggest(&self) -> anyhow::Result<()> {
        let Some(address) = self.active_address().await? else {
            return Ok(());
        };
        let batch = self
            .picker
            .suggest_each(&address, &self.suggestion_types)
            .await
            .context("picking suggestions")?;

        if batch.picks.is_empty() {
            info!(service = %self.monitor.service_id(), "library is empty, no suggestions");
            return Ok(());
        }
        self.monitor.publish(Notification::Suggestions(batch)).await;
        Ok(())
    }

    /// Address for a data call, or `None` when the service is known to be
    /// down or the monitor has stopped.
    async fn active_address(&self) -> anyhow::Result<Option<String>> {
        let service = self.monitor.service_id();
        if self.monitor.is_stopped().await {
            return Ok(None);
        }
        if self.monitor.health().await.state == HealthState::Offline {
            info!(%service, "service offline, skipping content job");
            return Ok(None);
        }

        let outcome = self.monitor.resolver().resolve_for_data_call().await;
        if let Some(summary) = outcome.failure_summary() {
            bail!("no reachable endpoint for {service}: {summary}");
        }
        Ok(Some(outcome.address().to_string()))
    }
}
