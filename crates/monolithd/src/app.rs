//! Wiring: settings + capabilities → monitors, feeds, and scheduled jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use monolith_core::{
    JELLYFIN_SERVICE_ID, JellyfinSettings, MinecraftSettings, NotifierSink, Prober, RemoteLister,
    Settings,
};
use monolith_feed::{ChangeFeedCursor, ChangeFeedFetcher, SuggestionPicker};
use monolith_health::{MonitorRegistry, ServiceMonitor, StickyResolver};
use monolith_protocol::{HttpClient, JellyfinClient, MinecraftProber};
use monolith_scheduler::{JobOrchestrator, RunOutcome, Trigger};
use tracing::{info, warn};

use crate::jobs::{self, ContentJobs};

/// Protocol implementations for each service kind.
pub struct Capabilities {
    pub jellyfin_prober: Arc<dyn Prober>,
    pub jellyfin_lister: Arc<dyn RemoteLister>,
    pub minecraft_prober: Arc<dyn Prober>,
}

impl Capabilities {
    /// Real network adapters.
    pub fn live(settings: &Settings) -> anyhow::Result<Self> {
        let http_timeout = settings
            .jellyfin
            .as_ref()
            .map(|jf| jf.timeout)
            .unwrap_or(Duration::from_secs(10));
        let http = HttpClient::new(http_timeout).context("building HTTP client")?;
        let page_limit = settings.jellyfin.as_ref().and_then(|jf| jf.page_limit);
        let api_key = settings
            .jellyfin
            .as_ref()
            .map(|jf| jf.api_key.clone())
            .unwrap_or_default();

        let jellyfin = Arc::new(JellyfinClient::new(http, api_key).with_page_limit(page_limit));
        Ok(Self {
            jellyfin_prober: jellyfin.clone(),
            jellyfin_lister: jellyfin,
            minecraft_prober: Arc::new(MinecraftProber::new()),
        })
    }
}

/// Jobs selectable for a one-shot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnceTarget {
    JfHealth,
    JfAnnounce,
    JfSuggest,
    McHealth,
    McPlayers,
    All,
}

impl OnceTarget {
    pub fn matches(self, job_id: &str) -> bool {
        match self {
            Self::JfHealth => job_id == jobs::JELLYFIN_HEALTH,
            Self::JfAnnounce => job_id == jobs::JELLYFIN_ANNOUNCE,
            Self::JfSuggest => job_id == jobs::JELLYFIN_SUGGEST,
            Self::McHealth => job_id.starts_with("minecraft:") && job_id.ends_with(":health"),
            Self::McPlayers => job_id.starts_with("minecraft:") && job_id.ends_with(":players"),
            Self::All => true,
        }
    }
}

/// A fully wired daemon.
pub struct App {
    registry: Arc<MonitorRegistry>,
    orchestrator: Arc<JobOrchestrator>,
}

impl App {
    /// Build monitors for every enabled service and register their jobs.
    pub async fn build(
        settings: &Settings,
        caps: Capabilities,
        notifier: Arc<dyn NotifierSink>,
    ) -> anyhow::Result<Self> {
        let mut monitors = Vec::new();
        if let Some(jf) = &settings.jellyfin {
            monitors.push(ServiceMonitor::new(
                StickyResolver::new(jf.endpoints.clone(), caps.jellyfin_prober.clone(), jf.timeout),
                notifier.clone(),
            ));
        }
        if let Some(mc) = &settings.minecraft {
            for server in &mc.servers {
                monitors.push(ServiceMonitor::new(
                    StickyResolver::new(server.clone(), caps.minecraft_prober.clone(), mc.timeout),
                    notifier.clone(),
                ));
            }
        }
        let registry = Arc::new(MonitorRegistry::new(monitors)?);
        let orchestrator = Arc::new(JobOrchestrator::new());

        if let Some(jf) = &settings.jellyfin {
            register_jellyfin(&orchestrator, &registry, jf, settings, &caps).await?;
        }
        if let Some(mc) = &settings.minecraft {
            register_minecraft(&orchestrator, &registry, mc).await?;
        }

        info!(
            services = registry.len(),
            jobs = orchestrator.job_ids().await.len(),
            "daemon wired"
        );
        Ok(Self {
            registry,
            orchestrator,
        })
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    /// One health check per service so trackers leave `Unknown` before any
    /// timer fires.
    pub async fn baseline(&self) {
        for (service, check) in self.registry.check_all().await {
            match check {
                Some(check) => info!(
                    %service,
                    state = ?check.state,
                    address = %check.outcome.address(),
                    "baseline health"
                ),
                None => warn!(%service, "baseline skipped, monitor stopped"),
            }
        }
    }

    pub async fn start(&self) {
        self.orchestrator.start().await;
    }

    /// Run every job `target` selects once, in id order.
    pub async fn run_once(&self, target: OnceTarget) -> anyhow::Result<Vec<(String, RunOutcome)>> {
        let selected: Vec<String> = self
            .orchestrator
            .job_ids()
            .await
            .into_iter()
            .filter(|id| target.matches(id))
            .collect();
        if selected.is_empty() {
            warn!(?target, "no configured job matches, is the service enabled?");
        }

        let mut outcomes = Vec::with_capacity(selected.len());
        for id in selected {
            let outcome = self.orchestrator.run_now(&id).await?;
            info!(job = %id, ?outcome, "one-shot run finished");
            outcomes.push((id, outcome));
        }
        Ok(outcomes)
    }

    /// Stop publishing, then drain the scheduler.
    pub async fn shutdown(&self, grace: Duration) {
        self.registry.stop_all().await;
        self.orchestrator.shutdown(grace).await;
    }
}

async fn register_jellyfin(
    orchestrator: &JobOrchestrator,
    registry: &MonitorRegistry,
    jf: &JellyfinSettings,
    settings: &Settings,
    caps: &Capabilities,
) -> anyhow::Result<()> {
    let monitor = registry
        .get(JELLYFIN_SERVICE_ID)
        .context("media server monitor missing")?;

    let health = monitor.clone();
    orchestrator
        .add_job(
            jobs::JELLYFIN_HEALTH,
            Trigger::every(jf.health_check_interval),
            move || jobs::health_check(health.clone()),
        )
        .await?;

    let content = Arc::new(ContentJobs::new(
        monitor,
        ChangeFeedFetcher::new(
            JELLYFIN_SERVICE_ID,
            caps.jellyfin_lister.clone(),
            ChangeFeedCursor {
                lookback_window: jf.lookback,
                max_items: jf.max_items_per_type,
            },
        ),
        SuggestionPicker::new(JELLYFIN_SERVICE_ID, caps.jellyfin_lister.clone()),
        jf.content_types.clone(),
        jf.suggestion_types.clone(),
    ));

    let announce = content.clone();
    orchestrator
        .add_job(
            jobs::JELLYFIN_ANNOUNCE,
            Trigger::daily(jf.announcement_times.clone(), settings.timezone),
            move || {
                let content = announce.clone();
                async move { content.announce().await }
            },
        )
        .await?;

    orchestrator
        .add_job(
            jobs::JELLYFIN_SUGGEST,
            Trigger::daily(jf.suggestion_times.clone(), settings.timezone),
            move || {
                let content = content.clone();
                async move { content.suggest().await }
            },
        )
        .await?;
    Ok(())
}

async fn register_minecraft(
    orchestrator: &JobOrchestrator,
    registry: &MonitorRegistry,
    mc: &MinecraftSettings,
) -> anyhow::Result<()> {
    for server in &mc.servers {
        let name = server.service_id();
        let monitor = registry
            .get(name)
            .with_context(|| format!("monitor for game server '{name}' missing"))?;

        let health = monitor.clone();
        orchestrator
            .add_job(
                &jobs::minecraft_health(name),
                Trigger::every(mc.health_check_interval),
                move || jobs::health_check(health.clone()),
            )
            .await?;

        orchestrator
            .add_job(
                &jobs::minecraft_players(name),
                Trigger::every(mc.player_check_interval),
                move || jobs::player_check(monitor.clone()),
            )
            .await?;
    }
    Ok(())
}
