//! Notifier sinks shipped with the daemon.
//!
//! `LogNotifier` renders every notification as structured log lines.
//! `ChannelNotifier` forwards them over an mpsc channel for embedders and
//! tests.

use async_trait::async_trait;
use chrono::TimeDelta;
use monolith_core::{Notification, NotifierSink, TransitionKind};
use monolith_protocol::jellyfin::item_url;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Human-readable length of a period: "45 seconds", "1 minute", "1h 1m",
/// "2d 3h". Negative spans read as zero.
pub fn format_duration(span: TimeDelta) -> String {
    fn plural(n: i64, unit: &str) -> String {
        format!("{n} {unit}{}", if n == 1 { "" } else { "s" })
    }

    let seconds = span.num_seconds().max(0);
    if seconds < 60 {
        return plural(seconds, "second");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let (hours, rem_minutes) = (minutes / 60, minutes % 60);
    if hours < 24 {
        return if rem_minutes > 0 {
            format!("{hours}h {rem_minutes}m")
        } else {
            plural(hours, "hour")
        };
    }
    let (days, rem_hours) = (hours / 24, hours % 24);
    if rem_hours > 0 {
        format!("{days}d {rem_hours}h")
    } else {
        plural(days, "day")
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotifierSink for LogNotifier {
    async fn notify(&self, notification: Notification) {
        match notification {
            Notification::Transition(event) => {
                let period = format_duration(event.duration());
                let address = event.address.as_deref().unwrap_or("-");
                match event.kind {
                    TransitionKind::WentOnline => info!(
                        service = %event.service_id,
                        %address,
                        version = event.info.as_ref().map(|i| i.version()).unwrap_or("-"),
                        downtime = %period,
                        "service is back online"
                    ),
                    TransitionKind::WentOffline => warn!(
                        service = %event.service_id,
                        tried = ?event.addresses_tried,
                        error = event.error.as_deref().unwrap_or("-"),
                        uptime = %period,
                        "service went offline"
                    ),
                }
            }
            Notification::NewContent(batch) => {
                info!(
                    service = %batch.service_id,
                    items = batch.total_items(),
                    window = ?batch.window,
                    "new content"
                );
                for section in &batch.sections {
                    for item in &section.items {
                        info!(
                            kind = section.kind.label(),
                            title = %item.display_title(),
                            link = %item_url(&batch.address, &item.id),
                            "  added"
                        );
                    }
                }
            }
            Notification::Suggestions(batch) => {
                for (kind, item) in &batch.picks {
                    info!(
                        service = %batch.service_id,
                        kind = kind.label(),
                        title = %item.display_title(),
                        link = %item_url(&batch.address, &item.id),
                        "suggestion"
                    );
                }
            }
            Notification::PlayersJoined(event) => {
                let joined: Vec<&str> = event.joined.iter().map(String::as_str).collect();
                info!(
                    service = %event.service_id,
                    joined = %joined.join(", "),
                    online = event.online_now,
                    max = event.max_players,
                    "players joined"
                );
            }
        }
    }
}

/// Forwards notifications to a bounded channel.
///
/// Never waits for capacity: a full channel or a closed receiver drops the
/// notification with a log line.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotifierSink for ChannelNotifier {
    async fn notify(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(service = %dropped.service_id(), "notification channel full, dropping");
            }
            Err(TrySendError::Closed(dropped)) => {
                debug!(service = %dropped.service_id(), "notification receiver closed, dropping");
            }
        }
    }
}
