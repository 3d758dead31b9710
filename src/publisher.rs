use crate::activity::{format_activity, unix_millis, ActivityPayload, Branding};
use crate::discord::{PresenceChannel, PresenceConnector};
use crate::locale::Language;
use crate::metrics::Metrics;
use crate::state::SharedState;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    NoData,
    Disconnected,
    Failed,
}

/// Pushes the formatted activity for the tracked device to the presence
/// channel. Owns the connection and the session start timestamp.
pub struct Publisher<C: PresenceConnector> {
    connector: C,
    channel: Option<C::Channel>,
    state: SharedState,
    metrics: Arc<Metrics>,
    branding: Branding,
    language: Language,
    reconnect_interval: Duration,
    start_timestamp: Option<SystemTime>,
    last_connect_attempt: Option<Instant>,
}

impl<C: PresenceConnector> Publisher<C> {
    pub fn new(
        connector: C,
        state: SharedState,
        metrics: Arc<Metrics>,
        branding: Branding,
        language: Language,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            connector,
            channel: None,
            state,
            metrics,
            branding,
            language,
            reconnect_interval,
            start_timestamp: None,
            last_connect_attempt: None,
        }
    }

    pub fn start_timestamp(&self) -> Option<SystemTime> {
        self.start_timestamp
    }

    /// Connects unless already connected or the last attempt was less than
    /// `reconnect_interval` ago. Returns whether a channel is ready.
    pub async fn ensure_connected(&mut self) -> bool {
        if self.channel.is_some() {
            return true;
        }
        if let Some(last) = self.last_connect_attempt {
            if last.elapsed() < self.reconnect_interval {
                return false;
            }
        }
        self.last_connect_attempt = Some(Instant::now());

        match self.connector.connect().await {
            Ok(channel) => {
                let start = *self.start_timestamp.get_or_insert_with(SystemTime::now);
                info!(start_ms = unix_millis(start), "presence channel ready");
                self.channel = Some(channel);
                self.metrics.set_channel_connected(true);
                true
            }
            Err(err) => {
                warn!(error = %err, "presence channel unavailable");
                self.metrics.inc_channel_error();
                false
            }
        }
    }

    /// One publish: format from the current state and send. Nothing is sent
    /// while no snapshot or no matching device is available.
    pub async fn publish_tick(&mut self) -> TickOutcome {
        let payload = {
            let Some(mining) = self.state.mining() else {
                debug!("no rig data yet, skipping publish");
                self.metrics.inc_publish_skipped();
                return TickOutcome::NoData;
            };
            let Some(device) = mining.selected_device() else {
                debug!("no active device selected, skipping publish");
                self.metrics.inc_publish_skipped();
                return TickOutcome::NoData;
            };
            let (Some(start), true) = (self.start_timestamp, self.channel.is_some()) else {
                return TickOutcome::Disconnected;
            };
            let activity =
                format_activity(device, &mining.snapshot, SystemTime::now(), self.language);
            ActivityPayload::new(activity, start, &self.branding)
        };

        let Some(channel) = self.channel.as_mut() else {
            return TickOutcome::Disconnected;
        };
        match channel.set_activity(&payload).await {
            Ok(()) => {
                self.metrics.inc_publish();
                self.state.record_activity(payload);
                TickOutcome::Published
            }
            Err(err) => {
                warn!(error = %err, "failed to set activity, dropping presence connection");
                self.channel = None;
                self.metrics.inc_channel_error();
                self.metrics.set_channel_connected(false);
                TickOutcome::Failed
            }
        }
    }

    /// Waits for the channel to become ready, publishes immediately, then
    /// every `period` until shutdown.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut retry = interval(self.reconnect_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("publisher stopping before presence channel became ready");
                    return;
                }
                _ = retry.tick() => {
                    if self.ensure_connected().await {
                        break;
                    }
                }
            }
        }

        self.publish_tick().await;

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let session_secs = self
                        .start_timestamp()
                        .and_then(|start| start.elapsed().ok())
                        .map_or(0, |d| d.as_secs());
                    info!(session_secs, "publisher stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if self.ensure_connected().await {
                        self.publish_tick().await;
                    }
                }
            }
        }

        self.disconnect().await;
    }

    /// Clears the activity and closes the connection, if any.
    pub async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(err) = channel.clear_activity().await {
                debug!(error = %err, "failed to clear activity on shutdown");
            }
            if let Err(err) = channel.close().await {
                debug!(error = %err, "failed to close presence channel");
            }
        }
        self.metrics.set_channel_connected(false);
    }
}
