use crate::state::SharedState;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub presence_refresh_total: Counter,
    pub presence_fetch_errors_total: CounterVec,
    pub presence_publish_total: Counter,
    pub presence_publish_skipped_total: Counter,
    pub presence_channel_errors_total: Counter,
    pub presence_channel_connected: Gauge,
    pub presence_tracked_devices: Gauge,
    pub presence_last_refresh_timestamp_seconds: Gauge,
    pub presence_uptime_seconds: Gauge,
    pub presence_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let presence_refresh_total = Counter::with_opts(opts!(
            "presence_refresh_total",
            "Successful NiceHash refreshes"
        ))?;
        let presence_fetch_errors_total = CounterVec::new(
            opts!(
                "presence_fetch_errors_total",
                "Failed NiceHash fetches by error kind"
            ),
            &["kind"],
        )?;
        let presence_publish_total = Counter::with_opts(opts!(
            "presence_publish_total",
            "Activities accepted by the presence channel"
        ))?;
        let presence_publish_skipped_total = Counter::with_opts(opts!(
            "presence_publish_skipped_total",
            "Publish ticks skipped because no device data was available"
        ))?;
        let presence_channel_errors_total = Counter::with_opts(opts!(
            "presence_channel_errors_total",
            "Presence connection or write failures"
        ))?;
        let presence_channel_connected = Gauge::with_opts(opts!(
            "presence_channel_connected",
            "1 while the presence channel is connected"
        ))?;
        let presence_tracked_devices = Gauge::with_opts(opts!(
            "presence_tracked_devices",
            "Devices in the latest snapshot across all rigs"
        ))?;
        let presence_last_refresh_timestamp_seconds = Gauge::with_opts(opts!(
            "presence_last_refresh_timestamp_seconds",
            "Unix time of the last successful refresh"
        ))?;
        let presence_uptime_seconds = Gauge::with_opts(opts!(
            "presence_uptime_seconds",
            "Seconds since the process started"
        ))?;
        let presence_scrape_count_total = Counter::with_opts(opts!(
            "presence_scrape_count_total",
            "Scrapes of the metrics endpoint"
        ))?;

        register(&registry, &presence_refresh_total)?;
        register(&registry, &presence_fetch_errors_total)?;
        register(&registry, &presence_publish_total)?;
        register(&registry, &presence_publish_skipped_total)?;
        register(&registry, &presence_channel_errors_total)?;
        register(&registry, &presence_channel_connected)?;
        register(&registry, &presence_tracked_devices)?;
        register(&registry, &presence_last_refresh_timestamp_seconds)?;
        register(&registry, &presence_uptime_seconds)?;
        register(&registry, &presence_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            presence_refresh_total,
            presence_fetch_errors_total,
            presence_publish_total,
            presence_publish_skipped_total,
            presence_channel_errors_total,
            presence_channel_connected,
            presence_tracked_devices,
            presence_last_refresh_timestamp_seconds,
            presence_uptime_seconds,
            presence_scrape_count_total,
        }))
    }

    pub fn update_from_state(&self, state: &SharedState) {
        if let Some(mining) = state.mining() {
            self.presence_tracked_devices
                .set(mining.snapshot.device_count() as f64);
            self.presence_last_refresh_timestamp_seconds
                .set(unix_secs(mining.refreshed_at) as f64);
        }
        let uptime = unix_secs(SystemTime::now()).saturating_sub(unix_secs(state.started_at()));
        self.presence_uptime_seconds.set(uptime as f64);
    }

    pub fn inc_refresh(&self) {
        self.presence_refresh_total.inc();
    }

    pub fn inc_fetch_error(&self, kind: &str) {
        self.presence_fetch_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_publish(&self) {
        self.presence_publish_total.inc();
    }

    pub fn inc_publish_skipped(&self) {
        self.presence_publish_skipped_total.inc();
    }

    pub fn inc_channel_error(&self) {
        self.presence_channel_errors_total.inc();
    }

    pub fn set_channel_connected(&self, connected: bool) {
        self.presence_channel_connected
            .set(if connected { 1.0 } else { 0.0 });
    }

    pub fn inc_scrape_count(&self) {
        self.presence_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
