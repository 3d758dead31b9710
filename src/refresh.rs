use crate::metrics::Metrics;
use crate::nicehash::{TelemetryError, TelemetrySource};
use crate::state::{MiningState, SharedState};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Fetches once, selects the device and swaps the result into `state`.
/// On error the previous state stays in place.
pub async fn refresh_once<T>(
    source: &T,
    brand: &str,
    state: &SharedState,
    metrics: &Metrics,
) -> Result<(), TelemetryError>
where
    T: TelemetrySource + ?Sized,
{
    let snapshot = match source.fetch().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            metrics.inc_fetch_error(err.kind());
            return Err(err);
        }
    };

    let mining = MiningState::new(snapshot, brand, SystemTime::now());
    match mining.selected_device() {
        Some(device) => tracing::debug!(
            device = %device.name,
            status = %device.status.enum_name,
            "device selected"
        ),
        None => tracing::debug!(brand, "no active device matches brand"),
    }
    state.replace_mining(mining);
    metrics.inc_refresh();
    metrics.update_from_state(state);
    Ok(())
}

/// Retries the first fetch every `retry` until it succeeds. Returns `false`
/// if shutdown arrives first.
pub async fn initial_refresh<T>(
    source: &T,
    brand: &str,
    state: &SharedState,
    metrics: &Metrics,
    retry: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool
where
    T: TelemetrySource + ?Sized,
{
    let mut ticker = interval(retry);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("shutdown requested before the first successful refresh");
                return false;
            }
            _ = ticker.tick() => {
                match refresh_once(source, brand, state, metrics).await {
                    Ok(()) => return true,
                    Err(err) => warn!(
                        error = %err,
                        kind = err.kind(),
                        retry_secs = retry.as_secs(),
                        "initial rig fetch failed, retrying"
                    ),
                }
            }
        }
    }
}

/// Refreshes every `period` until shutdown. The first tick fires one period
/// after start since bootstrap already performed the initial fetch.
pub async fn run_refresh_loop<T>(
    source: T,
    brand: String,
    state: SharedState,
    metrics: Arc<Metrics>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    T: TelemetrySource,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("refresh loop stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = refresh_once(&source, &brand, &state, &metrics).await {
                    warn!(error = %err, kind = err.kind(), "rig refresh failed, keeping previous data");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::fixtures::{device, rig, snapshot};
    use crate::model::RigSnapshot;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued responses; once drained, every fetch is a 503.
    pub(crate) struct ScriptedSource {
        responses: Mutex<VecDeque<Result<RigSnapshot, TelemetryError>>>,
        pub calls: Mutex<usize>,
    }

    impl ScriptedSource {
        pub(crate) fn new(responses: Vec<Result<RigSnapshot, TelemetryError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for ScriptedSource {
        async fn fetch(&self) -> Result<RigSnapshot, TelemetryError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TelemetryError::Status { status: 503 }))
        }
    }

    fn named(name: &str) -> RigSnapshot {
        snapshot(vec![rig("r", vec![device(name, "NVIDIA", "MINING")])])
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_state() {
        let metrics = Metrics::new().unwrap();
        let state = SharedState::new(SystemTime::now());
        let source = ScriptedSource::new(vec![
            Ok(named("first")),
            Err(TelemetryError::Auth { status: 401 }),
        ]);

        refresh_once(&source, "NVIDIA", &state, &metrics)
            .await
            .expect("first refresh");
        let err = refresh_once(&source, "NVIDIA", &state, &metrics)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "auth");
        let current = state.mining().expect("previous state retained");
        assert_eq!(current.selected_device().unwrap().name, "first");
        assert_eq!(metrics.presence_refresh_total.get(), 1.0);
        assert_eq!(
            metrics
                .presence_fetch_errors_total
                .with_label_values(&["auth"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn refresh_without_matching_device_stores_empty_selection() {
        let metrics = Metrics::new().unwrap();
        let state = SharedState::new(SystemTime::now());
        let source = ScriptedSource::new(vec![Ok(named("amd-only"))]);

        refresh_once(&source, "AMD", &state, &metrics).await.unwrap();

        let current = state.mining().expect("snapshot stored");
        assert!(current.selected.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn initial_refresh_retries_until_success() {
        let metrics = Metrics::new().unwrap();
        let state = SharedState::new(SystemTime::now());
        let source = ScriptedSource::new(vec![
            Err(TelemetryError::Status { status: 503 }),
            Err(TelemetryError::Auth { status: 401 }),
            Ok(named("late")),
        ]);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let started = Instant::now();

        let ready = initial_refresh(
            &source,
            "NVIDIA",
            &state,
            &metrics,
            Duration::from_secs(1),
            &mut shutdown_rx,
        )
        .await;

        assert!(ready);
        assert_eq!(*source.calls.lock().unwrap(), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3));
        assert_eq!(
            state.mining().unwrap().selected_device().unwrap().name,
            "late"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn initial_refresh_stops_on_shutdown() {
        let metrics = Metrics::new().unwrap();
        let state = SharedState::new(SystemTime::now());
        let source = ScriptedSource::new(vec![]);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(4_500)).await;
            shutdown_tx.send(true).unwrap();
        });

        let ready = initial_refresh(
            &source,
            "NVIDIA",
            &state,
            &metrics,
            Duration::from_secs(1),
            &mut shutdown_rx,
        )
        .await;

        assert!(!ready);
        assert_eq!(*source.calls.lock().unwrap(), 5);
        assert!(state.mining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_on_period_and_survives_errors() {
        let metrics = Metrics::new().unwrap();
        let state = SharedState::new(SystemTime::now());
        let source = Arc::new(ScriptedSource::new(vec![
            Err(TelemetryError::Status { status: 500 }),
            Ok(named("second")),
        ]));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_refresh_loop(
            Arc::clone(&source),
            "NVIDIA".to_string(),
            state.clone(),
            Arc::clone(&metrics),
            Duration::from_secs(30),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(*source.calls.lock().unwrap(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*source.calls.lock().unwrap(), 1);
        assert!(state.mining().is_none());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(*source.calls.lock().unwrap(), 2);
        assert_eq!(
            state.mining().unwrap().selected_device().unwrap().name,
            "second"
        );

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
