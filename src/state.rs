use crate::activity::ActivityPayload;
use crate::model::{Device, DeviceRef, RigSnapshot};
use crate::selector::locate_device;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;

/// One refresh worth of telemetry: the snapshot and the device picked from it.
/// Never mutated after construction.
#[derive(Debug)]
pub struct MiningState {
    pub snapshot: RigSnapshot,
    pub selected: Option<DeviceRef>,
    pub refreshed_at: SystemTime,
}

impl MiningState {
    pub fn new(snapshot: RigSnapshot, brand: &str, refreshed_at: SystemTime) -> Self {
        let selected = locate_device(&snapshot, brand);
        Self {
            snapshot,
            selected,
            refreshed_at,
        }
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.selected.and_then(|at| self.snapshot.device_at(at))
    }
}

/// Single-slot holder shared by the refresh loop, the publisher and the
/// status server. Writers swap a whole value in, readers clone the `Arc`
/// out, so a reader sees either the old or the new state.
#[derive(Clone)]
pub struct SharedState {
    mining: Arc<watch::Sender<Option<Arc<MiningState>>>>,
    activity: Arc<watch::Sender<Option<ActivityPayload>>>,
    started_at: SystemTime,
}

impl SharedState {
    pub fn new(started_at: SystemTime) -> Self {
        let (mining, _) = watch::channel(None);
        let (activity, _) = watch::channel(None);
        Self {
            mining: Arc::new(mining),
            activity: Arc::new(activity),
            started_at,
        }
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn replace_mining(&self, state: MiningState) {
        self.mining.send_replace(Some(Arc::new(state)));
    }

    pub fn mining(&self) -> Option<Arc<MiningState>> {
        self.mining.borrow().clone()
    }

    pub fn record_activity(&self, payload: ActivityPayload) {
        self.activity.send_replace(Some(payload));
    }

    pub fn last_activity(&self) -> Option<ActivityPayload> {
        self.activity.borrow().clone()
    }
}
