use crate::locale::Language;
use crate::model::{Device, RigSnapshot};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The two presence lines shown under the application name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub details: String,
    pub state: String,
}

/// Fixed artwork shown next to the activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub large_image_key: String,
    pub large_image_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityPayload {
    pub details: String,
    pub state: String,
    pub start_timestamp_ms: u64,
    pub large_image_key: String,
    pub large_image_text: String,
    pub instance: bool,
}

impl ActivityPayload {
    pub fn new(activity: Activity, start: SystemTime, branding: &Branding) -> Self {
        Self {
            details: activity.details,
            state: activity.state,
            start_timestamp_ms: unix_millis(start),
            large_image_key: branding.large_image_key.clone(),
            large_image_text: branding.large_image_text.clone(),
            instance: false,
        }
    }
}

/// Builds the activity for `device`. Payout figures are only read while the
/// device is mining.
pub fn format_activity(
    device: &Device,
    snapshot: &RigSnapshot,
    now: SystemTime,
    language: Language,
) -> Activity {
    if !device.is_mining() {
        return Activity {
            details: device.name.clone(),
            state: device.status.description.clone(),
        };
    }

    let speed = match device.speeds.first() {
        Some(speed) => format!("{:.2} {}/s", speed.speed, speed.display_suffix),
        None => "0".to_string(),
    };
    let details = format!(
        "{} ({}) {}W ({})",
        device.name, speed, device.power_usage, device.intensity.description
    );

    let remaining = time_until(snapshot.next_payout_timestamp, now);
    let state = language.payout_state(&format_countdown(remaining), &snapshot.unpaid_amount);

    Activity { details, state }
}

/// Time left until `target`; zero once it has passed.
pub fn time_until(target: SystemTime, now: SystemTime) -> Duration {
    target.duration_since(now).unwrap_or(Duration::ZERO)
}

/// `HH:MM:SS`, hours keep counting past 24.
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
