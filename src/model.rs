use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const STATUS_MINING: &str = "MINING";
pub const STATUS_DISABLED: &str = "DISABLED";

/// Response of `GET /main/api/v2/mining/rigs2`, trimmed to the fields the
/// presence needs. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RigSnapshot {
    #[serde(default)]
    pub mining_rigs: Vec<Rig>,
    #[serde(deserialize_with = "de_decimal_text")]
    pub unpaid_amount: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub next_payout_timestamp: SystemTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rig {
    #[serde(default)]
    pub rig_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub device_type: Tag,
    #[serde(default)]
    pub status: Tag,
    #[serde(default)]
    pub speeds: Vec<Speed>,
    #[serde(default, deserialize_with = "de_number")]
    pub power_usage: f64,
    #[serde(default)]
    pub intensity: Tag,
}

/// NiceHash enum value: machine name plus a human description.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub enum_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speed {
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub title: String,
    #[serde(deserialize_with = "de_number")]
    pub speed: f64,
    #[serde(default)]
    pub display_suffix: String,
}

/// Position of a device inside a snapshot: rig index, then device index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceRef {
    pub rig: usize,
    pub device: usize,
}

impl RigSnapshot {
    pub fn device_at(&self, at: DeviceRef) -> Option<&Device> {
        self.mining_rigs.get(at.rig)?.devices.get(at.device)
    }

    pub fn device_count(&self) -> usize {
        self.mining_rigs.iter().map(|rig| rig.devices.len()).sum()
    }
}

impl Device {
    pub fn is_mining(&self) -> bool {
        self.status.enum_name == STATUS_MINING
    }

    pub fn is_disabled(&self) -> bool {
        self.status.enum_name == STATUS_DISABLED
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

fn de_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(v) => Ok(v),
        NumberOrText::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid number '{text}'"))),
    }
}

// Amounts stay textual so the presence shows exactly what NiceHash reports.
fn de_decimal_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(v) => Ok(v.to_string()),
        NumberOrText::Text(text) => Ok(text),
    }
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(ms) if ms >= 0.0 => {
            Ok(UNIX_EPOCH + Duration::from_millis(ms as u64))
        }
        NumberOrText::Number(ms) => Err(D::Error::custom(format!("negative timestamp {ms}"))),
        NumberOrText::Text(text) => humantime::parse_rfc3339_weak(text.trim())
            .map_err(|err| D::Error::custom(format!("invalid timestamp '{text}': {err}"))),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn device(name: &str, brand: &str, status: &str) -> Device {
        Device {
            id: format!("{name}-id"),
            name: name.to_string(),
            device_type: Tag {
                enum_name: brand.to_string(),
                description: brand.to_string(),
            },
            status: Tag {
                enum_name: status.to_string(),
                description: status.to_lowercase(),
            },
            speeds: vec![],
            power_usage: 0.0,
            intensity: Tag {
                enum_name: "LOW".to_string(),
                description: "Low power mode".to_string(),
            },
        }
    }

    pub fn rig(name: &str, devices: Vec<Device>) -> Rig {
        Rig {
            rig_id: format!("{name}-id"),
            name: name.to_string(),
            devices,
        }
    }

    pub fn snapshot(rigs: Vec<Rig>) -> RigSnapshot {
        RigSnapshot {
            mining_rigs: rigs,
            unpaid_amount: "0.00012345".to_string(),
            next_payout_timestamp: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        }
    }
}
