use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    En,
}

impl Language {
    pub fn payout_state(self, countdown: &str, unpaid_amount: &str) -> String {
        match self {
            Language::Ja => {
                format!("次回のお支払い {countdown} / 未払いマイニング報酬: {unpaid_amount} BTC")
            }
            Language::En => {
                format!("Next payout {countdown} / Unpaid mining rewards: {unpaid_amount} BTC")
            }
        }
    }

    pub fn missing_credentials(self) -> &'static str {
        match self {
            Language::Ja => "NiceHash API Key 等を config.yaml に記述してください",
            Language::En => {
                "Set the NiceHash API key, secret, organization id and gpu_device_brand in config.yaml"
            }
        }
    }

    pub fn error_title(self) -> &'static str {
        match self {
            Language::Ja => "エラー",
            Language::En => "Error",
        }
    }
}
