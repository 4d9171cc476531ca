use crate::config::RelayConfig;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub mod clock;
pub mod delivery;
pub mod directory;
pub mod updates;

pub use clock::HttpConversationClock;
pub use delivery::HttpDeliveryClient;
pub use directory::HttpDirectory;
pub use updates::HttpUpdateFeed;

/// Phrases the relay uses when it refuses a message for arriving out of order.
const ORDERING_SIGNATURES: &[&str] = &[
    "time order",
    "out of order",
    "out-of-order",
    "dateunix must",
    "earlier than the last",
    "时间顺序",
    "早于最后",
];

/// Largest magnitude an `f64` holds without losing integer precision.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Response shape shared by the relay's JSON API endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope {
    #[serde(default)]
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) data: Option<Value>,
    #[serde(default, rename = "errMessage")]
    pub(crate) err_message: Option<String>,
}

/// Response shape of the bot endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct BotEnvelope {
    #[serde(default)]
    pub(crate) ok: bool,
    #[serde(default)]
    pub(crate) result: Option<Value>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

/// Endpoints and HTTP client shared by every relay adapter.
#[derive(Clone, Debug)]
pub struct RelayEndpoints {
    http: reqwest::Client,
    api_base: String,
    bot_base: String,
}

impl RelayEndpoints {
    /// Builds the shared client with the configured timeouts.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &RelayConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        let api_base = config.api_base_url.trim_end_matches('/').to_string();
        let bot_base = config
            .bot_base_url
            .as_deref()
            .map_or_else(|| api_base.clone(), |url| url.trim_end_matches('/').to_string());
        Ok(Self { http, api_base, bot_base })
    }

    pub(crate) fn api(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base)
    }

    pub(crate) fn bot(&self, path: &str) -> String {
        format!("{}/{path}", self.bot_base)
    }

    pub(crate) const fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Whether a relay error text describes an ordering rejection.
pub(crate) fn is_ordering_rejection(text: &str) -> bool {
    let lower = text.to_lowercase();
    ORDERING_SIGNATURES.iter().any(|signature| lower.contains(signature))
}

/// Error text the relay put in an `errMessage` or `description` field, if the body carries one.
pub(crate) fn relay_error_text(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["errMessage", "description"]
        .iter()
        .find_map(|field| value.get(field).and_then(Value::as_str))
        .map(str::to_string)
}

/// Reads an integer that the relay may encode as a JSON number or a numeric string.
///
/// Fractional or out-of-range numbers are rejected rather than truncated.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
