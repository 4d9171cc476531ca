use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;
use time::UtcOffset;
use time::macros::format_description;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub store: StoreConfig,

    #[command(flatten)]
    pub relay: RelayConfig,

    #[command(flatten)]
    pub dispatch: DispatchConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "RELAY_DISPATCH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "RELAY_DISPATCH_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seconds to wait for an active dispatch run to stop during shutdown
    #[arg(long, env = "RELAY_DISPATCH_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8080, shutdown_timeout_secs: 10 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct StoreConfig {
    /// JSON file holding the message list
    #[arg(long = "store-path", env = "RELAY_DISPATCH_STORE_PATH", default_value = "messages.json")]
    pub path: PathBuf,

    /// Offset applied to scheduled times written without one, e.g. +08:00
    #[arg(long, env = "RELAY_DISPATCH_UTC_OFFSET", default_value = "+00:00", value_parser = parse_utc_offset)]
    pub utc_offset: UtcOffset,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("messages.json"), utc_offset: UtcOffset::UTC }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RelayVariant {
    /// JSON import endpoint on the API host; returns an acknowledgment envelope
    #[default]
    Import,
    /// Bot-style `sendTextMessage` command; acknowledgments need reconciliation
    Bot,
}

#[derive(Clone, Debug, Args)]
pub struct RelayConfig {
    /// Base URL of the directory, conversation clock and import endpoints
    #[arg(long, env = "RELAY_DISPATCH_API_BASE_URL", default_value = "http://localhost:9999/api/v1")]
    pub api_base_url: String,

    /// Base URL of the bot endpoints (sendTextMessage, getUpdates), token included
    #[arg(long, env = "RELAY_DISPATCH_BOT_BASE_URL")]
    pub bot_base_url: Option<String>,

    /// Which relay send integration to use
    #[arg(long = "relay-variant", env = "RELAY_DISPATCH_RELAY_VARIANT", value_enum, default_value_t = RelayVariant::Import)]
    pub variant: RelayVariant,

    /// Chat the bot variant posts its send commands to
    #[arg(long, env = "RELAY_DISPATCH_CHAT_ID", default_value_t = 777_000)]
    pub chat_id: i64,

    /// Chat type of the bot variant command chat
    #[arg(long, env = "RELAY_DISPATCH_CHAT_TYPE", default_value_t = 1)]
    pub chat_type: i32,

    /// Total request timeout for relay calls
    #[arg(long, env = "RELAY_DISPATCH_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Connect timeout for relay calls
    #[arg(long, env = "RELAY_DISPATCH_CONNECT_TIMEOUT_SECS", default_value_t = 5)]
    pub connect_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:9999/api/v1".to_string(),
            bot_base_url: None,
            variant: RelayVariant::Import,
            chat_id: 777_000,
            chat_type: 1,
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ClockFailurePolicy {
    /// A failed clock lookup counts as "no prior message" and the send proceeds
    #[default]
    Open,
    /// A failed clock lookup fails the message without sending it
    Closed,
}

#[derive(Clone, Debug, Args)]
pub struct DispatchConfig {
    /// Pause between consecutive sends of a batch
    #[arg(long, env = "RELAY_DISPATCH_INTER_MESSAGE_DELAY_MS", default_value_t = 500)]
    pub inter_message_delay_ms: u64,

    /// Query the conversation clock before sending
    #[arg(
        long,
        env = "RELAY_DISPATCH_ORDERING_PRECHECK",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub ordering_precheck: bool,

    /// What to do when the conversation clock cannot be reached
    #[arg(long, env = "RELAY_DISPATCH_CLOCK_FAILURE_POLICY", value_enum, default_value_t = ClockFailurePolicy::Open)]
    pub clock_failure_policy: ClockFailurePolicy,

    /// Maximum age of a conversation clock reading before it is queried again
    #[arg(long, env = "RELAY_DISPATCH_CLOCK_MAX_AGE_SECS", default_value_t = 5)]
    pub clock_max_age_secs: u64,

    /// Confirm each accepted send against the relay update feed
    #[arg(
        long,
        env = "RELAY_DISPATCH_VERIFY_AFTER_SEND",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub verify_after_send: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inter_message_delay_ms: 500,
            ordering_precheck: true,
            clock_failure_policy: ClockFailurePolicy::Open,
            clock_max_age_secs: 5,
            verify_after_send: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "RELAY_DISPATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP gRPC collector endpoint; traces and metrics are exported when set
    #[arg(long, env = "RELAY_DISPATCH_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

fn parse_utc_offset(raw: &str) -> Result<UtcOffset, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(raw, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
        .map_err(|e| format!("invalid UTC offset '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+08:00"), Ok(UtcOffset::from_hms(8, 0, 0).expect("valid offset")));
        assert_eq!(parse_utc_offset("-05:30"), Ok(UtcOffset::from_hms(-5, -30, 0).expect("valid offset")));
        assert_eq!(parse_utc_offset("Z"), Ok(UtcOffset::UTC));
        assert!(parse_utc_offset("8").is_err());
    }

    #[test]
    fn test_defaults_match_cli() {
        let config = Config::parse_from(["relay-dispatch"]);
        let dispatch = DispatchConfig::default();

        assert_eq!(config.dispatch.inter_message_delay_ms, dispatch.inter_message_delay_ms);
        assert_eq!(config.dispatch.ordering_precheck, dispatch.ordering_precheck);
        assert_eq!(config.dispatch.clock_failure_policy, dispatch.clock_failure_policy);
        assert_eq!(config.relay.variant, RelayVariant::Import);
        assert_eq!(config.store.utc_offset, UtcOffset::UTC);
        assert_eq!(config.server.port, ServerConfig::default().port);
    }

    #[test]
    fn test_boolean_flags_take_values() {
        let config = Config::parse_from([
            "relay-dispatch",
            "--ordering-precheck",
            "false",
            "--verify-after-send",
            "true",
            "--relay-variant",
            "bot",
            "--clock-failure-policy",
            "closed",
        ]);

        assert!(!config.dispatch.ordering_precheck);
        assert!(config.dispatch.verify_after_send);
        assert_eq!(config.relay.variant, RelayVariant::Bot);
        assert_eq!(config.dispatch.clock_failure_policy, ClockFailurePolicy::Closed);
    }
}
