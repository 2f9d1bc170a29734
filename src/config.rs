//! Configuration types for predictor-engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub round: RoundConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Where live prices come from
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedSourceKind {
    #[default]
    Binance,
    Synthetic,
}

/// Price feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub source: FeedSourceKind,

    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// WebSocket base URL; the stream name is appended
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// REST base URL for the kline history seed
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Reconnection attempts before falling back to synthetic prices
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_initial_reconnect_delay_ms")]
    pub initial_reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Trailing window size
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Fetch kline history before opening the stream
    #[serde(default = "default_true")]
    pub seed_history: bool,

    #[serde(default = "default_synthetic_interval_ms")]
    pub synthetic_interval_ms: u64,

    /// Width of one random-walk step
    #[serde(default = "default_synthetic_step")]
    pub synthetic_step: Decimal,

    /// Synthetic prices never go below this
    #[serde(default = "default_synthetic_floor")]
    pub synthetic_floor: Decimal,

    /// Start price when no live price was ever observed
    #[serde(default = "default_synthetic_start_price")]
    pub synthetic_start_price: Decimal,
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}
fn default_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}
fn default_rest_url() -> String {
    "https://api.binance.com".to_string()
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_initial_reconnect_delay_ms() -> u64 {
    1_000
}
fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}
fn default_history_capacity() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_synthetic_interval_ms() -> u64 {
    1_000
}
fn default_synthetic_step() -> Decimal {
    Decimal::new(1000, 0) // +/- 500 per step
}
fn default_synthetic_floor() -> Decimal {
    Decimal::new(10_000, 0)
}
fn default_synthetic_start_price() -> Decimal {
    Decimal::new(50_000, 0)
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: FeedSourceKind::Binance,
            symbol: default_symbol(),
            ws_url: default_ws_url(),
            rest_url: default_rest_url(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            initial_reconnect_delay_ms: default_initial_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            history_capacity: default_history_capacity(),
            seed_history: true,
            synthetic_interval_ms: default_synthetic_interval_ms(),
            synthetic_step: default_synthetic_step(),
            synthetic_floor: default_synthetic_floor(),
            synthetic_start_price: default_synthetic_start_price(),
        }
    }
}

/// Round timing and scoring
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoundConfig {
    #[serde(default = "default_round_duration_ms")]
    pub duration_ms: u64,

    /// Betting closes this long before the round ends
    #[serde(default = "default_anti_cheat_buffer_ms")]
    pub anti_cheat_buffer_ms: u64,

    #[serde(default = "default_points_per_win")]
    pub points_per_win: u64,

    /// Gap between settlement and the next round opening
    #[serde(default = "default_inter_round_pause_ms")]
    pub inter_round_pause_ms: u64,

    /// How long `run` waits for the first price before giving up
    #[serde(default = "default_startup_price_timeout_ms")]
    pub startup_price_timeout_ms: u64,
}

fn default_round_duration_ms() -> u64 {
    10_000
}
fn default_anti_cheat_buffer_ms() -> u64 {
    250
}
fn default_points_per_win() -> u64 {
    10
}
fn default_inter_round_pause_ms() -> u64 {
    1_000
}
fn default_startup_price_timeout_ms() -> u64 {
    15_000
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_round_duration_ms(),
            anti_cheat_buffer_ms: default_anti_cheat_buffer_ms(),
            points_per_win: default_points_per_win(),
            inter_round_pause_ms: default_inter_round_pause_ms(),
            startup_price_timeout_ms: default_startup_price_timeout_ms(),
        }
    }
}

impl RoundConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn anti_cheat_buffer(&self) -> Duration {
        Duration::from_millis(self.anti_cheat_buffer_ms)
    }

    pub fn inter_round_pause(&self) -> Duration {
        Duration::from_millis(self.inter_round_pause_ms)
    }
}

/// Session registry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Sessions unseen for longer than this are swept
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Linked sessions are asked for a Telegram handle after this many rounds
    #[serde(default = "default_telegram_prompt_after_rounds")]
    pub telegram_prompt_after_rounds: u32,
}

fn default_idle_timeout_secs() -> u64 {
    24 * 60 * 60
}
fn default_sweep_interval_secs() -> u64 {
    60 * 60
}
fn default_telegram_prompt_after_rounds() -> u32 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            telegram_prompt_after_rounds: default_telegram_prompt_after_rounds(),
        }
    }
}

/// Durable record store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Lock acquisition retries after the first attempt
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    #[serde(default = "default_lock_min_backoff_ms")]
    pub lock_min_backoff_ms: u64,

    #[serde(default = "default_lock_max_backoff_ms")]
    pub lock_max_backoff_ms: u64,

    #[serde(default = "default_lock_backoff_factor")]
    pub lock_backoff_factor: f64,

    /// Lock files older than this are considered abandoned
    #[serde(default = "default_lock_stale_ms")]
    pub lock_stale_ms: u64,

    /// Session rows newer than this survive compaction
    #[serde(default = "default_session_retention_secs")]
    pub session_retention_secs: u64,

    #[serde(default = "default_compaction_interval_secs")]
    pub compaction_interval_secs: u64,

    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_lock_retries() -> u32 {
    5
}
fn default_lock_min_backoff_ms() -> u64 {
    100
}
fn default_lock_max_backoff_ms() -> u64 {
    1_000
}
fn default_lock_backoff_factor() -> f64 {
    1.5
}
fn default_lock_stale_ms() -> u64 {
    10_000
}
fn default_session_retention_secs() -> u64 {
    24 * 60 * 60
}
fn default_compaction_interval_secs() -> u64 {
    24 * 60 * 60
}
fn default_snapshot_interval_secs() -> u64 {
    5 * 60
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lock_retries: default_lock_retries(),
            lock_min_backoff_ms: default_lock_min_backoff_ms(),
            lock_max_backoff_ms: default_lock_max_backoff_ms(),
            lock_backoff_factor: default_lock_backoff_factor(),
            lock_stale_ms: default_lock_stale_ms(),
            session_retention_secs: default_session_retention_secs(),
            compaction_interval_secs: default_compaction_interval_secs(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus scrape port; metrics are not exported when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override the operational constants from `lookup` (the environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))
        }

        if let Some(raw) = lookup("PREDICTOR_ROUND_DURATION_MS") {
            self.round.duration_ms = parse("PREDICTOR_ROUND_DURATION_MS", raw)?;
        }
        if let Some(raw) = lookup("PREDICTOR_ANTI_CHEAT_BUFFER_MS") {
            self.round.anti_cheat_buffer_ms = parse("PREDICTOR_ANTI_CHEAT_BUFFER_MS", raw)?;
        }
        if let Some(raw) = lookup("PREDICTOR_POINTS_PER_WIN") {
            self.round.points_per_win = parse("PREDICTOR_POINTS_PER_WIN", raw)?;
        }
        if let Some(raw) = lookup("PREDICTOR_SESSION_IDLE_SECS") {
            self.session.idle_timeout_secs = parse("PREDICTOR_SESSION_IDLE_SECS", raw)?;
        }
        if let Some(raw) = lookup("PREDICTOR_FEED_MAX_RECONNECTS") {
            self.feed.max_reconnect_attempts = parse("PREDICTOR_FEED_MAX_RECONNECTS", raw)?;
        }
        if let Some(raw) = lookup("PREDICTOR_DATA_DIR") {
            self.ledger.data_dir = PathBuf::from(raw);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [feed]
            source = "synthetic"
            symbol = "ETHUSDT"
            max_reconnect_attempts = 3
            synthetic_floor = 1500.5

            [round]
            duration_ms = 30000
            anti_cheat_buffer_ms = 500
            points_per_win = 25

            [session]
            idle_timeout_secs = 600

            [ledger]
            data_dir = "/var/lib/predictor"
            lock_retries = 2

            [telemetry]
            log_level = "debug"
            log_format = "json"
            metrics_port = 9090
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.source, FeedSourceKind::Synthetic);
        assert_eq!(config.feed.symbol, "ETHUSDT");
        assert_eq!(config.feed.max_reconnect_attempts, 3);
        assert_eq!(config.feed.synthetic_floor, dec!(1500.5));
        assert_eq!(config.round.duration(), Duration::from_secs(30));
        assert_eq!(config.round.anti_cheat_buffer(), Duration::from_millis(500));
        assert_eq!(config.round.points_per_win, 25);
        assert_eq!(config.session.idle_timeout_secs, 600);
        assert_eq!(config.ledger.data_dir, PathBuf::from("/var/lib/predictor"));
        assert_eq!(config.ledger.lock_retries, 2);
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.telemetry.metrics_port, Some(9090));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.feed.source, FeedSourceKind::Binance);
        assert_eq!(config.feed.symbol, "BTCUSDT");
        assert_eq!(config.feed.max_reconnect_attempts, 5);
        assert_eq!(config.feed.history_capacity, 100);
        assert_eq!(config.round.duration_ms, 10_000);
        assert_eq!(config.round.anti_cheat_buffer_ms, 250);
        assert_eq!(config.round.points_per_win, 10);
        assert_eq!(config.session.idle_timeout_secs, 86_400);
        assert_eq!(config.session.telegram_prompt_after_rounds, 10);
        assert_eq!(config.ledger.lock_retries, 5);
        assert!(config.telemetry.metrics_port.is_none());
    }

    #[test]
    fn test_partial_section_fills_remaining_fields() {
        let config: Config = toml::from_str("[round]\npoints_per_win = 3\n").unwrap();
        assert_eq!(config.round.points_per_win, 3);
        assert_eq!(config.round.duration_ms, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PREDICTOR_ROUND_DURATION_MS", "5000"),
            ("PREDICTOR_ANTI_CHEAT_BUFFER_MS", " 100 "),
            ("PREDICTOR_POINTS_PER_WIN", "7"),
            ("PREDICTOR_SESSION_IDLE_SECS", "60"),
            ("PREDICTOR_FEED_MAX_RECONNECTS", "2"),
            ("PREDICTOR_DATA_DIR", "/tmp/ledger"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.round.duration_ms, 5000);
        assert_eq!(config.round.anti_cheat_buffer_ms, 100);
        assert_eq!(config.round.points_per_win, 7);
        assert_eq!(config.session.idle_timeout_secs, 60);
        assert_eq!(config.feed.max_reconnect_attempts, 2);
        assert_eq!(config.ledger.data_dir, PathBuf::from("/tmp/ledger"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "PREDICTOR_POINTS_PER_WIN").then(|| "ten".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PREDICTOR_POINTS_PER_WIN"));
        assert_eq!(config.round.points_per_win, 10);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }
}
