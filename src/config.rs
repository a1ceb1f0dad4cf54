//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `gateway.toml`.
//!     loads configuration from file or falls back to defaults.
//!     credentials can be injected through the environment instead of the file.
//!
//! structure:
//!     - NetworkConfig: how the join phase decides the uplink is up.
//!     - RadioConfig: radio-modem socket addresses and LoRa parameters.
//!     - HttpConfig: control endpoint address, timeouts, request buffer size.
//!     - TelegramConfig: bot credentials and the notification timeout.
//!     - LoopConfig: tick interval.
//!     - LoggingConfig: log level and sensor echo.
//!
//! ==============================================================================

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";
/// Environment override for the bot token
pub const BOT_TOKEN_ENV: &str = "GATEWAY_TELEGRAM_BOT_TOKEN";
/// Environment override for the chat id
pub const CHAT_ID_ENV: &str = "GATEWAY_TELEGRAM_CHAT_ID";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub gateway: LoopConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    /// host resolved to decide the uplink is usable
    pub probe_host: String,
    pub probe_port: u16,
    /// retries after the first check
    pub join_attempts: u32,
    pub join_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RadioConfig {
    /// local datagram address the modem sends frames to
    pub bind: SocketAddr,
    /// modem address outbound frames go to
    pub peer: SocketAddr,
    pub frequency_hz: u32,
    pub bandwidth_khz: u32,
    pub spreading_factor: u8,
    pub coding_rate: String,
    pub max_payload: usize,
    pub send_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
    pub accept_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_request_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: i64,
    pub api_host: String,
    pub api_port: u16,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoopConfig {
    pub tick_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl NetworkConfig {
    pub fn join_interval(&self) -> Duration {
        Duration::from_millis(self.join_interval_ms)
    }
}

impl RadioConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl HttpConfig {
    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl GatewayConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML document
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("gateway.toml"));
        paths.push(PathBuf::from("..").join("config").join("gateway.toml"));

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Replace file credentials with values from the environment, if set
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(
            std::env::var(BOT_TOKEN_ENV).ok(),
            std::env::var(CHAT_ID_ENV).ok(),
        )
    }

    fn apply_overrides(
        &mut self,
        token: Option<String>,
        chat_id: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(token) = token {
            self.telegram.bot_token = token;
            self.telegram.enabled = true;
        }
        if let Some(chat_id) = chat_id {
            self.telegram.chat_id = chat_id
                .trim()
                .parse()
                .with_context(|| format!("{} is not a numeric chat id", CHAT_ID_ENV))?;
        }
        Ok(())
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.enabled {
            if self.telegram.bot_token.trim().is_empty() {
                bail!("telegram.bot_token is required when telegram is enabled");
            }
            if self.telegram.chat_id == 0 {
                bail!("telegram.chat_id is required when telegram is enabled");
            }
            if self.telegram.timeout_ms == 0 {
                bail!("telegram.timeout_ms must be greater than zero");
            }
        }
        if !(7..=12).contains(&self.radio.spreading_factor) {
            bail!(
                "radio.spreading_factor must be between 7 and 12, got {}",
                self.radio.spreading_factor
            );
        }
        if ![125, 250, 500].contains(&self.radio.bandwidth_khz) {
            bail!("radio.bandwidth_khz must be 125, 250 or 500, got {}", self.radio.bandwidth_khz);
        }
        if !["4/5", "4/6", "4/7", "4/8"].contains(&self.radio.coding_rate.as_str()) {
            bail!(
                "radio.coding_rate must be one of 4/5, 4/6, 4/7, 4/8, got {}",
                self.radio.coding_rate
            );
        }
        if self.radio.max_payload == 0 {
            bail!("radio.max_payload must be greater than zero");
        }
        if self.http.max_request_bytes == 0 {
            bail!("http.max_request_bytes must be greater than zero");
        }
        if self.gateway.tick_interval_ms == 0 {
            bail!("gateway.tick_interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│         GATEWAY CONFIGURATION           │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Radio bind: {}", self.radio.bind);
        println!("│ Radio peer: {}", self.radio.peer);
        println!(
            "│ LoRa: {:.1} MHz BW{} SF{} CR{}",
            self.radio.frequency_hz as f64 / 1_000_000.0,
            self.radio.bandwidth_khz,
            self.radio.spreading_factor,
            self.radio.coding_rate
        );
        println!("│ HTTP: http://{}/dashboard", self.http.bind);
        println!(
            "│ Telegram: {}",
            if self.telegram.enabled { "enabled" } else { "disabled" }
        );
        println!("│ Tick: {}ms", self.gateway.tick_interval_ms);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "api.telegram.org".to_string(),
            probe_port: 443,
            join_attempts: 20,
            join_interval_ms: 1000,
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 1700)),
            peer: SocketAddr::from(([127, 0, 0, 1], 1701)),
            frequency_hz: 868_100_000,
            bandwidth_khz: 125,
            spreading_factor: 7,
            coding_rate: "4/5".to_string(),
            max_payload: 256,
            send_timeout_ms: 2000,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 80)),
            accept_timeout_ms: 100,
            request_timeout_ms: 2000,
            max_request_bytes: 1024,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: 0,
            api_host: "api.telegram.org".to_string(),
            api_port: 443,
            timeout_ms: 5000,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 100 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.max_request_bytes, 1024);
        assert_eq!(config.network.join_attempts, 20);
        assert_eq!(config.gateway.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = GatewayConfig::parse(
            r#"
[http]
bind = "127.0.0.1:8080"

[telegram]
enabled = true
bot_token = "123:abc"
chat_id = 42
"#,
        )
        .unwrap();

        assert_eq!(config.http.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.http.accept_timeout_ms, 100);
        assert_eq!(config.radio.spreading_factor, 7);
        assert_eq!(config.telegram.chat_id, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_telegram_requires_credentials() {
        let mut config = GatewayConfig::default();
        config.telegram.enabled = true;
        assert!(config.validate().is_err());

        config.telegram.bot_token = "123:abc".to_string();
        assert!(config.validate().is_err());

        config.telegram.chat_id = 2026;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_lora_parameters() {
        let mut config = GatewayConfig::default();
        config.radio.spreading_factor = 13;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.radio.coding_rate = "5/4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_enable_telegram() {
        let mut config = GatewayConfig::default();
        config
            .apply_overrides(Some("123:abc".to_string()), Some(" 2026 ".to_string()))
            .unwrap();

        assert!(config.telegram.enabled);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.chat_id, 2026);

        assert!(config.apply_overrides(None, Some("not-a-number".to_string())).is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join("gateway.toml");
        let config = GatewayConfig::load(path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.radio.frequency_hz, 868_100_000);
        assert_eq!(config.http.bind.port(), 80);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = GatewayConfig::parse("[http]\nbind = 80").unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
