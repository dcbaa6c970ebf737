use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::LlmConfig;

/// Configuration for the video relay pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Message source gateway settings
    pub source: SourceConfig,

    /// Stream scanning settings
    pub scan: ScanConfig,

    /// Caption resolution settings
    pub caption: CaptionConfig,

    /// Chat-completion backend for ranking and rewriting
    pub llm: LlmConfig,

    /// Publish endpoint settings
    pub publish: PublishConfig,

    /// State persistence settings
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the message source gateway
    pub base_url: String,

    /// Channel to scan for videos
    pub channel: String,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            channel: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Page size for each scan of the video stream
    pub batch_size: usize,

    /// Neighbors fetched on each side of a candidate for caption context
    pub context_radius: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            context_radius: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    /// Max age difference for the same-sender fallback (seconds)
    pub sender_window_seconds: i64,

    /// Caption used when resolution comes back empty
    pub default_caption: String,

    /// Platform character limit for the final caption
    pub max_length: usize,

    /// Rewrite the resolved caption with the LLM before posting
    pub enable_rewrite: bool,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            sender_window_seconds: 300,
            default_caption: "New video".to_string(),
            max_length: 280,
            enable_rewrite: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Media upload endpoint
    pub endpoint: String,

    /// API key for the publish service
    pub api_key: Option<String>,

    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8082/posts".to_string(),
            api_key: None,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding cursor and dedup state files
    pub state_dir: PathBuf,

    /// Scratch directory for downloaded media
    pub scratch_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".video_relay_state"),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_paths = [
            "video-relay.toml",
            "config/video-relay.toml",
            "~/.config/video-relay/config.toml",
            "/etc/video-relay/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override settings from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var("VIDEO_RELAY_GATEWAY_URL") {
            self.source.base_url = base_url;
        }

        if let Ok(channel) = std::env::var("VIDEO_RELAY_CHANNEL") {
            self.source.channel = channel;
        }

        if let Ok(state_dir) = std::env::var("VIDEO_RELAY_STATE_DIR") {
            self.state.state_dir = PathBuf::from(state_dir);
        }

        if let Ok(batch_size) = std::env::var("VIDEO_RELAY_BATCH_SIZE") {
            if let Ok(parsed) = batch_size.parse() {
                self.scan.batch_size = parsed;
            }
        }

        if let Ok(api_key) = std::env::var("VIDEO_RELAY_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Ok(endpoint) = std::env::var("VIDEO_RELAY_PUBLISH_ENDPOINT") {
            self.publish.endpoint = endpoint;
        }

        if let Ok(api_key) = std::env::var("VIDEO_RELAY_PUBLISH_API_KEY") {
            self.publish.api_key = Some(api_key);
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.source.channel.trim().is_empty() {
            return Err(anyhow!("source.channel must be set"));
        }

        if self.scan.batch_size == 0 {
            return Err(anyhow!("scan.batch_size must be greater than 0"));
        }

        if self.scan.context_radius == 0 {
            return Err(anyhow!("scan.context_radius must be greater than 0"));
        }

        if self.caption.max_length <= 3 {
            return Err(anyhow!("caption.max_length is too small for an ellipsis"));
        }

        if self.caption.sender_window_seconds <= 0 {
            return Err(anyhow!("caption.sender_window_seconds must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.batch_size, 50);
        assert_eq!(config.scan.context_radius, 2);
        assert_eq!(config.caption.sender_window_seconds, 300);
        assert_eq!(config.caption.max_length, 280);
    }

    #[test]
    fn test_default_config_needs_channel() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.source.channel = "my_channel".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = Config::default();
        config.source.channel = "my_channel".to_string();
        config.scan.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.source.channel = "my_channel".to_string();
        config.caption.enable_rewrite = true;

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.source.channel, "my_channel");
        assert!(parsed.caption.enable_rewrite);
        assert_eq!(parsed.scan.batch_size, config.scan.batch_size);
    }
}
