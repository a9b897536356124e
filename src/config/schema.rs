use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};

/// Default RTMP port used when the endpoint string omits one
pub const DEFAULT_PORT: u16 = 1935;
/// Host used when the endpoint string has no authority
pub const DEFAULT_HOST: &str = "localhost";
/// Application name used when the endpoint string has no path
pub const DEFAULT_APPLICATION: &str = "live";

/// Main session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoint parsing defaults
    pub target: TargetConfig,
    /// Publish retry policy
    pub retry: RetryConfig,
    /// Connection monitor settings
    pub monitor: MonitorConfig,
    /// Quality parameters pushed to the transport before connecting
    pub stream: StreamSettings,
}

impl SessionConfig {
    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.target.default_host.trim().is_empty() {
            return Err(AppError::Config("target.default_host must not be empty".to_string()));
        }
        if self.target.default_port == 0 {
            return Err(AppError::Config("target.default_port must be 1-65535".to_string()));
        }
        if self.target.default_application.trim().is_empty() {
            return Err(AppError::Config(
                "target.default_application must not be empty".to_string(),
            ));
        }
        if self.monitor.interval_ms == 0 {
            return Err(AppError::Config("monitor.interval_ms must be positive".to_string()));
        }
        self.stream.validate()
    }
}

/// Defaults applied while parsing an endpoint string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub default_host: String,
    pub default_port: u16,
    pub default_application: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            default_host: DEFAULT_HOST.to_string(),
            default_port: DEFAULT_PORT,
            default_application: DEFAULT_APPLICATION.to_string(),
        }
    }
}

/// Publish retry policy
///
/// The number of attempts is fixed at two (initial + one retry); only the
/// pause between them is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed backoff before the single retry (milliseconds)
    pub backoff_ms: u64,
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { backoff_ms: 100 }
    }
}

/// Connection monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sampling period (milliseconds)
    pub interval_ms: u64,
    /// Minimum gap between repeated "connection lost" warnings (seconds)
    pub log_throttle_secs: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            log_throttle_secs: 30,
        }
    }
}

/// Audio quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    /// Low bandwidth voice (64kbps)
    Voice,
    /// Balanced quality (128kbps) - default
    #[default]
    Balanced,
    /// High quality audio (192kbps)
    High,
}

impl AudioQuality {
    /// Get the bitrate for this quality level
    pub fn bitrate(&self) -> u32 {
        match self {
            AudioQuality::Voice => 64_000,
            AudioQuality::Balanced => 128_000,
            AudioQuality::High => 192_000,
        }
    }
}

impl std::str::FromStr for AudioQuality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "voice" | "low" => Ok(AudioQuality::Voice),
            "balanced" | "medium" => Ok(AudioQuality::Balanced),
            "high" | "music" => Ok(AudioQuality::High),
            other => Err(AppError::Config(format!("Unknown audio quality: {}", other))),
        }
    }
}

impl std::fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioQuality::Voice => write!(f, "voice"),
            AudioQuality::Balanced => write!(f, "balanced"),
            AudioQuality::High => write!(f, "high"),
        }
    }
}

/// Video encoder parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Keyframe interval in seconds
    pub keyframe_interval_secs: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate: 2_500_000,
            keyframe_interval_secs: 2,
        }
    }
}

/// Audio encoder parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub quality: AudioQuality,
    pub sample_rate: u32,
    pub channels: u8,
}

impl AudioSettings {
    pub fn bitrate(&self) -> u32 {
        self.quality.bitrate()
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            quality: AudioQuality::Balanced,
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Quality and audio parameters handed to the transport on every start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub video: VideoSettings,
    pub audio: AudioSettings,
}

impl StreamSettings {
    fn validate(&self) -> Result<()> {
        let video = &self.video;
        if video.width == 0 || video.height == 0 {
            return Err(AppError::Config(format!(
                "stream.video resolution {}x{} is invalid",
                video.width, video.height
            )));
        }
        if video.fps == 0 || video.fps > 120 {
            return Err(AppError::Config(format!("stream.video.fps {} out of range", video.fps)));
        }
        if !matches!(self.audio.channels, 1 | 2) {
            return Err(AppError::Config(format!(
                "stream.audio.channels must be 1 or 2, got {}",
                self.audio.channels
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target.default_port, 1935);
        assert_eq!(config.retry.backoff(), Duration::from_millis(100));
        assert_eq!(config.monitor.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_audio_quality_bitrate() {
        assert_eq!(AudioQuality::Voice.bitrate(), 64_000);
        assert_eq!(AudioQuality::Balanced.bitrate(), 128_000);
        assert_eq!(AudioQuality::High.bitrate(), 192_000);
    }

    #[test]
    fn test_audio_quality_from_str() {
        assert_eq!("voice".parse::<AudioQuality>().unwrap(), AudioQuality::Voice);
        assert_eq!("LOW".parse::<AudioQuality>().unwrap(), AudioQuality::Voice);
        assert_eq!("music".parse::<AudioQuality>().unwrap(), AudioQuality::High);
        assert!("loud".parse::<AudioQuality>().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "retry": { "backoff_ms": 250 } }"#).unwrap();
        assert_eq!(config.retry.backoff_ms, 250);
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.stream.audio.quality, AudioQuality::Balanced);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = SessionConfig::default();
        config.monitor.interval_ms = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_channels() {
        let mut config = SessionConfig::default();
        config.stream.audio.channels = 6;
        assert!(config.validate().is_err());
    }
}
