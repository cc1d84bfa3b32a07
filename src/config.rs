use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use crate::error::{Result, DubError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub polling: PollingConfig,
    pub tools: ToolsConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Scheme and host of the translation endpoint
    pub base_url: String,
    /// Path of the voice-over translation call
    pub translate_path: String,
    /// Path of the subtitle listing call
    pub subtitles_path: String,
    /// User agent sent with every request
    pub user_agent: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Number of re-requests while the translation is still being prepared
    pub max_attempts: u32,
    /// Wait between re-requests in milliseconds
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the video fetching tool (yt-dlp)
    pub downloader_path: String,
    /// Path to the muxing tool (ffmpeg)
    pub muxer_path: String,
    /// Timeouts, in seconds
    pub download_timeout_secs: u64,
    pub remux_timeout_secs: u64,
    pub version_probe_timeout_secs: u64,
    pub duration_probe_timeout_secs: u64,
    pub title_probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Audio codec for the remuxed output
    pub audio_codec: String,
    /// Audio bitrate for the remuxed output
    pub audio_bitrate: String,
    /// Duration reported to the service when the probe fails
    pub fallback_duration_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig {
                base_url: "https://api.browser.yandex.ru".to_string(),
                translate_path: "/video-translation/translate".to_string(),
                subtitles_path: "/video-subtitles/get-subtitles".to_string(),
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 YaBrowser/24.4.0.0 Safari/537.36".to_string(),
                request_timeout_ms: 60_000,
            },
            polling: PollingConfig {
                max_attempts: 10,
                interval_ms: 30_000,
            },
            tools: ToolsConfig {
                downloader_path: "yt-dlp".to_string(),
                muxer_path: "ffmpeg".to_string(),
                download_timeout_secs: 600,
                remux_timeout_secs: 900,
                version_probe_timeout_secs: 5,
                duration_probe_timeout_secs: 30,
                title_probe_timeout_secs: 10,
            },
            media: MediaConfig {
                audio_codec: "aac".to_string(),
                audio_bitrate: "192k".to_string(),
                fallback_duration_secs: 341.0,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DubError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DubError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DubError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DubError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ToolsConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn remux_timeout(&self) -> Duration {
        Duration::from_secs(self.remux_timeout_secs)
    }

    pub fn version_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.version_probe_timeout_secs)
    }

    pub fn duration_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.duration_probe_timeout_secs)
    }

    pub fn title_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.title_probe_timeout_secs)
    }
}
