// External tool supervision
//
// This module wraps the two command-line tools the workflow depends on:
// - Commands: command builders for yt-dlp and ffmpeg
// - Supervisor: timeout enforcement, structured results and scratch cleanup
// - Processor: the download, probe and remux operations built on both

pub mod commands;
pub mod processor;
pub mod supervisor;

use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

pub use commands::*;
pub use processor::*;
pub use supervisor::*;

use crate::config::{MediaConfig, ToolsConfig};
use crate::error::Result;
use crate::proxy::ProxyConfig;

/// How the translated audio is combined with the source video
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    pub keep_original_audio: bool,
    pub original_volume: f32,
    pub translation_volume: f32,
    pub proxy_url: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            keep_original_audio: true,
            original_volume: 1.0,
            translation_volume: 1.0,
            proxy_url: None,
        }
    }
}

impl MergeOptions {
    /// Clamp both volumes into the supported 0.0-2.0 range
    pub fn clamped(mut self) -> Self {
        for (name, volume) in [
            ("original", &mut self.original_volume),
            ("translation", &mut self.translation_volume),
        ] {
            let clamped = volume.clamp(0.0, 2.0);
            if clamped != *volume {
                warn!("{} volume {} is out of range, using {}", name, volume, clamped);
                *volume = clamped;
            }
        }
        self
    }
}

/// Main trait for media operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Check that both tools are installed and runnable
    async fn check_availability(&self) -> Result<()>;

    /// Video duration in seconds, falling back to a default on any failure
    async fn probe_duration(&self, url: &str) -> f64;

    /// Video title, if the downloader can fetch it
    async fn fetch_title(&self, url: &str) -> Option<String>;

    /// Download the source video into a scratch file inside `work_dir`
    async fn download_video(&self, url: &str, work_dir: &Path) -> Result<ScratchFile>;

    /// Combine a video with the translated audio
    async fn remux(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        options: &MergeOptions,
    ) -> Result<()>;

    /// Download the source video and remux it with the translated audio
    async fn create_video_with_translation(
        &self,
        url: &str,
        audio_path: &Path,
        output_path: &Path,
        options: &MergeOptions,
    ) -> Result<()>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (yt-dlp and ffmpeg)
    pub fn create_processor(
        tools: ToolsConfig,
        media: MediaConfig,
        proxy: Option<ProxyConfig>,
    ) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(tools, media, proxy))
    }
}
