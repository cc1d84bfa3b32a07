use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::{info, debug, warn};

use crate::config::{MediaConfig, ToolsConfig};
use crate::error::{Result, DubError};
use crate::proxy::ProxyConfig;
use super::{MediaProcessorTrait, MergeOptions, ScratchFile, ToolClass, ToolCommandBuilder, ToolSupervisor};

/// Concrete implementation of media processor (yt-dlp and ffmpeg)
pub struct MediaProcessorImpl {
    media: MediaConfig,
    proxy: Option<ProxyConfig>,
    supervisor: ToolSupervisor,
    command_builder: ToolCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(tools: ToolsConfig, media: MediaConfig, proxy: Option<ProxyConfig>) -> Self {
        let command_builder = ToolCommandBuilder::new(&tools.downloader_path, &tools.muxer_path);

        Self {
            media,
            proxy,
            supervisor: ToolSupervisor::new(tools),
            command_builder,
        }
    }

    fn proxy_url(&self) -> Option<&str> {
        self.proxy.as_ref().map(|p| p.proxy_url.as_str())
    }

    async fn ensure_tool(&self, binary_path: &str) -> Result<()> {
        let command = self.command_builder.version_check(binary_path);
        self.supervisor.ensure_available(&command).await
    }

    async fn download_into(&self, url: &str, work_dir: &Path, proxy_url: Option<&str>) -> Result<ScratchFile> {
        let downloader = self.command_builder.downloader_path().to_string();
        self.ensure_tool(&downloader).await?;

        let mut scratch = ScratchFile::new(work_dir, "temp_video", "mp4");
        let command = self.command_builder.download_video(url, scratch.path(), proxy_url);
        let result = self.supervisor.run(&command).await;

        if result.exited_ok() && scratch.path().exists() {
            debug!("Video downloaded to {}", scratch.path().display());
            return Ok(scratch);
        }

        // The downloader sometimes picks another container despite the requested one
        if !result.timed_out() {
            if let Some(found) = scratch.recover() {
                warn!("Downloader reported failure, but found its output at {}", found.display());
                return Ok(scratch);
            }
        }

        let timeout = self.supervisor.timeout_for(ToolClass::Download);
        result.into_result(&downloader, timeout)?;
        Err(DubError::ToolFailed {
            tool: downloader,
            message: "finished without producing a video file".to_string(),
        })
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    /// Check that both tools are installed and runnable
    async fn check_availability(&self) -> Result<()> {
        self.ensure_tool(self.command_builder.downloader_path()).await?;
        self.ensure_tool(self.command_builder.muxer_path()).await?;
        Ok(())
    }

    async fn probe_duration(&self, url: &str) -> f64 {
        let fallback = self.media.fallback_duration_secs;
        let command = self.command_builder.probe_duration(url, self.proxy_url());
        let result = self.supervisor.run(&command).await;

        if !result.exited_ok() {
            warn!(
                "Failed to get video duration ({}), using default ({}s)",
                result.error_message.as_deref().unwrap_or("unknown error"),
                fallback
            );
            return fallback;
        }

        match result.stdout.trim().parse::<f64>() {
            Ok(duration) if duration > 0.0 => {
                let secs = duration as u64;
                info!("Video duration: {}s ({}m {}s)", secs, secs / 60, secs % 60);
                duration
            }
            _ => {
                warn!("Could not parse video duration, using default ({}s)", fallback);
                fallback
            }
        }
    }

    async fn fetch_title(&self, url: &str) -> Option<String> {
        let command = self.command_builder.probe_title(url, self.proxy_url());
        let result = self.supervisor.run(&command).await;

        if !result.exited_ok() {
            debug!("Title probe failed: {}", result.error_message.unwrap_or_default());
            return None;
        }

        let title = result.stdout.lines().next().unwrap_or_default().trim().to_string();
        if title.is_empty() { None } else { Some(title) }
    }

    async fn download_video(&self, url: &str, work_dir: &Path) -> Result<ScratchFile> {
        self.download_into(url, work_dir, self.proxy_url()).await
    }

    async fn remux(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
        options: &MergeOptions,
    ) -> Result<()> {
        info!("Merging {} with {} -> {}",
              audio_path.display(), video_path.display(), output_path.display());

        let muxer = self.command_builder.muxer_path().to_string();
        self.ensure_tool(&muxer).await?;

        // The muxer writes beside the output; the output path is only replaced on success
        let work_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let extension = output_path.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
        let staged = ScratchFile::new(work_dir, "temp_merge", extension);
        let command = self.command_builder.remux(video_path, audio_path, staged.path(), options, &self.media);
        let timeout = self.supervisor.timeout_for(ToolClass::Remux);

        self.supervisor.run(&command).await.into_result(&muxer, timeout)?;
        fs::rename(staged.path(), output_path).await?;
        staged.release().await;

        info!("Remux completed successfully");
        Ok(())
    }

    async fn create_video_with_translation(
        &self,
        url: &str,
        audio_path: &Path,
        output_path: &Path,
        options: &MergeOptions,
    ) -> Result<()> {
        let work_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let proxy_url = options.proxy_url.as_deref().or(self.proxy_url());

        info!("Downloading video...");
        let video = self.download_into(url, work_dir, proxy_url).await?;

        info!("Merging video with translation...");
        self.remux(video.path(), audio_path, output_path, options).await?;
        video.release().await;

        info!("Video with translation saved: {}", output_path.display());
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    const FAKE_DOWNLOADER: &str = r#"#!/bin/sh
case "$1" in
  --version) echo 2024.04.09 ;;
  --print) echo 212 ;;
  --get-title) echo "Rust in Production: Part 1" ;;
  -f) echo video > "$6" ;;
esac
"#;

    const FAKE_MUXER: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 6.1"; exit 0; fi
for last; do :; done
echo merged > "$last"
"#;

    fn write_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn processor(bin_dir: &Path, downloader: &str, muxer: &str) -> MediaProcessorImpl {
        let mut config = Config::default();
        config.tools.downloader_path = write_tool(bin_dir, "fake-yt-dlp", downloader).display().to_string();
        config.tools.muxer_path = write_tool(bin_dir, "fake-ffmpeg", muxer).display().to_string();
        MediaProcessorImpl::new(config.tools, config.media, None)
    }

    #[tokio::test]
    async fn test_probes() {
        let bin = tempfile::tempdir().unwrap();
        let processor = processor(bin.path(), FAKE_DOWNLOADER, FAKE_MUXER);

        processor.check_availability().await.unwrap();
        assert_eq!(processor.probe_duration("https://youtu.be/x").await, 212.0);
        assert_eq!(
            processor.fetch_title("https://youtu.be/x").await.as_deref(),
            Some("Rust in Production: Part 1")
        );
    }

    #[tokio::test]
    async fn test_probe_failures_fall_back() {
        let bin = tempfile::tempdir().unwrap();
        let processor = processor(bin.path(), "#!/bin/sh\nexit 1\n", FAKE_MUXER);

        assert_eq!(processor.probe_duration("https://youtu.be/x").await, 341.0);
        assert_eq!(processor.fetch_title("https://youtu.be/x").await, None);
    }

    #[tokio::test]
    async fn test_missing_tool_is_reported() {
        let mut config = Config::default();
        config.tools.downloader_path = "/nonexistent/yt-dlp".to_string();
        let processor = MediaProcessorImpl::new(config.tools, config.media, None);

        let err = processor.check_availability().await.unwrap_err();
        assert!(matches!(err, DubError::ToolMissing { .. }));
    }

    #[tokio::test]
    async fn test_create_video_leaves_only_output() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let processor = processor(bin.path(), FAKE_DOWNLOADER, FAKE_MUXER);

        let audio = out.path().join("voice.mp3");
        std::fs::write(&audio, "audio").unwrap();
        let output = out.path().join("talk.mp4");

        processor
            .create_video_with_translation("https://youtu.be/x", &audio, &output, &MergeOptions::default())
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["talk.mp4", "voice.mp3"]);
    }

    #[tokio::test]
    async fn test_download_recovers_other_extension() {
        let bin = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let downloader = r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo 1; exit 0; fi
echo video > "${6%.mp4}.webm"
exit 1
"#;
        let processor = processor(bin.path(), downloader, FAKE_MUXER);

        let scratch = processor.download_video("https://youtu.be/x", work.path()).await.unwrap();
        assert_eq!(scratch.path().extension().unwrap(), "webm");
        assert!(scratch.path().exists());

        drop(scratch);
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_remux_removes_partial_output() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let muxer = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 6.1"; exit 0; fi
for last; do :; done
echo partial > "$last"
echo "Invalid data found when processing input" >&2
exit 1
"#;
        let processor = processor(bin.path(), FAKE_DOWNLOADER, muxer);

        let audio = out.path().join("voice.mp3");
        std::fs::write(&audio, "audio").unwrap();
        let output = out.path().join("talk.mp4");

        let err = processor
            .create_video_with_translation("https://youtu.be/x", &audio, &output, &MergeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DubError::ToolFailed { .. }));
        assert!(!output.exists());
        let remaining = std::fs::read_dir(out.path()).unwrap().count();
        assert_eq!(remaining, 1, "only the caller-owned audio should remain");
    }

    #[tokio::test]
    async fn test_failed_remux_leaves_existing_output_alone() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let muxer = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 6.1"; exit 0; fi
exit 1
"#;
        let processor = processor(bin.path(), FAKE_DOWNLOADER, muxer);

        let audio = out.path().join("voice.mp3");
        std::fs::write(&audio, "audio").unwrap();
        let output = out.path().join("talk.mp4");
        std::fs::write(&output, "finished video").unwrap();

        processor
            .create_video_with_translation("https://youtu.be/x", &audio, &output, &MergeOptions::default())
            .await
            .unwrap_err();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "finished video");
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 2);
    }
}
