use std::path::Path;

use crate::config::MediaConfig;
use crate::proxy::PROXY_ENV_VARS;
use super::MergeOptions;

/// Class of external tool invocation; each class has its own wall-clock limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    Download,
    Remux,
    VersionProbe,
    DurationProbe,
    TitleProbe,
}

/// Abstract external tool command representation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub description: String,
    pub class: ToolClass,
}

impl ToolCommand {
    /// Create a new tool command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2, class: ToolClass) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            env: Vec::new(),
            description: description.into(),
            class,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Export the proxy to the child process, both as variables and as a flag
    pub fn proxy(mut self, proxy: Option<&str>, with_flag: bool) -> Self {
        if let Some(proxy_url) = proxy {
            if with_flag {
                self = self.arg("--proxy").arg(proxy_url);
            }
            self.env.extend(
                PROXY_ENV_VARS
                    .iter()
                    .map(|key| (key.to_string(), proxy_url.to_string())),
            );
        }
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Select a stream for the output
    pub fn map<S: Into<String>>(self, stream: S) -> Self {
        self.arg("-map").arg(stream)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Copy video stream
    pub fn copy_video(self) -> Self {
        self.arg("-c:v").arg("copy")
    }

    /// Add a filter graph
    pub fn filter_complex<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-filter_complex").arg(filter)
    }

    /// Render the command line for logs
    pub fn display(&self) -> String {
        let mut line = self.binary_path.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push_str(&format!("\"{}\"", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Builder for the yt-dlp and ffmpeg invocations
#[derive(Debug, Clone)]
pub struct ToolCommandBuilder {
    downloader_path: String,
    muxer_path: String,
}

impl ToolCommandBuilder {
    pub fn new<S1: Into<String>, S2: Into<String>>(downloader_path: S1, muxer_path: S2) -> Self {
        Self {
            downloader_path: downloader_path.into(),
            muxer_path: muxer_path.into(),
        }
    }

    /// Build source video download command
    pub fn download_video<P: AsRef<Path>>(
        &self,
        url: &str,
        output_path: P,
        proxy_url: Option<&str>,
    ) -> ToolCommand {
        ToolCommand::new(&self.downloader_path, "Video download", ToolClass::Download)
            .args(["-f", "best[ext=mp4]/best", "--merge-output-format", "mp4", "-o"])
            .output(output_path)
            .proxy(proxy_url, true)
            .arg(url)
    }

    /// Build duration probe command
    pub fn probe_duration(&self, url: &str, proxy_url: Option<&str>) -> ToolCommand {
        ToolCommand::new(&self.downloader_path, "Duration probe", ToolClass::DurationProbe)
            .args(["--print", "duration"])
            .proxy(proxy_url, true)
            .arg(url)
    }

    /// Build title probe command
    pub fn probe_title(&self, url: &str, proxy_url: Option<&str>) -> ToolCommand {
        ToolCommand::new(&self.downloader_path, "Title probe", ToolClass::TitleProbe)
            .arg("--get-title")
            .proxy(proxy_url, true)
            .arg(url)
    }

    /// Build remux command combining a video with the translated audio.
    ///
    /// Keeping the original audio mixes both tracks and lasts as long as the
    /// longest one; replacing it stops at the shortest stream.
    pub fn remux<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        output_path: P,
        options: &MergeOptions,
        media: &MediaConfig,
    ) -> ToolCommand {
        let cmd = ToolCommand::new(&self.muxer_path, "Video remux", ToolClass::Remux)
            .input(video_path)
            .input(audio_path);

        let cmd = if options.keep_original_audio {
            cmd.filter_complex(format!(
                "[0:a]volume={}[a1];[1:a]volume={}[a2];[a1][a2]amix=inputs=2:duration=longest[aout]",
                options.original_volume, options.translation_volume
            ))
            .map("0:v")
            .map("[aout]")
            .copy_video()
            .audio_codec(&media.audio_codec)
            .audio_bitrate(&media.audio_bitrate)
        } else {
            cmd.map("0:v")
                .map("1:a")
                .copy_video()
                .audio_codec(&media.audio_codec)
                .audio_bitrate(&media.audio_bitrate)
                .arg("-shortest")
        };

        cmd.overwrite().output(output_path)
    }

    /// Build version check command for either tool
    pub fn version_check(&self, binary_path: &str) -> ToolCommand {
        let flag = if binary_path == self.muxer_path { "-version" } else { "--version" };
        ToolCommand::new(binary_path, "Version check", ToolClass::VersionProbe).arg(flag)
    }

    pub fn downloader_path(&self) -> &str {
        &self.downloader_path
    }

    pub fn muxer_path(&self) -> &str {
        &self.muxer_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn builder() -> ToolCommandBuilder {
        ToolCommandBuilder::new("yt-dlp", "ffmpeg")
    }

    fn options(keep_original_audio: bool) -> MergeOptions {
        MergeOptions {
            keep_original_audio,
            original_volume: 1.0,
            translation_volume: 1.0,
            proxy_url: None,
        }
    }

    #[test]
    fn test_mix_keeps_longest_track() {
        let media = Config::default().media;
        let cmd = builder().remux("in.mp4", "voice.mp3", "out.mp4", &options(true), &media);
        let line = cmd.args.join(" ");
        assert!(line.contains("amix=inputs=2:duration=longest"));
        assert!(line.contains("[0:a]volume=1[a1];[1:a]volume=1[a2]"));
        assert!(line.contains("-map [aout]"));
        assert!(line.contains("-c:v copy"));
        assert!(line.contains("-c:a aac -b:a 192k"));
        assert!(!cmd.args.contains(&"-shortest".to_string()));
        assert_eq!(cmd.args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(cmd.class, ToolClass::Remux);
    }

    #[test]
    fn test_replace_stops_at_shortest() {
        let media = Config::default().media;
        let cmd = builder().remux("in.mp4", "voice.mp3", "out.mp4", &options(false), &media);
        let line = cmd.args.join(" ");
        assert!(line.contains("-map 0:v -map 1:a"));
        assert!(cmd.args.contains(&"-shortest".to_string()));
        assert!(!line.contains("amix"));
    }

    #[test]
    fn test_download_exports_proxy() {
        let cmd = builder().download_video(
            "https://youtu.be/x",
            "/tmp/temp_video_1.mp4",
            Some("http://proxy.local:3128"),
        );
        assert!(cmd.args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "http://proxy.local:3128"));
        assert!(cmd.env.iter().any(|(k, _)| k == "HTTPS_PROXY"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("https://youtu.be/x"));
    }

    #[test]
    fn test_version_flags() {
        assert_eq!(builder().version_check("ffmpeg").args, vec!["-version"]);
        assert_eq!(builder().version_check("yt-dlp").args, vec!["--version"]);
    }
}
