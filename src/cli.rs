use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

use crate::media::MergeOptions;
use crate::pipeline::{JobMode, JobSettings};
use crate::protocol::VoiceStyle;
use crate::proxy::ProxyConfig;
use crate::subtitle::SubtitleFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VoiceStyleArg {
    /// Live voices that follow the speaker's intonation
    Live,
    /// Standard text-to-speech
    Tts,
}

impl From<VoiceStyleArg> for VoiceStyle {
    fn from(value: VoiceStyleArg) -> Self {
        match value {
            VoiceStyleArg::Live => VoiceStyle::Live,
            VoiceStyleArg::Tts => VoiceStyle::Tts,
        }
    }
}

/// Download machine-translated audio tracks (or subtitles) for videos
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video links to process
    #[arg(required_unless_present = "save_config")]
    pub links: Vec<String>,

    /// Directory to download into
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// File name to download as (requires --output)
    #[arg(long, requires = "output")]
    pub output_file: Option<String>,

    /// Source video language
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Audio track (or subtitle) language
    #[arg(long, default_value = "ru")]
    pub reslang: String,

    /// Voice style of the translated track
    #[arg(long, value_enum, default_value_t = VoiceStyleArg::Live)]
    pub voice_style: VoiceStyleArg,

    /// Fetch subtitles instead of audio (language taken from --reslang)
    #[arg(long, visible_alias = "subtitles")]
    pub subs: bool,

    /// Fetch subtitles and save them as SRT
    #[arg(long, visible_alias = "subtitles-srt")]
    pub subs_srt: bool,

    /// Merge the video with the translated audio (requires yt-dlp and ffmpeg)
    #[arg(long)]
    pub merge_video: bool,

    /// Mix the original audio under the translation when merging
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub keep_original_audio: bool,

    /// Translation audio volume (0.0-2.0)
    #[arg(long, default_value_t = 1.0)]
    pub translation_volume: f32,

    /// Original audio volume (0.0-2.0)
    #[arg(long, default_value_t = 1.0)]
    pub original_volume: f32,

    /// Proxy as [<PROTOCOL>://][<USERNAME>:<PASSWORD>@]<HOST>[:<PORT>]
    #[arg(long)]
    pub proxy: Option<String>,

    /// Abort instead of connecting directly when the proxy cannot be parsed
    #[arg(long)]
    pub force_proxy: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    pub save_config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn mode(&self) -> JobMode {
        if self.subs_srt {
            JobMode::Subtitles(SubtitleFormat::Srt)
        } else if self.subs {
            JobMode::Subtitles(SubtitleFormat::Json)
        } else {
            JobMode::Translation
        }
    }

    /// Settings shared by every job of this run
    pub fn job_settings(&self, proxy: Option<&ProxyConfig>, job_count: usize) -> JobSettings {
        JobSettings {
            output_dir: self.output.clone(),
            output_file: self.output_file.clone(),
            source_lang: self.lang.clone(),
            target_lang: self.reslang.clone(),
            voice: self.voice_style.into(),
            mode: self.mode(),
            merge_video: self.merge_video,
            merge: MergeOptions {
                keep_original_audio: self.keep_original_audio,
                original_volume: self.original_volume,
                translation_volume: self.translation_volume,
                proxy_url: proxy.map(|p| p.proxy_url.clone()),
            }
            .clamped(),
            job_count,
        }
    }
}
