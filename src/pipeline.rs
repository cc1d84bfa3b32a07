use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::download::{format_size, ArtifactDownloader};
use crate::error::{DubError, Result};
use crate::media::{MediaProcessorTrait, MergeOptions, ScratchFile};
use crate::poller::TranslationPoller;
use crate::protocol::{SubtitleTrack, SubtitlesRequest, TranslationRequest, VoiceStyle};
use crate::service::{sanitize_file_name, VideoReference};
use crate::subtitle::{self, SubtitleFormat};

/// What a job asks the service for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Translation,
    Subtitles(SubtitleFormat),
}

/// Run-wide settings shared read-only by every job
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub output_dir: Option<PathBuf>,
    pub output_file: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub voice: VoiceStyle,
    pub mode: JobMode,
    pub merge_video: bool,
    pub merge: MergeOptions,
    /// Jobs sharing these settings; a shared `output_file` gets a per-job suffix when above one
    pub job_count: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            output_file: None,
            source_lang: "en".to_string(),
            target_lang: "ru".to_string(),
            voice: VoiceStyle::Live,
            mode: JobMode::Translation,
            merge_video: false,
            merge: MergeOptions::default(),
            job_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Translate,
    Subtitles,
    Download,
    Merge,
    Finish,
    /// The job task itself, used when it died before reporting
    Pipeline,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Translate => "translate",
            Stage::Subtitles => "subtitles",
            Stage::Download => "download",
            Stage::Merge => "merge",
            Stage::Finish => "finish",
            Stage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal answer of the translate-or-subtitles stage
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Audio { url: String },
    Subtitles { tracks: Vec<SubtitleTrack> },
    Failed { stage: Stage, reason: String },
}

/// Per-job state, owned by one pipeline run and threaded through its stages
#[derive(Debug)]
pub struct JobContext {
    pub video_id: String,
    pub final_url: String,
    pub title: Option<String>,
    result: Option<JobResult>,
}

impl JobContext {
    fn new(reference: &VideoReference) -> Self {
        Self {
            video_id: reference.video_id.clone(),
            final_url: reference.final_url(),
            title: None,
            result: None,
        }
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    fn set_result(&mut self, result: JobResult) {
        debug_assert!(self.result.is_none(), "job result written twice");
        self.result = Some(result);
    }

    /// Title when known, otherwise the raw id
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.video_id)
    }

    fn audio_url(&self) -> Result<&str> {
        match &self.result {
            Some(JobResult::Audio { url }) => Ok(url),
            other => Err(DubError::DependencyUnmet(format!(
                "Link \"{}\" not found",
                describe_missing(other)
            ))),
        }
    }

    fn tracks(&self) -> Result<&[SubtitleTrack]> {
        match &self.result {
            Some(JobResult::Subtitles { tracks }) => Ok(tracks),
            other => Err(DubError::DependencyUnmet(format!(
                "Link \"{}\" not found",
                describe_missing(other)
            ))),
        }
    }
}

fn describe_missing(result: &Option<JobResult>) -> String {
    match result {
        Some(JobResult::Failed { reason, .. }) => reason.clone(),
        _ => "undefined".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Success,
    /// The service answered, but a later stage failed
    PartialSuccess { stage: Stage, reason: String },
    Failed { stage: Stage, reason: String },
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::PartialSuccess { stage, reason } => {
                write!(f, "partial success ({} failed: {})", stage, reason)
            }
            JobStatus::Failed { stage, reason } => write!(f, "failed at {}: {}", stage, reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub video_id: String,
    pub title: Option<String>,
    pub status: JobStatus,
    pub artifacts: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Report for a job that never reached its own finish stage
    pub fn failed(video_id: &str, stage: Stage, reason: String) -> Self {
        let now = Utc::now();
        Self {
            video_id: video_id.to_string(),
            title: None,
            status: JobStatus::Failed { stage, reason },
            artifacts: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn status_line(&self) -> String {
        let mut line = match &self.title {
            Some(title) => format!("[{}] {}: {}", self.video_id, title, self.status),
            None => format!("[{}] {}", self.video_id, self.status),
        };
        for artifact in &self.artifacts {
            line.push_str(&format!("\n    -> {}", artifact.display()));
        }
        line
    }
}

/// Fixed stage sequence for one video:
/// resolve -> translate or subtitles -> download -> merge -> finish
pub struct JobPipeline {
    settings: Arc<JobSettings>,
    poller: Arc<TranslationPoller>,
    media: Arc<dyn MediaProcessorTrait>,
    downloader: Arc<ArtifactDownloader>,
}

impl JobPipeline {
    pub fn new(
        settings: Arc<JobSettings>,
        poller: Arc<TranslationPoller>,
        media: Arc<dyn MediaProcessorTrait>,
        downloader: Arc<ArtifactDownloader>,
    ) -> Self {
        Self {
            settings,
            poller,
            media,
            downloader,
        }
    }

    /// Run every enabled stage for one video and report its terminal state.
    ///
    /// Stage errors never escape: they become the job's status.
    pub async fn run(&self, reference: VideoReference) -> JobReport {
        let span = info_span!(
            "job",
            video_id = %reference.video_id,
            service = reference.service.name()
        );
        self.run_stages(reference).instrument(span).await
    }

    async fn run_stages(&self, reference: VideoReference) -> JobReport {
        let started_at = Utc::now();
        let mut ctx = JobContext::new(&reference);
        let mut artifacts = Vec::new();
        let mut failures: Vec<(Stage, String)> = Vec::new();

        self.resolve(&mut ctx).await;

        match self.settings.mode {
            JobMode::Translation => self.translate(&mut ctx).await,
            JobMode::Subtitles(_) => self.fetch_subtitles(&mut ctx).await,
        }

        if let Some(output_dir) = self.settings.output_dir.as_deref() {
            let outcome = match self.settings.mode {
                JobMode::Translation => self.download_audio(&ctx, output_dir).await,
                JobMode::Subtitles(format) => self.download_subtitles(&ctx, output_dir, format).await,
            };
            record(Stage::Download, outcome, &mut artifacts, &mut failures);

            if self.settings.merge_video && self.settings.mode == JobMode::Translation {
                let outcome = self.merge(&ctx, output_dir).await;
                record(Stage::Merge, outcome, &mut artifacts, &mut failures);
            }
        }

        let status = finish(&ctx, failures);

        JobReport {
            video_id: ctx.video_id,
            title: ctx.title,
            status,
            artifacts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn resolve(&self, ctx: &mut JobContext) {
        info!("Video URL: {}", ctx.final_url);

        ctx.title = self.media.fetch_title(&ctx.final_url).await;
        match &ctx.title {
            Some(title) => info!("Title: \"{}\"", title),
            None => warn!("Could not fetch title, using video ID"),
        }
    }

    async fn translate(&self, ctx: &mut JobContext) {
        let duration_secs = self.media.probe_duration(&ctx.final_url).await;
        let request = TranslationRequest {
            url: ctx.final_url.clone(),
            duration_secs,
            source_lang: self.settings.source_lang.clone(),
            target_lang: self.settings.target_lang.clone(),
            voice: self.settings.voice,
        };

        info!("Translating with {}", self.settings.voice.describe());

        match self.poller.poll_translation(&request).await {
            Ok(url) => {
                info!("Audio link: {}", url);
                ctx.set_result(JobResult::Audio { url });
            }
            Err(e) => {
                warn!("Translation failed: {}", e);
                ctx.set_result(JobResult::Failed {
                    stage: Stage::Translate,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn fetch_subtitles(&self, ctx: &mut JobContext) {
        let request = SubtitlesRequest {
            url: ctx.final_url.clone(),
            source_lang: self.settings.source_lang.clone(),
        };

        match self.poller.fetch_subtitles(&request).await {
            Ok(tracks) => {
                for track in &tracks {
                    debug!(
                        "Subtitle track {} (translated from {})",
                        track.language,
                        track.translated_from_language.as_deref().unwrap_or("-")
                    );
                }
                ctx.set_result(JobResult::Subtitles { tracks });
            }
            Err(e) => {
                warn!("{}", e);
                ctx.set_result(JobResult::Failed {
                    stage: Stage::Subtitles,
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn download_audio(&self, ctx: &JobContext, output_dir: &Path) -> Result<PathBuf> {
        let audio_url = ctx.audio_url()?;
        let destination = output_dir.join(self.artifact_name(ctx, "mp3"));

        info!("Saving as {}", destination.display());
        self.downloader.download(audio_url, &destination).await?;
        Ok(destination)
    }

    async fn download_subtitles(
        &self,
        ctx: &JobContext,
        output_dir: &Path,
        format: SubtitleFormat,
    ) -> Result<PathBuf> {
        let target_lang = &self.settings.target_lang;
        let track = ctx
            .tracks()?
            .iter()
            .find(|track| &track.language == target_lang)
            .ok_or_else(|| {
                DubError::DependencyUnmet(format!(
                    "Failed to find {} in the resulting list of subtitles",
                    target_lang
                ))
            })?;

        let extension = format.extension();
        let file_name = match &self.settings.output_file {
            Some(name) => self.output_file_name(name, ctx, extension),
            None => format!(
                "{}---{}---{}.{}",
                track.language,
                sanitize_file_name(&ctx.video_id),
                Uuid::new_v4(),
                extension
            ),
        };
        let destination = output_dir.join(file_name);

        match format {
            SubtitleFormat::Json => {
                self.downloader.download(&track.url, &destination).await?;
            }
            SubtitleFormat::Srt => {
                let raw = ScratchFile::new(output_dir, "temp_subtitles", "json");
                self.downloader.download(&track.url, raw.path()).await?;
                subtitle::convert_file(raw.path(), &destination).await?;
                raw.release().await;
            }
        }

        Ok(destination)
    }

    async fn merge(&self, ctx: &JobContext, output_dir: &Path) -> Result<PathBuf> {
        let audio_url = ctx.audio_url()?;
        let video_path = output_dir.join(self.artifact_name(ctx, "mp4"));
        let options = &self.settings.merge;

        info!(
            "Merging video with translation (original volume {}%, translation volume {}%)",
            options.original_volume * 100.0,
            options.translation_volume * 100.0
        );

        // Removed when this stage returns, whatever the outcome
        let audio = ScratchFile::new(output_dir, "temp_audio", "mp3");
        self.downloader.download(audio_url, audio.path()).await?;

        self.media
            .create_video_with_translation(&ctx.final_url, audio.path(), &video_path, options)
            .await?;
        audio.release().await;

        let size = fs::metadata(&video_path).await?.len();
        info!("Final video size: {}", format_size(size));
        Ok(video_path)
    }

    /// `--output-file`, else `{title}---{id}`, else `{id}---{uuid}`.
    ///
    /// Every name carries the video id, so concurrent jobs never share a path.
    fn artifact_name(&self, ctx: &JobContext, extension: &str) -> String {
        if let Some(name) = &self.settings.output_file {
            return self.output_file_name(name, ctx, extension);
        }

        let id = sanitize_file_name(&ctx.video_id);
        match ctx.title.as_deref().map(sanitize_file_name) {
            Some(title) if !title.is_empty() => format!("{}---{}.{}", title, id, extension),
            _ => format!("{}---{}.{}", id, Uuid::new_v4(), extension),
        }
    }

    fn output_file_name(&self, name: &str, ctx: &JobContext, extension: &str) -> String {
        if self.settings.job_count <= 1 {
            return with_extension(name, extension);
        }
        let stem = name.strip_suffix(&format!(".{}", extension)).unwrap_or(name);
        format!("{}---{}.{}", stem, sanitize_file_name(&ctx.video_id), extension)
    }
}

fn with_extension(name: &str, extension: &str) -> String {
    if name.ends_with(&format!(".{}", extension)) {
        name.to_string()
    } else {
        format!("{}.{}", name, extension)
    }
}

fn record(
    stage: Stage,
    outcome: Result<PathBuf>,
    artifacts: &mut Vec<PathBuf>,
    failures: &mut Vec<(Stage, String)>,
) {
    match outcome {
        Ok(path) => artifacts.push(path),
        Err(e) => {
            warn!("{} stage failed: {}", stage, e);
            failures.push((stage, e.to_string()));
        }
    }
}

fn finish(ctx: &JobContext, failures: Vec<(Stage, String)>) -> JobStatus {
    let status = match ctx.result() {
        Some(JobResult::Failed { stage, reason }) => JobStatus::Failed {
            stage: *stage,
            reason: reason.clone(),
        },
        None => JobStatus::Failed {
            stage: Stage::Finish,
            reason: "no result was produced".to_string(),
        },
        Some(_) => match failures.into_iter().next() {
            Some((stage, reason)) => JobStatus::PartialSuccess { stage, reason },
            None => JobStatus::Success,
        },
    };

    info!("Finished {}: {}", ctx.display_name(), status);
    status
}
