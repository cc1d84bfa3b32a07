// Remote translation protocol
//
// This module speaks the binary request/response protocol of the translation
// service:
// - messages: protobuf wire messages
// - client: HTTP transport with error classification
//
// Decoding never fails: anything the service returns maps onto a typed
// outcome, so callers branch on data instead of errors.

pub mod client;
pub mod messages;

use async_trait::async_trait;
use prost::Message;
use tracing::debug;

pub use client::YandexClient;
use crate::error::TransportError;
use messages::{SubtitlesObject, SubtitlesResponse, VideoTranslationResponse};

/// Message used when a ready translation carries no audio link.
pub const NO_LINK: &str = "no link";
/// Message used when the response body cannot be decoded.
pub const DECODE_ERROR: &str = "decode error";
/// Source tag attached to tracks returned by the subtitle call.
pub const SUBTITLE_SOURCE: &str = "yandex";

/// Voice used for the synthesized track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStyle {
    /// Voices that follow the speaker's intonation
    Live,
    /// Standard text-to-speech
    Tts,
}

impl VoiceStyle {
    pub fn describe(&self) -> &'static str {
        match self {
            VoiceStyle::Live => "live voices",
            VoiceStyle::Tts => "standard TTS",
        }
    }
}

/// Parameters of a voice-over translation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub url: String,
    pub duration_secs: f64,
    pub source_lang: String,
    pub target_lang: String,
    pub voice: VoiceStyle,
}

/// Parameters of a subtitle listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitlesRequest {
    pub url: String,
    pub source_lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Ready { url: String },
    Pending,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub source: String,
    pub language: String,
    pub url: String,
    /// Set when the service machine-translated this track from another language
    pub translated_from_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitlesOutcome {
    Ready { tracks: Vec<SubtitleTrack> },
    Failed { message: String },
}

/// Single-shot calls to the translation service.
///
/// Implementations perform exactly one network call per method and never
/// retry; the returned bytes are the undecoded response body. Proxy settings
/// are fixed when the implementation is constructed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationApi: Send + Sync {
    async fn request_translation(
        &self,
        request: &TranslationRequest,
    ) -> std::result::Result<Vec<u8>, TransportError>;

    async fn request_subtitles(
        &self,
        request: &SubtitlesRequest,
    ) -> std::result::Result<Vec<u8>, TransportError>;
}

/// Map a translation response body onto an outcome.
pub fn decode_translation(body: &[u8]) -> TranslationOutcome {
    let response = match VideoTranslationResponse::decode(body) {
        Ok(response) => response,
        Err(e) => {
            debug!("Failed to decode translation response: {}", e);
            return TranslationOutcome::Failed {
                message: DECODE_ERROR.to_string(),
            };
        }
    };

    match response.status {
        0 => TranslationOutcome::Failed {
            message: response.message.unwrap_or_default(),
        },
        1 => match response.url.filter(|url| !url.is_empty()) {
            Some(url) => TranslationOutcome::Ready { url },
            None => TranslationOutcome::Failed {
                message: NO_LINK.to_string(),
            },
        },
        2 => {
            if let Some(remaining) = response.remaining_time {
                debug!("Translation pending, service estimates {}s remaining", remaining);
            }
            TranslationOutcome::Pending
        }
        other => TranslationOutcome::Failed {
            message: format!("unknown status {}", other),
        },
    }
}

/// Map a subtitle response body onto an outcome with a deduplicated track list.
pub fn decode_subtitles(body: &[u8]) -> SubtitlesOutcome {
    match SubtitlesResponse::decode(body) {
        Ok(response) => {
            if response.waiting {
                debug!("Subtitle service reports tracks are still being prepared");
            }
            SubtitlesOutcome::Ready {
                tracks: collect_tracks(&response.subtitles),
            }
        }
        Err(e) => {
            debug!("Failed to decode subtitles response: {}", e);
            SubtitlesOutcome::Failed {
                message: DECODE_ERROR.to_string(),
            }
        }
    }
}

/// Flatten service objects into tracks.
///
/// A primary track is skipped when a primary with the same source and language
/// is already listed. Translated tracks are always appended and keep the
/// language they were translated from.
pub fn collect_tracks(objects: &[SubtitlesObject]) -> Vec<SubtitleTrack> {
    let mut tracks: Vec<SubtitleTrack> = Vec::new();

    for object in objects {
        let duplicate = tracks.iter().any(|track| {
            track.source == SUBTITLE_SOURCE
                && track.language == object.language
                && track.translated_from_language.is_none()
        });

        if !object.language.is_empty() && !duplicate {
            tracks.push(SubtitleTrack {
                source: SUBTITLE_SOURCE.to_string(),
                language: object.language.clone(),
                url: object.url.clone(),
                translated_from_language: None,
            });
        }

        if !object.translated_language.is_empty() {
            tracks.push(SubtitleTrack {
                source: SUBTITLE_SOURCE.to_string(),
                language: object.translated_language.clone(),
                url: object.translated_url.clone(),
                translated_from_language: Some(object.language.clone()),
            });
        }
    }

    tracks
}
