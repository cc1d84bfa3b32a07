use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::{DubError, Result};
use crate::protocol::{
    decode_subtitles, decode_translation, SubtitleTrack, SubtitlesOutcome, SubtitlesRequest,
    TranslationApi, TranslationOutcome, TranslationRequest,
};

/// Retry schedule for translations the service is still preparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(30_000),
        }
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            interval: config.interval(),
        }
    }
}

/// Retry bookkeeping for one job's translation stage.
#[derive(Debug)]
pub struct PollState {
    attempt: u32,
    policy: PollPolicy,
}

impl PollState {
    pub fn new(policy: PollPolicy) -> Self {
        Self { attempt: 0, policy }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Count one more scheduled retry. Returns false once the budget is spent.
    fn advance(&mut self) -> bool {
        self.attempt += 1;
        self.attempt <= self.policy.max_attempts
    }

    fn exhausted_error(&self) -> DubError {
        DubError::PendingRetryExceeded {
            attempts: self.policy.max_attempts,
            elapsed: self.policy.interval * self.policy.max_attempts,
        }
    }
}

/// Drives the translation service until it returns a terminal answer.
pub struct TranslationPoller {
    api: Arc<dyn TranslationApi>,
    policy: PollPolicy,
}

impl TranslationPoller {
    pub fn new(api: Arc<dyn TranslationApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Request a translation, re-issuing the full request while it is pending.
    ///
    /// Returns the audio URL. Transport failures and business failures end the
    /// loop immediately; only the pending status is retried, at most
    /// `max_attempts` times with `interval` between requests.
    pub async fn poll_translation(&self, request: &TranslationRequest) -> Result<String> {
        let mut state = PollState::new(self.policy);

        loop {
            debug!("Requesting translation of {} (attempt {})", request.url, state.attempt());

            let body = self.api.request_translation(request).await?;

            match decode_translation(&body) {
                TranslationOutcome::Ready { url } => {
                    if state.attempt() == 0 {
                        info!("Translation received instantly (cached)");
                    } else {
                        info!("Translation ready after {} retries", state.attempt());
                    }
                    return Ok(url);
                }
                TranslationOutcome::Failed { message } => {
                    warn!("Translation failed: {}", message);
                    return Err(DubError::Protocol(message));
                }
                TranslationOutcome::Pending => {
                    info!(
                        "Translation is being prepared, waiting {}s",
                        self.policy.interval.as_secs()
                    );
                    tokio::time::sleep(self.policy.interval).await;

                    if !state.advance() {
                        let error = state.exhausted_error();
                        warn!("{}", error);
                        return Err(error);
                    }
                    info!("Retry {}/{}", state.attempt(), self.policy.max_attempts);
                }
            }
        }
    }

    /// Request the subtitle track list. There is no retry branch for subtitles.
    pub async fn fetch_subtitles(&self, request: &SubtitlesRequest) -> Result<Vec<SubtitleTrack>> {
        debug!("Requesting subtitles of {}", request.url);

        let body = self.api.request_subtitles(request).await?;

        match decode_subtitles(&body) {
            SubtitlesOutcome::Ready { tracks } => {
                info!("Received {} subtitle tracks", tracks.len());
                Ok(tracks)
            }
            SubtitlesOutcome::Failed { message } => Err(DubError::Protocol(format!(
                "Failed to get subtitles: {}",
                message
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::test_support::{subtitle_object, subtitles_body, translation_body};
    use crate::protocol::{MockTranslationApi, VoiceStyle};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> TranslationRequest {
        TranslationRequest {
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            duration_secs: 341.0,
            source_lang: "en".to_string(),
            target_lang: "ru".to_string(),
            voice: VoiceStyle::Live,
        }
    }

    fn poller(api: MockTranslationApi) -> TranslationPoller {
        TranslationPoller::new(Arc::new(api), PollPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_after_budget() {
        let mut api = MockTranslationApi::new();
        api.expect_request_translation()
            .times(11)
            .returning(|_| Ok(translation_body(2, None, None)));

        let started = tokio::time::Instant::now();
        let err = poller(api).poll_translation(&request()).await.unwrap_err();

        match err {
            DubError::PendingRetryExceeded { attempts, elapsed } => {
                assert_eq!(attempts, 10);
                assert_eq!(elapsed, Duration::from_secs(300));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // 11 waits: the 11th tick is the one that finds the budget spent
        assert_eq!(started.elapsed(), Duration::from_secs(330));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_two_pending_cycles() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut api = MockTranslationApi::new();
        api.expect_request_translation().times(3).returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(translation_body(2, None, None))
            } else {
                Ok(translation_body(1, Some("https://cdn/voice.mp3"), None))
            }
        });

        let started = tokio::time::Instant::now();
        let url = poller(api).poll_translation(&request()).await.unwrap();
        assert_eq!(url, "https://cdn/voice.mp3");
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let mut api = MockTranslationApi::new();
        api.expect_request_translation()
            .times(1)
            .returning(|_| Err(TransportError::ConnectionReset));

        let started = tokio::time::Instant::now();
        let err = poller(api).poll_translation(&request()).await.unwrap_err();
        assert!(matches!(err, DubError::Transport(TransportError::ConnectionReset)));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_business_failure_is_reported_verbatim() {
        let mut api = MockTranslationApi::new();
        api.expect_request_translation()
            .times(1)
            .returning(|_| Ok(translation_body(0, None, Some("Translation is unavailable"))));

        let err = poller(api).poll_translation(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Translation is unavailable");
    }

    #[tokio::test]
    async fn test_subtitles_single_request() {
        let mut api = MockTranslationApi::new();
        api.expect_request_subtitles().times(1).returning(|_| {
            Ok(subtitles_body(vec![
                subtitle_object("en", "https://subs/en", Some(("ru", "https://subs/ru"))),
                subtitle_object("en", "https://subs/en-dup", None),
            ]))
        });

        let tracks = poller(api)
            .fetch_subtitles(&SubtitlesRequest {
                url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
                source_lang: "en".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].translated_from_language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_subtitles_transport_error() {
        let mut api = MockTranslationApi::new();
        api.expect_request_subtitles()
            .times(1)
            .returning(|_| Err(TransportError::HttpStatus(500)));

        let err = poller(api)
            .fetch_subtitles(&SubtitlesRequest {
                url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
                source_lang: "en".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DubError::Transport(TransportError::HttpStatus(500))));
    }
}
