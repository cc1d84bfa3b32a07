use std::error::Error as StdError;

use async_trait::async_trait;
use prost::Message;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{DubError, Result, TransportError};
use crate::proxy::ProxyConfig;
use super::messages;
use super::{SubtitlesRequest, TranslationApi, TranslationRequest, VoiceStyle};

const PROTOBUF_MEDIA_TYPE: &str = "application/x-protobuf";

/// HTTP transport for the translation service
pub struct YandexClient {
    client: Client,
    config: RemoteConfig,
}

impl YandexClient {
    pub fn new(config: RemoteConfig, proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(PROTOBUF_MEDIA_TYPE));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_MEDIA_TYPE));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));

        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout());

        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        let client = builder.build().map_err(DubError::Http)?;

        Ok(Self { client, config })
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> std::result::Result<Vec<u8>, TransportError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        debug!("Sending protobuf request to {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Translation service answered {} for {}", status, path);
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        debug!("Received {} bytes from {}", bytes.len(), path);
        Ok(bytes.to_vec())
    }

    fn classify(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout(self.config.request_timeout_ms);
        }
        if is_connection_reset(&error) {
            return TransportError::ConnectionReset;
        }
        if let Some(status) = error.status() {
            return TransportError::HttpStatus(status.as_u16());
        }
        TransportError::Other(error.to_string())
    }
}

fn is_connection_reset(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// Encode a translation request with the constants the service expects.
pub fn encode_translation_request(request: &TranslationRequest) -> Vec<u8> {
    messages::VideoTranslationRequest {
        url: request.url.clone(),
        device_id: None,
        first_request: true,
        duration: request.duration_secs,
        unknown0: 1,
        language: request.source_lang.clone(),
        force_source_lang: false,
        unknown1: 0,
        was_stream: false,
        response_language: request.target_lang.clone(),
        unknown2: 1,
        unknown3: 2,
        bypass_cache: false,
        use_lively_voice: request.voice == VoiceStyle::Live,
        video_title: String::new(),
    }
    .encode_to_vec()
}

pub fn encode_subtitles_request(request: &SubtitlesRequest) -> Vec<u8> {
    messages::SubtitlesRequest {
        url: request.url.clone(),
        language: request.source_lang.clone(),
    }
    .encode_to_vec()
}

#[async_trait]
impl TranslationApi for YandexClient {
    async fn request_translation(
        &self,
        request: &TranslationRequest,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let body = encode_translation_request(request);
        self.post(&self.config.translate_path, body).await
    }

    async fn request_subtitles(
        &self,
        request: &SubtitlesRequest,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        let body = encode_subtitles_request(request);
        self.post(&self.config.subtitles_path, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::protocol::test_support::translation_body;
    use crate::protocol::{decode_translation, TranslationOutcome};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote_config(server: &MockServer) -> RemoteConfig {
        let mut config = Config::default().remote;
        config.base_url = server.uri();
        config.request_timeout_ms = 500;
        config
    }

    fn sample_request() -> TranslationRequest {
        TranslationRequest {
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            duration_secs: 212.0,
            source_lang: "en".to_string(),
            target_lang: "ru".to_string(),
            voice: VoiceStyle::Live,
        }
    }

    #[test]
    fn test_request_encoding_carries_parameters() {
        let bytes = encode_translation_request(&sample_request());
        let decoded = messages::VideoTranslationRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.url, "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(decoded.language, "en");
        assert_eq!(decoded.response_language, "ru");
        assert!(decoded.use_lively_voice);
        assert!(decoded.first_request);
        assert_eq!(decoded.duration, 212.0);
    }

    #[tokio::test]
    async fn test_posts_protobuf_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video-translation/translate"))
            .and(header("content-type", PROTOBUF_MEDIA_TYPE))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(translation_body(1, Some("https://cdn/a.mp3"), None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = YandexClient::new(remote_config(&server), None).unwrap();
        let body = client.request_translation(&sample_request()).await.unwrap();
        assert_eq!(
            decode_translation(&body),
            TranslationOutcome::Ready {
                url: "https://cdn/a.mp3".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_non_200_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = YandexClient::new(remote_config(&server), None).unwrap();
        let err = client.request_translation(&sample_request()).await.unwrap_err();
        assert_eq!(err, TransportError::HttpStatus(429));
    }

    #[tokio::test]
    async fn test_slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = YandexClient::new(remote_config(&server), None).unwrap();
        let err = client
            .request_subtitles(&SubtitlesRequest {
                url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
                source_lang: "en".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout(500));
    }
}
