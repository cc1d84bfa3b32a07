// Wire messages of the translation endpoint.
//
// Field numbers are fixed by the remote service; unknown fields carry
// constants the service expects but never documents.

#[derive(Clone, PartialEq, prost::Message)]
pub struct VideoTranslationRequest {
    #[prost(string, tag = "3")]
    pub url: String,
    #[prost(string, optional, tag = "4")]
    pub device_id: Option<String>,
    #[prost(bool, tag = "5")]
    pub first_request: bool,
    #[prost(double, tag = "6")]
    pub duration: f64,
    #[prost(int32, tag = "7")]
    pub unknown0: i32,
    #[prost(string, tag = "8")]
    pub language: String,
    #[prost(bool, tag = "9")]
    pub force_source_lang: bool,
    #[prost(int32, tag = "10")]
    pub unknown1: i32,
    #[prost(bool, tag = "13")]
    pub was_stream: bool,
    #[prost(string, tag = "14")]
    pub response_language: String,
    #[prost(int32, tag = "15")]
    pub unknown2: i32,
    #[prost(int32, tag = "16")]
    pub unknown3: i32,
    #[prost(bool, tag = "17")]
    pub bypass_cache: bool,
    #[prost(bool, tag = "18")]
    pub use_lively_voice: bool,
    #[prost(string, tag = "19")]
    pub video_title: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct VideoTranslationResponse {
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(double, optional, tag = "2")]
    pub duration: Option<f64>,
    #[prost(int32, tag = "4")]
    pub status: i32,
    #[prost(int32, optional, tag = "5")]
    pub remaining_time: Option<i32>,
    #[prost(int32, optional, tag = "6")]
    pub unknown0: Option<i32>,
    #[prost(string, optional, tag = "7")]
    pub translation_id: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub message: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubtitlesRequest {
    #[prost(string, tag = "1")]
    pub url: String,
    #[prost(string, tag = "2")]
    pub language: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubtitlesObject {
    #[prost(string, tag = "1")]
    pub language: String,
    #[prost(string, tag = "2")]
    pub url: String,
    #[prost(int32, tag = "3")]
    pub unknown0: i32,
    #[prost(string, tag = "4")]
    pub translated_language: String,
    #[prost(string, tag = "5")]
    pub translated_url: String,
    #[prost(int32, tag = "6")]
    pub unknown1: i32,
    #[prost(int32, tag = "7")]
    pub unknown2: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SubtitlesResponse {
    #[prost(bool, tag = "1")]
    pub waiting: bool,
    #[prost(message, repeated, tag = "2")]
    pub subtitles: Vec<SubtitlesObject>,
}
