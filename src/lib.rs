//! dubfetch - Video Translation Downloader
//!
//! Requests machine-generated voice-over translations (or subtitles) for
//! videos from a remote translation service, polls until they are ready,
//! downloads them and optionally remuxes the audio into the source video
//! using yt-dlp and ffmpeg.

pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod host;
pub mod media;
pub mod pipeline;
pub mod poller;
pub mod protocol;
pub mod proxy;
pub mod service;
pub mod subtitle;
