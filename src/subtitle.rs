use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::info;

use crate::error::Result;

/// File format a subtitle track is saved in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    /// The service's own JSON document, saved as received
    Json,
    Srt,
}

impl SubtitleFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Json => "json",
            SubtitleFormat::Srt => "srt",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubtitleDocument {
    #[serde(default)]
    subtitles: Vec<SubtitleLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubtitleLine {
    text: String,
    start_ms: f64,
    duration_ms: f64,
}

/// Convert the service's subtitle JSON into SRT text
pub fn json_to_srt(json: &str) -> Result<String> {
    let document: SubtitleDocument = serde_json::from_str(json)?;

    let mut srt_content = String::new();

    for (index, line) in document.subtitles.iter().enumerate() {
        let start = line.start_ms.max(0.0) as u64;
        let end = start + line.duration_ms.max(0.0) as u64;

        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(start),
            format_srt_time(end),
            line.text.trim()
        ));
    }

    Ok(srt_content)
}

/// Convert a downloaded subtitle JSON file into an SRT file
pub async fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(json_path: P, output_path: Q) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating SRT file: {}", output_path.display());

    let json = fs::read_to_string(json_path.as_ref()).await?;
    fs::write(output_path, json_to_srt(&json)?).await?;

    Ok(())
}

/// Format milliseconds as SRT time (HH:MM:SS,mmm)
fn format_srt_time(total_milliseconds: u64) -> String {
    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds % 3_600_000) / 60_000;
    let secs = (total_milliseconds % 60_000) / 1_000;
    let millis = total_milliseconds % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
