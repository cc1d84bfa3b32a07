use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{DubError, Result, TransportError};
use crate::media::ScratchFile;
use crate::proxy::ProxyConfig;

/// Fetches finished artifacts (translated audio, subtitle tracks) over HTTP
pub struct ArtifactDownloader {
    client: Client,
    show_progress: bool,
}

impl ArtifactDownloader {
    pub fn new(user_agent: &str, proxy: Option<&ProxyConfig>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(user_agent.to_string());
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }

        Ok(Self {
            client: builder.build().map_err(DubError::Http)?,
            show_progress: true,
        })
    }

    /// Disable the terminal progress bar
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Download `url` to `destination`, returning the number of bytes written.
    ///
    /// The body is streamed into a scratch file next to the destination and
    /// renamed into place once complete, so an interrupted download never
    /// leaves a truncated artifact under the final name.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        let label = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        debug!("Downloading {} to {}", url, destination.display());

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()).into());
        }

        let pb = self.progress_bar(response.content_length(), &label);
        let scratch = ScratchFile::new(parent, "temp_download", "part");
        let mut file = async_fs::File::create(scratch.path()).await?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await?;
        drop(file);

        async_fs::rename(scratch.path(), destination).await?;
        pb.finish_and_clear();

        info!("Saved {} ({})", destination.display(), format_size(downloaded));
        Ok(downloaded)
    }

    fn progress_bar(&self, length: Option<u64>, label: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = match length {
            Some(length) => ProgressBar::new(length),
            None => ProgressBar::new_spinner(),
        };
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(label.to_string());
        pb
    }
}

/// Human readable size in megabytes
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}
