use std::sync::OnceLock;

use regex::Regex;

use crate::error::{DubError, Result};

/// A video hosting service the translation endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    YouTube,
    Vimeo,
    /// Any other https link, passed to the service verbatim
    Custom,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::YouTube => "youtube",
            Service::Vimeo => "vimeo",
            Service::Custom => "custom",
        }
    }

    fn base_url(&self) -> &'static str {
        match self {
            Service::YouTube => "https://youtu.be/",
            Service::Vimeo => "https://vimeo.com/",
            Service::Custom => "",
        }
    }
}

/// A validated link: the service it belongs to and the id within that service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub service: Service,
    pub video_id: String,
}

fn youtube_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^https?://(?:www\.|m\.|music\.)?(?:youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/|live/)|youtu\.be/)([A-Za-z0-9_-]{6,})",
        )
        .expect("valid youtube pattern")
    })
}

fn vimeo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://(?:www\.|player\.)?vimeo\.com/(?:video/)?(\d+)")
            .expect("valid vimeo pattern")
    })
}

impl VideoReference {
    pub fn parse(link: &str) -> Result<Self> {
        let link = link.trim();

        if let Some(caps) = youtube_pattern().captures(link) {
            return Ok(Self {
                service: Service::YouTube,
                video_id: caps[1].to_string(),
            });
        }

        if let Some(caps) = vimeo_pattern().captures(link) {
            return Ok(Self {
                service: Service::Vimeo,
                video_id: caps[1].to_string(),
            });
        }

        match url::Url::parse(link) {
            Ok(parsed) if parsed.scheme() == "https" && parsed.host_str().is_some() => Ok(Self {
                service: Service::Custom,
                video_id: link.to_string(),
            }),
            _ => Err(DubError::UnsupportedLink(link.to_string())),
        }
    }

    /// The URL sent to the translation service and to the video fetching tool.
    pub fn final_url(&self) -> String {
        if self.video_id.starts_with("https://") || self.service == Service::Custom {
            self.video_id.clone()
        } else {
            format!("{}{}", self.service.base_url(), self.video_id)
        }
    }
}

/// Turn an arbitrary title into something usable as a file name.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut in_whitespace = false;
    for c in replaced.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                collapsed.push('_');
            }
            in_whitespace = true;
        } else {
            collapsed.push(c);
            in_whitespace = false;
        }
    }

    collapsed.chars().take(100).collect()
}
