// Platform detection from user-supplied URLs
//
// Advisory only: a false positive is handed to the library, which does its
// own validation. A false negative just blocks submission.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hint text shown in an empty URL field. Never a real URL.
pub const PLACEHOLDER_URL: &str = "https://youtube.com/watch?v=... or https://x.com/...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    Twitter,
    Unsupported,
}

impl Platform {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Extractor arguments passed through to the library for this site.
    pub fn extractor_args(&self) -> Option<&'static str> {
        match self {
            // Try every Twitter API the extractor knows, most reliable first
            Self::Twitter => Some("twitter:api=syndication,legacy,graphql"),
            Self::YouTube | Self::Unsupported => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YouTube => write!(f, "youtube"),
            Self::Twitter => write!(f, "twitter"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

lazy_static::lazy_static! {
    // Host (optionally with scheme and subdomains) followed by a path,
    // query, port or the end of the string.
    static ref YOUTUBE_RE: Regex = Regex::new(
        r"(?i)^(?:https?://)?(?:[a-z0-9-]+\.)*(?:youtube\.com|youtube-nocookie\.com|youtu\.be)(?:[/?#:]|$)"
    ).unwrap();
    static ref TWITTER_RE: Regex = Regex::new(
        r"(?i)^(?:https?://)?(?:[a-z0-9-]+\.)*(?:twitter\.com|x\.com|t\.co)(?:[/?#:]|$)"
    ).unwrap();
}

/// Classify a URL by source site.
pub fn detect(url: &str) -> Platform {
    let url = url.trim();
    if url.is_empty() || url == PLACEHOLDER_URL || url.chars().any(char::is_whitespace) {
        return Platform::Unsupported;
    }

    if YOUTUBE_RE.is_match(url) {
        Platform::YouTube
    } else if TWITTER_RE.is_match(url) {
        Platform::Twitter
    } else {
        Platform::Unsupported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_urls() {
        for url in [
            "https://youtube.com/watch?v=abc",
            "https://www.youtube.com/watch?v=abc&t=10",
            "http://m.youtube.com/shorts/xyz",
            "https://youtu.be/abc",
            "youtube.com/watch?v=abc",
            "  https://music.youtube.com/watch?v=abc  ",
        ] {
            assert_eq!(detect(url), Platform::YouTube, "{url}");
        }
    }

    #[test]
    fn test_twitter_urls() {
        for url in [
            "https://x.com/user/status/1",
            "https://twitter.com/user/status/1",
            "https://mobile.twitter.com/user/status/1",
            "https://t.co/AbCd",
        ] {
            assert_eq!(detect(url), Platform::Twitter, "{url}");
        }
    }

    #[test]
    fn test_unsupported_urls() {
        for url in [
            "",
            "   ",
            "not a url",
            PLACEHOLDER_URL,
            "https://vimeo.com/123",
            "https://box.com/file",
            "https://notyoutube.com/watch?v=abc",
            "https://example.com/?next=youtube.com",
        ] {
            assert_eq!(detect(url), Platform::Unsupported, "{url:?}");
        }
    }

    #[test]
    fn test_extractor_args() {
        assert!(Platform::Twitter.extractor_args().unwrap().starts_with("twitter:"));
        assert_eq!(Platform::YouTube.extractor_args(), None);
    }
}
