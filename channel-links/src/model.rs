//! The values that flow through a channel-to-links resolution.
//!
//! All of these are request-scoped: nothing here outlives a single run of the pipeline.

use crate::pipeline::ResolveError;
use std::fmt;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// What the user typed into the form, trimmed and known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelQuery(String);

impl ChannelQuery {
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque YouTube channel identifier (`UC...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelId(pub String);

/// Identifier of the playlist YouTube keeps of every upload of one channel (`UU...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadsPlaylistId(pub String);

/// Canonical watch URL of one video.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoLink(String);

impl VideoLink {
    pub fn from_video_id(video_id: &str) -> Self {
        Self(format!("{WATCH_URL_PREFIX}{video_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn video_id(&self) -> &str {
        &self.0[WATCH_URL_PREFIX.len()..]
    }
}

/// Upload links in the order the API returned them, across all pages.
pub type VideoLinkList = Vec<VideoLink>;

/// One page of the uploads playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistPage {
    pub links: Vec<VideoLink>,
    /// Present when there is at least one more page to fetch.
    pub next_page_token: Option<String>,
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

display_as_str!(ChannelQuery, ChannelId, UploadsPlaylistId, VideoLink);
