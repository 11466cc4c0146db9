//! Progress reporting out of the resolution pipeline.
//!
//! The pipeline never logs directly. It reports what happened to an [`EventSink`], and the
//! binaries plug in [`TracingSink`] to turn those reports into log lines.

use crate::model::{ChannelId, ChannelQuery, UploadsPlaylistId, VideoLink};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    /// The caller has no token; nothing was sent to YouTube.
    AuthorizationRequired { url: &'a str },
    ChannelNotFound { query: &'a ChannelQuery },
    ChannelResolved {
        query: &'a ChannelQuery,
        channel_id: &'a ChannelId,
    },
    UploadsPlaylistResolved {
        channel_id: &'a ChannelId,
        playlist_id: &'a UploadsPlaylistId,
    },
    /// One page of the uploads playlist arrived. `page` counts from 1.
    PageFetched {
        playlist_id: &'a UploadsPlaylistId,
        page: usize,
        videos: usize,
        has_more: bool,
    },
    /// Every page has been fetched.
    Completed {
        playlist_id: &'a UploadsPlaylistId,
        links: &'a [VideoLink],
    },
}

impl PipelineEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationRequired { .. } => "authorization_required",
            Self::ChannelNotFound { .. } => "channel_not_found",
            Self::ChannelResolved { .. } => "channel_resolved",
            Self::UploadsPlaylistResolved { .. } => "uploads_playlist_resolved",
            Self::PageFetched { .. } => "page_fetched",
            Self::Completed { .. } => "completed",
        }
    }
}

/// Receives [`PipelineEvent`]s as the pipeline makes progress.
pub trait EventSink: Send + Sync {
    fn record(&self, event: PipelineEvent<'_>);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn record(&self, event: PipelineEvent<'_>) {
        (**self).record(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _: PipelineEvent<'_>) {}
}

/// Forwards events to `tracing`.
///
/// Each resulting link is logged on its own line at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::AuthorizationRequired { url } => {
                tracing::info!(%url, "authorization required, visit this URL");
            }
            PipelineEvent::ChannelNotFound { query } => {
                tracing::info!(%query, "channel not found");
            }
            PipelineEvent::ChannelResolved { query, channel_id } => {
                tracing::info!(%query, %channel_id, "channel ID found");
            }
            PipelineEvent::UploadsPlaylistResolved {
                channel_id,
                playlist_id,
            } => {
                tracing::info!(%channel_id, %playlist_id, "uploads playlist found");
            }
            PipelineEvent::PageFetched {
                playlist_id,
                page,
                videos,
                has_more,
            } => {
                tracing::debug!(%playlist_id, page, videos, has_more, "fetched uploads page");
            }
            PipelineEvent::Completed { playlist_id, links } => {
                tracing::info!(%playlist_id, total = links.len(), "video links obtained");
                for link in links {
                    tracing::info!("{link}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn logged_at(level: tracing::Level, event: PipelineEvent<'_>) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(level)
            .finish();
        tracing::subscriber::with_default(subscriber, || TracingSink.record(event));
        captured.text()
    }

    #[test]
    fn every_link_is_logged_at_info() {
        let playlist_id = UploadsPlaylistId("UU-abc".into());
        let links = vec![
            VideoLink::from_video_id("first"),
            VideoLink::from_video_id("second"),
        ];
        let out = logged_at(
            tracing::Level::INFO,
            PipelineEvent::Completed {
                playlist_id: &playlist_id,
                links: &links,
            },
        );

        assert!(out.contains("total=2"), "{out}");
        let first = out.find("https://www.youtube.com/watch?v=first").unwrap();
        let second = out.find("https://www.youtube.com/watch?v=second").unwrap();
        assert!(first < second);
        assert_eq!(out.matches(" INFO ").count(), 3, "{out}");
    }

    #[test]
    fn page_progress_is_debug_only() {
        let playlist_id = UploadsPlaylistId("UU-abc".into());
        let event = PipelineEvent::PageFetched {
            playlist_id: &playlist_id,
            page: 1,
            videos: 50,
            has_more: true,
        };
        assert_eq!(logged_at(tracing::Level::INFO, event), "");
        assert!(logged_at(tracing::Level::DEBUG, event).contains("page=1"));
    }

    #[test]
    fn noop_sink_and_names() {
        let query = ChannelQuery::parse("q").unwrap();
        let event = PipelineEvent::ChannelNotFound { query: &query };
        NoopSink.record(event);
        assert_eq!(event.name(), "channel_not_found");
    }
}
