//! Resolve a YouTube channel name to the watch URL of every video it has uploaded.
//!
//! The work happens in [`pipeline::Pipeline`], which talks to the YouTube Data API through
//! [`youtube_api::YouTubeClient`] using tokens from a [`token::TokenProvider`]. The web form in
//! [`web`] and the two binaries are thin shells around it.

pub mod config;
pub mod events;
pub mod model;
pub mod oauth;
pub mod pipeline;
pub mod token;
pub mod web;
pub mod youtube_api;

#[cfg(test)]
mod mock;

pub use events::{EventSink, NoopSink, PipelineEvent, TracingSink};
pub use model::{
    ChannelId, ChannelQuery, PlaylistPage, UploadsPlaylistId, VideoLink, VideoLinkList,
};
pub use pipeline::{ErrorKind, Outcome, Pipeline, ResolveError};
pub use token::{OAuthTokenProvider, TokenProvider, TokenStore};

use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber both binaries log through.
///
/// Logs go to stderr so that stdout carries nothing but results. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}
