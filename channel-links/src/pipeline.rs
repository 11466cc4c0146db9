//! Channel name in, upload links out.
//!
//! Resolution runs in three strictly sequential stages, each feeding the next:
//!
//! 1. search for the query and take the first channel hit,
//! 2. look up that channel's uploads playlist,
//! 3. page through the playlist, 50 videos at a time, until a page comes back without a
//!    continuation token.
//!
//! Nothing is retried. Any transport or decoding failure ends the run, and paging does not
//! resume where it left off on the next run.

use crate::events::{EventSink, PipelineEvent};
use crate::model::{
    ChannelId, ChannelQuery, PlaylistPage, UploadsPlaylistId, VideoLink, VideoLinkList,
};
use crate::token::TokenProvider;
use crate::youtube_api::{ApiError, YouTubeClient};
use thiserror::Error;
use tokio_stream::{Stream, StreamExt};

/// Why a resolution could not produce a link list.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("channel query is empty")]
    EmptyQuery,

    #[error("no channel matches {0:?}")]
    ChannelNotFound(String),

    /// The channel lookup returned nothing usable for an ID that search handed us.
    #[error("channel {0} does not exist or has no uploads playlist")]
    InvalidChannelId(ChannelId),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Coarse classification of [`ResolveError`], for deciding what to tell a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyQuery,
    Unauthenticated,
    ChannelNotFound,
    InvalidChannelId,
    Transport,
    MalformedResponse,
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery => ErrorKind::EmptyQuery,
            Self::ChannelNotFound(_) => ErrorKind::ChannelNotFound,
            Self::InvalidChannelId(_) => ErrorKind::InvalidChannelId,
            Self::Api(ApiError::Unauthenticated(_)) => ErrorKind::Unauthenticated,
            Self::Api(ApiError::Transport { .. } | ApiError::Status { .. }) => {
                ErrorKind::Transport
            }
            Self::Api(ApiError::Malformed { .. }) => ErrorKind::MalformedResponse,
        }
    }
}

/// How a complete run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No token is available. The user must visit `url` first; no API call was made.
    AuthorizationRequired { url: String },
    /// No token is available, and no authorization URL could be produced either.
    AuthorizationUnavailable { reason: String },
    /// Search found no channel for the query.
    ChannelNotFound { query: ChannelQuery },
    /// Every upload of the channel, possibly none.
    Links(VideoLinkList),
}

impl Outcome {
    /// The resolved links; empty unless the run got as far as the uploads playlist.
    pub fn links(&self) -> &[VideoLink] {
        match self {
            Self::Links(links) => links,
            Self::AuthorizationRequired { .. }
            | Self::AuthorizationUnavailable { .. }
            | Self::ChannelNotFound { .. } => &[],
        }
    }
}

/// Resolves channel queries to upload links.
///
/// Holds no per-query state, so one pipeline can serve any number of queries, and running the
/// same query twice against an unchanged channel yields the same links.
#[derive(Debug)]
pub struct Pipeline<P, E> {
    client: YouTubeClient<P>,
    events: E,
}

impl<P: TokenProvider, E: EventSink> Pipeline<P, E> {
    pub fn new(client: YouTubeClient<P>, events: E) -> Self {
        Self { client, events }
    }

    pub fn client(&self) -> &YouTubeClient<P> {
        &self.client
    }

    /// Runs all three stages for a raw, user-entered query.
    ///
    /// Checks for access before anything else. Without it the outcome carries an
    /// authorization URL (or, failing that, the reason there is none) and YouTube is never
    /// contacted. An empty search is
    /// [`Outcome::ChannelNotFound`], which keeps it apart from a channel that exists but has
    /// not uploaded anything.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, raw_query: &str) -> Result<Outcome, ResolveError> {
        let query = ChannelQuery::parse(raw_query)?;

        let tokens = self.client.token_provider();
        if !tokens.has_access().await {
            let url = match tokens.authorization_url().await {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "could not build authorization URL");
                    return Ok(Outcome::AuthorizationUnavailable {
                        reason: e.to_string(),
                    });
                }
            };
            self.events
                .record(PipelineEvent::AuthorizationRequired { url: &url });
            return Ok(Outcome::AuthorizationRequired { url });
        }

        let channel_id = match self.resolve_channel_id(&query).await {
            Ok(id) => id,
            Err(ResolveError::ChannelNotFound(_)) => {
                return Ok(Outcome::ChannelNotFound { query });
            }
            Err(e) => return Err(e),
        };
        let playlist_id = self.resolve_uploads_playlist_id(&channel_id).await?;
        let links = self.fetch_all_video_links(&playlist_id).await?;
        Ok(Outcome::Links(links))
    }

    /// Picks the first channel search returns for `query`.
    ///
    /// No attempt is made to choose between several plausible matches.
    pub async fn resolve_channel_id(
        &self,
        query: &ChannelQuery,
    ) -> Result<ChannelId, ResolveError> {
        let results = self.client.search_channels(query.as_str()).await?;
        let Some(first) = results.items.into_iter().next() else {
            self.events.record(PipelineEvent::ChannelNotFound { query });
            return Err(ResolveError::ChannelNotFound(query.to_string()));
        };

        let channel_id = ChannelId(first.snippet.channel_id);
        self.events.record(PipelineEvent::ChannelResolved {
            query,
            channel_id: &channel_id,
        });
        Ok(channel_id)
    }

    /// Finds the playlist that holds every upload of `channel_id`.
    pub async fn resolve_uploads_playlist_id(
        &self,
        channel_id: &ChannelId,
    ) -> Result<UploadsPlaylistId, ResolveError> {
        let channels = self
            .client
            .get_channel_content_details(&channel_id.0)
            .await?;
        let uploads = channels
            .items
            .front()
            .and_then(|channel| channel.uploads_playlist_id());
        let Some(uploads) = uploads else {
            return Err(ResolveError::InvalidChannelId(channel_id.clone()));
        };

        let playlist_id = UploadsPlaylistId(uploads.to_string());
        self.events.record(PipelineEvent::UploadsPlaylistResolved {
            channel_id,
            playlist_id: &playlist_id,
        });
        Ok(playlist_id)
    }

    /// Pages of the uploads playlist, fetched one at a time as the stream is polled.
    ///
    /// Each call starts over from the first page.
    pub fn pages<'a>(
        &'a self,
        playlist_id: &'a UploadsPlaylistId,
    ) -> impl Stream<Item = Result<PlaylistPage, ResolveError>> + Send + 'a {
        let mut page = 0;
        self.client
            .list_playlist_item_pages(&playlist_id.0)
            .map(move |response| -> Result<PlaylistPage, ResolveError> {
                let response = response?;
                page += 1;
                let links: Vec<_> = response
                    .items
                    .iter()
                    .map(|item| VideoLink::from_video_id(item.video_id()))
                    .collect();
                self.events.record(PipelineEvent::PageFetched {
                    playlist_id,
                    page,
                    videos: links.len(),
                    has_more: response.next_page_token.is_some(),
                });
                Ok(PlaylistPage {
                    links,
                    next_page_token: response.next_page_token,
                })
            })
    }

    /// Every upload link, in playlist order, fetching pages only as they are needed.
    ///
    /// A consumer that only wants the most recent handful of uploads can stop early without
    /// walking the whole playlist.
    pub fn video_links<'a>(
        &'a self,
        playlist_id: &'a UploadsPlaylistId,
    ) -> impl Stream<Item = Result<VideoLink, ResolveError>> + Send + 'a {
        async_stream::try_stream! {
            let pages = self.pages(playlist_id);
            let mut pages = std::pin::pin!(pages);
            while let Some(page) = pages.next().await {
                for link in page?.links {
                    yield link;
                }
            }
        }
    }

    /// Fetches every page and concatenates the links in fetch order.
    pub async fn fetch_all_video_links(
        &self,
        playlist_id: &UploadsPlaylistId,
    ) -> Result<VideoLinkList, ResolveError> {
        let links = self
            .video_links(playlist_id)
            .collect::<Result<VideoLinkList, ResolveError>>()
            .await?;
        self.events.record(PipelineEvent::Completed {
            playlist_id,
            links: &links,
        });
        Ok(links)
    }
}
