//! Core YouTube API client functionality.

use crate::token::TokenProvider;
use crate::youtube_api::{
    channels::ChannelListResponse, error::ApiError, playlist_items::PlaylistItemListResponse,
    search::SearchListResponse, types::continuation,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::instrument;

/// Where the YouTube Data API v3 lives.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Largest page the list endpoints will hand out.
pub const MAX_RESULTS_PER_PAGE: u32 = 50;

/// Client for the read-only parts of the YouTube Data API v3 that we need.
///
/// Every request is authorized with a bearer token obtained from the [`TokenProvider`] right
/// before the request is sent, so the provider gets a chance to refresh in between calls.
#[derive(Debug)]
pub struct YouTubeClient<P> {
    tokens: Arc<P>,
    client: reqwest::Client,
    base_url: String,
}

impl<P> Clone for YouTubeClient<P> {
    fn clone(&self) -> Self {
        Self {
            tokens: Arc::clone(&self.tokens),
            client: self.client.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl<P: TokenProvider> YouTubeClient<P> {
    /// Creates a client that talks to the real YouTube API.
    pub fn new(tokens: Arc<P>, client: reqwest::Client) -> Self {
        Self {
            tokens,
            client,
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Points the client at a different API root, such as a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token_provider(&self) -> &P {
        &self.tokens
    }

    /// Makes an authenticated GET request against `endpoint` and decodes the JSON response.
    ///
    /// The body is read in full before decoding, so that a body that fails to arrive is a
    /// [`ApiError::Transport`] and a body that arrives but has the wrong shape is a
    /// [`ApiError::Malformed`].
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(ApiError::unauthenticated)?;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .query(query_params)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        if !status.is_success() {
            return Err(ApiError::Status { url, status, body });
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Malformed { url, source })
    }

    /// Searches for channels matching free text.
    ///
    /// Search is fuzzy. Results are in YouTube's relevance order, which is not guaranteed to
    /// put an exact handle match first.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/search/list>
    #[instrument(skip(self))]
    pub async fn search_channels(&self, query: &str) -> Result<SearchListResponse, ApiError> {
        let query_params = [("part", "snippet"), ("type", "channel"), ("q", query)];
        let results: SearchListResponse = self.get_json("search", &query_params).await?;

        tracing::debug!(
            total_results = results.page_info.total_results,
            returned_items = results.items.len(),
            "searched channels"
        );

        Ok(results)
    }

    /// Fetches the content details (related playlists) of one channel.
    ///
    /// The response has no items if `channel_id` does not name an existing channel.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self))]
    pub async fn get_channel_content_details(
        &self,
        channel_id: &str,
    ) -> Result<ChannelListResponse, ApiError> {
        let query_params = [("part", "contentDetails"), ("id", channel_id)];
        let channels: ChannelListResponse = self.get_json("channels", &query_params).await?;

        tracing::debug!(
            channel_id,
            returned_items = channels.items.len(),
            "fetched channel content details"
        );

        Ok(channels)
    }

    /// Fetches one page of a playlist.
    ///
    /// `page_token` is the `nextPageToken` of the previous page, or `None` for the first page.
    /// An empty `nextPageToken` in the response is normalised to `None`.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self))]
    pub async fn list_playlist_items_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<PlaylistItemListResponse, ApiError> {
        let max_results = MAX_RESULTS_PER_PAGE.to_string();
        let mut query_params = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(token) = page_token {
            query_params.push(("pageToken", token));
        }

        let mut page: PlaylistItemListResponse =
            self.get_json("playlistItems", &query_params).await?;
        page.next_page_token = continuation(page.next_page_token.take());

        tracing::debug!(
            total_results = page.page_info.total_results,
            returned_items = page.items.len(),
            has_more = page.next_page_token.is_some(),
            "fetched playlist items"
        );

        Ok(page)
    }

    /// Returns every page of a playlist, fetched one at a time as the stream is polled.
    ///
    /// The stream ends after the first page without a continuation token, or right after the
    /// first error. Each call starts over from the first page.
    pub fn list_playlist_item_pages<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> impl Stream<Item = Result<PlaylistItemListResponse, ApiError>> + Send + 'a {
        async_stream::try_stream! {
            let mut page_token: Option<String> = None;
            loop {
                let page = self
                    .list_playlist_items_page(playlist_id, page_token.as_deref())
                    .await?;
                page_token = page.next_page_token.clone();
                let is_last = page_token.is_none();
                yield page;
                if is_last {
                    break;
                }
            }
        }
    }
}
