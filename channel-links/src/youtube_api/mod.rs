//! YouTube Data API v3 client library.
//!
//! Only the three read endpoints needed to enumerate a channel's uploads are covered:
//!
//! 1. [`YouTubeClient::search_channels`] turns free text into candidate channel IDs.
//! 2. [`YouTubeClient::get_channel_content_details`] finds a channel's uploads playlist.
//! 3. [`YouTubeClient::list_playlist_items_page`] walks that playlist, 50 items at a time.

pub mod channels;
pub mod client;
pub mod error;
pub mod playlist_items;
pub mod search;
pub mod types;

pub use client::{DEFAULT_API_BASE, MAX_RESULTS_PER_PAGE, YouTubeClient};
pub use error::ApiError;
pub use types::PageInfo;

pub use channels::{Channel, ChannelListResponse};
pub use playlist_items::{PlaylistItem, PlaylistItemListResponse};
pub use search::{SearchListResponse, SearchResult};
