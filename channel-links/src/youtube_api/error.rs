//! Failure classification for YouTube Data API calls.

use thiserror::Error;

/// Why a single YouTube Data API request did not produce a decoded response.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable access token could be obtained for the request.
    #[error("no usable YouTube access token")]
    Unauthenticated(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The request could not be sent, or its response body could not be read.
    #[error("send request to YouTube API: {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-2xx status.
    #[error("YouTube API request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body was not the JSON shape we expected.
    #[error("parse YouTube API response from {url}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub(crate) fn unauthenticated(e: eyre::Report) -> Self {
        Self::Unauthenticated(e.into())
    }
}
