//! Shared types for the YouTube API client.

/// Paging details for lists of resources.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
    /// The number of results included in the API response.
    #[serde(rename = "resultsPerPage", default)]
    pub results_per_page: u32,
}

/// Treats an empty continuation token the same as a missing one.
pub(crate) fn continuation(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}
