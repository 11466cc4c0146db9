//! Test doubles: a fake YouTube Data API server, a canned token provider, and an event sink
//! that remembers what it was told.
//!
//! The fake server is a real HTTP/1 server on a random loopback port, so requests go through
//! the same reqwest code path as in production. It records every request it receives so tests
//! can assert on exactly which calls were made.

use crate::events::{EventSink, PipelineEvent};
use crate::token::TokenProvider;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One request as seen by [`MockYouTube`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub authorization: Option<String>,
}

impl RecordedRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default, Clone)]
struct Routes {
    search: Option<Value>,
    channels: HashMap<String, Value>,
    /// keyed by (playlist ID, page token)
    playlist_pages: HashMap<(String, Option<String>), Value>,
    failures: HashMap<String, (u16, String)>,
}

/// A stand-in for `https://www.googleapis.com/youtube/v3`.
///
/// Unregistered channel IDs get an empty `channels.list` response, like the real API gives for
/// unknown IDs. Unregistered playlist pages get a 404.
#[derive(Debug, Default)]
pub(crate) struct MockYouTube {
    routes: Routes,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockYouTube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, response: Value) -> Self {
        self.routes.search = Some(response);
        self
    }

    /// Registers a channel whose uploads live in `uploads_playlist_id`.
    pub fn channel(self, channel_id: &str, uploads_playlist_id: &str) -> Self {
        let response = json!({
            "kind": "youtube#channelListResponse",
            "pageInfo": { "totalResults": 1, "resultsPerPage": 5 },
            "items": [{
                "kind": "youtube#channel",
                "id": channel_id,
                "contentDetails": {
                    "relatedPlaylists": { "likes": "", "uploads": uploads_playlist_id }
                }
            }]
        });
        self.channel_response(channel_id, response)
    }

    pub fn channel_response(mut self, channel_id: &str, response: Value) -> Self {
        self.routes.channels.insert(channel_id.to_string(), response);
        self
    }

    pub fn playlist_page(mut self, playlist_id: &str, page_token: Option<&str>, response: Value) -> Self {
        self.routes.playlist_pages.insert(
            (playlist_id.to_string(), page_token.map(String::from)),
            response,
        );
        self
    }

    /// Makes every request to `path` fail with `status`.
    pub fn fail(mut self, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .failures
            .insert(path.to_string(), (status, body.to_string()));
        self
    }

    /// Starts serving and returns the base URL to point a client at.
    pub async fn start(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock YouTube API");
        let addr = listener.local_addr().expect("mock YouTube API address");
        let routes = Arc::new(self.routes.clone());
        let requests = Arc::clone(&self.requests);

        tokio::spawn(async move {
            while let Ok((conn, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let requests = Arc::clone(&requests);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let response = respond(&routes, &requests, &req);
                        async move { Ok::<_, Infallible>(response) }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(hyper_util::rt::TokioIo::new(conn), service)
                        .await;
                });
            }
        });

        format!("http://{addr}")
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock poisoned").clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

fn respond(
    routes: &Routes,
    requests: &Mutex<Vec<RecordedRequest>>,
    req: &Request<Incoming>,
) -> Response<Full<Bytes>> {
    let recorded = RecordedRequest {
        path: req.uri().path().to_string(),
        query: form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
            .into_owned()
            .collect(),
        authorization: req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    };
    requests
        .lock()
        .expect("lock poisoned")
        .push(recorded.clone());

    if let Some((status, body)) = routes.failures.get(&recorded.path) {
        return reply(
            StatusCode::from_u16(*status).expect("valid status"),
            body.clone(),
        );
    }

    let body = match recorded.path.as_str() {
        "/search" => routes.search.clone(),
        "/channels" => Some(
            recorded
                .param("id")
                .and_then(|id| routes.channels.get(id))
                .cloned()
                .unwrap_or_else(|| {
                    json!({
                        "kind": "youtube#channelListResponse",
                        "pageInfo": { "totalResults": 0, "resultsPerPage": 5 }
                    })
                }),
        ),
        "/playlistItems" => {
            let key = (
                recorded.param("playlistId").unwrap_or("").to_string(),
                recorded.param("pageToken").map(String::from),
            );
            routes.playlist_pages.get(&key).cloned()
        }
        _ => None,
    };

    match body {
        Some(body) => reply(StatusCode::OK, body.to_string()),
        None => reply(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":404,"message":"not found"}}"#.to_string(),
        ),
    }
}

fn reply(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, "application/json".parse().expect("valid header"));
    response
}

/// A `search.list` item pointing at `channel_id`.
pub(crate) fn search_hit(channel_id: &str) -> Value {
    json!({
        "kind": "youtube#searchResult",
        "id": { "kind": "youtube#channel", "channelId": channel_id },
        "snippet": {
            "channelId": channel_id,
            "title": format!("Channel {channel_id}"),
            "channelTitle": format!("Channel {channel_id}"),
        }
    })
}

/// A `playlistItems.list` page containing `video_ids`, in order.
pub(crate) fn playlist_page(video_ids: &[String], next_page_token: Option<&str>) -> Value {
    let items: Vec<_> = video_ids
        .iter()
        .enumerate()
        .map(|(position, id)| {
            json!({
                "kind": "youtube#playlistItem",
                "snippet": {
                    "publishedAt": "2024-01-01T00:00:00Z",
                    "title": format!("Video {id}"),
                    "position": position,
                    "resourceId": { "kind": "youtube#video", "videoId": id }
                }
            })
        })
        .collect();
    let mut page = json!({
        "kind": "youtube#playlistItemListResponse",
        "pageInfo": { "totalResults": video_ids.len(), "resultsPerPage": 50 },
        "items": items,
    });
    if let Some(token) = next_page_token {
        page["nextPageToken"] = json!(token);
    }
    page
}

/// A [`TokenProvider`] with fixed answers.
///
/// Completing an authorization with state `"good-state"` grants access; any other state fails.
#[derive(Debug)]
pub(crate) struct MockTokens {
    access: AtomicBool,
    token_available: bool,
    authorization_available: bool,
    completed: Mutex<Vec<(String, String)>>,
}

impl MockTokens {
    pub fn authorized() -> Self {
        Self {
            access: AtomicBool::new(true),
            token_available: true,
            authorization_available: true,
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            access: AtomicBool::new(false),
            token_available: true,
            authorization_available: true,
            completed: Mutex::new(Vec::new()),
        }
    }

    /// Claims access, but then fails to produce a token.
    pub fn revoked_mid_run() -> Self {
        Self {
            access: AtomicBool::new(true),
            token_available: false,
            authorization_available: true,
            completed: Mutex::new(Vec::new()),
        }
    }

    /// Has no access, and cannot produce an authorization URL either.
    pub fn authorization_broken() -> Self {
        Self {
            access: AtomicBool::new(false),
            token_available: false,
            authorization_available: false,
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn completed(&self) -> Vec<(String, String)> {
        self.completed.lock().expect("lock poisoned").clone()
    }
}

impl TokenProvider for MockTokens {
    async fn has_access(&self) -> bool {
        self.access.load(Ordering::SeqCst)
    }

    async fn access_token(&self) -> eyre::Result<String> {
        if !self.token_available {
            eyre::bail!("refresh token revoked");
        }
        Ok("test-token".to_string())
    }

    async fn authorization_url(&self) -> eyre::Result<String> {
        if !self.authorization_available {
            eyre::bail!("OAuth client is misconfigured");
        }
        Ok("https://accounts.google.com/o/oauth2/auth?client_id=test&state=good-state".to_string())
    }

    async fn complete_authorization(&self, state: &str, code: &str) -> eyre::Result<()> {
        if state != "good-state" {
            eyre::bail!("unknown or expired authorization state");
        }
        self.completed
            .lock()
            .expect("lock poisoned")
            .push((state.to_string(), code.to_string()));
        self.access.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Remembers the name of every event it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().expect("lock poisoned").clone()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: PipelineEvent<'_>) {
        self.events.lock().expect("lock poisoned").push(event.name());
    }
}
