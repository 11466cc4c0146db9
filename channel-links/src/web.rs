//! The one-field web form in front of the pipeline.
//!
//! Everything is a `GET`: `/` renders the form (and, with `?channel=`, the result of resolving
//! it), and `/oauth2callback` is where Google sends the user back after granting access.

use crate::config::CALLBACK_PATH;
use crate::events::EventSink;
use crate::pipeline::{ErrorKind, Outcome, Pipeline};
use crate::token::TokenProvider;
use bytes::Bytes;
use eyre::Context;
use http::{Method, StatusCode, Uri, header};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::fmt::Write;
use std::sync::Arc;
use tokio::net::TcpListener;

const PAGE: &str = include_str!("../assets/page.html");
const OAUTH_SUCCESS: &str = include_str!("../assets/oauth_success.html");
const OAUTH_FAILURE: &str = include_str!("../assets/oauth_failure.html");

/// Query parameters Google appends to the OAuth redirect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    /// Set instead of `code` when the user declined, e.g. `access_denied`.
    pub error: Option<String>,
}

impl CallbackParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        for (key, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            let slot = match &*key {
                "state" => &mut params.state,
                "code" => &mut params.code,
                "error" => &mut params.error,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        params
    }
}

/// The web front end: routes requests and renders pipeline outcomes as HTML.
#[derive(Debug)]
pub struct App<P, E> {
    pipeline: Pipeline<P, E>,
}

impl<P: TokenProvider, E: EventSink> App<P, E> {
    pub fn new(pipeline: Pipeline<P, E>) -> Self {
        Self { pipeline }
    }

    #[tracing::instrument(skip_all, fields(%method, %uri))]
    pub async fn handle(&self, method: &Method, uri: &Uri) -> Response<Full<Bytes>> {
        if method != Method::GET && method != Method::HEAD {
            return html(
                StatusCode::METHOD_NOT_ALLOWED,
                page("", "<p>Only GET is supported.</p>"),
            );
        }

        match uri.path() {
            "/" => match channel_param(uri.query()) {
                None => html(StatusCode::OK, page("", "")),
                Some(query) => self.resolve(&query).await,
            },
            CALLBACK_PATH => self.oauth_callback(CallbackParams::from_query(uri.query())).await,
            _ => html(StatusCode::NOT_FOUND, page("", "<p>Not found.</p>")),
        }
    }

    async fn resolve(&self, query: &str) -> Response<Full<Bytes>> {
        let outcome = match self.pipeline.run(query).await {
            Ok(outcome) => outcome,
            Err(e) if e.kind() == ErrorKind::EmptyQuery => {
                return html(
                    StatusCode::BAD_REQUEST,
                    page("", r#"<p class="error">Please enter a channel name.</p>"#),
                );
            }
            Err(e) if e.kind() == ErrorKind::Unauthenticated => {
                tracing::warn!(error = %e, "access to YouTube was lost mid-request");
                match self
                    .pipeline
                    .client()
                    .token_provider()
                    .authorization_url()
                    .await
                {
                    Ok(url) => Outcome::AuthorizationRequired { url },
                    Err(e) => Outcome::AuthorizationUnavailable {
                        reason: e.to_string(),
                    },
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind(), "could not resolve channel");
                return html(
                    StatusCode::BAD_GATEWAY,
                    page(
                        query,
                        r#"<p class="error">Something went wrong while talking to YouTube. Please try again later.</p>"#,
                    ),
                );
            }
        };

        let (status, body) = match &outcome {
            Outcome::AuthorizationRequired { url } => (
                StatusCode::OK,
                format!(
                    r#"<p>This app needs read access to YouTube first. <a href="{}">Authorize with Google</a>, then search again.</p>"#,
                    escape(url)
                ),
            ),
            Outcome::AuthorizationUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                r#"<p class="error">Signing in with Google is not possible right now. Please try again later.</p>"#
                    .to_string(),
            ),
            Outcome::ChannelNotFound { query } => (
                StatusCode::OK,
                format!("<p>No channel matches <q>{}</q>.</p>", escape(query.as_str())),
            ),
            Outcome::Links(links) if links.is_empty() => (
                StatusCode::OK,
                "<p>That channel has no videos.</p>".to_string(),
            ),
            Outcome::Links(links) => {
                let mut list = format!("<p>{} videos</p>\n<ol>\n", links.len());
                for link in links {
                    let link = escape(link.as_str());
                    let _ = writeln!(list, r#"<li><a href="{link}">{link}</a></li>"#);
                }
                list.push_str("</ol>");
                (StatusCode::OK, list)
            }
        };
        html(status, page(query, &body))
    }

    async fn oauth_callback(&self, params: CallbackParams) -> Response<Full<Bytes>> {
        if let Some(error) = &params.error {
            tracing::warn!(%error, "authorization was not granted");
            return html(StatusCode::BAD_REQUEST, OAUTH_FAILURE.to_string());
        }
        let (Some(state), Some(code)) = (&params.state, &params.code) else {
            tracing::warn!("authorization callback is missing state or code");
            return html(StatusCode::BAD_REQUEST, OAUTH_FAILURE.to_string());
        };

        match self
            .pipeline
            .client()
            .token_provider()
            .complete_authorization(state, code)
            .await
        {
            Ok(()) => html(StatusCode::OK, OAUTH_SUCCESS.to_string()),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "could not complete authorization");
                html(StatusCode::BAD_REQUEST, OAUTH_FAILURE.to_string())
            }
        }
    }
}

/// Accepts connections on `listener` until it fails, serving each on its own task.
pub async fn serve<P, E>(listener: TcpListener, app: Arc<App<P, E>>) -> eyre::Result<()>
where
    P: TokenProvider + 'static,
    E: EventSink + 'static,
{
    loop {
        let (conn, peer) = listener.accept().await.context("accept connection")?;
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let app = Arc::clone(&app);
                let (parts, _body) = req.into_parts();
                async move { Ok::<_, Infallible>(app.handle(&parts.method, &parts.uri).await) }
            });
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(hyper_util::rt::TokioIo::new(conn), service)
                .await
            {
                tracing::debug!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

fn channel_param(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "channel")
        .map(|(_, value)| value.into_owned())
}

/// Fills the page template in a single pass, so nothing substituted is looked at again.
fn page(query: &str, body: &str) -> String {
    let (head, rest) = PAGE.split_once("{{query}}").unwrap_or((PAGE, ""));
    let (middle, tail) = rest.split_once("{{body}}").unwrap_or((rest, ""));
    format!("{head}{}{middle}{body}{tail}", escape(query))
}

fn html(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}
