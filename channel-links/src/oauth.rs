//! OAuth 2.0 flows against Google's authorization server.
//!
//! Two ways in: [`OAuthManager::authorization_request`] + [`OAuthManager::exchange_code`] for a
//! redirect that lands on our own web server, and [`OAuthManager::authenticate`] for the
//! command-line tool, which listens on a loopback port for the redirect and opens the browser
//! itself. Both use PKCE and a random CSRF state.

use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::url::Url;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl, reqwest,
};
use std::future::Future;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint, used both for code exchange and refresh.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Listing a channel's uploads only needs read access.
pub const YOUTUBE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

/// Manages OAuth 2.0 authorization and refresh for YouTube API access.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
}

/// An authorization URL handed out to a user that has not come back yet.
///
/// Holds what is needed to finish the flow once the redirect arrives.
#[derive(Debug)]
pub struct PendingAuthorization {
    csrf: CsrfToken,
    pkce_verifier: PkceCodeVerifier,
    redirect_url: RedirectUrl,
}

impl PendingAuthorization {
    /// The `state` value the authorization server will echo back.
    pub fn state(&self) -> &str {
        self.csrf.secret()
    }
}

impl OAuthManager {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> eyre::Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http_client,
        })
    }

    /// Builds the URL the user must visit to grant read access to YouTube.
    ///
    /// The returned [`PendingAuthorization`] must be kept until the redirect to `redirect_url`
    /// arrives, and then passed to [`Self::exchange_code`].
    pub fn authorization_request(
        &self,
        redirect_url: RedirectUrl,
    ) -> eyre::Result<(Url, PendingAuthorization)> {
        self.authorization_request_with_state(redirect_url, CsrfToken::new_random())
    }

    /// Exchanges the authorization code from a redirect for an access token.
    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        pending: PendingAuthorization,
        code: AuthorizationCode,
    ) -> eyre::Result<BasicTokenResponse> {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("parse token URL")?)
            .set_redirect_uri(pending.redirect_url);

        let token = client
            .exchange_code(code)
            .set_pkce_verifier(pending.pkce_verifier)
            .request_async(&self.http_client)
            .await
            .context("exchange authorization code with access token")?;

        tracing::debug!(
            has_refresh_token = token.refresh_token().is_some(),
            "obtained access token"
        );
        Ok(token)
    }

    /// Runs the whole authorization flow from a terminal.
    ///
    /// Listens on a random loopback port for the redirect, opens the user's browser on the
    /// authorization URL, and waits for the code to come back. `done_html` is shown to the user
    /// once the redirect has been received.
    pub async fn authenticate(&self, done_html: &'static str) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = self
            .setup_redirect(csrf.clone(), done_html)
            .await
            .context("set up redirect endpoint")?;
        let (auth_url, pending) = self.authorization_request_with_state(redirect_url, csrf)?;

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if let Err(e) = webbrowser::open(auth_url.as_ref()) {
            tracing::warn!(error = %e, "could not open browser, visit the URL manually");
            eprintln!("Please authorize access by visiting: {auth_url}");
        }

        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;
        self.exchange_code(pending, authorization_code).await
    }

    /// Attempts to refresh an existing OAuth token using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded
    /// * `Ok(None)` - No refresh token, or the grant is no longer valid
    /// * `Err(_)` - Network or other error occurred during refresh attempt
    ///
    /// When `Ok(None)` is returned the token should be considered dead, and the user must
    /// authorize again.
    pub async fn refresh_token(
        &self,
        token: BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("parse token URL")?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http_client)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    fn authorization_request_with_state(
        &self,
        redirect_url: RedirectUrl,
        csrf: CsrfToken,
    ) -> eyre::Result<(Url, PendingAuthorization)> {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string()).context("parse authorization URL")?)
            .set_redirect_uri(redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = csrf.clone();
        let (auth_url, _) = client
            .authorize_url(move || state)
            .add_scope(Scope::new(YOUTUBE_READONLY_SCOPE.to_string()))
            // Google only hands out a refresh token for offline access
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok((
            auth_url,
            PendingAuthorization {
                csrf,
                pkce_verifier,
                redirect_url,
            },
        ))
    }

    /// Sets up a one-shot local HTTP server to receive the OAuth authorization callback.
    ///
    /// Returns the redirect URL and a future that resolves to the authorization code once a
    /// callback carrying the expected `csrf` state is received.
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
        done_html: &'static str,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>>,
    )> {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind to localhost")?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        let expected = csrf;
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let expected = expected.clone();
                    let got = got.clone();
                    async move {
                        let callback = crate::web::CallbackParams::from_query(req.uri().query());
                        if callback.state.as_deref() != Some(expected.secret().as_str()) {
                            return Err("invalid csrf token");
                        }
                        let Some(code) = callback.code else {
                            return Err("no authorization code found");
                        };
                        if got.send(AuthorizationCode::new(code)).await.is_err() {
                            return Err("authorization code already received");
                        }
                        Ok(Response::new(Full::<Bytes>::from(done_html)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    code = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        code.ok_or_else(|| eyre::eyre!("redirect handler went away"))
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}
