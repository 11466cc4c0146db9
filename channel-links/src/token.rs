//! Access-token supply for the YouTube client.
//!
//! The pipeline never talks to the OAuth machinery directly. It is handed something that
//! implements [`TokenProvider`], which in production is an [`OAuthTokenProvider`] backed by a
//! JSON token file, and in tests is whatever canned provider the test needs.

use crate::oauth::{OAuthManager, PendingAuthorization};
use eyre::Context;
use oauth2::basic::BasicTokenResponse;
use oauth2::{AuthorizationCode, RedirectUrl, TokenResponse};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// How many unanswered authorization URLs we remember before forgetting the oldest.
const MAX_PENDING_AUTHORIZATIONS: usize = 32;

/// Supplies bearer tokens, or a way for the user to get one.
pub trait TokenProvider: Send + Sync {
    /// Whether [`Self::access_token`] is expected to succeed right now.
    ///
    /// Never fails. Problems obtaining a token are reported as `false`.
    fn has_access(&self) -> impl Future<Output = bool> + Send;

    /// A bearer token that is valid for at least the next few minutes.
    fn access_token(&self) -> impl Future<Output = eyre::Result<String>> + Send;

    /// A URL the user can visit to grant access.
    fn authorization_url(&self) -> impl Future<Output = eyre::Result<String>> + Send;

    /// Finishes an authorization started by [`Self::authorization_url`], given the `state` and
    /// `code` the authorization server redirected back with.
    fn complete_authorization(
        &self,
        state: &str,
        code: &str,
    ) -> impl Future<Output = eyre::Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    /// When the current access token expires (with safety buffer)
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Creates a token that is already expired, forcing a refresh before first use.
    ///
    /// This is what tokens loaded from storage start out as, since we cannot know how long ago
    /// they were issued.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    /// Creates a token that was just issued.
    ///
    /// The expiry time is calculated from the token's `expires_in` field minus
    /// a 5-minute safety buffer to prevent edge-case failures.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
        }
    }

    pub fn raw_token(&self) -> &BasicTokenResponse {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn secret(&self) -> &str {
        self.token.access_token().secret()
    }

    /// Refreshes this token using the provided OAuth manager, preserving the refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh failed (invalid grant, no refresh token, etc.)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        match oauth_manager
            .refresh_token(self.token.clone())
            .await
            .context("refresh OAuth token")?
        {
            Some(new_token) => {
                self.replace(new_token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Swaps in a refreshed token.
    ///
    /// Google usually leaves the refresh token out of refresh responses, in which case the one
    /// we already had stays valid and is carried over.
    fn replace(&mut self, new_token: BasicTokenResponse) {
        let old_token = std::mem::replace(&mut self.token, new_token);
        if self.token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, keeping the previous one");
            self.token
                .set_refresh_token(old_token.refresh_token().cloned());
        }
        self.expires_at = Self::calculate_token_expiry(&self.token);
    }

    /// Uses the current time + expires_in duration - 5 minute safety buffer.
    /// If no expires_in is provided, assumes a conservative 55-minute lifetime.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let now = SystemTime::now();
        match token.expires_in() {
            Some(expires_in) => now + expires_in.saturating_sub(Duration::from_secs(300)),
            None => now + Duration::from_secs(3300),
        }
    }
}

/// Persists the OAuth token between runs as a JSON file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored token, if any.
    pub async fn load(&self) -> eyre::Result<Option<BasicTokenResponse>> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .with_context(|| format!("check for token file {}", self.path.display()))?
        {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read token file {}", self.path.display()))?;
        serde_json::from_str(&json).context("parse stored YouTube access token")
    }

    pub async fn save(&self, token: &BasicTokenResponse) -> eyre::Result<()> {
        let json = serde_json::to_string(token).context("serialize YouTube access token")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("write token file {}", self.path.display()))
    }

    pub async fn clear(&self) -> eyre::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("remove token file {}", self.path.display()))
            }
        }
    }
}

/// [`TokenProvider`] backed by Google OAuth and a [`TokenStore`].
#[derive(Debug)]
pub struct OAuthTokenProvider {
    oauth: OAuthManager,
    store: TokenStore,
    redirect_url: RedirectUrl,
    token: Mutex<Option<TimeBoundAccessToken>>,
    pending: Mutex<VecDeque<PendingAuthorization>>,
}

impl OAuthTokenProvider {
    /// Creates a provider, picking up any token left in `store` by a previous run.
    ///
    /// A stored token is treated as expired, so it is refreshed the first time it is needed.
    pub async fn load(
        oauth: OAuthManager,
        store: TokenStore,
        redirect_url: RedirectUrl,
    ) -> eyre::Result<Self> {
        let token = store.load().await?.map(TimeBoundAccessToken::expired);
        if token.is_some() {
            tracing::info!(path = %store.path().display(), "loaded stored YouTube token");
        }
        Ok(Self {
            oauth,
            store,
            redirect_url,
            token: Mutex::new(token),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    pub fn oauth(&self) -> &OAuthManager {
        &self.oauth
    }

    /// Adopts a freshly issued token and persists it.
    pub async fn install(&self, token: BasicTokenResponse) -> eyre::Result<()> {
        self.store
            .save(&token)
            .await
            .context("persist new YouTube token")?;
        *self.token.lock().await = Some(TimeBoundAccessToken::new(token));
        Ok(())
    }

    /// Returns a usable access token, refreshing first if needed.
    ///
    /// `Ok(None)` means there is no token, or it could no longer be refreshed, and the user has
    /// to authorize again.
    async fn usable_token(&self) -> eyre::Result<Option<String>> {
        let mut guard = self.token.lock().await;
        let Some(token) = guard.as_mut() else {
            return Ok(None);
        };

        if token.is_expired() {
            tracing::debug!("access token expired, attempting refresh");
            if !token.refresh(&self.oauth).await? {
                tracing::warn!("access token could not be refreshed, authorization required");
                *guard = None;
                self.store
                    .clear()
                    .await
                    .context("forget unrefreshable token")?;
                return Ok(None);
            }
            self.store
                .save(token.raw_token())
                .await
                .context("persist refreshed token")?;
        }

        Ok(Some(token.secret().to_string()))
    }
}

impl TokenProvider for OAuthTokenProvider {
    async fn has_access(&self) -> bool {
        match self.usable_token().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "could not obtain access token");
                false
            }
        }
    }

    async fn access_token(&self) -> eyre::Result<String> {
        self.usable_token()
            .await?
            .ok_or_else(|| eyre::eyre!("not authorized to access YouTube"))
    }

    async fn authorization_url(&self) -> eyre::Result<String> {
        let (url, pending) = self
            .oauth
            .authorization_request(self.redirect_url.clone())
            .context("build authorization request")?;

        let mut outstanding = self.pending.lock().await;
        if outstanding.len() >= MAX_PENDING_AUTHORIZATIONS {
            outstanding.pop_front();
        }
        outstanding.push_back(pending);
        Ok(url.to_string())
    }

    async fn complete_authorization(&self, state: &str, code: &str) -> eyre::Result<()> {
        let pending = {
            let mut outstanding = self.pending.lock().await;
            let Some(at) = outstanding.iter().position(|p| p.state() == state) else {
                eyre::bail!("unknown or expired authorization state");
            };
            outstanding.remove(at)
        };
        let Some(pending) = pending else {
            eyre::bail!("unknown or expired authorization state");
        };

        let token = self
            .oauth
            .exchange_code(pending, AuthorizationCode::new(code.to_string()))
            .await?;
        self.install(token).await?;
        tracing::info!("authorization successful");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields, RefreshToken};
    use pretty_assertions::assert_eq;

    fn token(access: &str, expires_in: Option<u64>, refresh: Option<&str>) -> BasicTokenResponse {
        let mut token = BasicTokenResponse::new(
            AccessToken::new(access.to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        token.set_expires_in(expires_in.map(Duration::from_secs).as_ref());
        token.set_refresh_token(refresh.map(|r| RefreshToken::new(r.to_string())));
        token
    }

    fn provider_in(dir: &tempfile::TempDir) -> (OAuthManager, TokenStore, RedirectUrl) {
        (
            OAuthManager::new("client-id", "client-secret").unwrap(),
            TokenStore::new(dir.path().join("tokens.json")),
            RedirectUrl::new("http://127.0.0.1:8080/oauth2callback".to_string()).unwrap(),
        )
    }

    #[test]
    fn stored_tokens_start_out_expired() {
        assert!(TimeBoundAccessToken::expired(token("a", Some(3600), None)).is_expired());
        assert!(!TimeBoundAccessToken::new(token("a", Some(3600), None)).is_expired());
        // no expires_in: assume it lasts most of an hour
        assert!(!TimeBoundAccessToken::new(token("a", None, None)).is_expired());
    }

    #[test]
    fn short_lived_tokens_are_immediately_stale() {
        assert!(TimeBoundAccessToken::new(token("a", Some(60), None)).is_expired());
    }

    #[test]
    fn refresh_keeps_the_old_refresh_token() {
        let mut t = TimeBoundAccessToken::expired(token("old", Some(3600), Some("keep-me")));
        t.replace(token("new", Some(3600), None));
        assert_eq!(t.secret(), "new");
        assert_eq!(
            t.raw_token().refresh_token().map(|r| r.secret().as_str()),
            Some("keep-me")
        );
        assert!(!t.is_expired());

        t.replace(token("newer", Some(3600), Some("rotated")));
        assert_eq!(
            t.raw_token().refresh_token().map(|r| r.secret().as_str()),
            Some("rotated")
        );
    }

    #[tokio::test]
    async fn token_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert!(store.load().await.unwrap().is_none());

        store
            .save(&token("abc", Some(3600), Some("r")))
            .await
            .unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.access_token().secret(), "abc");

        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // clearing twice is fine
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn provider_without_token_has_no_access() {
        let dir = tempfile::tempdir().unwrap();
        let (oauth, store, redirect) = provider_in(&dir);
        let provider = OAuthTokenProvider::load(oauth, store, redirect).await.unwrap();

        assert!(!provider.has_access().await);
        assert!(provider.access_token().await.is_err());
    }

    #[tokio::test]
    async fn installed_token_is_used_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (oauth, store, redirect) = provider_in(&dir);
        let provider = OAuthTokenProvider::load(oauth, store.clone(), redirect)
            .await
            .unwrap();

        provider
            .install(token("fresh", Some(3600), Some("r")))
            .await
            .unwrap();
        assert!(provider.has_access().await);
        assert_eq!(provider.access_token().await.unwrap(), "fresh");
        assert_eq!(
            store.load().await.unwrap().unwrap().access_token().secret(),
            "fresh"
        );
    }

    #[tokio::test]
    async fn stored_token_without_refresh_token_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (oauth, store, redirect) = provider_in(&dir);
        store.save(&token("stale", Some(3600), None)).await.unwrap();

        let provider = OAuthTokenProvider::load(oauth, store.clone(), redirect)
            .await
            .unwrap();
        // loaded tokens are refreshed first, and this one cannot be
        assert!(!provider.has_access().await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authorization_urls_point_back_at_our_callback() {
        let dir = tempfile::tempdir().unwrap();
        let (oauth, store, redirect) = provider_in(&dir);
        let provider = OAuthTokenProvider::load(oauth, store, redirect).await.unwrap();

        let url = provider.authorization_url().await.unwrap();
        let url = oauth2::url::Url::parse(&url).unwrap();
        let redirect_uri = url
            .query_pairs()
            .find(|(k, _)| k == "redirect_uri")
            .map(|(_, v)| v.into_owned());
        assert_eq!(
            redirect_uri.as_deref(),
            Some("http://127.0.0.1:8080/oauth2callback")
        );
        assert_eq!(provider.pending.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_state_is_rejected_without_contacting_google() {
        let dir = tempfile::tempdir().unwrap();
        let (oauth, store, redirect) = provider_in(&dir);
        let provider = OAuthTokenProvider::load(oauth, store, redirect).await.unwrap();
        provider.authorization_url().await.unwrap();

        let err = provider
            .complete_authorization("forged", "code")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown or expired authorization state");
        assert_eq!(provider.pending.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn pending_authorizations_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let (oauth, store, redirect) = provider_in(&dir);
        let provider = OAuthTokenProvider::load(oauth, store, redirect).await.unwrap();
        for _ in 0..MAX_PENDING_AUTHORIZATIONS + 5 {
            provider.authorization_url().await.unwrap();
        }
        assert_eq!(
            provider.pending.lock().await.len(),
            MAX_PENDING_AUTHORIZATIONS
        );
    }
}
