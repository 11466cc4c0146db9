use clap::Parser;
use eyre::Context;
use std::sync::Arc;
use youtube_channel_links::config::{Credentials, ServerArgs};
use youtube_channel_links::oauth::OAuthManager;
use youtube_channel_links::web::{self, App};
use youtube_channel_links::youtube_api::YouTubeClient;
use youtube_channel_links::{OAuthTokenProvider, Pipeline, TokenStore, TracingSink};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    youtube_channel_links::init_tracing();

    let args = ServerArgs::parse();
    let credentials = Credentials::from_env()?;
    let redirect_url = args.redirect_url()?;

    let oauth = OAuthManager::new(credentials.client_id, credentials.client_secret)?;
    let store = TokenStore::new(args.tokens.clone());
    let tokens = OAuthTokenProvider::load(oauth, store, redirect_url)
        .await
        .context("load stored YouTube token")?;
    let client = YouTubeClient::new(Arc::new(tokens), reqwest::Client::new());
    let app = Arc::new(App::new(Pipeline::new(client, TracingSink)));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind to {}", args.listen))?;
    tracing::info!(address = %args.listen, "listening");
    web::serve(listener, app).await
}
