use clap::Parser;
use eyre::Context;
use oauth2::RedirectUrl;
use std::sync::Arc;
use youtube_channel_links::config::{CliArgs, Credentials};
use youtube_channel_links::oauth::OAuthManager;
use youtube_channel_links::youtube_api::YouTubeClient;
use youtube_channel_links::{
    OAuthTokenProvider, Outcome, Pipeline, TokenProvider, TokenStore, TracingSink,
};

const OAUTH_DONE: &str = include_str!("../../assets/cli_done.html");

#[tokio::main]
async fn main() -> eyre::Result<()> {
    youtube_channel_links::init_tracing();

    let args = CliArgs::parse();
    let credentials = Credentials::from_env()?;

    let oauth = OAuthManager::new(credentials.client_id, credentials.client_secret)?;
    // only the loopback flow is used here, which picks its own redirect
    let unused_redirect = RedirectUrl::new("http://127.0.0.1/".to_string())
        .context("construct placeholder redirect URL")?;
    let store = TokenStore::new(args.tokens.clone());
    let tokens = OAuthTokenProvider::load(oauth, store, unused_redirect)
        .await
        .context("load stored YouTube token")?;

    if !tokens.has_access().await {
        eprintln!("Authorize access to YouTube in your browser to continue.");
        let token = tokens
            .oauth()
            .authenticate(OAUTH_DONE)
            .await
            .context("authorize user to YouTube")?;
        tokens.install(token).await?;
    }

    let client = YouTubeClient::new(Arc::new(tokens), reqwest::Client::new());
    let pipeline = Pipeline::new(client, TracingSink);
    match pipeline
        .run(&args.channel)
        .await
        .with_context(|| format!("list uploads of {:?}", args.channel))?
    {
        Outcome::Links(links) => {
            if links.is_empty() {
                eprintln!("channel has no videos");
            }
            for link in links {
                println!("{link}");
            }
        }
        Outcome::ChannelNotFound { query } => {
            eyre::bail!("no channel matches \"{query}\"");
        }
        Outcome::AuthorizationRequired { url } => {
            eyre::bail!("still not authorized; visit {url}");
        }
        Outcome::AuthorizationUnavailable { reason } => {
            eyre::bail!("cannot authorize with Google: {reason}");
        }
    }
    Ok(())
}
