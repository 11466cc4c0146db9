//! Startup configuration.
//!
//! The OAuth client credentials come from the process environment and nowhere else. Everything
//! else has a default and can be overridden on the command line.

use clap::Parser;
use eyre::Context;
use oauth2::RedirectUrl;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const CLIENT_ID_VAR: &str = "YOUTUBE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "YOUTUBE_CLIENT_SECRET";

/// Path the OAuth redirect comes back to on the web server.
pub const CALLBACK_PATH: &str = "/oauth2callback";

/// OAuth client credentials for a Google Cloud project with the YouTube Data API enabled.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Reads the credentials from the process environment.
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the credentials through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<Self> {
        let required = |key: &str| -> eyre::Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => eyre::bail!("{key} must be set to your OAuth client's {}", describe(key)),
            }
        };
        Ok(Self {
            client_id: required(CLIENT_ID_VAR)?,
            client_secret: required(CLIENT_SECRET_VAR)?,
        })
    }
}

fn describe(key: &str) -> &'static str {
    if key == CLIENT_ID_VAR {
        "client ID"
    } else {
        "client secret"
    }
}

/// Serve a form that lists every video a YouTube channel has uploaded.
#[derive(Debug, Parser)]
#[command(version)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// URL this server is reachable at from the user's browser [default: http://<listen>].
    ///
    /// The OAuth redirect URI registered with Google must be this URL followed by
    /// `/oauth2callback`.
    #[arg(long)]
    pub public_url: Option<String>,

    /// Where to keep the OAuth token between runs.
    #[arg(long, default_value = "tokens.json")]
    pub tokens: PathBuf,
}

impl ServerArgs {
    pub fn redirect_url(&self) -> eyre::Result<RedirectUrl> {
        let base = match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen),
        };
        RedirectUrl::new(format!("{base}{CALLBACK_PATH}")).context("construct OAuth redirect URL")
    }
}

/// Print the watch URL of every video a YouTube channel has uploaded.
#[derive(Debug, Parser)]
#[command(version)]
pub struct CliArgs {
    /// Channel name or handle to search for.
    pub channel: String,

    /// Where to keep the OAuth token between runs.
    #[arg(long, default_value = "tokens.json")]
    pub tokens: PathBuf,
}
