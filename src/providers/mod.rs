//! The repository-listing strategies.

mod github;
mod gitlab;
mod pagination;

pub use self::github::GitHub;
pub use self::gitlab::GitLab;

use crate::config::{Config, ConfigError};
use async_trait::async_trait;
use failure::{Error, Fail, ResultExt};
use reqwest::{StatusCode, Url};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A repository discovered on the server, as the rest of the program
/// sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Provider-qualified display name; may contain spaces and
    /// namespace separators.
    pub name: String,
    /// The clone endpoint.
    pub url: String,
}

/// Something which can list the repositories we want to back up.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn repositories(&self) -> Result<Vec<Repository>, Error>;
}

/// The closed set of supported providers, selected once at startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    GitLab,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<ProviderKind, ConfigError> {
        match s.to_lowercase().as_str() {
            "github" => Ok(ProviderKind::GitHub),
            "gitlab" => Ok(ProviderKind::GitLab),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ProviderKind::GitHub => "github".fmt(f),
            ProviderKind::GitLab => "gitlab".fmt(f),
        }
    }
}

/// Instantiate the provider the config asks for.
pub fn provider_for(cfg: &Config) -> Result<Box<dyn Provider>, Error> {
    match cfg.provider {
        ProviderKind::GitHub => Ok(Box::new(GitHub::from_config(cfg)?)),
        ProviderKind::GitLab => Ok(Box::new(GitLab::from_config(cfg)?)),
    }
}

/// The ways listing repositories can fail.
#[derive(Debug, Fail)]
pub enum FetchError {
    #[fail(display = "Request to {} failed with {}", url, status)]
    BadResponse { status: StatusCode, url: String },
    #[fail(display = "Unable to reach the server")]
    Transport(#[fail(cause)] reqwest::Error),
    #[fail(display = "Couldn't understand the server's response")]
    BadBody(#[fail(cause)] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(other: reqwest::Error) -> FetchError {
        FetchError::Transport(other)
    }
}

/// Base URL for a server string, defaulting the scheme to HTTPS when
/// none is given.
pub(crate) fn api_base(server: &str) -> Result<Url, Error> {
    let with_scheme = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    };

    let url = Url::parse(&with_scheme)
        .with_context(|_| format!("{:?} is not a valid server", server))?;
    Ok(url)
}
