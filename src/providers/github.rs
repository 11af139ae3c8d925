//! Lists a user's repositories through the GitHub search API.

use super::pagination::{decode_page, paginated, Page};
use super::{api_base, Provider, Repository};
use crate::config::{Config, ConfigError};
use async_trait::async_trait;
use failure::{Error, ResultExt};
use futures::TryStreamExt;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Url};
use serde::Deserialize;

/// An interface to the repositories stored on a GitHub-style server.
#[derive(Debug, Clone)]
pub struct GitHub {
    first_page: Url,
    headers: HeaderMap,
}

impl GitHub {
    /// Set up the provider, validating everything that can fail before
    /// the first request (token header, login, server URL).
    pub fn from_config(cfg: &Config) -> Result<GitHub, Error> {
        let login = cfg
            .login
            .as_deref()
            .ok_or(ConfigError::MissingLogin(cfg.provider))?;

        let mut first_page = api_base(&cfg.server)?
            .join("search/repositories")
            .context("Unable to build the search URL")?;
        first_page
            .query_pairs_mut()
            .append_pair("q", &format!("user:{}", login))
            .append_pair("per_page", "100");

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(login).context("The login makes an invalid User-Agent")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("token {}", cfg.token))
                .context("The token makes an invalid Authorization header")?,
        );

        Ok(GitHub { first_page, headers })
    }
}

#[async_trait]
impl Provider for GitHub {
    fn name(&self) -> &str {
        "github"
    }

    async fn repositories(&self) -> Result<Vec<Repository>, Error> {
        let pages = paginated(
            Client::new(),
            self.first_page.clone(),
            self.headers.clone(),
            |response| async move {
                let (next, results): (_, SearchResults) = decode_page(response).await?;
                Ok(Page {
                    next,
                    items: results.items,
                })
            },
        );

        let found: Vec<RawRepo> = pages
            .try_collect()
            .await
            .context("Unable to fetch repositories from GitHub")?;
        debug!("{} repositories found on github", found.len());

        Ok(found.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SearchResults {
    items: Vec<RawRepo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawRepo {
    full_name: String,
    ssh_url: String,
}

impl From<RawRepo> for Repository {
    fn from(raw: RawRepo) -> Repository {
        Repository {
            name: raw.full_name,
            url: raw.ssh_url,
        }
    }
}
