//! Lists the projects visible to a token through the GitLab v4 API.

use super::pagination::{decode_page, paginated, Page};
use super::{api_base, FetchError, Provider, Repository};
use crate::config::Config;
use async_trait::async_trait;
use failure::{Error, ResultExt};
use futures::TryStreamExt;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use serde::Deserialize;

/// A provider which queries the GitLab API.
#[derive(Debug, Clone)]
pub struct GitLab {
    base: Url,
    headers: HeaderMap,
}

impl GitLab {
    pub fn from_config(cfg: &Config) -> Result<GitLab, Error> {
        let base = api_base(&cfg.server)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("private-token"),
            HeaderValue::from_str(&cfg.token)
                .context("The token makes an invalid PRIVATE-TOKEN header")?,
        );

        Ok(GitLab { base, headers })
    }

    fn projects_url(&self, archived: bool) -> Result<Url, Error> {
        let mut url = self
            .base
            .join("api/v4/projects")
            .context("Unable to build the projects URL")?;
        url.query_pairs_mut()
            .append_pair("archived", if archived { "true" } else { "false" })
            .append_pair("per_page", "100");

        Ok(url)
    }

    async fn projects(&self, archived: bool) -> Result<Vec<RawProject>, Error> {
        let pages = paginated(
            Client::new(),
            self.projects_url(archived)?,
            self.headers.clone(),
            |response| async move {
                let (next, items) = decode_page(response).await?;
                Ok::<_, FetchError>(Page { next, items })
            },
        );

        let found = pages
            .try_collect()
            .await
            .context("Unable to fetch projects from GitLab")?;
        Ok(found)
    }
}

#[async_trait]
impl Provider for GitLab {
    fn name(&self) -> &str {
        "gitlab"
    }

    async fn repositories(&self) -> Result<Vec<Repository>, Error> {
        // Archived projects are listed separately; a project can show up
        // in both passes, so merge on the project id.
        let active = self.projects(false).await?;
        let archived = self.projects(true).await?;

        let all = merge_by_id(active, archived);
        debug!("{} projects found on gitlab", all.len());

        Ok(all.into_iter().map(Into::into).collect())
    }
}

fn merge_by_id(mut known: Vec<RawProject>, extra: Vec<RawProject>) -> Vec<RawProject> {
    for candidate in extra {
        if !known.iter().any(|p| p.id == candidate.id) {
            known.push(candidate);
        }
    }

    known
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawProject {
    id: u64,
    name_with_namespace: String,
    ssh_url_to_repo: String,
}

impl From<RawProject> for Repository {
    fn from(raw: RawProject) -> Repository {
        Repository {
            name: raw.name_with_namespace,
            url: raw.ssh_url_to_repo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            provider: ProviderKind::GitLab,
            server: "gitlab.example.com".to_string(),
            token: "s3cret".to_string(),
            login: None,
            folder: PathBuf::from("git-backup"),
            log_file: None,
            dry_run: false,
            job_timeout: None,
        }
    }

    #[test]
    fn the_projects_url_carries_the_archived_flag() {
        let gl = GitLab::from_config(&config()).unwrap();

        assert_eq!(
            gl.projects_url(true).unwrap().as_str(),
            "https://gitlab.example.com/api/v4/projects?archived=true&per_page=100"
        );
    }

    #[test]
    fn merging_drops_duplicate_projects() {
        let project = |id| RawProject {
            id,
            ..RawProject::default()
        };

        let merged = merge_by_id(vec![project(1), project(2)], vec![project(2), project(3)]);

        let ids: Vec<u64> = merged.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn projects_map_onto_repositories() {
        let payload = serde_json::json!([{
            "id": 42,
            "name_with_namespace": "My Group / My Project",
            "ssh_url_to_repo": "git@gitlab.example.com:my-group/my-project.git"
        }]);

        let projects: Vec<RawProject> = serde_json::from_value(payload).unwrap();
        let repo: Repository = projects.into_iter().next().unwrap().into();

        assert_eq!(repo.name, "My Group / My Project");
        assert_eq!(repo.url, "git@gitlab.example.com:my-group/my-project.git");
    }
}
