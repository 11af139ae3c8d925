//! Ties a run together: list the repositories, set up the working
//! directory, fan the jobs out, and hand back the summary.

use crate::config::Config;
use crate::paths;
use crate::providers;
use crate::scheduler::{self, JobOptions, RunSummary};
use failure::{Error, ResultExt};
use log::info;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    config: Config,
}

impl Driver {
    pub fn with_config(config: Config) -> Driver {
        Driver { config }
    }

    /// Perform one full backup pass.
    ///
    /// An `Err` here is fatal (no repository list, or no working
    /// directory); failures of individual repositories are recoverable
    /// and land inside the returned [`RunSummary`] instead.
    pub async fn run(&self) -> Result<RunSummary, Error> {
        let provider = providers::provider_for(&self.config)?;

        info!("Fetching repositories from {}", provider.name());
        let repos = provider
            .repositories()
            .await
            .context("Unable to fetch the repository list")?;
        info!("Found {} repositories", repos.len());

        let working_dir = self.working_dir();
        if !self.config.dry_run {
            tokio::fs::create_dir_all(&working_dir)
                .await
                .with_context(|_| {
                    format!("Couldn't create the working directory ({})", working_dir.display())
                })?;
        }
        info!("Backing up to {}", working_dir.display());

        let options = JobOptions {
            dry_run: self.config.dry_run,
            timeout: self.config.job_timeout,
        };
        let summary = scheduler::run_jobs(&repos, &working_dir, &options).await;

        if summary.all_succeeded() {
            info!("[success] done");
        } else {
            info!("[failure] done ({} repositories failed)", summary.failures().count());
        }

        Ok(summary)
    }

    /// Where every mirror for the configured server lives.
    pub fn working_dir(&self) -> PathBuf {
        self.config
            .folder
            .join(paths::server_dir(&self.config.server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    fn config(server: &str) -> Config {
        Config {
            provider: ProviderKind::GitLab,
            server: server.to_string(),
            token: "s3cret".to_string(),
            login: None,
            folder: PathBuf::from("/backups"),
            log_file: None,
            dry_run: false,
            job_timeout: None,
        }
    }

    #[test]
    fn the_working_dir_is_scoped_to_the_server() {
        let driver = Driver::with_config(config("gitlab.example.com:8443"));

        assert_eq!(
            driver.working_dir(),
            PathBuf::from("/backups").join("gitlab.example.com_8443")
        );
    }

    #[tokio::test]
    async fn an_unreachable_server_is_fatal_before_any_job_runs() {
        // Port 1 on loopback is never listening.
        let driver = Driver::with_config(config("http://127.0.0.1:1"));

        let err = driver.run().await.unwrap_err();

        assert!(err.to_string().contains("Unable to fetch the repository list"));
    }
}
