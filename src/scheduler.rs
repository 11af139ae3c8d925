//! Fans one backup job out per repository and folds their outcomes back
//! together.
//!
//! Jobs run concurrently with no ordering guarantees and share nothing
//! but the read-only working directory root; each job owns its own
//! destination and swallows its own errors, so one repository failing
//! (or timing out) never disturbs its siblings.

use crate::providers::Repository;
use crate::{git, paths};
use failure::Error;
use log::{error, info, warn};
use std::fmt::{self, Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinSet;

/// What a job decided to do with its destination.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Clone,
    Update,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Action::Clone => "clone".fmt(f),
            Action::Update => "update".fmt(f),
        }
    }
}

/// How one job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Action),
    Failure(Action, String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        match self {
            Outcome::Success(_) => true,
            Outcome::Failure(..) => false,
        }
    }
}

/// One job's result, as handed to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub repo: Repository,
    pub dest: PathBuf,
    pub outcome: Outcome,
}

/// Everything that happened during the fan-out, in completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// How many repositories the provider listed.
    pub repositories_found: usize,
    pub reports: Vec<JobReport>,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Write a human-readable recap of every failed repository.
    pub fn display_failures<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let failed: Vec<_> = self.failures().collect();

        writeln!(
            writer,
            "There were {} errors backing up repositories",
            failed.len()
        )?;

        for report in failed {
            if let Outcome::Failure(action, reason) = &report.outcome {
                writeln!(
                    writer,
                    "Error: {} of {} failed: {}",
                    action, report.repo.url, reason
                )?;
            }
        }

        Ok(())
    }

    fn record(&mut self, report: JobReport) {
        match &report.outcome {
            Outcome::Success(action) => info!(
                "[success] {} of {} in {}",
                action,
                report.repo.url,
                report.dest.display()
            ),
            Outcome::Failure(action, reason) => warn!(
                "[failure] {} of {} in {}: {}",
                action,
                report.repo.url,
                report.dest.display(),
                reason
            ),
        }

        self.reports.push(report);
    }
}

/// Knobs for a single fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    pub dry_run: bool,
    pub timeout: Option<Duration>,
}

/// Back up every repository under `working_dir`, one concurrent job
/// each, and wait for all of them.
pub async fn run_jobs(
    repos: &[Repository],
    working_dir: &Path,
    options: &JobOptions,
) -> RunSummary {
    let mut summary = RunSummary {
        repositories_found: repos.len(),
        dry_run: options.dry_run,
        ..RunSummary::default()
    };

    if options.dry_run {
        for repo in repos {
            let dest = working_dir.join(paths::repo_path(&repo.name));
            info!("[dry-run] would back up {} to {}", repo.url, dest.display());
        }
        return summary;
    }

    let mut jobs = JoinSet::new();
    for repo in repos {
        let job = BackupJob {
            repo: repo.clone(),
            dest: working_dir.join(paths::repo_path(&repo.name)),
            timeout: options.timeout,
        };
        jobs.spawn(job.execute());
    }

    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(report) => summary.record(report),
            // A panicked job still mustn't take the run down with it.
            Err(e) => error!("A backup job died unexpectedly: {}", e),
        }
    }

    summary
}

/// One unit of work: mirror exactly one repository.
#[derive(Debug, Clone)]
struct BackupJob {
    repo: Repository,
    dest: PathBuf,
    timeout: Option<Duration>,
}

impl BackupJob {
    async fn execute(self) -> JobReport {
        let outcome = self.perform().await;

        JobReport {
            repo: self.repo,
            dest: self.dest,
            outcome,
        }
    }

    async fn perform(&self) -> Outcome {
        if let Err(e) = tokio::fs::create_dir_all(&self.dest).await {
            return Outcome::Failure(
                Action::Clone,
                format!("Couldn't create {}: {}", self.dest.display(), e),
            );
        }

        // The clone-or-update decision is made here, from the state the
        // destination is in when this job starts, not at scheduling time.
        let action = if git::is_mirror(&self.dest) {
            Action::Update
        } else {
            Action::Clone
        };

        let operation = self.run_action(action);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(result) => result,
                Err(_) => Err(failure::err_msg(format!(
                    "Timed out after {} seconds",
                    limit.as_secs()
                ))),
            },
            None => operation.await,
        };

        match result {
            Ok(()) => Outcome::Success(action),
            Err(e) => Outcome::Failure(action, cause_chain(&e)),
        }
    }

    async fn run_action(&self, action: Action) -> Result<(), Error> {
        match action {
            Action::Update => git::update_mirror(&self.dest).await,
            Action::Clone => {
                // Clear out any debris from a previously failed attempt
                // before cloning from scratch.
                match tokio::fs::remove_dir_all(&self.dest).await {
                    Ok(()) => {}
                    Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::from(e).context("Couldn't reset the destination").into()),
                }
                tokio::fs::create_dir_all(&self.dest).await?;

                git::clone_mirror(&self.repo.url, &self.dest).await
            }
        }
    }
}

fn cause_chain(error: &Error) -> String {
    let mut chain = error.to_string();

    for cause in error.iter_causes() {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::tests::{init_source_repo, require_git};

    fn descriptor(name: &str, url: &str) -> Repository {
        Repository {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn fresh_mirrors_are_cloned_then_updated() {
        require_git!();

        let temp = tempfile::tempdir().unwrap();
        let src_a = init_source_repo(temp.path(), "src-a");
        let src_b = init_source_repo(temp.path(), "src-b");
        let working_dir = temp.path().join("backups");
        std::fs::create_dir_all(&working_dir).unwrap();
        let repos = vec![
            descriptor("a/b", src_a.to_str().unwrap()),
            descriptor("a c", src_b.to_str().unwrap()),
        ];

        let first = run_jobs(&repos, &working_dir, &JobOptions::default()).await;

        assert_eq!(first.repositories_found, 2);
        assert_eq!(first.reports.len(), 2);
        assert!(first
            .reports
            .iter()
            .all(|r| r.outcome == Outcome::Success(Action::Clone)));
        assert!(git::is_mirror(&working_dir.join("a").join("b")));
        assert!(git::is_mirror(&working_dir.join("ac")));

        let second = run_jobs(&repos, &working_dir, &JobOptions::default()).await;

        assert_eq!(second.reports.len(), 2);
        assert!(second
            .reports
            .iter()
            .all(|r| r.outcome == Outcome::Success(Action::Update)));
    }

    #[tokio::test]
    async fn one_failing_job_leaves_the_others_alone() {
        require_git!();

        let temp = tempfile::tempdir().unwrap();
        let good_src = init_source_repo(temp.path(), "good");
        let working_dir = temp.path().join("backups");
        std::fs::create_dir_all(&working_dir).unwrap();
        let repos = vec![
            descriptor("good", good_src.to_str().unwrap()),
            descriptor("broken", "/no/such/repository"),
            descriptor("also-good", good_src.to_str().unwrap()),
        ];

        let summary = run_jobs(&repos, &working_dir, &JobOptions::default()).await;

        // The barrier waited for every job, not just the survivors.
        assert_eq!(summary.reports.len(), 3);
        let outcome_of = |name: &str| {
            &summary
                .reports
                .iter()
                .find(|r| r.repo.name == name)
                .unwrap()
                .outcome
        };
        assert_eq!(*outcome_of("good"), Outcome::Success(Action::Clone));
        assert_eq!(*outcome_of("also-good"), Outcome::Success(Action::Clone));
        assert!(!outcome_of("broken").is_success());
        assert!(!summary.all_succeeded());
    }

    #[tokio::test]
    async fn concurrent_jobs_never_touch_each_others_destination() {
        require_git!();

        let temp = tempfile::tempdir().unwrap();
        let src_x = init_source_repo(temp.path(), "src-x");
        let src_y = init_source_repo(temp.path(), "src-y");
        let working_dir = temp.path().join("backups");
        std::fs::create_dir_all(&working_dir).unwrap();
        let repos = vec![
            descriptor("x", src_x.to_str().unwrap()),
            descriptor("y", src_y.to_str().unwrap()),
        ];

        let summary = run_jobs(&repos, &working_dir, &JobOptions::default()).await;

        assert!(summary.all_succeeded());
        let origin_of = |mirror: &str| {
            std::fs::read_to_string(working_dir.join(mirror).join("config")).unwrap()
        };
        assert!(origin_of("x").contains(src_x.to_str().unwrap()));
        assert!(!origin_of("x").contains(src_y.to_str().unwrap()));
        assert!(origin_of("y").contains(src_y.to_str().unwrap()));
    }

    #[tokio::test]
    async fn timed_out_jobs_report_failure_and_stop_mutating() {
        require_git!();

        let temp = tempfile::tempdir().unwrap();
        let src = init_source_repo(temp.path(), "src");
        let working_dir = temp.path().join("backups");
        std::fs::create_dir_all(&working_dir).unwrap();
        let repos = vec![descriptor("slow", src.to_str().unwrap())];
        let options = JobOptions {
            timeout: Some(Duration::from_nanos(1)),
            ..JobOptions::default()
        };

        let summary = run_jobs(&repos, &working_dir, &options).await;

        assert_eq!(summary.reports.len(), 1);
        match &summary.reports[0].outcome {
            Outcome::Failure(_, reason) => assert!(reason.contains("Timed out after")),
            other => panic!("expected a timeout failure, got {:?}", other),
        }

        // The abandoned operation must not keep working on the
        // destination behind the report's back.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!git::is_mirror(&working_dir.join("slow")));
    }

    #[tokio::test]
    async fn dry_runs_touch_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let working_dir = temp.path().join("backups");
        std::fs::create_dir_all(&working_dir).unwrap();
        let repos = vec![
            descriptor("a/b", "url-1"),
            descriptor("a c", "url-2"),
        ];
        let options = JobOptions {
            dry_run: true,
            ..JobOptions::default()
        };

        let summary = run_jobs(&repos, &working_dir, &options).await;

        assert_eq!(summary.repositories_found, 2);
        assert!(summary.reports.is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(&working_dir).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn an_empty_repository_list_is_a_no_op() {
        let temp = tempfile::tempdir().unwrap();

        let summary = run_jobs(&[], temp.path(), &JobOptions::default()).await;

        assert_eq!(summary.repositories_found, 0);
        assert!(summary.reports.is_empty());
        assert!(summary.all_succeeded());
    }

    #[test]
    fn failure_recaps_name_the_repository() {
        let summary = RunSummary {
            repositories_found: 1,
            reports: vec![JobReport {
                repo: descriptor("a/b", "git@example.com:a/b.git"),
                dest: PathBuf::from("backups/a/b"),
                outcome: Outcome::Failure(Action::Clone, "boom".to_string()),
            }],
            dry_run: false,
        };

        let mut recap = Vec::new();
        summary.display_failures(&mut recap).unwrap();
        let recap = String::from_utf8(recap).unwrap();

        assert!(recap.contains("1 errors"));
        assert!(recap.contains("git@example.com:a/b.git"));
        assert!(recap.contains("boom"));
    }
}
