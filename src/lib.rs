//! Mirror every repository you own on a GitHub or GitLab server into a
//! tree of bare git mirrors, suitable for unattended backups.
//!
//! A run asks the configured provider for the full repository list,
//! then backs each repository up concurrently: new repositories are
//! cloned with `git clone --mirror`, existing mirrors are refreshed
//! with `git remote update`. One repository failing is logged and
//! reported, but never stops the others.
//!
//! ```no_run
//! use repo_mirror::{Config, Driver};
//! # async fn demo(config: Config) -> Result<(), failure::Error> {
//! let driver = Driver::with_config(config);
//! let summary = driver.run().await?;
//!
//! for failed in summary.failures() {
//!     eprintln!("{} couldn't be backed up", failed.repo.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
mod driver;
pub mod git;
pub mod logging;
pub mod paths;
pub mod providers;
pub mod schedule;
pub mod scheduler;

pub use crate::config::{Config, ConfigError, Layer, RunOptions};
pub use crate::driver::Driver;
pub use crate::providers::{Provider, ProviderKind, Repository};
pub use crate::scheduler::{Action, JobReport, Outcome, RunSummary};
