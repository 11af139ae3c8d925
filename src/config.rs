//! Layered configuration.
//!
//! Each setting can come from (highest priority first) an environment
//! variable, a command-line flag, a credentials file, or a built-in
//! default. The binary collects one [`Layer`] per source and
//! [`Config::resolve`] merges them; nothing in the library reads the
//! environment or argv itself.

use crate::providers::ProviderKind;
use failure::{Error, Fail, ResultExt};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The fully resolved settings a run needs, built once at startup and
/// passed by value into [`Driver`](crate::Driver).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub provider: ProviderKind,
    /// The API host being backed up, e.g. `gitlab.example.com`.
    pub server: String,
    pub token: String,
    /// The account whose repositories are listed (required by GitHub).
    pub login: Option<String>,
    /// The top-level directory all backups are placed in.
    pub folder: PathBuf,
    pub log_file: Option<PathBuf>,
    /// Count and log the repositories without touching the filesystem.
    pub dry_run: bool,
    /// Per-repository time limit for the clone/update operation.
    pub job_timeout: Option<Duration>,
}

/// One source's worth of (possibly partial) settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct Layer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Layer {
    /// Read the `GIT_BACKUP_*` environment variables.
    pub fn from_env() -> Layer {
        Layer {
            provider: env::var("GIT_BACKUP_PROVIDER").ok(),
            server: env::var("GIT_BACKUP_SERVER").ok(),
            token: env::var("GIT_BACKUP_TOKEN").ok(),
            login: env::var("GIT_BACKUP_LOGIN").ok(),
            folder: env::var("GIT_BACKUP_DESTINATION").ok().map(PathBuf::from),
            log_file: env::var("GIT_BACKUP_LOGFILE").ok().map(PathBuf::from),
        }
    }

    /// Load a TOML credentials file, returning an empty layer when the
    /// file doesn't exist.
    pub fn from_file(path: &Path) -> Result<Layer, Error> {
        if !path.exists() {
            return Ok(Layer::default());
        }

        let raw = std::fs::read_to_string(path)
            .context("Couldn't read the credentials file")?;
        let layer =
            toml::from_str(&raw).context("The credentials file is not valid TOML")?;

        Ok(layer)
    }

    pub fn as_toml(&self) -> Result<String, Error> {
        let rendered =
            toml::to_string(self).context("Couldn't serialize the configuration")?;
        Ok(rendered)
    }

    fn merge(self, lower: Layer) -> Layer {
        Layer {
            provider: self.provider.or(lower.provider),
            server: self.server.or(lower.server),
            token: self.token.or(lower.token),
            login: self.login.or(lower.login),
            folder: self.folder.or(lower.folder),
            log_file: self.log_file.or(lower.log_file),
        }
    }
}

/// Settings with no layered sources, supplied by the CLI alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub job_timeout: Option<Duration>,
}

impl Config {
    pub const DEFAULT_FOLDER: &'static str = "git-backup";
    pub const DEFAULT_LOG_FILE: &'static str = "repo-mirror.log";

    /// Merge the three layers (environment beats CLI beats credentials
    /// file) and fill in defaults. Fails fast when the server or token
    /// is missing so no network or filesystem work happens without them.
    pub fn resolve(
        env: Layer,
        cli: Layer,
        file: Layer,
        options: RunOptions,
    ) -> Result<Config, Error> {
        let merged = env.merge(cli.merge(file));

        let provider = match merged.provider {
            Some(name) => name.parse()?,
            None => ProviderKind::GitLab,
        };
        let server = merged.server.ok_or(ConfigError::MissingServer)?;
        let token = merged.token.ok_or(ConfigError::MissingToken)?;
        let folder = merged
            .folder
            .unwrap_or_else(|| PathBuf::from(Config::DEFAULT_FOLDER));
        let log_file = merged
            .log_file
            .unwrap_or_else(|| folder.join(Config::DEFAULT_LOG_FILE));

        Ok(Config {
            provider,
            server,
            token,
            login: merged.login,
            folder,
            log_file: Some(log_file),
            dry_run: options.dry_run,
            job_timeout: options.job_timeout,
        })
    }

    /// An example credentials file.
    pub fn example() -> Layer {
        Layer {
            provider: Some("gitlab".to_string()),
            server: Some("gitlab.example.com".to_string()),
            token: Some("your-api-token".to_string()),
            login: Some("your-login".to_string()),
            folder: Some(PathBuf::from(Config::DEFAULT_FOLDER)),
            log_file: None,
        }
    }
}

/// The ways startup configuration can be unusable.
#[derive(Debug, Clone, PartialEq, Fail)]
pub enum ConfigError {
    #[fail(display = "No server specified (use --server or GIT_BACKUP_SERVER)")]
    MissingServer,
    #[fail(display = "No API token specified (use --token or GIT_BACKUP_TOKEN)")]
    MissingToken,
    #[fail(display = "Unknown provider {:?} (expected \"github\" or \"gitlab\")", _0)]
    UnknownProvider(String),
    #[fail(display = "The {} provider needs a login (use --login or GIT_BACKUP_LOGIN)", _0)]
    MissingLogin(ProviderKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Layer {
        Layer {
            server: Some("gitlab.example.com".to_string()),
            token: Some("s3cret".to_string()),
            ..Layer::default()
        }
    }

    #[test]
    fn environment_beats_cli_beats_file() {
        let env = Layer {
            token: Some("from-env".to_string()),
            ..Layer::default()
        };
        let cli = Layer {
            token: Some("from-cli".to_string()),
            server: Some("cli.example.com".to_string()),
            ..Layer::default()
        };
        let file = Layer {
            token: Some("from-file".to_string()),
            folder: Some(PathBuf::from("/backups")),
            ..minimal()
        };

        let cfg = Config::resolve(env, cli, file, RunOptions::default()).unwrap();

        assert_eq!(cfg.token, "from-env");
        assert_eq!(cfg.server, "cli.example.com");
        assert_eq!(cfg.folder, PathBuf::from("/backups"));
    }

    #[test]
    fn missing_server_is_fatal() {
        let layer = Layer {
            token: Some("s3cret".to_string()),
            ..Layer::default()
        };

        let err = Config::resolve(layer, Layer::default(), Layer::default(), RunOptions::default())
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingServer)
        );
    }

    #[test]
    fn missing_token_is_fatal() {
        let layer = Layer {
            server: Some("gitlab.example.com".to_string()),
            ..Layer::default()
        };

        let err = Config::resolve(layer, Layer::default(), Layer::default(), RunOptions::default())
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingToken)
        );
    }

    #[test]
    fn the_default_provider_is_gitlab() {
        let cfg =
            Config::resolve(minimal(), Layer::default(), Layer::default(), RunOptions::default())
                .unwrap();

        assert_eq!(cfg.provider, ProviderKind::GitLab);
    }

    #[test]
    fn unknown_providers_are_rejected() {
        let layer = Layer {
            provider: Some("sourceforge".to_string()),
            ..minimal()
        };

        let err = Config::resolve(layer, Layer::default(), Layer::default(), RunOptions::default())
            .unwrap_err();

        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn the_log_file_defaults_into_the_backup_folder() {
        let cfg =
            Config::resolve(minimal(), Layer::default(), Layer::default(), RunOptions::default())
                .unwrap();

        assert_eq!(
            cfg.log_file,
            Some(PathBuf::from(Config::DEFAULT_FOLDER).join(Config::DEFAULT_LOG_FILE))
        );
    }

    #[test]
    fn the_example_config_round_trips() {
        let example = Config::example();

        let reparsed: Layer = toml::from_str(&example.as_toml().unwrap()).unwrap();

        assert_eq!(reparsed, example);
    }
}
