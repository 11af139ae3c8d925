//! Installs (or re-installs) the backup as a recurring OS task: a
//! `@daily` crontab entry on Unix, a Scheduled Task on Windows.

use crate::config::Config;
use failure::{Error, ResultExt};
use log::info;
use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(unix)]
const CRON_MARKER: &str = "# repo-mirror daily";
#[cfg(windows)]
const TASK_NAME: &str = "repo-mirror backup";

/// Register the current executable to run daily with the already
/// resolved arguments, replacing any previous registration.
pub fn install(cfg: &Config) -> Result<(), Error> {
    let exe = std::env::current_exe().context("Couldn't locate the current executable")?;
    let line = invocation(&exe, cfg);

    install_task(&line)
}

/// The full command line a scheduled run re-invokes, carrying every
/// resolved setting so nothing has to be supplied interactively.
fn invocation(exe: &Path, cfg: &Config) -> String {
    let mut line = format!(
        "{} --provider {} --server {} --token {} --folder {}",
        exe.display(),
        cfg.provider,
        cfg.server,
        cfg.token,
        cfg.folder.display()
    );

    if let Some(login) = &cfg.login {
        line.push_str(&format!(" --login {}", login));
    }
    if let Some(log_file) = &cfg.log_file {
        line.push_str(&format!(" --log-file {}", log_file.display()));
    }

    line
}

#[cfg(unix)]
fn install_task(line: &str) -> Result<(), Error> {
    info!("Installing a crontab entry");

    // A missing crontab just means there's nothing to preserve.
    let existing = Command::new("crontab")
        .arg("-l")
        .stderr(Stdio::null())
        .output()
        .context("Unable to invoke crontab")?;
    let existing = String::from_utf8_lossy(&existing.stdout);

    let mut crontab = String::new();
    for entry in existing.lines() {
        if entry.contains(CRON_MARKER) {
            info!("Replacing the existing entry");
        } else {
            crontab.push_str(entry);
            crontab.push('\n');
        }
    }
    crontab.push_str(&format!("@daily {} {}\n", line, CRON_MARKER));

    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .spawn()
        .context("Unable to invoke crontab")?;
    if let Some(stdin) = child.stdin.as_mut() {
        use std::io::Write;
        stdin
            .write_all(crontab.as_bytes())
            .context("Couldn't write the new crontab")?;
    }
    let status = child.wait().context("Unable to invoke crontab")?;

    if status.success() {
        info!("Installed; the backup will run daily");
        Ok(())
    } else {
        Err(failure::err_msg("crontab rejected the new table"))
    }
}

#[cfg(windows)]
fn install_task(line: &str) -> Result<(), Error> {
    info!("Installing a Scheduled Task");

    let exists = Command::new("schtasks")
        .args(&["/query", "/tn", TASK_NAME])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("Unable to invoke schtasks")?
        .success();
    if exists {
        info!("Replacing the existing task");
        Command::new("schtasks")
            .args(&["/delete", "/f", "/tn", TASK_NAME])
            .status()
            .context("Unable to invoke schtasks")?;
    }

    let status = Command::new("schtasks")
        .args(&["/create", "/sc", "daily", "/tn", TASK_NAME, "/tr", line])
        .status()
        .context("Unable to invoke schtasks")?;

    if status.success() {
        info!("Installed; the backup will run daily");
        Ok(())
    } else {
        Err(failure::err_msg("schtasks couldn't create the task"))
    }
}
