//! Thin wrapper around the `git` binary for creating and refreshing
//! bare mirrors.
//!
//! Every operation takes the target directory as an explicit argument.
//! There is deliberately no handle with a "current repository" notion,
//! so concurrent jobs cannot trample each other's target.

use failure::{Error, ResultExt};
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

/// Does `path` already hold a usable local mirror?
///
/// This is a marker check on the bare-repository layout, not a content
/// check; it says nothing about *which* repository is mirrored there.
/// Never fails: a missing path is simply not a mirror.
pub fn is_mirror(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

/// Create a fresh mirror (all refs, full history, no working tree) of
/// `url` at `dest`.
pub async fn clone_mirror(url: &str, dest: &Path) -> Result<(), Error> {
    let output = Command::new("git")
        .arg("clone")
        .arg("--mirror")
        .arg("--quiet")
        .arg(url)
        .arg(dest)
        // If the job is abandoned (e.g. it times out), take the child
        // down with it instead of letting it keep writing into dest.
        .kill_on_drop(true)
        .output()
        .await
        .context("Unable to invoke git")?;

    interpret_exit_status(output, "Unable to clone the repository")
}

/// Fetch every ref from the remote into the existing mirror at `dest`,
/// pruning refs the remote no longer has.
pub async fn update_mirror(dest: &Path) -> Result<(), Error> {
    let output = Command::new("git")
        .arg("remote")
        .arg("update")
        .arg("--prune")
        .current_dir(dest)
        .kill_on_drop(true)
        .output()
        .await
        .context("Unable to invoke git")?;

    interpret_exit_status(output, "Unable to fetch upstream changes")
}

fn interpret_exit_status(output: Output, ctx: &'static str) -> Result<(), Error> {
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(failure::err_msg(stderr.trim().to_string())
            .context(ctx)
            .into())
    }
}
