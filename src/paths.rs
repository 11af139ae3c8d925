//! Derives filesystem locations from repository and server names.

use std::path::PathBuf;

/// Turn a provider-qualified repository name into a relative path under
/// the working directory.
///
/// Spaces are dropped and each namespace segment becomes one path
/// component, so `"My Group / My Project"` maps to `MyGroup/MyProject`.
/// Two distinct names that normalize to the same path will silently
/// share a destination; nothing here detects that.
pub fn repo_path(name: &str) -> PathBuf {
    let collapsed = name.replace(' ', "");

    collapsed
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .collect()
}

/// The directory (relative to the backup folder) holding every mirror
/// for one server.
pub fn server_dir(server: &str) -> String {
    let without_scheme = match server.find("://") {
        Some(ix) => &server[ix + 3..],
        None => server,
    };

    without_scheme.replace(|c| c == ':' || c == '/', "_")
}
