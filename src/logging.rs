//! The log sink: timestamped lines on stderr, duplicated into a
//! size-rotated log file so unattended runs leave a trail behind.

use chrono::Local;
use failure::{Error, ResultExt};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Rotation threshold, matching the original tool's 100k log files.
const MAX_LOG_SIZE: u64 = 100 * 1024;
/// How many rotated files to keep around.
const KEEP_ROTATIONS: u32 = 5;

/// Install the global logger.
///
/// `verbosity` is the number of `-v` flags; the file sink is optional
/// so `--example-config` and friends don't create log files.
pub fn init(verbosity: u64, log_file: Option<PathBuf>) -> Result<(), Error> {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let file = match log_file {
        Some(path) => Some(Mutex::new(RotatingFile::open(path)?)),
        None => None,
    };

    log::set_boxed_logger(Box::new(DualLogger { level, file }))?;
    log::set_max_level(level);

    Ok(())
}

struct DualLogger {
    level: LevelFilter,
    file: Option<Mutex<RotatingFile>>,
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Warnings and errors always get through; chattier levels are
        // only interesting for this crate.
        metadata.level() <= Level::Warn
            || (metadata.target().starts_with("repo_mirror") && metadata.level() <= self.level)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!(
            "{} [{:5}] ({}): {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        );

        eprintln!("{}", line);

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                // Console output is the one that matters; a full disk
                // shouldn't kill the backup.
                let _ = file.write_line(&line);
            }
        }
    }

    fn flush(&self) {}
}

/// An append-only log file that rotates itself (`log` -> `log.1` -> …)
/// once it grows past [`MAX_LOG_SIZE`].
struct RotatingFile {
    path: PathBuf,
    file: File,
}

impl RotatingFile {
    fn open(path: PathBuf) -> Result<RotatingFile, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context("Couldn't create the log file's directory")?;
            }
        }

        let file = append_to(&path).context("Couldn't open the log file")?;

        Ok(RotatingFile { path, file })
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if self.file.metadata()?.len() >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        writeln!(self.file, "{}", line)
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        for i in (1..KEEP_ROTATIONS).rev() {
            let older = rotation_name(&self.path, i);
            if older.exists() {
                fs::rename(&older, rotation_name(&self.path, i + 1))?;
            }
        }
        fs::rename(&self.path, rotation_name(&self.path, 1))?;

        self.file = append_to(&self.path)?;
        Ok(())
    }
}

fn append_to(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotation_name(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}
