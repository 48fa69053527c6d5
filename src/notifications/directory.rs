use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::models::Notification;

use super::payload::IncomingNotification;
use super::NotificationSource;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const DEFAULT_PATTERN: &str = "*.json";

/// Watches a drop folder where each matching file holds one JSON
/// notification. Files are archived (or deleted) once read; files that are
/// not valid JSON are deleted.
pub struct DirectoryNotificationSource {
    id: String,
    dir: PathBuf,
    pattern: String,
    archive_dir: Option<PathBuf>,
    category: Option<String>,
}

impl DirectoryNotificationSource {
    pub fn new(
        id: impl Into<String>,
        dir: PathBuf,
        pattern: Option<String>,
        archive_dir: Option<PathBuf>,
        category: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            dir,
            pattern: pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
            archive_dir,
            category,
        }
    }

    fn matching_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if wildcard_match(&self.pattern, &name.to_string_lossy()) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn consume(&self, path: &Path) -> std::io::Result<()> {
        let Some(archive) = &self.archive_dir else {
            return fs::remove_file(path);
        };
        fs::create_dir_all(archive)?;
        let target = archive.join(path.file_name().unwrap_or(path.as_os_str()));
        if fs::rename(path, &target).is_ok() {
            return Ok(());
        }
        // Archive on another filesystem.
        fs::copy(path, &target)?;
        fs::remove_file(path)
    }

    fn read_file(&self, path: &Path, now: DateTime<Utc>) -> Option<Notification> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log_debug!("{}: could not read {}: {err}", self.id, path.display());
                return None;
            }
        };
        match IncomingNotification::parse(&String::from_utf8_lossy(&bytes)) {
            Ok(incoming) => Some(incoming.into_notification(&self.id, self.category.as_deref(), now)),
            Err(err) => {
                log_warn!("{}: deleting malformed {}: {err}", self.id, path.display());
                if let Err(err) = fs::remove_file(path) {
                    log_warn!("{}: could not delete {}: {err}", self.id, path.display());
                }
                None
            }
        }
    }
}

impl NotificationSource for DirectoryNotificationSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        let files = match self.matching_files() {
            Ok(files) => files,
            Err(err) => {
                log_warn!("{}: failed to list {}: {err}", self.id, self.dir.display());
                return Vec::new();
            }
        };

        let mut produced = Vec::new();
        for path in files {
            let Some(notification) = self.read_file(&path, now) else {
                continue;
            };
            // A file that stays in place would be read again next poll.
            if let Err(err) = self.consume(&path) {
                log_warn!("{}: could not move {} out of the inbox: {err}", self.id, path.display());
                continue;
            }
            produced.push(notification);
        }
        produced
    }
}

/// Shell-style match where `*` spans any run of characters and `?` one.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
