use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::models::Notification;

use super::payload::IncomingNotification;
use super::NotificationSource;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const MAX_SEEN_IDS: usize = 4096;

/// Recently produced ids, oldest evicted first.
#[derive(Default)]
struct SeenIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenIds {
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= MAX_SEEN_IDS {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

/// Tails a JSON-lines file: each complete line is one notification. Lines
/// without an id get a fresh one; ids already seen are skipped.
pub struct JsonlNotificationSource {
    id: String,
    path: PathBuf,
    category: Option<String>,
    offset: u64,
    seen: SeenIds,
}

impl JsonlNotificationSource {
    pub fn new(id: impl Into<String>, path: PathBuf, category: Option<String>) -> Self {
        Self {
            id: id.into(),
            path,
            category,
            offset: 0,
            seen: SeenIds::default(),
        }
    }

    fn read_new_lines(&mut self) -> std::io::Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let len = file.metadata()?.len();
        if len < self.offset {
            log_debug!("{}: {} shrank, reading from the start", self.id, self.path.display());
            self.offset = 0;
            self.seen.clear();
        }
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        // A trailing partial line is picked up on a later poll.
        let Some(end) = buffer.iter().rposition(|byte| *byte == b'\n') else {
            return Ok(Vec::new());
        };
        self.offset += end as u64 + 1;
        Ok(buffer[..end]
            .split(|byte| *byte == b'\n')
            .map(String::from_utf8_lossy)
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    fn parse_line(&self, line: &str, now: DateTime<Utc>) -> Option<Notification> {
        match IncomingNotification::parse(line) {
            Ok(incoming) => Some(incoming.into_notification(&self.id, self.category.as_deref(), now)),
            Err(err) => {
                log_debug!("{}: skipping malformed line: {err}", self.id);
                None
            }
        }
    }
}

impl NotificationSource for JsonlNotificationSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        let lines = match self.read_new_lines() {
            Ok(lines) => lines,
            Err(err) => {
                log_warn!("{}: failed to read {}: {err}", self.id, self.path.display());
                return Vec::new();
            }
        };

        let mut produced = Vec::new();
        for line in lines {
            let Some(notification) = self.parse_line(&line, now) else {
                continue;
            };
            if self.seen.insert(&notification.id) {
                produced.push(notification);
            }
        }
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::at;
    use chrono::TimeZone;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn append(path: &std::path::Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn reads_only_new_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        let mut source = JsonlNotificationSource::new("inbox", path.clone(), Some("email".into()));

        assert!(source.poll(at(0)).is_empty());

        append(&path, b"{\"id\": \"m1\", \"subject\": \"Deploy done\", \"body\": \"release 1.2\"}\n");
        append(&path, b"not json\n{\"title\": \"partial\"");
        let first = source.poll(at(1));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "m1");
        assert_eq!(first[0].title, "Deploy done");
        assert_eq!(first[0].category, "email");
        assert_eq!(first[0].tags, vec!["deployment", "email"]);
        assert_eq!(first[0].created_at, at(1));

        append(&path, b", \"category\": \"chat\"}\n{\"id\": \"m1\", \"title\": \"dup\"}\n");
        let second = source.poll(at(2));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].title, "partial");
        assert_eq!(second[0].category, "chat");
    }

    #[test]
    fn numeric_timestamps_are_read_under_both_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        append(
            &path,
            b"{\"id\":\"x\",\"title\":\"t\",\"timestamp\":1700000000.0}\n{\"id\":\"y\",\"title\":\"t\",\"created_ts\":1700000000.0}\n",
        );
        let mut source = JsonlNotificationSource::new("inbox", path, None);

        let produced = source.poll(at(0));
        let ids: Vec<&str> = produced.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        let expected = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(produced.iter().all(|n| n.created_at == expected));
    }

    #[test]
    fn invalid_utf8_does_not_stall_the_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        let mut source = JsonlNotificationSource::new("inbox", path.clone(), None);

        append(&path, b"{\"id\":\"bad\",\"title\":\"\xff\"}\n");
        let first = source.poll(at(0));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].title, "\u{fffd}");

        append(&path, b"{\"id\":\"good\",\"title\":\"fine\"}\n");
        let second = source.poll(at(1));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "good");
    }

    #[test]
    fn truncated_file_is_reread_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.jsonl");
        append(&path, b"{\"id\": \"a\", \"title\": \"one\"}\n{\"id\": \"b\", \"title\": \"two\"}\n");
        let mut source = JsonlNotificationSource::new("inbox", path.clone(), None);
        assert_eq!(source.poll(at(0)).len(), 2);

        std::fs::write(&path, "{\"id\": \"a\", \"title\": \"again\"}\n").unwrap();
        let produced = source.poll(at(1));
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].title, "again");
    }

    #[test]
    fn seen_ids_are_bounded() {
        let mut seen = SeenIds::default();
        assert!(seen.insert("first"));
        assert!(!seen.insert("first"));
        for i in 0..MAX_SEEN_IDS {
            seen.insert(&format!("id-{i}"));
        }
        assert_eq!(seen.ids.len(), MAX_SEEN_IDS);
        assert!(seen.insert("first"));
    }
}
