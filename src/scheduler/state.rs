use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Notification;

/// How many terminal ids are remembered for conflict reporting.
const TERMINAL_HISTORY: usize = 4096;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CancelOutcome {
    Canceled,
    AlreadyReleased,
    AlreadyCanceled,
    Unknown,
}

impl CancelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelOutcome::Canceled => "canceled",
            CancelOutcome::AlreadyReleased => "released",
            CancelOutcome::AlreadyCanceled => "canceled",
            CancelOutcome::Unknown => "unknown",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CancelOutcome::AlreadyReleased | CancelOutcome::AlreadyCanceled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FlushReason {
    Expired,
    Full,
    Shutdown,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Expired => "expired",
            FlushReason::Full => "full",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchWindow {
    pub window_id: String,
    pub batch_key: String,
    pub opened_at: DateTime<Utc>,
    pub close_at: DateTime<Utc>,
    pub members: Vec<Notification>,
    seq: u64,
}

/// Something leaving the scheduler: either one deferred item or a whole window.
#[derive(Debug, Clone, PartialEq)]
pub enum Release {
    Deferred {
        notification: Notification,
        release_at: DateTime<Utc>,
    },
    Batch {
        window: BatchWindow,
        reason: FlushReason,
    },
}

impl Release {
    pub fn notifications(&self) -> Vec<&Notification> {
        match self {
            Release::Deferred { notification, .. } => vec![notification],
            Release::Batch { window, .. } => window.members.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlacement {
    pub window_id: String,
    pub close_at: DateTime<Utc>,
    /// Windows flushed by this append: an expired window still waiting for
    /// `due`, then the new window if the append filled it.
    pub flushed: Vec<Release>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Deferred { release_at: DateTime<Utc>, seq: u64 },
    Batched { batch_key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Released,
    Canceled,
}

#[derive(Debug, Clone, Copy)]
struct TerminalEntry {
    state: Terminal,
    stamp: u64,
    conflict_reported: bool,
}

/// Pure scheduler bookkeeping. Every mutation happens through `&mut self`, so the
/// owner's single mutex makes insert, release, flush and cancel mutually exclusive.
#[derive(Debug)]
pub struct SchedulerState {
    batch_window: Duration,
    batch_max_size: usize,
    next_seq: u64,
    deferred: BTreeMap<(DateTime<Utc>, u64), Notification>,
    windows: HashMap<String, BatchWindow>,
    index: HashMap<String, Slot>,
    terminal: HashMap<String, TerminalEntry>,
    terminal_order: VecDeque<(String, u64)>,
}

impl SchedulerState {
    pub fn new(batch_window_secs: u64, batch_max_size: usize) -> Self {
        Self {
            batch_window: Duration::seconds(batch_window_secs.min(i64::MAX as u64 / 1000) as i64),
            batch_max_size: batch_max_size.max(1),
            next_seq: 0,
            deferred: BTreeMap::new(),
            windows: HashMap::new(),
            index: HashMap::new(),
            terminal: HashMap::new(),
            terminal_order: VecDeque::new(),
        }
    }

    /// Applies new batch limits to windows opened from now on.
    pub fn set_batch_limits(&mut self, batch_window_secs: u64, batch_max_size: usize) {
        self.batch_window = Duration::seconds(batch_window_secs.min(i64::MAX as u64 / 1000) as i64);
        self.batch_max_size = batch_max_size.max(1);
    }

    pub fn pending_len(&self) -> usize {
        self.index.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Drops a still-pending entry for `id` so a resubmission can replace it.
    pub fn supersede(&mut self, id: &str) -> bool {
        self.remove_pending(id).is_some()
    }

    pub fn defer(&mut self, notification: Notification, release_at: DateTime<Utc>) {
        self.replace_entry(&notification.id);
        let seq = self.bump_seq();
        self.index
            .insert(notification.id.clone(), Slot::Deferred { release_at, seq });
        self.deferred.insert((release_at, seq), notification);
    }

    pub fn batch(&mut self, notification: Notification, batch_key: &str, now: DateTime<Utc>) -> BatchPlacement {
        self.replace_entry(&notification.id);
        let mut flushed = Vec::new();
        if self
            .windows
            .get(batch_key)
            .is_some_and(|window| window.close_at <= now)
        {
            flushed.extend(self.take_window(batch_key).map(|window| Release::Batch {
                window,
                reason: FlushReason::Expired,
            }));
        }
        self.index.insert(
            notification.id.clone(),
            Slot::Batched {
                batch_key: batch_key.to_string(),
            },
        );

        let open_seq = if self.windows.contains_key(batch_key) {
            0
        } else {
            self.bump_seq()
        };
        let close_at = now + self.batch_window;
        let max = self.batch_max_size;
        let window = self
            .windows
            .entry(batch_key.to_string())
            .or_insert_with(|| BatchWindow {
                window_id: Uuid::new_v4().to_string(),
                batch_key: batch_key.to_string(),
                opened_at: now,
                close_at,
                members: Vec::new(),
                seq: open_seq,
            });
        window.members.push(notification);
        let window_id = window.window_id.clone();
        let close_at = window.close_at;
        let full = window.members.len() >= max;

        if full {
            flushed.extend(self.take_window(batch_key).map(|window| Release::Batch {
                window,
                reason: FlushReason::Full,
            }));
        }

        BatchPlacement {
            window_id,
            close_at,
            flushed,
        }
    }

    /// Records an immediate delivery so a later cancel reports a conflict.
    pub fn mark_delivered(&mut self, id: &str) {
        self.supersede(id);
        self.record_terminal(id, Terminal::Released);
    }

    /// Removes every item whose deadline has passed, ordered by deadline then
    /// insertion sequence.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Release> {
        let mut due: Vec<((DateTime<Utc>, u64), Release)> = Vec::new();

        let deferred_keys: Vec<(DateTime<Utc>, u64)> = self
            .deferred
            .range(..=(now, u64::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in deferred_keys {
            if let Some(notification) = self.deferred.remove(&key) {
                self.index.remove(&notification.id);
                self.record_terminal(&notification.id, Terminal::Released);
                due.push((
                    key,
                    Release::Deferred {
                        notification,
                        release_at: key.0,
                    },
                ));
            }
        }

        let expired: Vec<String> = self
            .windows
            .iter()
            .filter(|(_, window)| window.close_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(window) = self.take_window(&key) {
                due.push((
                    (window.close_at, window.seq),
                    Release::Batch {
                        window,
                        reason: FlushReason::Expired,
                    },
                ));
            }
        }

        due.sort_by_key(|(key, _)| *key);
        due.into_iter().map(|(_, release)| release).collect()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let deferred = self.deferred.keys().next().map(|(at, _)| *at);
        let window = self.windows.values().map(|w| w.close_at).min();
        match (deferred, window) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Cancels a pending item. The second value is true the first time a
    /// conflict is seen for this id, so callers can log it once.
    pub fn cancel(&mut self, id: &str) -> (CancelOutcome, bool) {
        if self.remove_pending(id).is_some() {
            self.record_terminal(id, Terminal::Canceled);
            return (CancelOutcome::Canceled, false);
        }

        match self.terminal.get_mut(id) {
            Some(entry) => {
                let first = !entry.conflict_reported;
                entry.conflict_reported = true;
                let outcome = match entry.state {
                    Terminal::Released => CancelOutcome::AlreadyReleased,
                    Terminal::Canceled => CancelOutcome::AlreadyCanceled,
                };
                (outcome, first)
            }
            None => (CancelOutcome::Unknown, false),
        }
    }

    /// Removes everything still pending: deferred items by deadline, then batch
    /// windows by opening order.
    pub fn drain(&mut self) -> Vec<Release> {
        let mut drained: Vec<Release> = std::mem::take(&mut self.deferred)
            .into_iter()
            .map(|((release_at, _), notification)| Release::Deferred {
                notification,
                release_at,
            })
            .collect();

        let mut windows: Vec<BatchWindow> = self.windows.drain().map(|(_, window)| window).collect();
        windows.sort_by_key(|window| window.seq);
        drained.extend(windows.into_iter().map(|window| Release::Batch {
            window,
            reason: FlushReason::Shutdown,
        }));

        let ids: Vec<String> = self.index.drain().map(|(id, _)| id).collect();
        for id in ids {
            self.record_terminal(&id, Terminal::Released);
        }
        drained
    }

    fn take_window(&mut self, batch_key: &str) -> Option<BatchWindow> {
        let window = self.windows.remove(batch_key)?;
        for member in &window.members {
            self.index.remove(&member.id);
            self.record_terminal(&member.id, Terminal::Released);
        }
        Some(window)
    }

    fn remove_pending(&mut self, id: &str) -> Option<Notification> {
        match self.index.remove(id)? {
            Slot::Deferred { release_at, seq } => self.deferred.remove(&(release_at, seq)),
            Slot::Batched { batch_key } => {
                let window = self.windows.get_mut(&batch_key)?;
                let position = window.members.iter().position(|m| m.id == id)?;
                let removed = window.members.remove(position);
                if window.members.is_empty() {
                    self.windows.remove(&batch_key);
                }
                Some(removed)
            }
        }
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn record_terminal(&mut self, id: &str, state: Terminal) {
        let stamp = self.bump_seq();
        self.terminal.insert(
            id.to_string(),
            TerminalEntry {
                state,
                stamp,
                conflict_reported: false,
            },
        );
        self.terminal_order.push_back((id.to_string(), stamp));

        while self.terminal_order.len() > TERMINAL_HISTORY {
            if let Some((old_id, old_stamp)) = self.terminal_order.pop_front() {
                if self.terminal.get(&old_id).map(|e| e.stamp) == Some(old_stamp) {
                    self.terminal.remove(&old_id);
                }
            }
        }
    }

    fn replace_entry(&mut self, id: &str) {
        self.remove_pending(id);
        self.terminal.remove(id);
    }
}
