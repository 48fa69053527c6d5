use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::error::SignalUnavailable;

use super::{AppReading, AppTracker};

/// Best-effort foreground guess: the busiest process other than ourselves.
///
/// There is no portable foreground-window API, so this trades accuracy for
/// running everywhere sysinfo does. CPU usage needs two refreshes to produce a
/// delta, so the first poll after construction tends to see all zeros.
pub struct SysinfoAppTracker {
    system: Mutex<System>,
    own_pid: Pid,
}

impl SysinfoAppTracker {
    pub fn new() -> Self {
        let mut system = System::new();
        // Baseline for the CPU delta on the first real poll.
        system.refresh_processes(ProcessesToUpdate::All);

        Self {
            system: Mutex::new(system),
            own_pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for SysinfoAppTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AppTracker for SysinfoAppTracker {
    fn poll(&self) -> Result<AppReading, SignalUnavailable> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::All);

        let busiest = system
            .processes()
            .iter()
            .filter(|(pid, _)| **pid != self.own_pid)
            .max_by(|(_, a), (_, b)| a.cpu_usage().total_cmp(&b.cpu_usage()))
            .map(|(_, process)| process.name().to_string_lossy().into_owned())
            .filter(|name| !name.is_empty());

        match busiest {
            Some(app_name) => Ok(AppReading {
                app_name,
                timestamp: Utc::now(),
            }),
            None => Err(SignalUnavailable::new("app", "no candidate process found")),
        }
    }
}
