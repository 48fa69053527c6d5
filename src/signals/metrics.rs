use std::sync::{Mutex, PoisonError};

use sysinfo::{Networks, System};

use crate::error::SignalUnavailable;

use super::{MetricsSampler, SystemMetrics};

pub struct SysinfoMetricsSampler {
    inner: Mutex<SamplerState>,
}

struct SamplerState {
    system: System,
    networks: Networks,
}

impl SysinfoMetricsSampler {
    pub fn new() -> Self {
        let mut system = System::new();

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            inner: Mutex::new(SamplerState {
                system,
                networks: Networks::new_with_refreshed_list(),
            }),
        }
    }
}

impl Default for SysinfoMetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSampler for SysinfoMetricsSampler {
    fn sample(&self) -> Result<SystemMetrics, SignalUnavailable> {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.system.refresh_cpu_usage();
        state.system.refresh_memory();
        state.networks.refresh();

        let total_memory = state.system.total_memory();
        if total_memory == 0 {
            return Err(SignalUnavailable::new("metrics", "memory totals not reported"));
        }
        let mem_pct = (state.system.used_memory() as f64 / total_memory as f64 * 100.0) as f32;

        let net_bytes = state
            .networks
            .iter()
            .map(|(_, data)| data.total_received().saturating_add(data.total_transmitted()))
            .fold(0u64, u64::saturating_add);

        Ok(SystemMetrics {
            cpu_pct: state.system.global_cpu_usage(),
            mem_pct,
            // sysinfo has no battery API.
            battery: None,
            net_bytes,
        })
    }
}
