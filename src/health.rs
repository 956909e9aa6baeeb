// Health and memory pressure
//
// Periodic health checks publish snapshot age, queue depth, pool
// utilization, and resident memory. Pressure levels drive the documented
// reactions: shrink caches and batches at high, refuse ingest at critical.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One published health sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub snapshot_generation: u64,
    pub snapshot_age_ms: u64,
    pub pending_ingest_ops: usize,
    pub watcher_queue_depth: usize,
    pub extractor_workers: usize,
    pub rss_bytes: u64,
    pub pressure: PressureLevel,
    pub store_files: u64,
    pub store_symbols: u64,
    pub store_relationships: u64,
    pub index_docs: u64,
    pub quarantined_files: Vec<String>,
    pub files_by_language: Vec<(String, u64)>,
}

/// Samples this process's resident set and maps it to a pressure level
pub struct MemoryMonitor {
    high_bytes: u64,
    critical_bytes: u64,
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl MemoryMonitor {
    pub fn new(high_bytes: u64, critical_bytes: u64) -> Self {
        Self {
            high_bytes,
            critical_bytes: critical_bytes.max(high_bytes),
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Current resident set size in bytes; 0 when sampling is unavailable
    pub fn sample_rss(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let Ok(mut system) = self.system.lock() else {
            return 0;
        };
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }

    pub fn level_for(&self, rss_bytes: u64) -> PressureLevel {
        if rss_bytes >= self.critical_bytes {
            PressureLevel::Critical
        } else if rss_bytes >= self.high_bytes {
            PressureLevel::High
        } else {
            PressureLevel::Normal
        }
    }

    /// Sample and classify in one step
    pub fn check(&self) -> (u64, PressureLevel) {
        let rss = self.sample_rss();
        let level = self.level_for(rss);
        match level {
            PressureLevel::Normal => debug!("Memory sample: {} bytes ({})", rss, level),
            _ => warn!("Memory pressure {}: {} bytes resident", level, rss),
        }
        (rss, level)
    }
}
