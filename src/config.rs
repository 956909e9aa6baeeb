// Engine configuration
//
// Layered the same way the workspace state is: defaults are written to
// .quarry/config/quarry.toml on first init and re-read on open. Every knob
// here tunes behavior only; none of them can change the on-disk invariants
// (path layout, dual-write ordering, snapshot consistency).

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub shaper: ShaperConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Toggles synonym expansion on the code analyzer
    #[serde(default = "default_true")]
    pub synonyms_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Per-factor weight overrides, keyed by factor name.
    /// Unlisted factors keep their built-in defaults.
    #[serde(default)]
    pub factors: HashMap<String, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Near-real-time reader refresh cadence
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Index writer heap size in bytes
    #[serde(default = "default_writer_heap_bytes")]
    pub writer_heap_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Commit after this many pending file updates
    #[serde(default = "default_batch_max_count")]
    pub batch_max_count: usize,

    /// Commit after this much time with pending updates, whichever fires first
    #[serde(default = "default_batch_max_ms")]
    pub batch_max_ms: u64,

    /// Retry cap before a failing file is quarantined
    #[serde(default = "default_retry_cap")]
    pub retry_cap: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    /// Per-path coalesce window for change events
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Git-ignore style glob patterns. The engine state directory is always
    /// appended regardless of what is configured here.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Bound on the pending change-event queue
    #[serde(default = "default_event_queue_cap")]
    pub event_queue_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Per-branch deadline for planner fan-out
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: u64,

    /// Default hit limit when the caller omits one
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaperConfig {
    /// Default token budget when the caller omits one
    #[serde(default = "default_token_budget")]
    pub token_budget_default: usize,

    /// How long detail handles stay resolvable
    #[serde(default = "default_detail_ttl_ms")]
    pub detail_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    #[serde(default = "default_pressure_high_bytes")]
    pub pressure_high_bytes: u64,

    #[serde(default = "default_pressure_critical_bytes")]
    pub pressure_critical_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Writer locks older than this are reclaimed on startup
    #[serde(default = "default_lock_staleness_ms")]
    pub staleness_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Override for the `<workspace>/.quarry` location
    #[serde(default)]
    pub base: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Files larger than this are listed but not parsed or content-indexed
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Worker count for the extractor pool; 0 means available parallelism
    #[serde(default)]
    pub parallel_threads: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_refresh_interval_ms() -> u64 {
    1_000
}
fn default_writer_heap_bytes() -> usize {
    128 * 1024 * 1024
}
fn default_batch_max_count() -> usize {
    100
}
fn default_batch_max_ms() -> u64 {
    500
}
fn default_retry_cap() -> u32 {
    3
}
fn default_debounce_ms() -> u64 {
    150
}
fn default_event_queue_cap() -> usize {
    4_096
}
fn default_deadline_ms() -> u64 {
    100
}
fn default_max_results() -> usize {
    50
}
fn default_token_budget() -> usize {
    8_000
}
fn default_detail_ttl_ms() -> u64 {
    5 * 60 * 1_000
}
fn default_pressure_high_bytes() -> u64 {
    1_536 * 1024 * 1024
}
fn default_pressure_critical_bytes() -> u64 {
    2_048 * 1024 * 1024
}
fn default_lock_staleness_ms() -> u64 {
    5 * 60 * 1_000
}
fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/build/**".to_string(),
        "**/dist/**".to_string(),
        "**/.git/**".to_string(),
        "**/*.min.js".to_string(),
        "**/*.bundle.js".to_string(),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            analyzer: AnalyzerConfig::default(),
            scoring: ScoringConfig::default(),
            index: IndexConfig::default(),
            ingest: IngestConfig::default(),
            watcher: WatcherConfig::default(),
            search: SearchConfig::default(),
            shaper: ShaperConfig::default(),
            memory: MemoryConfig::default(),
            lock: LockConfig::default(),
            paths: PathsConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            synonyms_enabled: true,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            factors: HashMap::new(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
            writer_heap_bytes: default_writer_heap_bytes(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_max_count: default_batch_max_count(),
            batch_max_ms: default_batch_max_ms(),
            retry_cap: default_retry_cap(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ignore_patterns: default_ignore_patterns(),
            event_queue_cap: default_event_queue_cap(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: default_deadline_ms(),
            default_max_results: default_max_results(),
        }
    }
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            token_budget_default: default_token_budget(),
            detail_ttl_ms: default_detail_ttl_ms(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pressure_high_bytes: default_pressure_high_bytes(),
            pressure_critical_bytes: default_pressure_critical_bytes(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            staleness_ms: default_lock_staleness_ms(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            parallel_threads: 0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a config directory, writing defaults if no
    /// file exists yet. Unknown keys are a validation error, not a warning.
    pub fn load_or_create(config_dir: &Path) -> EngineResult<Self> {
        let config_path = config_dir.join("quarry.toml");

        if !config_path.exists() {
            let config = Self::default();
            config.save(config_dir)?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path).map_err(|source| EngineError::Io {
            path: config_path.clone(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| EngineError::Validation {
            reason: format!("invalid config file '{}': {}", config_path.display(), e),
        })?;

        if config.version != default_version() {
            warn!(
                "Config schema version {} differs from engine version {}",
                config.version,
                default_version()
            );
        }

        debug!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    /// Write this configuration out as pretty TOML
    pub fn save(&self, config_dir: &Path) -> EngineResult<()> {
        let config_path = config_dir.join("quarry.toml");
        let content = toml::to_string_pretty(self).map_err(|e| EngineError::Validation {
            reason: format!("failed to serialize config: {e}"),
        })?;

        fs::write(&config_path, content).map_err(|source| EngineError::Io {
            path: config_path.clone(),
            source,
        })?;

        debug!("Saved configuration to {}", config_path.display());
        Ok(())
    }

    /// Effective extractor pool size
    pub fn extractor_threads(&self) -> usize {
        if self.extraction.parallel_threads == 0 {
            num_cpus::get()
        } else {
            self.extraction.parallel_threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_meet_latency_targets() {
        let config = EngineConfig::default();
        assert_eq!(config.index.refresh_interval_ms, 1_000);
        assert_eq!(config.search.default_deadline_ms, 100);
        assert_eq!(config.ingest.batch_max_count, 100);
        assert_eq!(config.ingest.batch_max_ms, 500);
        assert_eq!(config.watcher.debounce_ms, 150);
        assert_eq!(config.lock.staleness_ms, 300_000);
        assert!(config.index.writer_heap_bytes >= 128 * 1024 * 1024);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();

        let first = EngineConfig::load_or_create(dir.path()).unwrap();
        assert!(dir.path().join("quarry.toml").exists());

        let second = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(first.watcher.ignore_patterns, second.watcher.ignore_patterns);
        assert_eq!(first.shaper.token_budget_default, second.shaper.token_budget_default);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("quarry.toml"),
            "version = 1\n[search]\nnot_a_real_option = 5\n",
        )
        .unwrap();

        let err = EngineConfig::load_or_create(dir.path()).unwrap_err();
        assert_eq!(err.code(), "validation-error");
    }

    #[test]
    fn test_factor_overrides_parse() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("quarry.toml"),
            "version = 1\n[scoring.factors]\ntype_definition = 8.0\nrecency = 0.0\n",
        )
        .unwrap();

        let config = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config.scoring.factors.get("type_definition"), Some(&8.0));
    }
}
