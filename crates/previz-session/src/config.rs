//! Engine configuration.
//!
//! The harness parses its command line (or a JSON config) into
//! [`EngineConfig`] and calls [`EngineConfig::install`], which sets up
//! logging, the rewrite switch, and the current cache. CLI parsing
//! itself stays outside the engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use previz_engine::cache::{self, CacheAlgorithm, FrameCache};
use previz_engine::graph;

fn default_cache_size_mib() -> u64 {
    100
}

/// Everything the harness can configure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Committed-store budget in MiB.
    pub cache_size_mib: u64,
    /// Eviction policy.
    pub cache_algorithm: CacheAlgorithm,
    /// Collect hit/miss statistics.
    pub enable_statistics: bool,
    /// Write a DOT rendering of priorities here after each session.
    pub visualise_filepath: Option<PathBuf>,
    /// Switch off the canonical-order and concat-flattening passes.
    pub disable_transformations: bool,
    /// Log destination; stderr when unset.
    pub log_filepath: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_size_mib: default_cache_size_mib(),
            cache_algorithm: CacheAlgorithm::default(),
            enable_statistics: false,
            visualise_filepath: None,
            disable_transformations: false,
            log_filepath: None,
        }
    }
}

impl EngineConfig {
    /// Apply the configuration: initialise logging, set the rewrite
    /// switch, and swap in a cache built to spec. Returns the previous
    /// cache.
    pub fn install(&self) -> anyhow::Result<FrameCache> {
        self.init_logging()?;
        graph::set_transformations_enabled(!self.disable_transformations);

        let new_cache = FrameCache::new(
            (self.cache_size_mib as usize) * 1024 * 1024,
            self.cache_algorithm,
            self.enable_statistics,
        );
        info!(
            algorithm = ?self.cache_algorithm,
            capacity_mib = self.cache_size_mib,
            "installed frame cache"
        );
        Ok(cache::swap(new_cache))
    }

    fn init_logging(&self) -> anyhow::Result<()> {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = match &self.log_filepath {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                builder
                    .with_writer(std::sync::Arc::new(file))
                    .with_ansi(false)
                    .try_init()
            }
            None => builder.try_init(),
        };
        // A second install (tests, re-configuration) keeps the first
        // subscriber.
        let _ = result;
        Ok(())
    }
}
