//! Loader configuration from `vgraph.toml`.
//!
//! Configuration is optional; every section falls back to defaults and
//! command-line flags override whatever the file sets.
//!
//! # Example Configuration
//!
//! ```toml
//! [loader]
//! default_mapper = "opentsdb"
//! max_allocation = 500000
//!
//! [layout]
//! seed = 42
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::pipeline::{PipelineOptions, DEFAULT_MAX_ALLOCATION};

/// Name of the configuration file looked up in a directory.
pub const CONFIG_FILE: &str = "vgraph.toml";

/// Root configuration structure loaded from `vgraph.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct VgraphConfig {
    /// Mapper and allocation settings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Initial layout settings.
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Loader section.
#[derive(Debug, Deserialize)]
pub struct LoaderConfig {
    /// Mapper profile used when the metadata does not name one.
    ///
    /// Known profiles: `default`, `splunk`, `opentsdb`, `miserables`.
    #[serde(default)]
    pub default_mapper: Option<String>,

    /// Cap on the element counts sent in the allocation hint.
    ///
    /// Default: 2,000,000
    #[serde(default = "default_max_allocation")]
    pub max_allocation: usize,
}

fn default_max_allocation() -> usize {
    DEFAULT_MAX_ALLOCATION
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            default_mapper: None,
            max_allocation: DEFAULT_MAX_ALLOCATION,
        }
    }
}

/// Layout section.
#[derive(Debug, Deserialize, Default)]
pub struct LayoutConfig {
    /// Fixed seed for the layout RNG, for reproducible positions.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl VgraphConfig {
    /// Load configuration from `vgraph.toml` in the given directory.
    ///
    /// Returns defaults if the file doesn't exist. Read and parse errors are
    /// logged as warnings.
    pub fn load(root: &Path) -> Self {
        Self::load_file(&root.join(CONFIG_FILE))
    }

    /// Load configuration from an explicit file path.
    pub fn load_file(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Pipeline options described by this configuration.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            default_mapper: self.loader.default_mapper.clone(),
            max_allocation: self.loader.max_allocation,
            seed: self.layout.seed,
        }
    }
}
