//! Run configuration.  Everything defaults sensibly; `from_env` overlays
//! `OPTIFOLD_*` variables.

use std::env;
use std::path::PathBuf;

use log::debug;
use serde_derive::{Deserialize, Serialize};

use optifold::{ContextConfig, ExecutionContext, ExecutionMode};

use crate::cache::{Cache, DEFAULT_CACHE_FILE};
use crate::error::{Error, Result};

/// Settings for one run of the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache file
    pub cache: PathBuf,

    /// Recompute even when a cached result exists
    pub force: bool,

    /// Directory algorithms write their reports into
    pub output: PathBuf,

    /// Where partitions are spilled, if at all
    pub spill_dir: Option<PathBuf>,

    pub context: ContextConfig
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache: PathBuf::from(DEFAULT_CACHE_FILE),
            force: false,
            output: PathBuf::from("."),
            spill_dir: None,
            context: ContextConfig::default()
        }
    }
}

impl Config {

    /// Defaults overlaid with `OPTIFOLD_MODE`, `OPTIFOLD_CACHE`, `OPTIFOLD_FORCE`,
    /// `OPTIFOLD_WORKER_MEMORY`, `OPTIFOLD_OUTPUT` and `OPTIFOLD_SPILL_DIR`.
    pub fn from_env() -> Result<Config> {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    ///
    /// ```rust
    /// use optifold::ExecutionMode;
    /// use optifold_analysis::config::Config;
    ///
    /// let config = Config::from_lookup(|name| match name {
    ///     "OPTIFOLD_MODE" => Some("single".to_owned()),
    ///     "OPTIFOLD_FORCE" => Some("yes".to_owned()),
    ///     _ => None
    /// }).unwrap();
    /// assert_eq!(config.context.mode, ExecutionMode::Single);
    /// assert!(config.force);
    /// ```
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Config> {
        let mut config = Config::default();
        if let Some(mode) = lookup("OPTIFOLD_MODE") {
            config.context.mode = mode.parse::<ExecutionMode>()
                .map_err(|e| Error::Config(e.to_string()))?;
        }
        if let Some(cache) = lookup("OPTIFOLD_CACHE") {
            config.cache = PathBuf::from(cache);
        }
        if let Some(force) = lookup("OPTIFOLD_FORCE") {
            config.force = parse_flag("OPTIFOLD_FORCE", &force)?;
        }
        if let Some(memory) = lookup("OPTIFOLD_WORKER_MEMORY") {
            config.context.worker_memory = match memory.trim().parse::<u64>() {
                Ok(bytes) if bytes > 0 => bytes,
                _ => return Err(Error::Config(format!("OPTIFOLD_WORKER_MEMORY must be a positive byte count, not {:?}", memory)))
            };
        }
        if let Some(output) = lookup("OPTIFOLD_OUTPUT") {
            config.output = PathBuf::from(output);
        }
        if let Some(spill) = lookup("OPTIFOLD_SPILL_DIR") {
            config.spill_dir = Some(PathBuf::from(spill));
        }
        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn open_cache(&self) -> Cache {
        Cache::new(&self.cache)
    }

    /// Builds the execution context for this run.
    pub fn enter(&self) -> ExecutionContext {
        ExecutionContext::enter(&self.context)
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{} must be a boolean, not {:?}", name, value)))
    }
}
