//! Configuration management for aie-ctl.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`AIE_CTL_GENERATION`, `AIE_CTL_BACKEND`, etc.)
//! 2. Project-local config file (`./aie-ctl.toml`)
//! 3. User config file (`~/.config/aie-ctl/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # aie-ctl.toml
//!
//! generation = "aie2-ipu"
//! start_col = 0
//! num_cols = 4
//!
//! # One of live, sim, debug, cdo, txn
//! backend = "cdo"
//! output = "partition.cdo"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::backend::{BackendKind, BackendOptions};
use crate::device::{DeviceConfig, DeviceGeneration};

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

const ENV_GENERATION: &str = "AIE_CTL_GENERATION";
const ENV_START_COL: &str = "AIE_CTL_START_COL";
const ENV_NUM_COLS: &str = "AIE_CTL_NUM_COLS";
const ENV_BACKEND: &str = "AIE_CTL_BACKEND";
const ENV_DEVICE: &str = "AIE_CTL_DEVICE";
const ENV_APERTURE: &str = "AIE_CTL_APERTURE";
const ENV_OUTPUT: &str = "AIE_CTL_OUTPUT";

/// aie-ctl configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Array generation of the partition.
    pub generation: Option<DeviceGeneration>,

    /// Absolute column where the partition starts.
    pub start_col: Option<u8>,

    /// Number of columns in the partition.
    pub num_cols: Option<u8>,

    /// Backend used to carry register operations.
    pub backend: Option<BackendKind>,

    /// Device node mapped by the live backend.
    pub device_path: Option<PathBuf>,

    /// Bytes of register space the live backend maps.
    /// Defaults to the extent of the partition's columns.
    pub aperture_size: Option<usize>,

    /// Where capture backends write their stream.
    pub output: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `aie-ctl.toml`
    /// 3. User config `~/.config/aie-ctl/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_overrides(|key| std::env::var(key).ok());

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    pub fn generation(&self) -> DeviceGeneration {
        self.generation.unwrap_or(DeviceGeneration::Aie2Ipu)
    }

    pub fn start_col(&self) -> u8 {
        self.start_col.unwrap_or(0)
    }

    pub fn num_cols(&self) -> u8 {
        self.num_cols.unwrap_or(4)
    }

    /// Backend kind, with the simulator as fallback.
    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or(BackendKind::Sim)
    }

    /// Capture output path, named after the backend when unset.
    pub fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("aie-ctl.{}", self.backend())))
    }

    /// Partition geometry described by this configuration.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.generation(), self.start_col(), self.num_cols())
    }

    /// Backend parameters for [`Config::device_config`].
    pub fn backend_options(&self) -> BackendOptions {
        let mut opts = BackendOptions::for_config(&self.device_config());
        if let Some(path) = &self.device_path {
            opts = opts.with_device_path(path);
        }
        if let Some(size) = self.aperture_size {
            opts.aperture_size = size;
        }
        opts
    }

    /// Load user configuration from ~/.config/aie-ctl/config.toml
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./aie-ctl.toml
    fn load_local_config() -> Option<Self> {
        Self::load_from_file(Path::new("aie-ctl.toml"))
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.generation.is_some() {
            self.generation = other.generation;
        }
        if other.start_col.is_some() {
            self.start_col = other.start_col;
        }
        if other.num_cols.is_some() {
            self.num_cols = other.num_cols;
        }
        if other.backend.is_some() {
            self.backend = other.backend;
        }
        if other.device_path.is_some() {
            self.device_path = other.device_path;
        }
        if other.aperture_size.is_some() {
            self.aperture_size = other.aperture_size;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
    }

    /// Apply overrides from `lookup`, normally the process environment.
    /// Unparseable values are reported and skipped.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(key: &str, value: String) -> Option<T>
        where
            T::Err: std::fmt::Display,
        {
            match value.parse() {
                Ok(v) => {
                    log::info!("Using {} from environment: {}", key, value);
                    Some(v)
                }
                Err(e) => {
                    log::warn!("Ignoring {}={}: {}", key, value, e);
                    None
                }
            }
        }

        if let Some(v) = lookup(ENV_GENERATION).and_then(|v| parsed(ENV_GENERATION, v)) {
            self.generation = Some(v);
        }
        if let Some(v) = lookup(ENV_START_COL).and_then(|v| parsed(ENV_START_COL, v)) {
            self.start_col = Some(v);
        }
        if let Some(v) = lookup(ENV_NUM_COLS).and_then(|v| parsed(ENV_NUM_COLS, v)) {
            self.num_cols = Some(v);
        }
        if let Some(v) = lookup(ENV_BACKEND).and_then(|v| parsed(ENV_BACKEND, v)) {
            self.backend = Some(v);
        }
        if let Some(v) = lookup(ENV_APERTURE).and_then(|v| parsed(ENV_APERTURE, v)) {
            self.aperture_size = Some(v);
        }
        if let Some(path) = lookup(ENV_DEVICE) {
            log::info!("Using {} from environment: {}", ENV_DEVICE, path);
            self.device_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_OUTPUT) {
            log::info!("Using {} from environment: {}", ENV_OUTPUT, path);
            self.output = Some(PathBuf::from(path));
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("aie-ctl").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# aie-ctl configuration
# Place this file at ~/.config/aie-ctl/config.toml or ./aie-ctl.toml

# Array generation: aie-ml, aie2-ipu or aie2p
generation = "aie2-ipu"

# Partition columns
start_col = 0
num_cols = 4

# Backend: live, sim, debug, cdo or txn
backend = "sim"

# Device node and aperture for the live backend
# device_path = "/dev/mem"
# aperture_size = 134217728

# Output file for the cdo and txn backends
# output = "partition.cdo"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.generation(), DeviceGeneration::Aie2Ipu);
        assert_eq!(config.backend(), BackendKind::Sim);
        assert_eq!(config.output(), PathBuf::from("aie-ctl.sim"));
        let dev = config.device_config();
        assert_eq!((dev.start_col, dev.num_cols, dev.num_rows), (0, 4, 6));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            generation: Some(DeviceGeneration::AieMl),
            num_cols: Some(2),
            backend: Some(BackendKind::Cdo),
            ..Default::default()
        };

        let overlay = Config {
            num_cols: Some(8),
            backend: Some(BackendKind::Txn),
            output: Some(PathBuf::from("out.txn")),
            ..Default::default()
        };

        base.merge(overlay);

        // generation unchanged (overlay was None)
        assert_eq!(base.generation, Some(DeviceGeneration::AieMl));
        // num_cols and backend overridden by overlay
        assert_eq!(base.num_cols, Some(8));
        assert_eq!(base.backend, Some(BackendKind::Txn));
        assert_eq!(base.output(), PathBuf::from("out.txn"));
    }

    #[test]
    fn test_overrides_beat_file_values() {
        let mut config = Config { num_cols: Some(2), ..Default::default() };
        let env: HashMap<&str, &str> = [
            (ENV_GENERATION, "npu1"),
            (ENV_NUM_COLS, "5"),
            (ENV_BACKEND, "TXN"),
            (ENV_DEVICE, "/dev/uio0"),
            (ENV_START_COL, "not-a-number"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.generation, Some(DeviceGeneration::Aie2Ipu));
        assert_eq!(config.num_cols, Some(5));
        assert_eq!(config.backend, Some(BackendKind::Txn));
        assert_eq!(config.device_path, Some(PathBuf::from("/dev/uio0")));
        // Bad values are skipped
        assert_eq!(config.start_col, None);
    }

    #[test]
    fn test_backend_options() {
        let config = Config {
            generation: Some(DeviceGeneration::AieMl),
            start_col: Some(1),
            num_cols: Some(2),
            device_path: Some(PathBuf::from("/dev/mem")),
            ..Default::default()
        };
        let opts = config.backend_options();
        assert_eq!(opts.base_addr, 0x200_0000_0000);
        assert_eq!(opts.num_rows, 11);
        assert_eq!(opts.num_mem_tile_rows, 2);
        assert_eq!(opts.aperture_size, 3 << 25);
        assert_eq!(opts.device_path, Some(PathBuf::from("/dev/mem")));

        let sized = Config { aperture_size: Some(0x1000), ..config };
        assert_eq!(sized.backend_options().aperture_size, 0x1000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "generation = \"aie2p\"\nnum_cols = 3\nbackend = \"cdo\"").unwrap();
        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.generation, Some(DeviceGeneration::Aie2P));
        assert_eq!(config.num_cols, Some(3));
        assert_eq!(config.backend, Some(BackendKind::Cdo));
        assert_eq!(config.start_col, None);
    }

    #[test]
    fn test_load_from_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_cols = \"many\"").unwrap();
        assert!(Config::load_from_file(file.path()).is_none());
        assert!(Config::load_from_file(Path::new("/nonexistent/aie-ctl.toml")).is_none());
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.backend, Some(BackendKind::Sim));
    }
}
