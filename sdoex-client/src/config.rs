//! Exerciser configuration
//!
//! Settings come from three layers: values given on the command line, an optional TOML file,
//! and built-in defaults. Each layer is a [`ConfigFile`], with every field optional, and
//! [`ConfigFile::merge`] lays one on top of another. [`ConfigFile::resolve`] then fills defaults
//! and validates the result into an [`ExerciserConfig`].
//!
//! ```toml
//! interface = "can0"
//! node_id = 5
//! eds_file = "device.eds"
//! interval_ms = 10
//! ```
use std::{
    ops::Range,
    path::{Path, PathBuf},
    time::Duration,
};

use sdoex_common::{node_id::InvalidNodeIdError, NodeId};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::sdo_client::DEFAULT_RESPONSE_TIMEOUT;

/// Interface used when none is configured
pub const DEFAULT_INTERFACE: &str = "vcan0";
/// Object index written when none is configured
pub const DEFAULT_INDEX: u16 = 0x4000;
/// Sub index written when none is configured
pub const DEFAULT_SUB: u8 = 0;
/// Delay between writes when none is configured
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1);

/// Error returned while loading or resolving configuration
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The config file could not be read
    #[snafu(display("Failed to read config file {}", path.display()))]
    Io {
        /// Path of the config file
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },
    /// The config file is not valid TOML, or has unknown or mistyped fields
    #[snafu(display("Invalid config file"))]
    Toml {
        /// The underlying error
        source: toml::de::Error,
    },
    /// A required setting was provided by no layer
    #[snafu(display("No value for {field}"))]
    MissingField {
        /// Name of the setting
        field: &'static str,
    },
    /// The node ID is outside the range 1-127
    #[snafu(display("Invalid node ID setting"))]
    InvalidNodeId {
        /// The underlying error
        source: InvalidNodeIdError,
    },
}

/// One layer of settings, as found in a config file or on the command line
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Name of the CAN interface
    pub interface: Option<String>,
    /// Node ID of the device to write to
    pub node_id: Option<u8>,
    /// Path of the device's EDS
    pub eds_file: Option<PathBuf>,
    /// Object index to write
    pub index: Option<u16>,
    /// Sub index to write
    pub sub: Option<u8>,
    /// First counter value
    pub start: Option<u32>,
    /// Number of writes before stopping
    pub count: Option<u32>,
    /// Delay between writes, in milliseconds
    pub interval_ms: Option<u64>,
    /// Time to wait for each SDO response, in milliseconds
    pub sdo_timeout_ms: Option<u64>,
}

impl ConfigFile {
    /// Read a layer from a TOML file
    ///
    /// A relative `eds_file` is taken relative to the directory containing the config file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(IoSnafu { path })?;
        let mut config = Self::load_from_str(&text)?;
        if let (Some(eds_file), Some(dir)) = (config.eds_file.as_mut(), path.parent()) {
            if eds_file.is_relative() {
                *eds_file = dir.join(&*eds_file);
            }
        }
        Ok(config)
    }

    /// Read a layer from a TOML string
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).context(TomlSnafu)
    }

    /// Lay `overrides` on top of self, so that any value set in `overrides` wins
    pub fn merge(self, overrides: ConfigFile) -> ConfigFile {
        ConfigFile {
            interface: overrides.interface.or(self.interface),
            node_id: overrides.node_id.or(self.node_id),
            eds_file: overrides.eds_file.or(self.eds_file),
            index: overrides.index.or(self.index),
            sub: overrides.sub.or(self.sub),
            start: overrides.start.or(self.start),
            count: overrides.count.or(self.count),
            interval_ms: overrides.interval_ms.or(self.interval_ms),
            sdo_timeout_ms: overrides.sdo_timeout_ms.or(self.sdo_timeout_ms),
        }
    }

    /// Fill in defaults and validate
    pub fn resolve(self) -> Result<ExerciserConfig, ConfigError> {
        let node_id = self.node_id.context(MissingFieldSnafu { field: "node_id" })?;
        let node_id = NodeId::new(node_id).context(InvalidNodeIdSnafu)?;
        let eds_file = self.eds_file.context(MissingFieldSnafu { field: "eds_file" })?;

        Ok(ExerciserConfig {
            interface: self
                .interface
                .unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
            node_id,
            eds_file,
            counter: CounterPlan {
                index: self.index.unwrap_or(DEFAULT_INDEX),
                sub: self.sub.unwrap_or(DEFAULT_SUB),
                start: self.start.unwrap_or(0),
                count: self.count,
                interval: self
                    .interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_INTERVAL),
            },
            sdo_timeout: self
                .sdo_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RESPONSE_TIMEOUT),
        })
    }
}

/// Fully resolved settings for one exerciser run
#[derive(Clone, Debug, PartialEq)]
pub struct ExerciserConfig {
    /// Name of the CAN interface
    pub interface: String,
    /// Node ID of the device to write to
    pub node_id: NodeId,
    /// Path of the device's EDS
    pub eds_file: PathBuf,
    /// What to write, and how often
    pub counter: CounterPlan,
    /// Time to wait for each SDO response
    pub sdo_timeout: Duration,
}

/// Describes the sequence of writes performed by a run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CounterPlan {
    /// Object index to write
    pub index: u16,
    /// Sub index to write
    pub sub: u8,
    /// First value written
    pub start: u32,
    /// Maximum number of writes, or None to run until interrupted
    pub count: Option<u32>,
    /// Delay after each write
    pub interval: Duration,
}

impl Default for CounterPlan {
    fn default() -> Self {
        Self {
            index: DEFAULT_INDEX,
            sub: DEFAULT_SUB,
            start: 0,
            count: None,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl CounterPlan {
    /// The values to be written, in order
    ///
    /// The range never includes `u32::MAX`.
    pub fn values(&self) -> Range<u32> {
        let end = match self.count {
            Some(count) => self.start.saturating_add(count),
            None => u32::MAX,
        };
        self.start..end
    }
}
