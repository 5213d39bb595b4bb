//! Command line handling for the `sdo-counter` and `sdo-sim` tools
use std::path::PathBuf;

use clap::Parser;
use clap_num::maybe_hex;
use sdoex_client::{
    common::NodeId, ConfigError, ConfigFile, ExerciserConfig, ExerciserError, RunSummary,
};

pub mod signals;
pub mod sim;

/// Exit status after a failed run
pub const FAILURE_EXIT_STATUS: u8 = 1;

/// Exit status for the outcome of a run
///
/// A run which stopped cleanly, whether interrupted or out of counter values, exits with 0.
pub fn exit_status(result: &Result<RunSummary, ExerciserError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => FAILURE_EXIT_STATUS,
    }
}

/// Write an incrementing u32 to an object on a CANopen node until interrupted
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct CounterArgs {
    /// The CAN interface to use [default: vcan0]
    #[arg(short, long)]
    pub interface: Option<String>,
    /// Node ID of the device to write to
    #[arg(short, long, required_unless_present = "config")]
    pub node_id: Option<NodeId>,
    /// Path of the device's EDS
    #[arg(short, long, required_unless_present = "config")]
    pub eds_file: Option<PathBuf>,
    /// TOML file with settings. Options given on the command line take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Object index to write [default: 0x4000]
    #[arg(long, value_parser = maybe_hex::<u16>)]
    pub index: Option<u16>,
    /// Sub index to write [default: 0]
    #[arg(long, value_parser = maybe_hex::<u8>)]
    pub sub: Option<u8>,
    /// First counter value [default: 0]
    #[arg(long, value_parser = maybe_hex::<u32>)]
    pub start: Option<u32>,
    /// Stop after this many writes
    #[arg(long)]
    pub count: Option<u32>,
    /// Delay between writes in milliseconds [default: 1]
    #[arg(long)]
    pub interval_ms: Option<u64>,
    /// SDO response timeout in milliseconds [default: 150]
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl CounterArgs {
    /// The settings given on the command line, as a config layer
    pub fn overrides(&self) -> ConfigFile {
        ConfigFile {
            interface: self.interface.clone(),
            node_id: self.node_id.map(u8::from),
            eds_file: self.eds_file.clone(),
            index: self.index,
            sub: self.sub,
            start: self.start,
            count: self.count,
            interval_ms: self.interval_ms,
            sdo_timeout_ms: self.timeout_ms,
        }
    }

    /// Combine the config file, if any, with the command line and resolve defaults
    pub fn load_config(&self) -> Result<ExerciserConfig, ConfigError> {
        let base = match &self.config {
            Some(path) => ConfigFile::load_from_file(path)?,
            None => ConfigFile::default(),
        };
        base.merge(self.overrides()).resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::assert_contains;
    use sdoex_client::{SdoClientError, StopReason};
    use std::time::Duration;

    #[test]
    fn test_minimal_args() {
        let args = CounterArgs::try_parse_from(["sdo-counter", "-n", "5", "-e", "node.eds"]).unwrap();
        let config = args.load_config().unwrap();
        assert_eq!("vcan0", config.interface);
        assert_eq!(5, config.node_id.raw());
        assert_eq!(PathBuf::from("node.eds"), config.eds_file);
        assert_eq!(0x4000, config.counter.index);
        assert_eq!(0, config.counter.sub);
        assert_eq!(None, config.counter.count);
    }

    #[test]
    fn test_long_args() {
        let args = CounterArgs::try_parse_from([
            "sdo-counter",
            "--interface",
            "can1",
            "--node-id",
            "0x20",
            "--eds-file",
            "node.eds",
            "--index",
            "0x2100",
            "--sub",
            "3",
            "--count",
            "10",
            "--interval-ms",
            "5",
            "--timeout-ms",
            "1000",
        ])
        .unwrap();
        let config = args.load_config().unwrap();
        assert_eq!("can1", config.interface);
        assert_eq!(0x20, config.node_id.raw());
        assert_eq!(0x2100, config.counter.index);
        assert_eq!(3, config.counter.sub);
        assert_eq!(Some(10), config.counter.count);
        assert_eq!(Duration::from_millis(5), config.counter.interval);
        assert_eq!(Duration::from_millis(1000), config.sdo_timeout);
    }

    #[test]
    fn test_node_id_and_eds_required() {
        let err = CounterArgs::try_parse_from(["sdo-counter", "-e", "node.eds"]).unwrap_err();
        assert_contains!(err.to_string(), "--node-id");
        let err = CounterArgs::try_parse_from(["sdo-counter", "-n", "5"]).unwrap_err();
        assert_contains!(err.to_string(), "--eds-file");
    }

    #[test]
    fn test_invalid_node_id() {
        for raw in ["0", "128", "0x80", "five"] {
            let err =
                CounterArgs::try_parse_from(["sdo-counter", "-n", raw, "-e", "x.eds"]).unwrap_err();
            assert_contains!(err.to_string(), "--node-id");
        }
        let err = CounterArgs::try_parse_from(["sdo-counter", "-n", "0", "-e", "x.eds"]).unwrap_err();
        assert_contains!(err.to_string(), "Invalid node ID 0");
    }

    #[test]
    fn test_exit_status() {
        let interrupted = RunSummary {
            transfers: 12,
            last_value: Some(11),
            reason: StopReason::Interrupted,
        };
        assert_eq!(0, exit_status(&Ok(interrupted)));

        let failed = Err(ExerciserError::Transfer {
            value: 3,
            completed: 3,
            source: SdoClientError::NoResponse,
        });
        assert_eq!(FAILURE_EXIT_STATUS, exit_status(&failed));
        assert_ne!(signals::FORCED_EXIT_STATUS, FAILURE_EXIT_STATUS as i32);
    }

    #[test]
    fn test_missing_config_file() {
        let args = CounterArgs::try_parse_from(["sdo-counter", "-c", "/nonexistent/sdo.toml"])
            .unwrap();
        assert!(matches!(args.load_config(), Err(ConfigError::Io { .. })));
    }
}
