//! Command line handling and behaviour for the `sdo-sim` tool
//!
//! The simulated device serves the objects of its EDS. On top of that it watches the counter
//! object written by `sdo-counter`: every write which does not follow on from the previous value
//! raises an EMCY, and the write rate is logged on each tick.
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Parser;
use clap_num::maybe_hex;
use sdoex_client::{
    common::{
        emcy::error_register,
        traits::{AsyncCanReceiver, AsyncCanSender},
        NodeId,
    },
    config::{DEFAULT_INDEX, DEFAULT_INTERFACE, DEFAULT_SUB},
};
use sdoex_sim::{SimulatedSlave, WriteOutcome};

/// EMCY error code sent when a counter write skips or repeats a value
pub const COUNTER_GAP_ERROR_CODE: u16 = 0xFF00;

/// Run a simulated CANopen device described by an EDS
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct SimArgs {
    /// The CAN interface to use
    #[arg(short, long, default_value = DEFAULT_INTERFACE)]
    pub interface: String,
    /// Node ID of the simulated device
    #[arg(short, long)]
    pub node_id: NodeId,
    /// Path of the EDS describing the device
    #[arg(short, long, visible_alias = "eds-file")]
    pub model: PathBuf,
    /// Heartbeat period in milliseconds, replacing the EDS value of 0x1017. 0 disables heartbeats
    #[arg(long)]
    pub heartbeat_ms: Option<u16>,
    /// Period of the status log in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,
    /// Index of the counter object
    #[arg(long, default_value_t = DEFAULT_INDEX, value_parser = maybe_hex::<u16>)]
    pub index: u16,
    /// Sub index of the counter object
    #[arg(long, default_value_t = DEFAULT_SUB, value_parser = maybe_hex::<u8>)]
    pub sub: u8,
}

impl SimArgs {
    /// Period of the status log
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Follows the values written to the counter object
#[derive(Clone, Copy, Debug, Default)]
pub struct CounterMonitor {
    last: Option<u32>,
    gaps: u64,
}

impl CounterMonitor {
    /// Record a written value, returning false if it does not follow the previous one
    ///
    /// Writing 0 restarts the sequence.
    pub fn record(&mut self, value: u32) -> bool {
        let in_sequence = match self.last {
            Some(last) => value == 0 || last.checked_add(1) == Some(value),
            None => true,
        };
        self.last = Some(value);
        if !in_sequence {
            self.gaps += 1;
        }
        in_sequence
    }

    /// The last value written
    pub fn last(&self) -> Option<u32> {
        self.last
    }

    /// Number of writes which did not follow the previous value
    pub fn gaps(&self) -> u64 {
        self.gaps
    }
}

/// Add the counter watching behaviour and the settings from `args` to `slave`
pub fn configure<S, R>(slave: &mut SimulatedSlave<S, R>, args: &SimArgs)
where
    S: AsyncCanSender,
    R: AsyncCanReceiver,
{
    if let Some(period_ms) = args.heartbeat_ms {
        slave.configure_heartbeat(period_ms);
    }

    let writes = Arc::new(AtomicU64::new(0));
    let counted = writes.clone();
    let mut monitor = CounterMonitor::default();
    slave.on_write(args.index, args.sub, move |ctx, index, sub, data| {
        let Ok(bytes) = <[u8; 4]>::try_from(data) else {
            log::warn!("Write of {} bytes to counter 0x{index:04X}sub{sub}", data.len());
            return WriteOutcome::Accept;
        };
        let value = u32::from_le_bytes(bytes);
        counted.fetch_add(1, Ordering::Relaxed);
        let previous = monitor.last();
        if !monitor.record(value) {
            log::warn!("Counter went from {previous:?} to {value}");
            ctx.emcy(COUNTER_GAP_ERROR_CODE, error_register::MANUFACTURER);
        }
        WriteOutcome::Accept
    });

    let mut reported = 0;
    slave.on_tick(args.tick_period(), move |ctx| {
        let total = writes.load(Ordering::Relaxed);
        log::info!(
            "Node {} {}: {} counter writes this period, {total} total",
            ctx.node_id(),
            ctx.nmt_state(),
            total - reported,
        );
        reported = total;
    });

    slave.on_sync(|ctx, counter| {
        log::debug!("Node {} received SYNC {counter:?}", ctx.node_id());
    });
}
