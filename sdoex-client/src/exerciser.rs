//! Repeatedly writes an incrementing counter to a remote node
//!
//! [`initialize`] opens the bus and adds the node. [`run`] then downloads each value of a
//! [`CounterPlan`] as 4 little-endian bytes, one transfer at a time, until the plan is exhausted,
//! a transfer fails, or the shutdown token is cancelled.
use std::path::{Path, PathBuf};

use sdoex_common::NodeId;
use sdoex_eds::{DataType, EdsError, ObjectDictionary};
use snafu::{ResultExt, Snafu};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{Bus, BusProvider, SdoNode},
    config::CounterPlan,
    sdo_client::SdoClientError,
};

/// Number of transfers between progress log messages
const PROGRESS_INTERVAL: u64 = 1000;

/// Error returned by the exerciser
#[derive(Debug, Snafu)]
pub enum ExerciserError {
    /// The bus channel could not be opened
    #[snafu(display("Failed to connect to interface {interface}"))]
    Connection {
        /// The interface name
        interface: String,
        /// The underlying error
        source: std::io::Error,
    },
    /// The device description could not be loaded
    #[snafu(display("Failed to load device description {}", path.display()))]
    Description {
        /// Path of the EDS
        path: PathBuf,
        /// The underlying error
        source: EdsError,
    },
    /// A write was rejected by the node, or went unanswered
    #[snafu(display("Write of counter value {value} failed after {completed} transfers"))]
    Transfer {
        /// The counter value which failed to write
        value: u32,
        /// Number of writes which succeeded before the failure
        completed: u64,
        /// The underlying error
        source: SdoClientError,
    },
}

/// An open bus with a node added to it, ready to [`run`]
pub struct NodeHandle<B: Bus> {
    // Held so the connection stays open for the lifetime of the node
    _bus: B,
    node: B::Node,
    node_id: NodeId,
}

impl<B: Bus> NodeHandle<B> {
    /// The ID of the node writes are sent to
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Access the node
    pub fn node(&mut self) -> &mut B::Node {
        &mut self.node
    }
}

impl<B: Bus> std::fmt::Debug for NodeHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

/// Why a run ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown token was cancelled
    Interrupted,
    /// Every value in the plan was written
    Exhausted,
}

/// Outcome of a run which ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of writes confirmed by the node
    pub transfers: u64,
    /// The last value written, if any
    pub last_value: Option<u32>,
    /// Why the run ended
    pub reason: StopReason,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self.reason {
            StopReason::Interrupted => "interrupted",
            StopReason::Exhausted => "counter exhausted",
        };
        write!(f, "{reason} after {} transfers", self.transfers)?;
        if let Some(value) = self.last_value {
            write!(f, ", last value {value}")?;
        }
        Ok(())
    }
}

/// Connect to `interface` and add the node described by `eds_file`
///
/// The bus is opened before the EDS is read, so a bad interface is reported even when the EDS is
/// also bad, and no node is created.
pub fn initialize<P: BusProvider>(
    provider: &P,
    interface: &str,
    node_id: NodeId,
    eds_file: &Path,
) -> Result<NodeHandle<P::Bus>, ExerciserError> {
    let mut bus = provider
        .connect(interface)
        .context(ConnectionSnafu { interface })?;
    let node = bus
        .add_node(node_id, eds_file)
        .context(DescriptionSnafu { path: eds_file })?;
    log::info!(
        "Connected to node {node_id} on {interface} using {}",
        eds_file.display()
    );
    Ok(NodeHandle {
        _bus: bus,
        node,
        node_id,
    })
}

/// Write the values of `plan` to the node until done, failed, or `shutdown` is cancelled
///
/// Cancellation is checked before each transfer and during the delay after it. A transfer in
/// progress is always allowed to finish. The first failed transfer ends the run; it is not
/// retried.
pub async fn run<B: Bus>(
    handle: NodeHandle<B>,
    plan: &CounterPlan,
    shutdown: CancellationToken,
) -> Result<RunSummary, ExerciserError> {
    let NodeHandle {
        _bus,
        mut node,
        node_id,
    } = handle;

    if let Some(od) = node.object_dictionary() {
        check_target(od, plan.index, plan.sub);
    }

    log::info!(
        "Writing counter to node {node_id} object 0x{:04X}sub{}, starting at {}",
        plan.index,
        plan.sub,
        plan.start
    );

    let mut transfers: u64 = 0;
    let mut last_value = None;
    let summary = |transfers, last_value, reason| RunSummary {
        transfers,
        last_value,
        reason,
    };

    for value in plan.values() {
        if shutdown.is_cancelled() {
            return Ok(summary(transfers, last_value, StopReason::Interrupted));
        }

        node.download(plan.index, plan.sub, &value.to_le_bytes())
            .await
            .context(TransferSnafu {
                value,
                completed: transfers,
            })?;
        transfers += 1;
        last_value = Some(value);
        log::trace!("Wrote {value}");
        if transfers % PROGRESS_INTERVAL == 0 {
            log::info!("{transfers} transfers complete, last value {value}");
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                return Ok(summary(transfers, last_value, StopReason::Interrupted));
            }
            _ = tokio::time::sleep(plan.interval) => {}
        }
    }

    Ok(summary(transfers, last_value, StopReason::Exhausted))
}

/// Warn if the EDS suggests the target sub-object will not accept a u32
///
/// The device is authoritative, so a mismatch only warns.
fn check_target(od: &ObjectDictionary, index: u16, sub: u8) {
    let Some(sub_object) = od.sub_object(index, sub) else {
        log::warn!("EDS does not describe object 0x{index:04X}sub{sub}");
        return;
    };
    if !sub_object.access_type.is_writable() {
        log::warn!(
            "EDS describes 0x{index:04X}sub{sub} ({}) as {:?}, writes may be refused",
            sub_object.name,
            sub_object.access_type
        );
    }
    if sub_object.data_type.size() != Some(4) {
        log::warn!(
            "EDS describes 0x{index:04X}sub{sub} ({}) as {:?}, not a 32-bit type",
            sub_object.name,
            sub_object.data_type
        );
    } else if sub_object.data_type != DataType::UInt32 {
        log::debug!(
            "0x{index:04X}sub{sub} is {:?}, counter values are written as UNSIGNED32",
            sub_object.data_type
        );
    }
}
