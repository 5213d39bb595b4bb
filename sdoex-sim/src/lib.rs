//! A simulated CANopen slave node
//!
//! Builds a node from an EDS, and runs it on any transport implementing the
//! [`sdoex_common::traits`]. The node serves SDO requests from an in-memory [`ObjectStore`],
//! follows NMT commands, produces heartbeats, and sends emergency messages on request. Custom
//! behaviour is added with write, tick and SYNC callbacks on the [`SimulatedSlave`].
#![warn(missing_docs, missing_copy_implementations)]

mod object_store;
mod sdo_server;
mod slave;

pub use object_store::{ObjectEntry, ObjectError, ObjectStore, ObjectValue};
pub use sdo_server::{SdoServer, ServerAction};
pub use slave::{
    SimulatedSlave, SlaveContext, SlaveError, SyncCallback, TickCallback, WriteCallback,
    WriteOutcome,
};
