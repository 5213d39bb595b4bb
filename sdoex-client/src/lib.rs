//! SDO client and counter exerciser for CANopen devices
//!
//! The [`SdoClient`] reads and writes objects on a remote node's SDO server over any transport
//! implementing the [`common::traits`]. On top of it, the [`exerciser`] repeatedly writes an
//! incrementing u32 to a node, reached through the [`BusProvider`] / [`Bus`] / [`SdoNode`]
//! capability.
//!
//! ```ignore
//! let provider = SocketCanProvider::new();
//! let handle = exerciser::initialize(&provider, "vcan0", NodeId::new(5)?, "node.eds".as_ref())?;
//! let summary = exerciser::run(handle, &CounterPlan::default(), CancellationToken::new()).await?;
//! ```
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod config;
pub mod exerciser;
mod node;
mod sdo_client;
#[cfg(all(feature = "socketcan", target_os = "linux"))]
mod socketcan_backend;

pub use backend::{Bus, BusProvider, SdoNode};
pub use config::{ConfigError, ConfigFile, CounterPlan, ExerciserConfig};
pub use exerciser::{ExerciserError, NodeHandle, RunSummary, StopReason};
pub use node::RemoteNode;
pub use sdo_client::{RawAbortCode, SdoClient, SdoClientError, DEFAULT_RESPONSE_TIMEOUT};
#[cfg(all(feature = "socketcan", target_os = "linux"))]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use socketcan_backend::{SocketCanBus, SocketCanProvider};

pub use sdoex_common as common;
pub use sdoex_eds as eds;
