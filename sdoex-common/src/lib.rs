//! Common functionality shared among other sdoex crates.
//!
//! Contains the CAN message model, the SDO wire codec, NMT and EMCY messages, node ID types, and
//! the transport traits which the client and simulator are written against. Most users will reach
//! it through the `sdoex-client` re-export.
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod constants;
pub mod emcy;
pub mod messages;
pub mod nmt;
pub mod node_id;
pub mod sdo;
pub mod traits;

#[cfg(all(feature = "socketcan", target_os = "linux"))]
mod socketcan;

#[cfg(all(feature = "socketcan", target_os = "linux"))]
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub use self::socketcan::{
    open_socketcan, ReceiveError, SocketCanReceiver, SocketCanSendError, SocketCanSender,
};

pub use messages::{CanError, CanId, CanMessage};
pub use node_id::NodeId;
