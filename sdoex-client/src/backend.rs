//! The capability the exerciser drives a device through
//!
//! A backend provides three operations: connecting to a bus channel, adding a node described by
//! an EDS to that bus, and downloading bytes to one of the node's sub-objects. Real hardware is
//! reached through [`SocketCanProvider`](crate::SocketCanProvider); tests substitute simulated or
//! mock implementations.
use std::{future::Future, path::Path};

use sdoex_common::NodeId;
use sdoex_eds::{EdsError, ObjectDictionary};

use crate::sdo_client::SdoClientError;

/// Opens bus channels of one driver kind
pub trait BusProvider {
    /// The connection type created by this provider
    type Bus: Bus;

    /// Open the named channel, e.g. "vcan0"
    fn connect(&self, channel: &str) -> Result<Self::Bus, std::io::Error>;
}

/// An open connection to a bus
pub trait Bus {
    /// The node type created by [`Bus::add_node`]
    type Node: SdoNode;

    /// Create a reference to a remote node, described by the EDS at `eds_path`
    fn add_node(&mut self, node_id: NodeId, eds_path: &Path) -> Result<Self::Node, EdsError>;
}

/// A remote node accepting SDO writes
pub trait SdoNode {
    /// Write `data` to the sub-object at index/sub, resolving once the node confirms the write
    fn download(
        &mut self,
        index: u16,
        sub: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<(), SdoClientError>>;

    /// The object dictionary the node was created from, if the backend keeps one
    fn object_dictionary(&self) -> Option<&ObjectDictionary> {
        None
    }
}
