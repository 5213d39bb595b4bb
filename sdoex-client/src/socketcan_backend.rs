use std::{path::Path, time::Duration};

use sdoex_common::{open_socketcan, NodeId, SocketCanReceiver, SocketCanSender};
use sdoex_eds::EdsError;

use crate::{
    backend::{Bus, BusProvider},
    node::RemoteNode,
    sdo_client::DEFAULT_RESPONSE_TIMEOUT,
};

/// Connects to Linux socketcan interfaces
#[derive(Debug, Clone, Copy)]
pub struct SocketCanProvider {
    sdo_timeout: Duration,
}

impl Default for SocketCanProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketCanProvider {
    /// Create a provider using the default SDO response timeout
    pub fn new() -> Self {
        Self {
            sdo_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Set the SDO response timeout used by nodes on buses opened by this provider
    pub fn with_sdo_timeout(mut self, sdo_timeout: Duration) -> Self {
        self.sdo_timeout = sdo_timeout;
        self
    }
}

impl BusProvider for SocketCanProvider {
    type Bus = SocketCanBus;

    fn connect(&self, channel: &str) -> Result<SocketCanBus, std::io::Error> {
        let (sender, receiver) = open_socketcan(channel)?;
        log::debug!("Opened socketcan interface {channel}");
        Ok(SocketCanBus {
            sender,
            receiver,
            sdo_timeout: self.sdo_timeout,
        })
    }
}

/// An open socketcan interface
///
/// Nodes added to the bus share its socket. Each frame is delivered to only one reader, so a bus
/// should have a single node actively transferring at a time.
#[derive(Debug)]
pub struct SocketCanBus {
    sender: SocketCanSender,
    receiver: SocketCanReceiver,
    sdo_timeout: Duration,
}

impl Bus for SocketCanBus {
    type Node = RemoteNode<SocketCanSender, SocketCanReceiver>;

    fn add_node(&mut self, node_id: NodeId, eds_path: &Path) -> Result<Self::Node, EdsError> {
        RemoteNode::new(
            node_id,
            eds_path,
            self.sender.clone(),
            self.receiver.clone(),
            self.sdo_timeout,
        )
    }
}
