use std::{path::Path, time::Duration};

use sdoex_common::{
    traits::{AsyncCanReceiver, AsyncCanSender},
    NodeId,
};
use sdoex_eds::{EdsError, ObjectDictionary};

use crate::{
    backend::SdoNode,
    sdo_client::{SdoClient, SdoClientError},
};

/// A node on the bus, accessed through its default SDO server
///
/// Pairs the parsed EDS of the device with an [`SdoClient`] addressed to its node ID.
#[derive(Debug)]
pub struct RemoteNode<S, R> {
    node_id: NodeId,
    od: ObjectDictionary,
    client: SdoClient<S, R>,
}

impl<S: AsyncCanSender, R: AsyncCanReceiver> RemoteNode<S, R> {
    /// Load the EDS at `eds_path` and create a node using the given sender/receiver
    ///
    /// `$NODEID` expressions in the EDS are evaluated for `node_id`.
    pub fn new(
        node_id: NodeId,
        eds_path: &Path,
        sender: S,
        receiver: R,
        sdo_timeout: Duration,
    ) -> Result<Self, EdsError> {
        let od = ObjectDictionary::load(eds_path, Some(node_id))?;
        Ok(Self::from_parts(node_id, od, sender, receiver, sdo_timeout))
    }

    /// Create a node from an already loaded object dictionary
    pub fn from_parts(
        node_id: NodeId,
        od: ObjectDictionary,
        sender: S,
        receiver: R,
        sdo_timeout: Duration,
    ) -> Self {
        let mut client = SdoClient::new_std(node_id, sender, receiver);
        client.set_timeout(sdo_timeout);
        Self {
            node_id,
            od,
            client,
        }
    }

    /// The node's ID
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Access the SDO client for reads and typed writes
    pub fn sdo_client(&mut self) -> &mut SdoClient<S, R> {
        &mut self.client
    }
}

impl<S: AsyncCanSender, R: AsyncCanReceiver> SdoNode for RemoteNode<S, R> {
    async fn download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<(), SdoClientError> {
        self.client.download(index, sub, data).await
    }

    fn object_dictionary(&self) -> Option<&ObjectDictionary> {
        Some(&self.od)
    }
}
