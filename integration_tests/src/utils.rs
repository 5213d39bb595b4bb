#![allow(dead_code)]
use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::sim_bus::{SimBus, SimBusReceiver, SimBusSender};
use crate::sim_node::SimNode;
use sdoex_client::{Bus, BusProvider, RemoteNode, SdoClient, DEFAULT_RESPONSE_TIMEOUT};
use sdoex_common::{
    constants::cob_ids::{SDO_REQUEST_BASE, SDO_RESPONSE_BASE},
    sdo::{SdoRequest, SdoResponse},
    traits::AsyncCanReceiver,
    NodeId,
};
use sdoex_eds::EdsError;

pub fn get_sdo_client(bus: &mut SimBus, node_id: u8) -> SdoClient<SimBusSender, SimBusReceiver> {
    let (sender, receiver) = bus.new_port();
    SdoClient::new_std(NodeId::new(node_id).unwrap(), sender, receiver)
}

/// Path of the EDS fixture describing the simulated counter node
pub fn counter_eds_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/counter_node.eds")
}

/// Run `test_task` while `node` serves requests in the background
pub async fn test_with_background_node<Fut, T>(node: &mut SimNode, test_task: Fut) -> T
where
    Fut: Future<Output = T>,
{
    tokio::select! {
        _ = node.serve() => panic!("Simulated node exited"),
        test_result = test_task => test_result
    }
}

/// A bus provider connecting to a [`SimBus`]
///
/// Only the interface names given to [`SimProvider::new`] exist.
pub struct SimProvider {
    bus: SimBus,
    interfaces: Vec<String>,
    sdo_timeout: Duration,
    connections: Arc<AtomicUsize>,
    nodes_added: Arc<AtomicUsize>,
}

impl SimProvider {
    pub fn new(bus: &SimBus, interfaces: &[&str]) -> Self {
        Self {
            bus: bus.clone(),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            sdo_timeout: DEFAULT_RESPONSE_TIMEOUT,
            connections: Arc::new(AtomicUsize::new(0)),
            nodes_added: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_sdo_timeout(mut self, sdo_timeout: Duration) -> Self {
        self.sdo_timeout = sdo_timeout;
        self
    }

    /// Number of successful connects
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Number of nodes successfully added to connections from this provider
    pub fn nodes_added(&self) -> usize {
        self.nodes_added.load(Ordering::Relaxed)
    }
}

impl BusProvider for SimProvider {
    type Bus = SimConnection;

    fn connect(&self, channel: &str) -> Result<SimConnection, std::io::Error> {
        if !self.interfaces.iter().any(|i| i == channel) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No such device: {channel}"),
            ));
        }
        self.connections.fetch_add(1, Ordering::Relaxed);
        Ok(SimConnection {
            bus: self.bus.clone(),
            sdo_timeout: self.sdo_timeout,
            nodes_added: self.nodes_added.clone(),
        })
    }
}

pub struct SimConnection {
    bus: SimBus,
    sdo_timeout: Duration,
    nodes_added: Arc<AtomicUsize>,
}

impl Bus for SimConnection {
    type Node = RemoteNode<SimBusSender, SimBusReceiver>;

    fn add_node(&mut self, node_id: NodeId, eds_path: &Path) -> Result<Self::Node, EdsError> {
        let (sender, receiver) = self.bus.new_port();
        let node = RemoteNode::new(node_id, eds_path, sender, receiver, self.sdo_timeout)?;
        self.nodes_added.fetch_add(1, Ordering::Relaxed);
        Ok(node)
    }
}

/// Collects bus traffic, and prints it when dropped
pub struct BusLogger {
    rx: SimBusReceiver,
}

impl BusLogger {
    pub fn new(rx: SimBusReceiver) -> Self {
        Self { rx }
    }

    pub fn print(&mut self) {
        println!("Bus message history");
        println!("-------------------");
        while let Some(msg) = self.rx.try_recv() {
            let id = msg.id().raw();
            if (SDO_REQUEST_BASE as u32..SDO_REQUEST_BASE as u32 + 0x80).contains(&id) {
                match SdoRequest::try_from(msg) {
                    Ok(req) => println!("{id:03X} {req:?}"),
                    Err(_) => println!("{msg:?}"),
                }
            } else if (SDO_RESPONSE_BASE as u32..SDO_RESPONSE_BASE as u32 + 0x80).contains(&id) {
                match SdoResponse::try_from(msg) {
                    Ok(resp) => println!("{id:03X} {resp:?}"),
                    Err(_) => println!("{msg:?}"),
                }
            } else {
                println!("{msg:?}");
            }
        }
    }
}

impl Drop for BusLogger {
    fn drop(&mut self) {
        self.print();
    }
}

/// Count the frames pending on `rx` with the given ID, consuming them
pub fn count_frames(rx: &mut SimBusReceiver, id: sdoex_common::CanId) -> usize {
    let mut count = 0;
    while let Some(msg) = rx.try_recv() {
        if msg.id() == id {
            count += 1;
        }
    }
    count
}
