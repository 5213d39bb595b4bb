//! A simulated device on a [`SimBus`], with a log of the writes it accepts
use std::sync::{Arc, Mutex};

use sdoex_common::NodeId;
use sdoex_sim::{ObjectEntry, SimulatedSlave, SlaveContext, WriteOutcome};
use tokio_util::sync::CancellationToken;

use crate::sim_bus::{SimBus, SimBusReceiver, SimBusSender};

type WriteHook = Box<dyn FnMut(u16, u8, &[u8]) -> WriteOutcome + Send>;

/// A write accepted by the node
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub index: u16,
    pub sub: u8,
    pub data: Vec<u8>,
}

/// Shared list of the writes a [`SimNode`] has accepted, in order
#[derive(Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<WriteRecord>>>);

impl WriteLog {
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<WriteRecord> {
        self.0.lock().unwrap().clone()
    }

    /// The data of each accepted write
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.data.clone())
            .collect()
    }

    fn push(&self, record: WriteRecord) {
        self.0.lock().unwrap().push(record);
    }
}

/// A [`SimulatedSlave`] with only the objects added by [`SimNode::with_object`]
///
/// Access to anything else is aborted with `NoSuchObject`.
pub struct SimNode {
    slave: SimulatedSlave<SimBusSender, SimBusReceiver>,
    writes: WriteLog,
    hook: Arc<Mutex<Option<WriteHook>>>,
}

impl SimNode {
    pub fn new(node_id: NodeId, bus: &mut SimBus) -> Self {
        let (sender, receiver) = bus.new_port();
        let mut slave = SimulatedSlave::new(node_id, Default::default(), sender, receiver);
        let writes = WriteLog::default();
        let hook: Arc<Mutex<Option<WriteHook>>> = Arc::new(Mutex::new(None));

        let log = writes.clone();
        let node_hook = hook.clone();
        slave.on_any_write(move |_: &mut SlaveContext, index, sub, data: &[u8]| {
            let outcome = match node_hook.lock().unwrap().as_mut() {
                Some(hook) => hook(index, sub, data),
                None => WriteOutcome::Accept,
            };
            if outcome == WriteOutcome::Accept {
                log.push(WriteRecord {
                    index,
                    sub,
                    data: data.to_vec(),
                });
            }
            outcome
        });

        Self {
            slave,
            writes,
            hook,
        }
    }

    pub fn with_object(mut self, index: u16, sub: u8, value: impl Into<Vec<u8>>) -> Self {
        self.slave
            .insert_object(index, sub, ObjectEntry::untyped(value));
        self
    }

    /// Set a function called for every completed write, deciding its outcome
    pub fn with_write_hook(
        self,
        hook: impl FnMut(u16, u8, &[u8]) -> WriteOutcome + Send + 'static,
    ) -> Self {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
        self
    }

    pub fn write_log(&self) -> WriteLog {
        self.writes.clone()
    }

    pub fn object(&self, index: u16, sub: u8) -> Option<&[u8]> {
        self.slave.objects().get(index, sub)
    }

    pub fn slave(&mut self) -> &mut SimulatedSlave<SimBusSender, SimBusReceiver> {
        &mut self.slave
    }

    /// Run the node until the bus is dropped
    pub async fn serve(&mut self) {
        if let Err(e) = self.slave.run(CancellationToken::new()).await {
            log::info!("Simulated node stopped: {e}");
        }
    }
}
