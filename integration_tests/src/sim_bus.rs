use std::sync::{Arc, Mutex};

use sdoex_common::messages::CanMessage;
use sdoex_common::traits::{AsyncCanReceiver, AsyncCanSender};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// An in-memory CAN bus
///
/// Every frame sent is delivered to every receiver on the bus, except the one created alongside
/// the sender by [`SimBus::new_port`].
#[derive(Clone, Default)]
pub struct SimBus {
    receivers: Arc<Mutex<Vec<UnboundedSender<CanMessage>>>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a connected sender/receiver pair, like a socket on a real interface
    pub fn new_port(&mut self) -> (SimBusSender, SimBusReceiver) {
        let (port, receiver) = self.add_receiver();
        let sender = SimBusSender {
            receivers: self.receivers.clone(),
            port: Some(port),
        };
        (sender, receiver)
    }

    /// Create a receiver which sees all traffic on the bus, e.g. for test listeners
    pub fn new_receiver(&mut self) -> SimBusReceiver {
        self.add_receiver().1
    }

    /// Create a sender with no receiver of its own
    pub fn new_sender(&mut self) -> SimBusSender {
        SimBusSender {
            receivers: self.receivers.clone(),
            port: None,
        }
    }

    fn add_receiver(&mut self) -> (usize, SimBusReceiver) {
        let (tx, rx) = unbounded_channel();
        let mut receivers = self.receivers.lock().unwrap();
        receivers.push(tx);
        (receivers.len() - 1, SimBusReceiver { channel_rx: rx })
    }
}

#[derive(Clone)]
pub struct SimBusSender {
    receivers: Arc<Mutex<Vec<UnboundedSender<CanMessage>>>>,
    port: Option<usize>,
}

impl AsyncCanSender for SimBusSender {
    type Error = CanMessage;

    async fn send(&mut self, msg: CanMessage) -> Result<(), CanMessage> {
        for (i, rx) in self.receivers.lock().unwrap().iter().enumerate() {
            // Don't echo back to the sender's own port
            if Some(i) != self.port {
                // A dropped receiver just means nobody is listening there anymore
                rx.send(msg).ok();
            }
        }
        Ok(())
    }
}

pub struct SimBusReceiver {
    channel_rx: UnboundedReceiver<CanMessage>,
}

impl AsyncCanReceiver for SimBusReceiver {
    type Error = ();

    async fn recv(&mut self) -> Result<CanMessage, Self::Error> {
        self.channel_rx.recv().await.ok_or(())
    }

    fn try_recv(&mut self) -> Option<CanMessage> {
        self.channel_rx.try_recv().ok()
    }

    fn flush(&mut self) {
        while self.channel_rx.try_recv().is_ok() {}
    }
}
