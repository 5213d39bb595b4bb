//! A simulated CANopen slave node
//!
//! The [`SimulatedSlave`] serves SDO requests from its [`ObjectStore`], follows NMT commands,
//! produces boot-up and heartbeat messages, and can send emergency messages. Behaviour is added
//! with callbacks:
//!
//! - [`on_write`](SimulatedSlave::on_write) is called when an SDO client completes a write to an
//!   object, and decides whether the write is accepted
//! - [`on_tick`](SimulatedSlave::on_tick) is called periodically
//! - [`on_sync`](SimulatedSlave::on_sync) is called when a SYNC message is received
//!
//! Each callback gets a [`SlaveContext`] to read and write objects and to queue emergencies.
//!
//! ```ignore
//! let mut slave = SimulatedSlave::from_eds(node_id, &od, sender, receiver);
//! slave.configure_heartbeat(1000);
//! slave.on_write(0x4000, 0, |ctx, _, _, data| {
//!     if data == [0xff; 4] {
//!         ctx.emcy(0xFF00, emcy::error_register::MANUFACTURER);
//!     }
//!     WriteOutcome::Accept
//! });
//! slave.run(shutdown).await?;
//! ```
use std::{collections::HashMap, time::Duration};

use sdoex_common::{
    constants::{cob_ids, object_ids},
    emcy::{self, Emcy},
    nmt::{Heartbeat, NmtCommand, NmtCommandSpecifier, NmtState},
    sdo::{AbortCode, SdoRequest, SdoResponse},
    traits::{AsyncCanReceiver, AsyncCanSender, CanSendError},
    CanId, CanMessage, NodeId,
};
use sdoex_eds::{AccessType, DataType, ObjectDictionary};
use snafu::Snafu;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    object_store::{ObjectEntry, ObjectError, ObjectStore, ObjectValue},
    sdo_server::{SdoServer, ServerAction},
};

/// What the node does with a completed write
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WriteOutcome {
    /// Store the value and confirm the write
    Accept,
    /// Reject the write with an abort
    Abort(AbortCode),
    /// Drop the request without responding
    Ignore,
}

/// Called with the object index, sub index and data of a completed SDO write
pub type WriteCallback = Box<dyn FnMut(&mut SlaveContext, u16, u8, &[u8]) -> WriteOutcome + Send>;
/// Called every tick period
pub type TickCallback = Box<dyn FnMut(&mut SlaveContext) + Send>;
/// Called with the counter value of each SYNC message, if it has one
pub type SyncCallback = Box<dyn FnMut(&mut SlaveContext, Option<u8>) + Send>;

/// Error which stops a running slave
#[derive(Debug, Snafu)]
pub enum SlaveError {
    /// The CAN receiver failed
    #[snafu(display("Error receiving from the bus: {message}"))]
    Receive {
        /// Description of the receiver error
        message: String,
    },
}

/// The state of a slave which callbacks can access
#[derive(Debug)]
pub struct SlaveContext {
    node_id: NodeId,
    nmt_state: NmtState,
    objects: ObjectStore,
    outbox: Vec<CanMessage>,
}

impl SlaveContext {
    /// The node's ID
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The node's current NMT state
    pub fn nmt_state(&self) -> NmtState {
        self.nmt_state
    }

    /// The node's objects
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// The node's objects, for modification
    pub fn objects_mut(&mut self) -> &mut ObjectStore {
        &mut self.objects
    }

    /// Read an object registered with [`ObjectStore::register`]
    pub fn get(&self, name: &str) -> Result<ObjectValue, ObjectError> {
        self.objects.read_named(name)
    }

    /// Write an object registered with [`ObjectStore::register`]
    pub fn set(&mut self, name: &str, value: impl Into<ObjectValue>) -> Result<(), ObjectError> {
        self.objects.write_named(name, value)
    }

    /// Queue an emergency message
    ///
    /// The error register (0x1001), when the node has one, is updated to `error_register` with
    /// the generic error bit added. Emergencies are not sent while the node is stopped.
    pub fn emcy(&mut self, error_code: u16, error_register: u8) {
        let error_register = if error_register != 0 {
            error_register | emcy::error_register::GENERIC
        } else {
            0
        };
        self.objects
            .set(object_ids::ERROR_REGISTER, 0, [error_register])
            .ok();
        if self.nmt_state == NmtState::Stopped {
            log::debug!("Not sending EMCY 0x{error_code:04X} while stopped");
            return;
        }
        log::info!("Sending EMCY 0x{error_code:04X}, error register 0x{error_register:02X}");
        self.send(Emcy::new(error_code, error_register).to_message(self.node_id));
    }

    /// Queue a message to be sent
    pub fn send(&mut self, msg: CanMessage) {
        self.outbox.push(msg);
    }

    /// The heartbeat period set in object 0x1017, or None if heartbeats are disabled
    fn heartbeat_period(&self) -> Option<Duration> {
        let data = self.objects.get(object_ids::HEARTBEAT_PRODUCER_TIME, 0)?;
        let ms = u16::from_le_bytes(data.try_into().ok()?);
        (ms != 0).then(|| Duration::from_millis(ms as u64))
    }

    fn boot_up(&mut self) {
        self.nmt_state = NmtState::PreOperational;
        log::info!("Node {} booting", self.node_id);
        self.send(
            Heartbeat {
                node: self.node_id,
                state: NmtState::Bootup,
            }
            .into(),
        );
    }
}

/// A simulated slave node on a CAN bus
pub struct SimulatedSlave<S, R> {
    ctx: SlaveContext,
    defaults: ObjectStore,
    server: SdoServer,
    write_callbacks: HashMap<(u16, u8), WriteCallback>,
    any_write_callback: Option<WriteCallback>,
    tick: Option<(Duration, TickCallback)>,
    sync_callback: Option<SyncCallback>,
    sender: S,
    receiver: R,
}

impl<S, R> std::fmt::Debug for SimulatedSlave<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSlave")
            .field("node_id", &self.ctx.node_id)
            .field("nmt_state", &self.ctx.nmt_state)
            .finish_non_exhaustive()
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick_some(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<S: AsyncCanSender, R: AsyncCanReceiver> SimulatedSlave<S, R> {
    /// Create a node serving `objects`
    ///
    /// The objects as given are also the defaults restored by an NMT reset.
    pub fn new(node_id: NodeId, objects: ObjectStore, sender: S, receiver: R) -> Self {
        Self {
            ctx: SlaveContext {
                node_id,
                nmt_state: NmtState::Bootup,
                objects: objects.clone(),
                outbox: Vec::new(),
            },
            defaults: objects,
            server: SdoServer::new(),
            write_callbacks: HashMap::new(),
            any_write_callback: None,
            tick: None,
            sync_callback: None,
            sender,
            receiver,
        }
    }

    /// Create a node with the objects described by an EDS, set to their defaults
    pub fn from_eds(node_id: NodeId, od: &ObjectDictionary, sender: S, receiver: R) -> Self {
        Self::new(node_id, ObjectStore::from_dictionary(od), sender, receiver)
    }

    /// The node's ID
    pub fn node_id(&self) -> NodeId {
        self.ctx.node_id
    }

    /// The node's current NMT state
    pub fn nmt_state(&self) -> NmtState {
        self.ctx.nmt_state
    }

    /// The node's objects
    pub fn objects(&self) -> &ObjectStore {
        &self.ctx.objects
    }

    /// Access the node's state, e.g. to change objects before running
    pub fn context(&mut self) -> &mut SlaveContext {
        &mut self.ctx
    }

    /// Add an object, which also becomes part of the defaults
    pub fn insert_object(&mut self, index: u16, sub: u8, entry: ObjectEntry) {
        self.defaults.insert(index, sub, entry.clone());
        self.ctx.objects.insert(index, sub, entry);
    }

    /// Give an object a name for typed access from callbacks
    pub fn register(
        &mut self,
        name: &str,
        index: u16,
        sub: u8,
        data_type: DataType,
    ) -> Result<(), ObjectError> {
        self.defaults.register(name, index, sub, data_type)?;
        self.ctx.objects.register(name, index, sub, data_type)
    }

    /// Set the callback for completed writes to one object
    pub fn on_write(
        &mut self,
        index: u16,
        sub: u8,
        callback: impl FnMut(&mut SlaveContext, u16, u8, &[u8]) -> WriteOutcome + Send + 'static,
    ) {
        self.write_callbacks.insert((index, sub), Box::new(callback));
    }

    /// Set the callback for completed writes to objects with no callback of their own
    pub fn on_any_write(
        &mut self,
        callback: impl FnMut(&mut SlaveContext, u16, u8, &[u8]) -> WriteOutcome + Send + 'static,
    ) {
        self.any_write_callback = Some(Box::new(callback));
    }

    /// Call `callback` every `period`, starting one period after the node starts running
    pub fn on_tick(
        &mut self,
        period: Duration,
        callback: impl FnMut(&mut SlaveContext) + Send + 'static,
    ) {
        self.tick = Some((period, Box::new(callback)));
    }

    /// Set the callback for SYNC messages
    ///
    /// It is called in the PreOperational and Operational states.
    pub fn on_sync(&mut self, callback: impl FnMut(&mut SlaveContext, Option<u8>) + Send + 'static) {
        self.sync_callback = Some(Box::new(callback));
    }

    /// Set the heartbeat producer time (object 0x1017) in milliseconds, with 0 disabling heartbeats
    ///
    /// The object is created if the node does not have one. SDO clients may also change the period
    /// while the node runs.
    pub fn configure_heartbeat(&mut self, period_ms: u16) {
        let entry = ObjectEntry::typed(ObjectValue::U16(period_ms), AccessType::Rw);
        self.insert_object(object_ids::HEARTBEAT_PRODUCER_TIME, 0, entry);
    }

    /// Queue an emergency message, see [`SlaveContext::emcy`]
    pub fn emcy(&mut self, error_code: u16, error_register: u8) {
        self.ctx.emcy(error_code, error_register);
    }

    /// Boot the node, and run it until `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), SlaveError> {
        self.ctx.boot_up();

        let mut heartbeat_period = self.ctx.heartbeat_period();
        let mut next_heartbeat = heartbeat_period.map(|p| Instant::now() + p);
        let mut ticker = self.tick.as_ref().map(|(period, _)| {
            let mut interval = tokio::time::interval_at(Instant::now() + *period, *period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            self.flush_outbox().await;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    log::info!("Node {} shutting down", self.ctx.node_id);
                    return Ok(());
                }
                msg = self.receiver.recv() => {
                    let msg = msg.map_err(|e| SlaveError::Receive { message: format!("{e:?}") })?;
                    self.handle_message(msg);
                }
                _ = sleep_until_some(next_heartbeat) => {
                    self.ctx.send(
                        Heartbeat {
                            node: self.ctx.node_id,
                            state: self.ctx.nmt_state,
                        }
                        .into(),
                    );
                    next_heartbeat = heartbeat_period.map(|p| Instant::now() + p);
                }
                _ = tick_some(&mut ticker) => {
                    if let Some((_, callback)) = self.tick.as_mut() {
                        callback(&mut self.ctx);
                    }
                }
            }

            // Writes to 0x1017 take effect immediately
            let period = self.ctx.heartbeat_period();
            if period != heartbeat_period {
                log::debug!("Heartbeat period changed to {period:?}");
                heartbeat_period = period;
                next_heartbeat = period.map(|p| Instant::now() + p);
            }
        }
    }

    async fn flush_outbox(&mut self) {
        for msg in std::mem::take(&mut self.ctx.outbox) {
            if let Err(e) = self.sender.send(msg).await {
                log::warn!("Node {} failed to send {msg:?}: {}", self.ctx.node_id, e.message());
            }
        }
    }

    fn handle_message(&mut self, msg: CanMessage) {
        let id = msg.id();
        if id == CanId::std(cob_ids::NMT) {
            match NmtCommand::try_from(msg) {
                Ok(cmd) if cmd.addresses(self.ctx.node_id) => self.handle_nmt_command(cmd.cs),
                Ok(_) => (),
                Err(_) => log::warn!("Ignoring invalid NMT command {msg:?}"),
            }
        } else if id == CanId::std(cob_ids::SYNC) {
            if self.ctx.nmt_state == NmtState::Stopped {
                return;
            }
            if let Some(callback) = self.sync_callback.as_mut() {
                callback(&mut self.ctx, msg.data().first().copied());
            }
        } else if id == self.ctx.node_id.sdo_request_id() {
            if self.ctx.nmt_state == NmtState::Stopped {
                return;
            }
            match SdoRequest::try_from(msg) {
                Ok(req) => self.handle_sdo_request(req),
                Err(e) => log::warn!("Ignoring invalid SDO request {msg:?}: {e}"),
            }
        }
    }

    fn handle_sdo_request(&mut self, req: SdoRequest) {
        let response = match self.server.handle(req, &self.ctx.objects) {
            ServerAction::Respond(resp) => Some(resp),
            ServerAction::None => None,
            ServerAction::Write {
                index,
                sub,
                data,
                ack,
            } => {
                let callback = match self.write_callbacks.get_mut(&(index, sub)) {
                    Some(callback) => Some(callback),
                    None => self.any_write_callback.as_mut(),
                };
                let outcome = match callback {
                    Some(callback) => callback(&mut self.ctx, index, sub, &data),
                    None => WriteOutcome::Accept,
                };
                log::debug!("Write to 0x{index:04X}sub{sub}: {data:02X?} -> {outcome:?}");
                match outcome {
                    WriteOutcome::Accept => match self.ctx.objects.set(index, sub, data) {
                        Ok(()) => Some(ack),
                        // A callback removed the object
                        Err(_) => Some(SdoResponse::abort(index, sub, AbortCode::NoSuchObject)),
                    },
                    WriteOutcome::Abort(abort_code) => {
                        Some(SdoResponse::abort(index, sub, abort_code))
                    }
                    WriteOutcome::Ignore => None,
                }
            }
        };
        if let Some(resp) = response {
            let resp_id = self.ctx.node_id.sdo_response_id();
            self.ctx.send(CanMessage::new(resp_id, &resp.to_bytes()));
        }
    }

    fn handle_nmt_command(&mut self, cs: NmtCommandSpecifier) {
        let prev_state = self.ctx.nmt_state;
        match cs {
            NmtCommandSpecifier::Start => self.ctx.nmt_state = NmtState::Operational,
            NmtCommandSpecifier::Stop => {
                self.server.reset();
                self.ctx.nmt_state = NmtState::Stopped;
            }
            NmtCommandSpecifier::EnterPreOp => self.ctx.nmt_state = NmtState::PreOperational,
            NmtCommandSpecifier::ResetApp => {
                self.server.reset();
                self.ctx.objects = self.defaults.clone();
                self.ctx.boot_up();
            }
            NmtCommandSpecifier::ResetComm => {
                self.server.reset();
                self.ctx.objects.restore(&self.defaults, 0x1000..=0x1FFF);
                self.ctx.boot_up();
            }
        }
        log::debug!(
            "NMT state changed from {:?} to {:?}",
            prev_state,
            self.ctx.nmt_state
        );
    }
}
