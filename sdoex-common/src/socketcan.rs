use std::sync::Arc;

use crate::{
    messages::{CanError, CanId, CanMessage},
    traits::{AsyncCanReceiver, AsyncCanSender, CanSendError},
};
use snafu::{ResultExt, Snafu};
use socketcan::{
    CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame as _, Id, ShouldRetry, Socket,
    StandardId,
};
use tokio::io::{unix::AsyncFd, Interest};

fn socketcan_id_to_sdoex_id(id: Id) -> CanId {
    match id {
        Id::Standard(id) => CanId::std(id.as_raw()),
        Id::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn sdoex_id_to_socketcan_id(id: CanId) -> Option<Id> {
    match id {
        CanId::Extended(id) => ExtendedId::new(id).map(Id::Extended),
        CanId::Std(id) => StandardId::new(id).map(Id::Standard),
    }
}

fn socketcan_frame_to_sdoex_message(frame: CanFrame) -> Result<CanMessage, CanError> {
    let id = socketcan_id_to_sdoex_id(EmbeddedFrame::id(&frame));

    match frame {
        CanFrame::Data(frame) => Ok(CanMessage::new(id, EmbeddedFrame::data(&frame))),
        CanFrame::Remote(_) => Ok(CanMessage::new_rtr(id)),
        CanFrame::Error(frame) => Err(CanError::from_raw(frame.error_bits() as u32)),
    }
}

fn sdoex_message_to_socket_frame(msg: CanMessage) -> Option<CanFrame> {
    let id = sdoex_id_to_socketcan_id(msg.id())?;

    if msg.is_rtr() {
        CanFrame::new_remote(id, 0)
    } else {
        CanFrame::new(id, msg.data())
    }
}

/// Error returned by [`SocketCanReceiver`]
#[derive(Debug, Snafu)]
pub enum ReceiveError {
    /// The socket returned an IO error
    #[snafu(display("Error reading CAN socket: {source}"))]
    Io {
        /// The underlying error
        source: socketcan::IoError,
    },
    /// An error frame was received
    #[snafu(display("{source}"))]
    Can {
        /// The decoded error frame
        source: CanError,
    },
}

/// Error returned by [`SocketCanSender`]
#[derive(Debug)]
pub struct SocketCanSendError {
    msg: CanMessage,
    reason: String,
}

impl CanSendError for SocketCanSendError {
    fn into_can_message(self) -> CanMessage {
        self.msg
    }

    fn message(&self) -> String {
        self.reason.clone()
    }
}

/// Create an Async socket around a socketcan CanSocket. This is just a reimplemenation of the tokio
/// socket in the `socketcan` crate, but with support for `try_read_frame` added.
#[derive(Debug)]
struct AsyncCanSocket(AsyncFd<CanSocket>);

impl AsyncCanSocket {
    pub fn open(ifname: &str) -> Result<Self, std::io::Error> {
        let socket = CanSocket::open(ifname)?;
        socket.set_nonblocking(true)?;
        Ok(Self(AsyncFd::new(socket)?))
    }

    /// Attempt to read a CAN frame from the socket without blocking
    ///
    /// If no message is immediately available, a WouldBlock error is returned.
    pub fn try_read_frame(&self) -> Result<CanFrame, std::io::Error> {
        self.0.get_ref().read_frame()
    }

    /// Read a CAN frame from the socket asynchronously
    pub async fn read_frame(&self) -> Result<CanFrame, std::io::Error> {
        self.0
            .async_io(Interest::READABLE, |inner| inner.read_frame())
            .await
    }

    pub async fn write_frame(&self, frame: &CanFrame) -> Result<(), std::io::Error> {
        self.0
            .async_io(Interest::WRITABLE, |inner| inner.write_frame(frame))
            .await
    }
}

/// The receiving half of a socketcan interface
#[derive(Debug, Clone)]
pub struct SocketCanReceiver {
    socket: Arc<AsyncCanSocket>,
}

impl AsyncCanReceiver for SocketCanReceiver {
    type Error = ReceiveError;

    fn try_recv(&mut self) -> Option<CanMessage> {
        loop {
            match self.socket.try_read_frame() {
                Ok(frame) => match socketcan_frame_to_sdoex_message(frame) {
                    Ok(msg) => return Some(msg),
                    // Error frames carry nothing for the caller; skip to the next frame
                    Err(e) => log::debug!("Dropping {e}"),
                },
                Err(_) => return None,
            }
        }
    }

    async fn recv(&mut self) -> Result<CanMessage, ReceiveError> {
        loop {
            match self.socket.read_frame().await {
                Ok(frame) => return socketcan_frame_to_sdoex_message(frame).context(CanSnafu),
                Err(e) => {
                    if !e.should_retry() {
                        return Err(ReceiveError::Io { source: e });
                    }
                }
            }
        }
    }
}

/// The sending half of a socketcan interface
#[derive(Debug, Clone)]
pub struct SocketCanSender {
    socket: Arc<AsyncCanSocket>,
}

impl AsyncCanSender for SocketCanSender {
    type Error = SocketCanSendError;

    async fn send(&mut self, msg: CanMessage) -> Result<(), SocketCanSendError> {
        let Some(socketcan_frame) = sdoex_message_to_socket_frame(msg) else {
            return Err(SocketCanSendError {
                msg,
                reason: format!("Cannot build a CAN frame for ID {}", msg.id()),
            });
        };

        self.socket
            .write_frame(&socketcan_frame)
            .await
            .map_err(|e| SocketCanSendError {
                msg,
                reason: e.to_string(),
            })
    }
}

/// Open a socketcan device and split it into a sender and receiver object for use with sdoex
/// library
///
/// # Arguments
/// * `device` - The name of the socketcan device to open, e.g. "vcan0", or "can0"
///
/// A key benefit of this is that by creating both sender and receiver objects from a shared socket,
/// the receiver will not receive messages sent by the sender.
#[cfg_attr(docsrs, doc(cfg(feature = "socketcan")))]
pub fn open_socketcan<S: AsRef<str>>(
    device: S,
) -> Result<(SocketCanSender, SocketCanReceiver), socketcan::IoError> {
    let device: &str = device.as_ref();
    let socket = Arc::new(AsyncCanSocket::open(device)?);
    let receiver = SocketCanReceiver {
        socket: socket.clone(),
    };
    let sender = SocketCanSender { socket };
    Ok((sender, receiver))
}
