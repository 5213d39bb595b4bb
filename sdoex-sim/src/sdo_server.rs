//! SDO server state machine
//!
//! Handles expedited and segmented transfers in both directions on a node's default SDO channel.
//! The server never changes the object store itself: a completed download is returned as a
//! [`ServerAction::Write`], so that the node can decide whether to accept it.
use sdoex_common::sdo::{AbortCode, SdoRequest, SdoResponse};

use crate::object_store::ObjectStore;

/// What the node should do in response to a request
#[derive(Clone, Debug, PartialEq)]
pub enum ServerAction {
    /// Send the response
    Respond(SdoResponse),
    /// A download completed. Store the data and send `ack`, or abort.
    Write {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// The downloaded data
        data: Vec<u8>,
        /// The response confirming the write
        ack: SdoResponse,
    },
    /// Nothing to send
    None,
}

#[derive(Debug, Default)]
enum TransferState {
    #[default]
    Idle,
    Downloading {
        index: u16,
        sub: u8,
        toggle: bool,
        buf: Vec<u8>,
    },
    Uploading {
        index: u16,
        sub: u8,
        toggle: bool,
        data: Vec<u8>,
        pos: usize,
    },
}

/// The server side of one SDO channel
#[derive(Debug, Default)]
pub struct SdoServer {
    state: TransferState,
}

fn abort(index: u16, sub: u8, abort_code: AbortCode) -> ServerAction {
    ServerAction::Respond(SdoResponse::abort(index, sub, abort_code))
}

impl SdoServer {
    /// Create a server with no transfer in progress
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandon any transfer in progress
    pub fn reset(&mut self) {
        self.state = TransferState::Idle;
    }

    /// Returns true if a segmented transfer is in progress
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, TransferState::Idle)
    }

    /// Process one request
    pub fn handle(&mut self, req: SdoRequest, objects: &ObjectStore) -> ServerAction {
        match req {
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                self.state = TransferState::Idle;
                if e {
                    let len = if s { 4 - n as usize } else { 4 };
                    if let Err(abort_code) = objects.check_write(index, sub, len) {
                        return abort(index, sub, abort_code);
                    }
                    ServerAction::Write {
                        index,
                        sub,
                        data: data[..len].to_vec(),
                        ack: SdoResponse::download_acknowledge(index, sub),
                    }
                } else {
                    let check = if s {
                        objects.check_write(index, sub, u32::from_le_bytes(data) as usize)
                    } else {
                        objects.check_writable(index, sub).map(|_| ())
                    };
                    if let Err(abort_code) = check {
                        return abort(index, sub, abort_code);
                    }
                    self.state = TransferState::Downloading {
                        index,
                        sub,
                        toggle: false,
                        buf: Vec::new(),
                    };
                    ServerAction::Respond(SdoResponse::download_acknowledge(index, sub))
                }
            }
            SdoRequest::DownloadSegment { t, n, c, data } => {
                let TransferState::Downloading {
                    index,
                    sub,
                    toggle,
                    buf,
                } = &mut self.state
                else {
                    return abort(0, 0, AbortCode::InvalidCommandSpecifier);
                };
                let (index, sub) = (*index, *sub);
                if t != *toggle {
                    self.state = TransferState::Idle;
                    return abort(index, sub, AbortCode::ToggleNotAlternated);
                }
                buf.extend_from_slice(&data[..7 - n as usize]);
                *toggle = !*toggle;
                let ack = SdoResponse::download_segment_acknowledge(t);
                if !c {
                    return ServerAction::Respond(ack);
                }
                let data = std::mem::take(buf);
                self.state = TransferState::Idle;
                if let Err(abort_code) = objects.check_write(index, sub, data.len()) {
                    return abort(index, sub, abort_code);
                }
                ServerAction::Write {
                    index,
                    sub,
                    data,
                    ack,
                }
            }
            SdoRequest::InitiateUpload { index, sub } => {
                self.state = TransferState::Idle;
                match objects.check_read(index, sub) {
                    Err(abort_code) => abort(index, sub, abort_code),
                    Ok(value) if value.len() <= 4 => {
                        ServerAction::Respond(SdoResponse::expedited_upload(index, sub, value))
                    }
                    Ok(value) => {
                        let size = value.len() as u32;
                        self.state = TransferState::Uploading {
                            index,
                            sub,
                            toggle: false,
                            data: value.to_vec(),
                            pos: 0,
                        };
                        ServerAction::Respond(SdoResponse::upload_acknowledge(index, sub, size))
                    }
                }
            }
            SdoRequest::ReqUploadSegment { t } => {
                let TransferState::Uploading {
                    index,
                    sub,
                    toggle,
                    data,
                    pos,
                } = &mut self.state
                else {
                    return abort(0, 0, AbortCode::InvalidCommandSpecifier);
                };
                if t != *toggle {
                    let action = abort(*index, *sub, AbortCode::ToggleNotAlternated);
                    self.state = TransferState::Idle;
                    return action;
                }
                let end = (*pos + 7).min(data.len());
                let last = end == data.len();
                let resp = SdoResponse::upload_segment(t, last, &data[*pos..end]);
                *pos = end;
                *toggle = !*toggle;
                if last {
                    self.state = TransferState::Idle;
                }
                ServerAction::Respond(resp)
            }
            SdoRequest::Abort { .. } => {
                self.state = TransferState::Idle;
                ServerAction::None
            }
        }
    }
}
