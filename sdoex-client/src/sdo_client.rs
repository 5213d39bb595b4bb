use std::time::Duration;

use snafu::Snafu;
use sdoex_common::{
    constants::object_ids,
    messages::CanId,
    sdo::{AbortCode, SdoRequest, SdoResponse},
    traits::{AsyncCanReceiver, AsyncCanSender, CanSendError as _},
    CanMessage, NodeId,
};

/// Response timeout used by a new [`SdoClient`]
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(150);

/// A wrapper around the AbortCode enum to allow for unknown values
///
/// Although the library should "know" all the abort codes, it is possible to receive other values
/// and this allows those to be captured and exposed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawAbortCode {
    /// A recognized abort code
    Valid(AbortCode),
    /// An unrecognized abort code
    Unknown(u32),
}

impl std::fmt::Display for RawAbortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawAbortCode::Valid(abort_code) => {
                write!(f, "{abort_code:?} (0x{:08X})", *abort_code as u32)
            }
            RawAbortCode::Unknown(code) => write!(f, "0x{code:08X}"),
        }
    }
}

impl From<u32> for RawAbortCode {
    fn from(value: u32) -> Self {
        match AbortCode::try_from(value) {
            Ok(code) => Self::Valid(code),
            Err(_) => Self::Unknown(value),
        }
    }
}

/// Error returned by [`SdoClient`] methods
#[derive(Clone, Debug, PartialEq, Snafu)]
pub enum SdoClientError {
    /// Timeout while awaiting an expected response
    #[snafu(display("No response from SDO server"))]
    NoResponse,
    /// Received a response that could not be interpreted
    #[snafu(display("Malformed SDO response"))]
    MalformedResponse,
    /// Received a valid SdoResponse, but with an unexpected command specifier
    #[snafu(display("Unexpected SDO response. Expected {expecting}, got {response:?}"))]
    UnexpectedResponse {
        /// The type of response which was expected
        expecting: String,
        /// The response which was received
        response: SdoResponse,
    },
    /// Received a ServerAbort response from the node
    #[snafu(display("Received abort accessing object 0x{index:X}sub{sub}: {abort_code}"))]
    ServerAbort {
        /// Index of the SDO access which was aborted
        index: u16,
        /// Sub index of the SDO access which was aborted
        sub: u8,
        /// Reason for the abort
        abort_code: RawAbortCode,
    },
    /// Received a response with the wrong toggle bit
    #[snafu(display("SDO server did not alternate the toggle bit"))]
    ToggleNotAlternated,
    /// Received a response with a different index/sub value than was requested
    #[snafu(display("Received object 0x{:x}sub{} after requesting 0x{:x}sub{}",
        received.0, received.1, expected.0, expected.1))]
    MismatchedObjectIndex {
        /// The object ID which was expected to be echoed back
        expected: (u16, u8),
        /// The received object ID
        received: (u16, u8),
    },
    /// An SDO upload response had a size that did not match the expected size
    #[snafu(display("SDO upload returned an unexpected number of bytes"))]
    UnexpectedSize,
    /// Failed to write a message to the socket
    #[snafu(display("Failed to send CAN message: {message}"))]
    SocketSendFailed {
        /// A string describing the error reason
        message: String,
    },
}

type Result<T> = std::result::Result<T, SdoClientError>;

/// Convenience macro for expecting a particular variant of a response and erroring on abort of
/// unexpected variant
macro_rules! match_response  {
    ($resp: ident, $expecting: literal, $($match:pat => $code : expr),*) => {
                match $resp {
                    $($match => $code),*
                    SdoResponse::Abort {
                        index,
                        sub,
                        abort_code,
                    } => {
                        return ServerAbortSnafu {
                            index,
                            sub,
                            abort_code,
                        }
                        .fail()
                    }
                    _ => {
                        return UnexpectedResponseSnafu {
                            expecting: $expecting,
                            response: $resp,
                        }
                        .fail()
                    }
                }
    };
}

use paste::paste;
macro_rules! access_methods {
    ($type: ty) => {

        paste! {
            #[doc = concat!("Read a ", stringify!($type), " sub object from the SDO server\n\n")]
            #[doc = concat!("This is an alias for upload_", stringify!($type), " for a more intuitive API")]
            pub async fn [<read_ $type>](&mut self, index: u16, sub: u8) -> Result<$type> {
                self.[<upload_ $type>](index, sub).await
            }

            #[doc = concat!("Read a ", stringify!($type), " sub object from the SDO server")]
            pub async fn [<upload_ $type>](&mut self, index: u16, sub: u8) -> Result<$type> {
                let data = self.upload(index, sub).await?;
                let bytes = data.try_into().map_err(|_| UnexpectedSizeSnafu.build())?;
                Ok($type::from_le_bytes(bytes))
            }

            #[doc = concat!("Write a ", stringify!($type), " sub object on the SDO server\n\n")]
            #[doc = concat!("This is an alias for download_", stringify!($type), " for a more intuitive API")]
            pub async fn [<write_ $type>](&mut self, index: u16, sub: u8, value: $type) -> Result<()> {
                self.[<download_ $type>](index, sub, value).await
            }

            #[doc = concat!("Write a ", stringify!($type), " sub object on the SDO server")]
            pub async fn [<download_ $type>](&mut self, index: u16, sub: u8, value: $type) -> Result<()> {
                let data = value.to_le_bytes();
                self.download(index, sub, &data).await
            }
        }
    };
}

#[derive(Debug)]
/// A client for accessing a node's SDO server
///
/// A single server can talk to a single client at a time.
pub struct SdoClient<S, R> {
    req_cob_id: CanId,
    resp_cob_id: CanId,
    timeout: Duration,
    sender: S,
    receiver: R,
}

impl<S: AsyncCanSender, R: AsyncCanReceiver> SdoClient<S, R> {
    /// Create a new SdoClient using a node ID
    ///
    /// Nodes have a default SDO server, which uses a COB ID based on the node ID. This is a
    /// shortcut to create a client that that default SDO server.
    ///
    /// It is possible for nodes to have other SDO servers on other COB IDs, and clients for these
    /// can be created using [`Self::new()`]
    pub fn new_std(server_node_id: NodeId, sender: S, receiver: R) -> Self {
        Self::new(
            server_node_id.sdo_request_id(),
            server_node_id.sdo_response_id(),
            sender,
            receiver,
        )
    }

    /// Create a new SdoClient from request and response COB IDs
    pub fn new(req_cob_id: CanId, resp_cob_id: CanId, sender: S, receiver: R) -> Self {
        Self {
            req_cob_id,
            resp_cob_id,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            sender,
            receiver,
        }
    }

    /// Set the timeout for waiting on SDO server responses
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Get the current timeout for waiting on SDO server responses
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    async fn send(&mut self, data: [u8; 8]) -> Result<()> {
        let frame = CanMessage::new(self.req_cob_id, &data);
        let mut tries = 3;
        loop {
            match self.sender.send(frame).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tries -= 1;
                    log::debug!("Retrying SDO request send after error: {}", e.message());
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    if tries == 0 {
                        return SocketSendFailedSnafu {
                            message: e.message(),
                        }
                        .fail();
                    }
                }
            }
        }
    }

    /// Write data to a sub-object on the SDO server
    ///
    /// Up to 4 bytes are sent as an expedited transfer; longer data uses a segmented transfer.
    pub async fn download(&mut self, index: u16, sub: u8, data: &[u8]) -> Result<()> {
        // Discard any late responses left over from an earlier request
        self.receiver.flush();

        if data.len() <= 4 {
            // Do an expedited transfer
            self.send(SdoRequest::expedited_download(index, sub, data).to_bytes())
                .await?;

            let resp = self.wait_for_response().await?;
            match_response!(
                resp,
                "ConfirmDownload",
                SdoResponse::ConfirmDownload { index: resp_index, sub: resp_sub } => {
                    check_mux((index, sub), (resp_index, resp_sub))
                }
            )
        } else {
            self.send(
                SdoRequest::initiate_download(index, sub, Some(data.len() as u32)).to_bytes(),
            )
            .await?;

            let resp = self.wait_for_response().await?;
            match_response!(
                resp,
                "ConfirmDownload",
                SdoResponse::ConfirmDownload { index: resp_index, sub: resp_sub } => {
                    check_mux((index, sub), (resp_index, resp_sub))?
                }
            );

            let mut toggle = false;
            // Send segments
            let total_segments = data.len().div_ceil(7);
            for n in 0..total_segments {
                let last_segment = n == total_segments - 1;
                let segment_size = (data.len() - n * 7).min(7);
                let seg_msg = SdoRequest::download_segment(
                    toggle,
                    last_segment,
                    &data[n * 7..n * 7 + segment_size],
                );
                self.send(seg_msg.to_bytes()).await?;
                let resp = self.wait_for_response().await?;
                match_response!(
                    resp,
                    "ConfirmDownloadSegment",
                    SdoResponse::ConfirmDownloadSegment { t } => {
                        // Fail if toggle value doesn't match
                        if t != toggle {
                            let abort_msg =
                                SdoRequest::abort(index, sub, AbortCode::ToggleNotAlternated);

                            self.send(abort_msg.to_bytes())
                                .await?;
                            return ToggleNotAlternatedSnafu.fail();
                        }
                        // Otherwise, carry on
                    }
                );
                toggle = !toggle;
            }
            Ok(())
        }
    }

    /// Read a sub-object on the SDO server
    pub async fn upload(&mut self, index: u16, sub: u8) -> Result<Vec<u8>> {
        let mut read_buf = Vec::new();

        self.receiver.flush();
        self.send(SdoRequest::initiate_upload(index, sub).to_bytes())
            .await?;

        let resp = self.wait_for_response().await?;

        let expedited = match_response!(
            resp,
            "ConfirmUpload",
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index: resp_index,
                sub: resp_sub,
                data,
            } => {
                check_mux((index, sub), (resp_index, resp_sub))?;
                if e {
                    // Without a size indication, all 4 bytes are taken as data
                    let len = if s { 4 - n as usize } else { 4 };
                    read_buf.extend_from_slice(&data[0..len]);
                }
                e
            }
        );

        if !expedited {
            // Read segments
            let mut toggle = false;
            loop {
                self.send(SdoRequest::upload_segment_request(toggle).to_bytes())
                    .await?;

                let resp = self.wait_for_response().await?;
                match_response!(
                    resp,
                    "UploadSegment",
                    SdoResponse::UploadSegment { t, n, c, data } => {
                        if t != toggle {
                            self.send(
                                    SdoRequest::abort(index, sub, AbortCode::ToggleNotAlternated)
                                        .to_bytes(),
                                )
                                .await?;
                            return ToggleNotAlternatedSnafu.fail();
                        }
                        read_buf.extend_from_slice(&data[0..7 - n as usize]);
                        if c {
                            // Transfer complete
                            break;
                        }
                    }
                );
                toggle = !toggle;
            }
        }
        Ok(read_buf)
    }

    access_methods!(f64);
    access_methods!(f32);
    access_methods!(u64);
    access_methods!(u32);
    access_methods!(u16);
    access_methods!(u8);
    access_methods!(i64);
    access_methods!(i32);
    access_methods!(i16);
    access_methods!(i8);

    /// Read an object as a visible string
    ///
    /// It will be read and assumed to contain valid UTF8 characters
    pub async fn read_visible_string(&mut self, index: u16, sub: u8) -> Result<String> {
        let bytes = self.upload(index, sub).await?;
        Ok(String::from_utf8_lossy(&bytes).into())
    }

    /// Read the device name object
    ///
    /// All nodes should implement this object
    pub async fn read_device_name(&mut self) -> Result<String> {
        self.read_visible_string(object_ids::DEVICE_NAME, 0).await
    }

    async fn wait_for_response(&mut self) -> Result<SdoResponse> {
        let wait_until = tokio::time::Instant::now() + self.timeout;
        loop {
            match tokio::time::timeout_at(wait_until, self.receiver.recv()).await {
                // Err indicates the timeout elapsed, so return
                Err(_) => return NoResponseSnafu.fail(),
                // Message was recieved. If it is the resp, return. Otherwise, keep waiting
                Ok(Ok(msg)) => {
                    if msg.id() == self.resp_cob_id {
                        return msg.try_into().map_err(|_| MalformedResponseSnafu.build());
                    }
                }
                // Recv returned an error
                Ok(Err(e)) => {
                    log::error!("Error reading from socket: {e:?}");
                    return NoResponseSnafu.fail();
                }
            }
        }
    }
}

fn check_mux(expected: (u16, u8), received: (u16, u8)) -> Result<()> {
    if expected == received {
        Ok(())
    } else {
        MismatchedObjectIndexSnafu { expected, received }.fail()
    }
}
