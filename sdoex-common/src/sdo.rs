//! SDO protocol messages
//!
//! Implements the command frames used for expedited and segmented SDO transfers, in both
//! directions. All SDO frames are exactly 8 bytes: a command byte, followed by either a
//! multiplexer (index and sub) and up to 4 data bytes, or up to 7 segment data bytes.
use int_enum::IntEnum;
use snafu::Snafu;

use crate::messages::CanMessage;

/// Abort codes which may be sent by either client or server to end a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntEnum)]
#[repr(u32)]
pub enum AbortCode {
    /// Toggle bit not alternated
    ToggleNotAlternated = 0x0503_0000,
    /// SDO protocol timed out
    SdoTimeout = 0x0504_0000,
    /// Client/server command specifier not valid or unknown
    InvalidCommandSpecifier = 0x0504_0001,
    /// Invalid block size
    InvalidBlockSize = 0x0504_0002,
    /// Invalid sequence number
    InvalidSequenceNumber = 0x0504_0003,
    /// CRC error
    CrcError = 0x0504_0004,
    /// Out of memory
    OutOfMemory = 0x0504_0005,
    /// Unsupported access to an object
    UnsupportedAccess = 0x0601_0000,
    /// Attempt to read a write only object
    WriteOnly = 0x0601_0001,
    /// Attempt to write a read only object
    ReadOnly = 0x0601_0002,
    /// Object does not exist in the object dictionary
    NoSuchObject = 0x0602_0000,
    /// Object cannot be mapped to the PDO
    UnmappablePdo = 0x0604_0041,
    /// The number and length of objects would exceed PDO length
    PdoTooLong = 0x0604_0042,
    /// General parameter incompatibility
    IncompatibleParameter = 0x0604_0043,
    /// General internal incompatibility in the device
    InternalIncompatibility = 0x0604_0047,
    /// Access failed due to a hardware error
    HardwareError = 0x0606_0000,
    /// Data type does not match, length of service parameter does not match
    DataTypeMismatch = 0x0607_0010,
    /// Data type does not match, length of service parameter too high
    DataTypeMismatchLengthHigh = 0x0607_0012,
    /// Data type does not match, length of service parameter too low
    DataTypeMismatchLengthLow = 0x0607_0013,
    /// Sub-index does not exist
    NoSuchSubIndex = 0x0609_0011,
    /// Invalid value for parameter (download only)
    InvalidValue = 0x0609_0030,
    /// Value of parameter written too high
    ValueTooHigh = 0x0609_0031,
    /// Value of parameter written too low
    ValueTooLow = 0x0609_0032,
    /// Maximum value is less than minimum value
    MaxLessThanMin = 0x0609_0036,
    /// Resource not available: SDO connection
    ResourceNotAvailable = 0x060A_0023,
    /// General error
    GeneralError = 0x0800_0000,
    /// Data cannot be transferred or stored to the application
    CantStore = 0x0800_0020,
    /// Data cannot be transferred or stored because of local control
    CantStoreLocalControl = 0x0800_0021,
    /// Data cannot be transferred or stored because of the present device state
    CantStoreDeviceState = 0x0800_0022,
    /// Object dictionary dynamic generation failed or no object dictionary is present
    NoObjectDict = 0x0800_0023,
    /// No data available
    NoData = 0x0800_0024,
}

/// Error returned when bytes cannot be decoded into an SDO message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Snafu)]
pub enum SdoParseError {
    /// SDO frames must carry exactly 8 bytes
    #[snafu(display("SDO frame must be 8 bytes, got {len}"))]
    WrongLength {
        /// The length received
        len: usize,
    },
    /// The command specifier is not one this codec understands
    #[snafu(display("Unsupported SDO command specifier {cs}"))]
    UnsupportedCommand {
        /// The 3-bit command specifier
        cs: u8,
    },
}

const CS_SHIFT: u8 = 5;

// Client command specifiers
const CCS_DOWNLOAD_SEGMENT: u8 = 0;
const CCS_INITIATE_DOWNLOAD: u8 = 1;
const CCS_INITIATE_UPLOAD: u8 = 2;
const CCS_UPLOAD_SEGMENT: u8 = 3;
const CS_ABORT: u8 = 4;

// Server command specifiers
const SCS_UPLOAD_SEGMENT: u8 = 0;
const SCS_DOWNLOAD_SEGMENT: u8 = 1;
const SCS_INITIATE_UPLOAD: u8 = 2;
const SCS_INITIATE_DOWNLOAD: u8 = 3;

fn check_len(value: &[u8]) -> Result<&[u8; 8], SdoParseError> {
    value
        .try_into()
        .map_err(|_| WrongLengthSnafu { len: value.len() }.build())
}

fn read_mux(bytes: &[u8; 8]) -> (u16, u8) {
    (u16::from_le_bytes([bytes[1], bytes[2]]), bytes[3])
}

fn write_mux(bytes: &mut [u8; 8], index: u16, sub: u8) {
    bytes[1..3].copy_from_slice(&index.to_le_bytes());
    bytes[3] = sub;
}

fn abort_bytes(index: u16, sub: u8, abort_code: u32) -> [u8; 8] {
    let mut bytes = [0; 8];
    bytes[0] = CS_ABORT << CS_SHIFT;
    write_mux(&mut bytes, index, sub);
    bytes[4..8].copy_from_slice(&abort_code.to_le_bytes());
    bytes
}

/// A request sent from an SDO client to an SDO server
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdoRequest {
    /// Begin a download, either carrying the data (expedited) or announcing a segmented transfer
    InitiateDownload {
        /// Number of bytes in `data` which do NOT contain data (only valid when `e` and `s` are set)
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size indicated flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
        /// Expedited data, or the total transfer size when not expedited
        data: [u8; 4],
    },
    /// A segment of a segmented download
    DownloadSegment {
        /// Toggle bit
        t: bool,
        /// Number of bytes in `data` which do NOT contain data
        n: u8,
        /// Set on the final segment
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Begin an upload
    InitiateUpload {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
    },
    /// Request the next upload segment
    ReqUploadSegment {
        /// Toggle bit
        t: bool,
    },
    /// Abort the ongoing transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
        /// Raw abort code
        abort_code: u32,
    },
}

impl SdoRequest {
    /// Create an expedited download request carrying up to 4 bytes
    ///
    /// Panics if data is longer than 4 bytes
    pub fn expedited_download(index: u16, sub: u8, data: &[u8]) -> Self {
        assert!(data.len() <= 4);
        let mut buf = [0; 4];
        buf[..data.len()].copy_from_slice(data);
        SdoRequest::InitiateDownload {
            n: (4 - data.len()) as u8,
            e: true,
            s: true,
            index,
            sub,
            data: buf,
        }
    }

    /// Create an initiate download request for a segmented transfer
    pub fn initiate_download(index: u16, sub: u8, size: Option<u32>) -> Self {
        SdoRequest::InitiateDownload {
            n: 0,
            e: false,
            s: size.is_some(),
            index,
            sub,
            data: size.unwrap_or(0).to_le_bytes(),
        }
    }

    /// Create a download segment request carrying up to 7 bytes
    ///
    /// Panics if data is longer than 7 bytes
    pub fn download_segment(toggle: bool, last_segment: bool, data: &[u8]) -> Self {
        assert!(data.len() <= 7);
        let mut buf = [0; 7];
        buf[..data.len()].copy_from_slice(data);
        SdoRequest::DownloadSegment {
            t: toggle,
            n: (7 - data.len()) as u8,
            c: last_segment,
            data: buf,
        }
    }

    /// Create an initiate upload request
    pub fn initiate_upload(index: u16, sub: u8) -> Self {
        SdoRequest::InitiateUpload { index, sub }
    }

    /// Create a request for the next upload segment
    pub fn upload_segment_request(toggle: bool) -> Self {
        SdoRequest::ReqUploadSegment { t: toggle }
    }

    /// Create an abort request
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoRequest::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Serialize the request into the 8 frame data bytes
    pub fn to_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        match self {
            SdoRequest::InitiateDownload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                bytes[0] = (CCS_INITIATE_DOWNLOAD << CS_SHIFT)
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                write_mux(&mut bytes, index, sub);
                bytes[4..8].copy_from_slice(&data);
            }
            SdoRequest::DownloadSegment { t, n, c, data } => {
                bytes[0] = (CCS_DOWNLOAD_SEGMENT << CS_SHIFT)
                    | ((t as u8) << 4)
                    | ((n & 0x7) << 1)
                    | (c as u8);
                bytes[1..8].copy_from_slice(&data);
            }
            SdoRequest::InitiateUpload { index, sub } => {
                bytes[0] = CCS_INITIATE_UPLOAD << CS_SHIFT;
                write_mux(&mut bytes, index, sub);
            }
            SdoRequest::ReqUploadSegment { t } => {
                bytes[0] = (CCS_UPLOAD_SEGMENT << CS_SHIFT) | ((t as u8) << 4);
            }
            SdoRequest::Abort {
                index,
                sub,
                abort_code,
            } => bytes = abort_bytes(index, sub, abort_code),
        }
        bytes
    }
}

impl TryFrom<&[u8]> for SdoRequest {
    type Error = SdoParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes = check_len(value)?;
        let cmd = bytes[0];
        let ccs = cmd >> CS_SHIFT;
        match ccs {
            CCS_INITIATE_DOWNLOAD => {
                let (index, sub) = read_mux(bytes);
                Ok(SdoRequest::InitiateDownload {
                    n: (cmd >> 2) & 0x3,
                    e: (cmd & 0x2) != 0,
                    s: (cmd & 0x1) != 0,
                    index,
                    sub,
                    data: [bytes[4], bytes[5], bytes[6], bytes[7]],
                })
            }
            CCS_DOWNLOAD_SEGMENT => {
                let mut data = [0; 7];
                data.copy_from_slice(&bytes[1..8]);
                Ok(SdoRequest::DownloadSegment {
                    t: (cmd & 0x10) != 0,
                    n: (cmd >> 1) & 0x7,
                    c: (cmd & 0x1) != 0,
                    data,
                })
            }
            CCS_INITIATE_UPLOAD => {
                let (index, sub) = read_mux(bytes);
                Ok(SdoRequest::InitiateUpload { index, sub })
            }
            CCS_UPLOAD_SEGMENT => Ok(SdoRequest::ReqUploadSegment {
                t: (cmd & 0x10) != 0,
            }),
            CS_ABORT => {
                let (index, sub) = read_mux(bytes);
                Ok(SdoRequest::Abort {
                    index,
                    sub,
                    abort_code: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
                })
            }
            cs => UnsupportedCommandSnafu { cs }.fail(),
        }
    }
}

/// A response sent from an SDO server to an SDO client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdoResponse {
    /// Response to an initiate upload, carrying data if expedited
    ConfirmUpload {
        /// Number of bytes in `data` which do NOT contain data (only valid when `e` and `s` are set)
        n: u8,
        /// Expedited flag
        e: bool,
        /// Size indicated flag
        s: bool,
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
        /// Expedited data, or the total transfer size when not expedited
        data: [u8; 4],
    },
    /// A segment of a segmented upload
    UploadSegment {
        /// Toggle bit
        t: bool,
        /// Number of bytes in `data` which do NOT contain data
        n: u8,
        /// Set on the final segment
        c: bool,
        /// Segment data
        data: [u8; 7],
    },
    /// Response to an initiate download
    ConfirmDownload {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
    },
    /// Response to a download segment
    ConfirmDownloadSegment {
        /// Toggle bit, echoed from the request
        t: bool,
    },
    /// The server aborted the transfer
    Abort {
        /// Object index
        index: u16,
        /// Object sub index
        sub: u8,
        /// Raw abort code
        abort_code: u32,
    },
}

impl SdoResponse {
    /// Create an expedited upload response carrying up to 4 bytes
    ///
    /// Panics if data is longer than 4 bytes
    pub fn expedited_upload(index: u16, sub: u8, data: &[u8]) -> Self {
        assert!(data.len() <= 4);
        let mut buf = [0; 4];
        buf[..data.len()].copy_from_slice(data);
        SdoResponse::ConfirmUpload {
            n: (4 - data.len()) as u8,
            e: true,
            s: true,
            index,
            sub,
            data: buf,
        }
    }

    /// Create an upload response announcing a segmented upload of `size` bytes
    pub fn upload_acknowledge(index: u16, sub: u8, size: u32) -> Self {
        SdoResponse::ConfirmUpload {
            n: 0,
            e: false,
            s: true,
            index,
            sub,
            data: size.to_le_bytes(),
        }
    }

    /// Create an upload segment carrying up to 7 bytes
    ///
    /// Panics if data is longer than 7 bytes
    pub fn upload_segment(toggle: bool, last_segment: bool, data: &[u8]) -> Self {
        assert!(data.len() <= 7);
        let mut buf = [0; 7];
        buf[..data.len()].copy_from_slice(data);
        SdoResponse::UploadSegment {
            t: toggle,
            n: (7 - data.len()) as u8,
            c: last_segment,
            data: buf,
        }
    }

    /// Create a download confirmation
    pub fn download_acknowledge(index: u16, sub: u8) -> Self {
        SdoResponse::ConfirmDownload { index, sub }
    }

    /// Create a download segment confirmation
    pub fn download_segment_acknowledge(toggle: bool) -> Self {
        SdoResponse::ConfirmDownloadSegment { t: toggle }
    }

    /// Create an abort response
    pub fn abort(index: u16, sub: u8, abort_code: AbortCode) -> Self {
        SdoResponse::Abort {
            index,
            sub,
            abort_code: abort_code as u32,
        }
    }

    /// Serialize the response into the 8 frame data bytes
    pub fn to_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        match self {
            SdoResponse::ConfirmUpload {
                n,
                e,
                s,
                index,
                sub,
                data,
            } => {
                bytes[0] = (SCS_INITIATE_UPLOAD << CS_SHIFT)
                    | ((n & 0x3) << 2)
                    | ((e as u8) << 1)
                    | (s as u8);
                write_mux(&mut bytes, index, sub);
                bytes[4..8].copy_from_slice(&data);
            }
            SdoResponse::UploadSegment { t, n, c, data } => {
                bytes[0] = (SCS_UPLOAD_SEGMENT << CS_SHIFT)
                    | ((t as u8) << 4)
                    | ((n & 0x7) << 1)
                    | (c as u8);
                bytes[1..8].copy_from_slice(&data);
            }
            SdoResponse::ConfirmDownload { index, sub } => {
                bytes[0] = SCS_INITIATE_DOWNLOAD << CS_SHIFT;
                write_mux(&mut bytes, index, sub);
            }
            SdoResponse::ConfirmDownloadSegment { t } => {
                bytes[0] = (SCS_DOWNLOAD_SEGMENT << CS_SHIFT) | ((t as u8) << 4);
            }
            SdoResponse::Abort {
                index,
                sub,
                abort_code,
            } => bytes = abort_bytes(index, sub, abort_code),
        }
        bytes
    }
}

impl TryFrom<&[u8]> for SdoResponse {
    type Error = SdoParseError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes = check_len(value)?;
        let cmd = bytes[0];
        let scs = cmd >> CS_SHIFT;
        match scs {
            SCS_INITIATE_UPLOAD => {
                let (index, sub) = read_mux(bytes);
                Ok(SdoResponse::ConfirmUpload {
                    n: (cmd >> 2) & 0x3,
                    e: (cmd & 0x2) != 0,
                    s: (cmd & 0x1) != 0,
                    index,
                    sub,
                    data: [bytes[4], bytes[5], bytes[6], bytes[7]],
                })
            }
            SCS_UPLOAD_SEGMENT => {
                let mut data = [0; 7];
                data.copy_from_slice(&bytes[1..8]);
                Ok(SdoResponse::UploadSegment {
                    t: (cmd & 0x10) != 0,
                    n: (cmd >> 1) & 0x7,
                    c: (cmd & 0x1) != 0,
                    data,
                })
            }
            SCS_INITIATE_DOWNLOAD => {
                let (index, sub) = read_mux(bytes);
                Ok(SdoResponse::ConfirmDownload { index, sub })
            }
            SCS_DOWNLOAD_SEGMENT => Ok(SdoResponse::ConfirmDownloadSegment {
                t: (cmd & 0x10) != 0,
            }),
            CS_ABORT => {
                let (index, sub) = read_mux(bytes);
                Ok(SdoResponse::Abort {
                    index,
                    sub,
                    abort_code: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
                })
            }
            cs => UnsupportedCommandSnafu { cs }.fail(),
        }
    }
}

impl TryFrom<CanMessage> for SdoResponse {
    type Error = SdoParseError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        SdoResponse::try_from(msg.data())
    }
}

impl TryFrom<CanMessage> for SdoRequest {
    type Error = SdoParseError;

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        SdoRequest::try_from(msg.data())
    }
}
