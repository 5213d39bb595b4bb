//! CAN message types

/// A CAN identifier, either an 11-bit standard ID or a 29-bit extended ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CanId {
    /// An extended 29-bit identifier
    Extended(u32),
    /// A standard 11-bit identifier
    Std(u16),
}

impl CanId {
    /// Create a new extended ID
    pub const fn extended(id: u32) -> CanId {
        CanId::Extended(id)
    }

    /// Create a new standard ID
    pub const fn std(id: u16) -> CanId {
        CanId::Std(id)
    }

    /// Get the raw ID as a u32
    pub fn raw(&self) -> u32 {
        match self {
            CanId::Extended(id) => *id,
            CanId::Std(id) => *id as u32,
        }
    }

    /// Returns true if this ID is an extended ID
    pub fn is_extended(&self) -> bool {
        matches!(self, CanId::Extended(_))
    }
}

impl core::fmt::Display for CanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CanId::Extended(id) => write!(f, "0x{id:08X}x"),
            CanId::Std(id) => write!(f, "0x{id:03X}"),
        }
    }
}

const MAX_DATA_LENGTH: usize = 8;

/// A classic CAN frame, with up to 8 data bytes
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CanMessage {
    id: CanId,
    dlc: u8,
    data: [u8; MAX_DATA_LENGTH],
    rtr: bool,
}

impl CanMessage {
    /// Create a new data frame
    ///
    /// Data longer than 8 bytes is truncated to 8.
    pub fn new(id: CanId, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DATA_LENGTH);
        let mut buf = [0u8; MAX_DATA_LENGTH];
        buf[..dlc].copy_from_slice(&data[..dlc]);
        Self {
            id,
            dlc: dlc as u8,
            data: buf,
            rtr: false,
        }
    }

    /// Create a new remote transmission request frame
    pub fn new_rtr(id: CanId) -> Self {
        Self {
            id,
            dlc: 0,
            data: [0; MAX_DATA_LENGTH],
            rtr: true,
        }
    }

    /// Get the ID of the message
    pub fn id(&self) -> CanId {
        self.id
    }

    /// Get the data bytes of the message
    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }

    /// Returns true if this is a remote transmission request
    pub fn is_rtr(&self) -> bool {
        self.rtr
    }
}

impl core::fmt::Debug for CanMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.rtr {
            write!(f, "CanMessage {{ id: {}, RTR }}", self.id)
        } else {
            write!(f, "CanMessage {{ id: {}, data: {:02X?} }}", self.id, self.data())
        }
    }
}

/// An error reported by the CAN controller via an error frame
///
/// Holds the raw error class bits from the frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanError(u32);

impl CanError {
    /// Create a CanError from the raw error class bits
    pub fn from_raw(bits: u32) -> Self {
        Self(bits)
    }

    /// Get the raw error class bits
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for CanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CAN error frame (class bits 0x{:08X})", self.0)
    }
}

impl core::error::Error for CanError {}
