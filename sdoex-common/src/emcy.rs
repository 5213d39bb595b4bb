//! Emergency (EMCY) messages

use crate::{messages::CanMessage, NodeId};

/// Bits of the error register (object 0x1001)
pub mod error_register {
    /// Generic error, set whenever any other bit is set
    pub const GENERIC: u8 = 0x01;
    /// Manufacturer specific error
    pub const MANUFACTURER: u8 = 0x80;
}

/// An emergency message produced by a node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Emcy {
    /// The CiA 301 emergency error code
    pub error_code: u16,
    /// Value of the node's error register at the time of the error
    pub error_register: u8,
    /// Manufacturer specific data
    pub vendor_data: [u8; 5],
}

impl Emcy {
    /// Create an emergency message with no manufacturer specific data
    pub fn new(error_code: u16, error_register: u8) -> Self {
        Self {
            error_code,
            error_register,
            vendor_data: [0; 5],
        }
    }

    /// Encode the message as sent by `node`
    pub fn to_message(&self, node: NodeId) -> CanMessage {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&self.error_code.to_le_bytes());
        data[2] = self.error_register;
        data[3..8].copy_from_slice(&self.vendor_data);
        CanMessage::new(node.emcy_id(), &data)
    }

    /// Decode an emergency message, returning the sending node along with it
    pub fn from_message(msg: &CanMessage) -> Option<(NodeId, Self)> {
        let raw = msg.id().raw();
        let base = crate::constants::cob_ids::EMCY_BASE as u32;
        if msg.id().is_extended() || !(base + 1..base + 0x80).contains(&raw) {
            return None;
        }
        let node = NodeId::new((raw - base) as u8).ok()?;
        let data: &[u8; 8] = msg.data().try_into().ok()?;
        let mut vendor_data = [0; 5];
        vendor_data.copy_from_slice(&data[3..8]);
        Some((
            node,
            Emcy {
                error_code: u16::from_le_bytes([data[0], data[1]]),
                error_register: data[2],
                vendor_data,
            },
        ))
    }
}
