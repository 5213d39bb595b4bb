//! Types for representing node IDs
//!

use crate::constants::cob_ids::{
    EMCY_BASE, HEARTBEAT_BASE, SDO_REQUEST_BASE, SDO_RESPONSE_BASE,
};
use crate::messages::CanId;

/// A newtype on u8 to enforce a valid configured node ID (1-127)
///
/// The unconfigured value 255 is not accepted, since an unconfigured node has no SDO server
/// which can be addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(try_from = "u8", into = "u8")
)]
pub struct NodeId(u8);

impl NodeId {
    /// Try to create a new NodeId
    ///
    /// It will fail if value is invalid (i.e. <1 or >127)
    pub const fn new(value: u8) -> Result<Self, InvalidNodeIdError> {
        if value > 0 && value < 128 {
            Ok(NodeId(value))
        } else {
            Err(InvalidNodeIdError(value))
        }
    }

    /// Get the raw node ID as a u8
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// The COB ID on which the node's default SDO server receives requests
    pub fn sdo_request_id(&self) -> CanId {
        CanId::std(SDO_REQUEST_BASE + self.0 as u16)
    }

    /// The COB ID on which the node's default SDO server sends responses
    pub fn sdo_response_id(&self) -> CanId {
        CanId::std(SDO_RESPONSE_BASE + self.0 as u16)
    }

    /// The COB ID on which the node sends emergency messages
    pub fn emcy_id(&self) -> CanId {
        CanId::std(EMCY_BASE + self.0 as u16)
    }

    /// The COB ID on which the node sends boot-up and heartbeat messages
    pub fn heartbeat_id(&self) -> CanId {
        CanId::std(HEARTBEAT_BASE + self.0 as u16)
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error for converting u8 to a NodeId
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidNodeIdError(pub u8);

impl core::fmt::Display for InvalidNodeIdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Invalid node ID {} (must be 1-127)", self.0)
    }
}
impl core::error::Error for InvalidNodeIdError {}

impl TryFrom<u8> for NodeId {
    type Error = InvalidNodeIdError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        NodeId::new(value)
    }
}

impl From<NodeId> for u8 {
    fn from(value: NodeId) -> Self {
        value.raw()
    }
}

impl core::str::FromStr for NodeId {
    type Err = String;

    /// Parse a node ID in decimal, or in hex with a `0x` prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => s.parse::<u8>(),
        }
        .map_err(|e| format!("'{s}' is not a node ID: {e}"))?;
        NodeId::new(value).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_range() {
        assert!(NodeId::new(0).is_err());
        assert!(NodeId::new(1).is_ok());
        assert!(NodeId::new(127).is_ok());
        assert!(NodeId::new(128).is_err());
        assert_eq!(Err(InvalidNodeIdError(255)), NodeId::new(255));
    }

    #[test]
    fn test_cob_ids() {
        let id = NodeId::new(5).unwrap();
        assert_eq!(CanId::std(0x605), id.sdo_request_id());
        assert_eq!(CanId::std(0x585), id.sdo_response_id());
        assert_eq!(CanId::std(0x85), id.emcy_id());
        assert_eq!(CanId::std(0x705), id.heartbeat_id());
    }

    #[test]
    fn test_parse() {
        assert_eq!(NodeId::new(10).unwrap(), "10".parse().unwrap());
        assert_eq!(NodeId::new(0x7f).unwrap(), "0x7F".parse().unwrap());
        assert!("0".parse::<NodeId>().is_err());
        assert!("300".parse::<NodeId>().is_err());
        assert!("abc".parse::<NodeId>().is_err());
    }
}
