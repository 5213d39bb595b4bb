//! Constants defining standard objects and COB IDs

/// Object indices for standard objects
pub mod object_ids {
    /// The Error Register object index
    pub const ERROR_REGISTER: u16 = 0x1001;
    /// The Device Name object index
    pub const DEVICE_NAME: u16 = 0x1008;
    /// The Heartbeat Producer Time object index, in milliseconds
    pub const HEARTBEAT_PRODUCER_TIME: u16 = 0x1017;
}

/// Standard COB-IDs, and base COB-IDs which the node ID is added to
pub mod cob_ids {
    /// NMT commands from the master
    pub const NMT: u16 = 0x000;
    /// SYNC object
    pub const SYNC: u16 = 0x080;
    /// Emergency messages base
    pub const EMCY_BASE: u16 = 0x080;
    /// SDO client to server (request) base
    pub const SDO_REQUEST_BASE: u16 = 0x600;
    /// SDO server to client (response) base
    pub const SDO_RESPONSE_BASE: u16 = 0x580;
    /// Heartbeat and boot-up messages base
    pub const HEARTBEAT_BASE: u16 = 0x700;
}
