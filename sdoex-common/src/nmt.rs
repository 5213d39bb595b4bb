//! Definitions for the NMT protocol, and the heartbeat messages nodes produce

use crate::{
    constants::cob_ids,
    messages::{CanId, CanMessage},
    NodeId,
};

/// Possible NMT states for a node
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtState {
    /// Bootup
    ///
    /// A node never remains in this state, as all nodes should transition automatically into
    /// PreOperational. It is only ever reported in the boot-up message.
    Bootup = 0,
    /// Node has been stopped
    Stopped = 4,
    /// Normal operational state
    Operational = 5,
    /// Node is awaiting command to enter operation
    PreOperational = 127,
}

impl core::fmt::Display for NmtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NmtState::Bootup => write!(f, "Bootup"),
            NmtState::Stopped => write!(f, "Stopped"),
            NmtState::Operational => write!(f, "Operational"),
            NmtState::PreOperational => write!(f, "PreOperational"),
        }
    }
}

/// An error for [`NmtState::try_from()`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidNmtStateError(pub u8);

impl TryFrom<u8> for NmtState {
    type Error = InvalidNmtStateError;

    /// Attempt to convert a u8 to an NmtState enum
    ///
    /// Fails with InvalidNmtStateError if value is not a valid state
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use NmtState::*;
        match value {
            x if x == Bootup as u8 => Ok(Bootup),
            x if x == Stopped as u8 => Ok(Stopped),
            x if x == Operational as u8 => Ok(Operational),
            x if x == PreOperational as u8 => Ok(PreOperational),
            _ => Err(InvalidNmtStateError(value)),
        }
    }
}

/// The command specifiers of NMT master commands
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommandSpecifier {
    /// Enter Operational
    Start = 1,
    /// Enter Stopped
    Stop = 2,
    /// Enter PreOperational
    EnterPreOp = 0x80,
    /// Reset the application, restoring every object to its default
    ResetApp = 0x81,
    /// Reset communication, restoring the communication objects (0x1000-0x1FFF) to their defaults
    ResetComm = 0x82,
}

impl NmtCommandSpecifier {
    /// Convert from the raw command specifier byte
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Start),
            2 => Some(Self::Stop),
            0x80 => Some(Self::EnterPreOp),
            0x81 => Some(Self::ResetApp),
            0x82 => Some(Self::ResetComm),
            _ => None,
        }
    }
}

/// A command broadcast by the NMT master
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NmtCommand {
    /// What the addressed nodes should do
    pub cs: NmtCommandSpecifier,
    /// The addressed node, or 0 for all nodes
    pub node: u8,
}

impl NmtCommand {
    /// Returns true if the command applies to `node_id`
    pub fn addresses(&self, node_id: NodeId) -> bool {
        self.node == 0 || self.node == node_id.raw()
    }
}

impl TryFrom<CanMessage> for NmtCommand {
    type Error = ();

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        if msg.id() != CanId::std(cob_ids::NMT) {
            return Err(());
        }
        match msg.data() {
            [cs, node] => Ok(NmtCommand {
                cs: NmtCommandSpecifier::from_byte(*cs).ok_or(())?,
                node: *node,
            }),
            _ => Err(()),
        }
    }
}

impl From<NmtCommand> for CanMessage {
    fn from(cmd: NmtCommand) -> Self {
        CanMessage::new(CanId::std(cob_ids::NMT), &[cmd.cs as u8, cmd.node])
    }
}

/// A heartbeat message, also used with [`NmtState::Bootup`] as the boot-up message
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// The node producing the heartbeat
    pub node: NodeId,
    /// The node's current state
    pub state: NmtState,
}

impl From<Heartbeat> for CanMessage {
    fn from(heartbeat: Heartbeat) -> Self {
        CanMessage::new(heartbeat.node.heartbeat_id(), &[heartbeat.state as u8])
    }
}

impl TryFrom<CanMessage> for Heartbeat {
    type Error = ();

    fn try_from(msg: CanMessage) -> Result<Self, Self::Error> {
        let raw = msg.id().raw();
        let base = cob_ids::HEARTBEAT_BASE as u32;
        if msg.id().is_extended() || !(base + 1..base + 0x80).contains(&raw) {
            return Err(());
        }
        let node = NodeId::new((raw - base) as u8).map_err(|_| ())?;
        let state = match msg.data() {
            // The top bit is the node guarding toggle
            [state] => NmtState::try_from(state & 0x7f).map_err(|_| ())?,
            _ => return Err(()),
        };
        Ok(Heartbeat { node, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmt_command() {
        let msg = CanMessage::new(CanId::std(0), &[0x01, 0x05]);
        let cmd = NmtCommand::try_from(msg).unwrap();
        assert_eq!(NmtCommandSpecifier::Start, cmd.cs);
        assert!(cmd.addresses(NodeId::new(5).unwrap()));
        assert!(!cmd.addresses(NodeId::new(6).unwrap()));

        let broadcast = NmtCommand {
            cs: NmtCommandSpecifier::ResetComm,
            node: 0,
        };
        assert!(broadcast.addresses(NodeId::new(6).unwrap()));
        assert_eq!(Ok(broadcast), NmtCommand::try_from(CanMessage::from(broadcast)));

        assert!(NmtCommand::try_from(CanMessage::new(CanId::std(0), &[0x03, 0x05])).is_err());
        assert!(NmtCommand::try_from(CanMessage::new(CanId::std(0x80), &[0x01, 0x05])).is_err());
    }

    #[test]
    fn test_heartbeat() {
        let heartbeat = Heartbeat {
            node: NodeId::new(0x22).unwrap(),
            state: NmtState::PreOperational,
        };
        let msg = CanMessage::from(heartbeat);
        assert_eq!(CanId::std(0x722), msg.id());
        assert_eq!(&[127], msg.data());
        assert_eq!(Ok(heartbeat), Heartbeat::try_from(msg));

        let toggled = CanMessage::new(CanId::std(0x722), &[0x85]);
        assert_eq!(NmtState::Operational, Heartbeat::try_from(toggled).unwrap().state);
        assert!(Heartbeat::try_from(CanMessage::new(CanId::std(0x622), &[5])).is_err());
    }
}
