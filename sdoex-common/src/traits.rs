//! Common traits

use crate::messages::CanMessage;

/// An async CAN sender trait
pub trait AsyncCanSender: Send {
    /// Error type returned by sender
    type Error: CanSendError;
    /// Send a message to the bus
    fn send(
        &mut self,
        msg: CanMessage,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>>;
}

/// A trait for CAN errors which may come from different types of interfaces
///
/// The error can always give back the unsent frame, and can convert any underlying errors into
/// a String.
pub trait CanSendError: core::fmt::Debug {
    /// Convert the error into the undelivered message
    fn into_can_message(self) -> CanMessage;

    /// Get a string describing the error
    fn message(&self) -> String;
}

/// Sinks which cannot report a reason simply hand the frame back
impl CanSendError for CanMessage {
    fn into_can_message(self) -> CanMessage {
        self
    }

    fn message(&self) -> String {
        format!("Failed to deliver {self:?}")
    }
}

/// An async CAN receiver trait
pub trait AsyncCanReceiver: Send {
    /// The error type returned by recv
    type Error: core::fmt::Debug + Send;

    /// Receive available message immediately
    fn try_recv(&mut self) -> Option<CanMessage>;

    /// A blocking receive
    fn recv(
        &mut self,
    ) -> impl core::future::Future<Output = Result<CanMessage, Self::Error>> + Send;

    /// Remove any pending messages from the receiver
    fn flush(&mut self) {
        while self.try_recv().is_some() {}
    }
}
