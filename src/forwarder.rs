//! Mesh forwarder collaborator contract.
//!
//! The forwarder owns the send queue and the 6LoWPAN fragmentation engine.
//! Messages are referenced by [`MessageId`]; the CSL sender reads metadata,
//! steers the per-message read offset, and asks the forwarder to build
//! mesh-less data frames at that offset.

use std::fmt;

use crate::mac::{MacAddress, TxFrame};

/// Stable identifier of a queued message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(u32);

impl MessageId {
    /// Create a new message ID.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

/// Payload class of a queued message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// An IPv6 datagram.
    Ip6,
    /// A child supervision keep-alive.
    Supervision,
    /// Anything else.
    Other,
}

/// Metadata of a queued message.
#[derive(Clone, Copy, Debug)]
pub struct MessageInfo {
    /// Payload class.
    pub kind: MessageKind,
    /// Total message length in bytes.
    pub length: u16,
    /// Whether the message is marked for direct (non-indirect) transmission.
    pub is_direct_transmission: bool,
    /// Whether link-layer security applies.
    pub link_security_enabled: bool,
    /// Whether this is an MLE Child ID Request.
    pub is_mle_child_id_request: bool,
    /// Whether the IPv6 destination is link-local.
    pub destination_is_link_local: bool,
}

/// The slice of the mesh forwarder the CSL sender depends on.
pub trait Forwarder {
    /// Message IDs currently in the send queue, in queue order.
    fn send_queue_ids(&self) -> Vec<MessageId>;

    /// Metadata of a queued message, if it is still queued.
    fn message_info(&self, id: MessageId) -> Option<MessageInfo>;

    /// Current read offset of a message.
    fn message_offset(&self, id: MessageId) -> u16;

    /// Set the read offset of a message.
    fn set_message_offset(&mut self, id: MessageId, offset: u16);

    /// Build a mesh-less data frame from the message at its current read
    /// offset, addressed as given. Returns the offset of the first byte not
    /// yet delivered.
    fn prepare_data_frame(
        &mut self,
        frame: &mut TxFrame,
        id: MessageId,
        source: MacAddress,
        destination: MacAddress,
    ) -> u16;

    /// Remove a message from the send queue once nothing is pending on it.
    fn remove_message_if_no_pending_tx(&mut self, id: MessageId);

    /// Account one IPv6 transmission outcome.
    fn record_ip_tx(&mut self, success: bool);

    /// MAC source address for a message, derived from its IPv6 source.
    fn mac_source_address(&self, id: MessageId) -> MacAddress;

    /// MAC destination address derived from a link-local IPv6 destination.
    fn mac_destination_address(&self, id: MessageId) -> MacAddress;
}
