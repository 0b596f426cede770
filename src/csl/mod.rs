//! Enhanced CSL transmission.
//!
//! Delivery of queued unicast messages to a CSL-synchronized peer: the
//! sender computes the peer's next sample window from its advertised period
//! and phase, asks the MAC for a transmission at that window, and carries
//! retransmission and fragmentation state across attempts.

pub mod peer;
pub mod sender;

pub use peer::{CslPeer, LinkStats};
pub use sender::{EnhCslSender, FrameContext, PrepareError, Services, TxError};
