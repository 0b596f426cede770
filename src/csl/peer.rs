//! Per-neighbor enhanced CSL state.
//!
//! Lives on the stack-owned neighbor record; one instance per neighbor. The
//! CSL sender mutates it through the neighbor table on every callback.

use crate::forwarder::MessageId;
use crate::mac::ExtAddress;

/// Per-peer message transmission accounting.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkStats {
    message_tx_success: u32,
    message_tx_failure: u32,
}

impl LinkStats {
    /// Record one completed message transmission.
    pub fn record_message_tx(&mut self, success: bool) {
        if success {
            self.message_tx_success += 1;
        } else {
            self.message_tx_failure += 1;
        }
    }

    /// Messages delivered.
    pub fn message_tx_success(&self) -> u32 {
        self.message_tx_success
    }

    /// Messages given up on.
    pub fn message_tx_failure(&self) -> u32 {
        self.message_tx_failure
    }
}

/// CSL synchronization and indirect-transmission state of one neighbor.
#[derive(Clone, Debug)]
pub struct CslPeer {
    ext_addr: ExtAddress,

    // --- Synchronization ---
    /// Sampled listening period in 10-symbol units; 0 means unsynchronized.
    csl_period: u16,
    /// Offset of the first sample within the period, in 10-symbol units.
    csl_phase: u16,
    csl_synchronized: bool,
    /// Radio timestamp of the last received frame carrying a CSL IE.
    last_rx_timestamp_us: u64,

    // --- Attempts ---
    csl_tx_attempts: u8,
    /// Per-peer override for the attempt cap; 0 means use the configured cap.
    csl_max_tx_attempts: u8,

    // --- Indirect message bookkeeping ---
    indirect_message: Option<MessageId>,
    indirect_queued_count: u16,
    /// 6LoWPAN fragment offset already delivered of the current message.
    indirect_fragment_offset: u16,
    /// Values preserved across retransmissions of the current frame.
    indirect_dsn: u8,
    indirect_frame_counter: u32,
    indirect_key_id: u8,
    /// Whether the next frame for this peer repeats an already sent one.
    indirect_retx_pending: bool,

    link_stats: LinkStats,
}

impl CslPeer {
    /// Create unsynchronized CSL state for a neighbor.
    pub fn new(ext_addr: ExtAddress) -> Self {
        Self {
            ext_addr,
            csl_period: 0,
            csl_phase: 0,
            csl_synchronized: false,
            last_rx_timestamp_us: 0,
            csl_tx_attempts: 0,
            csl_max_tx_attempts: 0,
            indirect_message: None,
            indirect_queued_count: 0,
            indirect_fragment_offset: 0,
            indirect_dsn: 0,
            indirect_frame_counter: 0,
            indirect_key_id: 0,
            indirect_retx_pending: false,
            link_stats: LinkStats::default(),
        }
    }

    /// Extended address of the neighbor.
    pub fn ext_addr(&self) -> ExtAddress {
        self.ext_addr
    }

    // === Synchronization ===

    /// Sampled listening period in 10-symbol units.
    pub fn csl_period(&self) -> u16 {
        self.csl_period
    }

    /// Set the sampled listening period, in 10-symbol units.
    pub fn set_csl_period(&mut self, period: u16) {
        self.csl_period = period;
    }

    /// Sample phase in 10-symbol units.
    pub fn csl_phase(&self) -> u16 {
        self.csl_phase
    }

    /// Set the sample phase, in 10-symbol units.
    pub fn set_csl_phase(&mut self, phase: u16) {
        self.csl_phase = phase;
    }

    /// Whether the peer is synchronized and advertises a non-zero period.
    pub fn is_enh_csl_synchronized(&self) -> bool {
        self.csl_synchronized && self.csl_period > 0
    }

    /// Set or clear the synchronized flag.
    pub fn set_csl_synchronized(&mut self, synchronized: bool) {
        self.csl_synchronized = synchronized;
    }

    /// Radio timestamp of the last CSL-IE-carrying frame, in microseconds.
    pub fn last_rx_timestamp_us(&self) -> u64 {
        self.last_rx_timestamp_us
    }

    /// Set the last-received timestamp, in microseconds.
    pub fn set_last_rx_timestamp_us(&mut self, timestamp_us: u64) {
        self.last_rx_timestamp_us = timestamp_us;
    }

    // === Attempts ===

    /// Transmission attempts made for the current frame.
    pub fn tx_attempts(&self) -> u8 {
        self.csl_tx_attempts
    }

    /// Count one more transmission attempt.
    pub fn increment_tx_attempts(&mut self) {
        self.csl_tx_attempts += 1;
    }

    /// Reset the attempt counter.
    pub fn reset_tx_attempts(&mut self) {
        self.csl_tx_attempts = 0;
    }

    /// Attempt cap for this peer: the per-peer override, or `default` when
    /// no override is set.
    pub fn max_tx_attempts(&self, default: u8) -> u8 {
        if self.csl_max_tx_attempts != 0 {
            self.csl_max_tx_attempts
        } else {
            default
        }
    }

    /// Override the attempt cap for this peer (0 restores the default).
    pub fn set_max_tx_attempts(&mut self, max: u8) {
        self.csl_max_tx_attempts = max;
    }

    // === Indirect message bookkeeping ===

    /// The message currently being delivered, if any.
    pub fn indirect_message(&self) -> Option<MessageId> {
        self.indirect_message
    }

    /// Set or clear the current message.
    pub fn set_indirect_message(&mut self, message: Option<MessageId>) {
        self.indirect_message = message;
    }

    /// Messages awaiting delivery to this peer.
    pub fn queued_count(&self) -> u16 {
        self.indirect_queued_count
    }

    /// Count one more queued message.
    pub fn increment_queued_count(&mut self) {
        self.indirect_queued_count += 1;
    }

    /// Count one delivered (or abandoned) message.
    pub fn decrement_queued_count(&mut self) {
        debug_assert!(self.indirect_queued_count > 0);
        self.indirect_queued_count = self.indirect_queued_count.saturating_sub(1);
    }

    /// Reset the queued-message counter.
    pub fn reset_queued_count(&mut self) {
        self.indirect_queued_count = 0;
    }

    /// Bytes of the current message already delivered.
    pub fn indirect_fragment_offset(&self) -> u16 {
        self.indirect_fragment_offset
    }

    /// Set the delivered-bytes offset.
    pub fn set_indirect_fragment_offset(&mut self, offset: u16) {
        self.indirect_fragment_offset = offset;
    }

    /// Data sequence number to reuse on retransmission.
    pub fn indirect_dsn(&self) -> u8 {
        self.indirect_dsn
    }

    /// Preserve the data sequence number for retransmission.
    pub fn set_indirect_dsn(&mut self, dsn: u8) {
        self.indirect_dsn = dsn;
    }

    /// Frame counter to reuse on retransmission.
    pub fn indirect_frame_counter(&self) -> u32 {
        self.indirect_frame_counter
    }

    /// Preserve the frame counter for retransmission.
    pub fn set_indirect_frame_counter(&mut self, counter: u32) {
        self.indirect_frame_counter = counter;
    }

    /// Key index to reuse on retransmission.
    pub fn indirect_key_id(&self) -> u8 {
        self.indirect_key_id
    }

    /// Preserve the key index for retransmission.
    pub fn set_indirect_key_id(&mut self, key_id: u8) {
        self.indirect_key_id = key_id;
    }

    /// Whether the next frame repeats an already transmitted one.
    pub fn has_pending_retx(&self) -> bool {
        self.indirect_retx_pending
    }

    /// Mark the preserved sequence/security values as valid for reuse.
    pub fn set_pending_retx(&mut self) {
        self.indirect_retx_pending = true;
    }

    /// Invalidate the preserved retransmission values.
    pub fn clear_pending_retx(&mut self) {
        self.indirect_retx_pending = false;
    }

    // === Stats ===

    /// Message transmission accounting.
    pub fn link_stats(&self) -> &LinkStats {
        &self.link_stats
    }

    /// Mutable message transmission accounting.
    pub fn link_stats_mut(&mut self) -> &mut LinkStats {
        &mut self.link_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronized_requires_nonzero_period() {
        let mut peer = CslPeer::new(ExtAddress::from_bytes([1; 8]));

        peer.set_csl_synchronized(true);
        assert!(!peer.is_enh_csl_synchronized());

        peer.set_csl_period(500);
        assert!(peer.is_enh_csl_synchronized());

        peer.set_csl_synchronized(false);
        assert!(!peer.is_enh_csl_synchronized());
    }

    #[test]
    fn test_max_tx_attempts_override() {
        let mut peer = CslPeer::new(ExtAddress::from_bytes([1; 8]));

        assert_eq!(peer.max_tx_attempts(4), 4);
        peer.set_max_tx_attempts(7);
        assert_eq!(peer.max_tx_attempts(4), 7);
        peer.set_max_tx_attempts(0);
        assert_eq!(peer.max_tx_attempts(4), 4);
    }

    #[test]
    fn test_link_stats() {
        let mut stats = LinkStats::default();

        stats.record_message_tx(true);
        stats.record_message_tx(true);
        stats.record_message_tx(false);

        assert_eq!(stats.message_tx_success(), 2);
        assert_eq!(stats.message_tx_failure(), 1);
    }
}
