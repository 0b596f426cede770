//! Enhanced CSL sender.
//!
//! State machine driving indirect transmissions to the one CSL-synchronized
//! peer (the parent). The MAC pulls frames through
//! [`EnhCslSender::handle_frame_request`] and reports outcomes through
//! [`EnhCslSender::handle_sent_frame`]; everything in between is
//! re-resolved from the neighbor table, never cached across callbacks.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CslConfig;
use crate::forwarder::{Forwarder, MessageId, MessageInfo, MessageKind};
use crate::mac::{Mac, MacAddress, TxFrame};
use crate::mle::Mle;
use crate::neighbor::{NeighborId, NeighborTable};
use crate::radio::{bus_transfer_time_us, Radio, TEN_SYMBOLS_US};

use super::peer::CslPeer;

/// Guard time allowed between frame preparation and the target slot, in
/// microseconds. A slot further out than the request-ahead time plus this
/// guard is abandoned rather than held.
pub const FRAME_PREPARATION_GUARD_US: u32 = 1500;

/// Worst-case frame size on the host-to-RCP bus, metadata included.
const MAX_FRAME_DATA_LENGTH: u32 = 150;

/// Errors preparing a CSL frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrepareError {
    /// The targeted peer has no indirect message.
    #[error("no indirect message for the peer")]
    InvalidState,

    /// The message type is not eligible for CSL transmission.
    #[error("message type not eligible for csl transmission")]
    NotImplemented,

    /// The message cannot be sent within a single frame.
    #[error("message does not fit a single frame")]
    Abort,
}

/// Transmission failures reported by the MAC.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TxError {
    /// The peer did not acknowledge the frame.
    #[error("no acknowledgement received")]
    NoAck,

    /// The channel could not be accessed in time.
    #[error("channel access failure")]
    ChannelAccessFailure,

    /// The transmission was aborted before going on air.
    #[error("transmission aborted")]
    Abort,
}

/// Per-transmission bookkeeping carried from frame request to completion.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameContext {
    /// Offset of the first byte of the current message not yet handed to the
    /// MAC.
    pub message_next_offset: u16,
}

/// Borrowed collaborators passed into every sender entry point.
///
/// All of these are owned by the surrounding stack; the sender holds them
/// only for the duration of a single cooperative callback.
pub struct Services<'a> {
    pub radio: &'a dyn Radio,
    pub mac: &'a mut dyn Mac,
    pub forwarder: &'a mut dyn Forwarder,
    pub mle: &'a mut dyn Mle,
    pub neighbors: &'a mut dyn NeighborTable,
}

/// Scheduler for enhanced CSL transmissions to the parent.
pub struct EnhCslSender {
    /// Peer targeted by the transmission currently at the MAC, if any.
    tx_peer: Option<NeighborId>,
    /// Message handed to the MAC, used to detect invalidation in `update`.
    tx_message: Option<MessageId>,
    /// How far ahead of the target slot the MAC operation is requested.
    frame_request_ahead_us: u32,
    /// Configured attempt cap, used when the peer carries no override.
    max_tx_attempts: u8,
    frame_context: FrameContext,
}

impl EnhCslSender {
    /// Create a sender; the request-ahead time absorbs the worst-case
    /// host-to-RCP transfer of one frame.
    pub fn new(config: &CslConfig, radio: &dyn Radio) -> Self {
        let frame_request_ahead_us = config.request_ahead_us
            + bus_transfer_time_us(MAX_FRAME_DATA_LENGTH, radio.bus_speed_hz());

        Self {
            tx_peer: None,
            tx_message: None,
            frame_request_ahead_us,
            max_tx_attempts: config.max_tx_attempts,
            frame_context: FrameContext::default(),
        }
    }

    /// How far ahead of a slot the MAC operation is requested, in
    /// microseconds.
    pub fn frame_request_ahead_us(&self) -> u32 {
        self.frame_request_ahead_us
    }

    /// Queue a message for CSL transmission to a neighbor.
    ///
    /// A single CSL peer is assumed: any message in the send queue not marked
    /// for direct transmission is considered to belong to it.
    pub fn add_message(
        &mut self,
        message: MessageId,
        neighbor: NeighborId,
        services: &mut Services<'_>,
    ) {
        let Some(peer) = services.neighbors.csl_peer_mut(neighbor) else {
            return;
        };

        if peer.indirect_message().is_none() {
            peer.set_indirect_message(Some(message));
            peer.set_indirect_fragment_offset(0);
            peer.clear_pending_retx();
        }
        peer.increment_queued_count();

        self.reschedule(services);
    }

    /// Drop all pending CSL work for a neighbor.
    pub fn clear_messages(&mut self, neighbor: NeighborId, services: &mut Services<'_>) {
        let has_queued = services
            .neighbors
            .csl_peer(neighbor)
            .is_some_and(|peer| peer.queued_count() > 0);
        if !has_queued {
            return;
        }

        for message in services.forwarder.send_queue_ids() {
            services.forwarder.remove_message_if_no_pending_tx(message);
        }

        if let Some(peer) = services.neighbors.csl_peer_mut(neighbor) {
            peer.set_indirect_message(None);
            peer.reset_queued_count();
            peer.reset_tx_attempts();
            peer.clear_pending_retx();
        }

        self.update(services);
    }

    /// React to external changes that may have invalidated in-flight work.
    ///
    /// When no frame is at the MAC, simply reschedule. When the MAC has
    /// already taken a frame whose message no longer matches the peer's,
    /// drop the working target so the completion callback discards the
    /// result instead of acting on it.
    pub fn update(&mut self, services: &mut Services<'_>) {
        if self.tx_message.is_none() {
            self.reschedule(services);
        } else if let Some(neighbor) = self.tx_peer {
            let still_current = services
                .neighbors
                .csl_peer(neighbor)
                .is_some_and(|peer| peer.indirect_message() == self.tx_message);

            if !still_current {
                self.tx_peer = None;
                self.frame_context.message_next_offset = 0;
            }
        }
    }

    /// The parent, or the parent candidate while a CSL central is present.
    fn target_peer(mle: &dyn Mle) -> Option<NeighborId> {
        mle.parent().or_else(|| {
            if mle.is_csl_central_present() {
                mle.parent_candidate()
            } else {
                None
            }
        })
    }

    /// Pick the target peer and ask the MAC for a transmission at its next
    /// sample window.
    fn reschedule(&mut self, services: &mut Services<'_>) {
        self.tx_peer = Self::target_peer(&*services.mle);
        let Some(neighbor) = self.tx_peer else {
            return;
        };
        let Some(peer) = services.neighbors.csl_peer_mut(neighbor) else {
            self.tx_peer = None;
            return;
        };

        if peer.queued_count() == 0 {
            return;
        }

        if peer.indirect_message().is_none() {
            let forwarder = &*services.forwarder;
            let adopted = forwarder.send_queue_ids().into_iter().find(|message| {
                forwarder
                    .message_info(*message)
                    .is_some_and(|info| !info.is_direct_transmission)
            });

            match adopted {
                Some(message) => {
                    peer.set_indirect_message(Some(message));
                    peer.set_indirect_fragment_offset(0);
                    peer.clear_pending_retx();
                }
                None => {
                    // A positive counter with nothing indirect in the queue
                    // means messages were removed without notice. Reset the
                    // counter to recover.
                    peer.reset_queued_count();
                    return;
                }
            }
        }

        if !peer.is_enh_csl_synchronized() {
            return;
        }

        let (delay_us, _) = next_csl_transmission_delay(
            peer,
            self.frame_request_ahead_us,
            services.radio.radio_now_us(),
        );
        services.mac.request_enh_csl_tx(delay_us / 1000);
    }

    /// Fill the next frame for the MAC. Returns false when no frame should
    /// go out at this opportunity.
    pub fn handle_frame_request(
        &mut self,
        frame: &mut TxFrame,
        services: &mut Services<'_>,
    ) -> bool {
        let Some(neighbor) = self.tx_peer else {
            return false;
        };
        let Some(peer) = services.neighbors.csl_peer_mut(neighbor) else {
            return false;
        };
        if !peer.is_enh_csl_synchronized() {
            return false;
        }

        if let Err(error) = Self::prepare_frame(
            frame,
            &mut self.frame_context,
            peer,
            &mut *services.forwarder,
        ) {
            debug!(addr = %peer.ext_addr(), %error, "csl frame not prepared");
            return false;
        }

        self.tx_message = peer.indirect_message();
        if self.tx_message.is_none() {
            return false;
        }

        if peer.tx_attempts() > 0 || peer.has_pending_retx() {
            // Repeat the sequence number of the previous attempt. A frame
            // carrying a CSL IE must instead be re-secured with a fresh
            // frame counter, as the IE content changed.
            frame.set_is_retransmission(true);
            frame.set_sequence(peer.indirect_dsn());

            if frame.is_security_enabled() && !frame.is_csl_ie_present() {
                frame.set_frame_counter(peer.indirect_frame_counter());
                frame.set_key_id(peer.indirect_key_id());
            }
        } else {
            frame.set_is_retransmission(false);
        }

        // Zero ahead time so a slightly delayed MAC operation does not miss
        // the slot it was requested for.
        let (delay_us, tx_delay_us) =
            next_csl_transmission_delay(peer, 0, services.radio.radio_now_us());
        if delay_us > self.frame_request_ahead_us + FRAME_PREPARATION_GUARD_US {
            return false;
        }

        frame.set_tx_delay(tx_delay_us);
        // Only the low 32 bits of the receive timestamp are required.
        frame.set_tx_delay_base_time(peer.last_rx_timestamp_us() as u32);
        frame.set_csma_ca_enabled(false);
        true
    }

    fn prepare_frame(
        frame: &mut TxFrame,
        context: &mut FrameContext,
        peer: &mut CslPeer,
        forwarder: &mut dyn Forwarder,
    ) -> Result<(), PrepareError> {
        let message = peer.indirect_message().ok_or(PrepareError::InvalidState)?;
        let info = forwarder
            .message_info(message)
            .ok_or(PrepareError::InvalidState)?;

        match info.kind {
            MessageKind::Ip6 => {
                context.message_next_offset =
                    Self::prepare_data_frame(frame, peer, message, &info, forwarder);

                if info.is_mle_child_id_request && info.link_security_enabled {
                    info!("child id request requires fragmentation, aborting tx");
                    context.message_next_offset = info.length;
                    return Err(PrepareError::Abort);
                }
                Ok(())
            }
            _ => Err(PrepareError::NotImplemented),
        }
    }

    fn prepare_data_frame(
        frame: &mut TxFrame,
        peer: &mut CslPeer,
        message: MessageId,
        info: &MessageInfo,
        forwarder: &mut dyn Forwarder,
    ) -> u16 {
        // Link-local destinations go through the standard derivation; anything
        // else is sent straight to the peer's extended address.
        let source = forwarder.mac_source_address(message);
        let destination = if info.destination_is_link_local {
            forwarder.mac_destination_address(message)
        } else {
            MacAddress::Extended(peer.ext_addr())
        };

        // Build from the peer's indirect offset, then restore the offset used
        // by direct transmissions.
        let direct_tx_offset = forwarder.message_offset(message);
        forwarder.set_message_offset(message, peer.indirect_fragment_offset());
        let next_offset = forwarder.prepare_data_frame(frame, message, source, destination);
        forwarder.set_message_offset(message, direct_tx_offset);

        // The frame pending bit is left clear even with more messages queued;
        // a single CSL peer is assumed.
        next_offset
    }

    /// Digest a transmission outcome reported by the MAC.
    pub fn handle_sent_frame(
        &mut self,
        frame: &TxFrame,
        result: Result<(), TxError>,
        services: &mut Services<'_>,
    ) {
        self.tx_message = None;

        // Without a working target the result is no longer of interest
        // (see `update`).
        let Some(neighbor) = self.tx_peer.take() else {
            return;
        };

        self.handle_sent_frame_to_peer(frame, result, neighbor, services);
    }

    fn handle_sent_frame_to_peer(
        &mut self,
        frame: &TxFrame,
        result: Result<(), TxError>,
        neighbor: NeighborId,
        services: &mut Services<'_>,
    ) {
        match result {
            Ok(()) => {
                if let Some(peer) = services.neighbors.csl_peer_mut(neighbor) {
                    peer.reset_tx_attempts();
                    peer.clear_pending_retx();
                }
                self.finish_frame(frame, Ok(()), neighbor, services);
            }

            Err(TxError::NoAck) => {
                // A secured frame must have had its header updated by the
                // time the MAC reports on it.
                debug_assert!(!frame.is_security_enabled() || frame.is_header_updated());

                let exhausted = {
                    let Some(peer) = services.neighbors.csl_peer_mut(neighbor) else {
                        return;
                    };
                    peer.increment_tx_attempts();
                    info!(
                        addr = %peer.ext_addr(),
                        attempt = peer.tx_attempts(),
                        max = peer.max_tx_attempts(self.max_tx_attempts),
                        "csl tx not acknowledged"
                    );
                    peer.tx_attempts() >= peer.max_tx_attempts(self.max_tx_attempts)
                };

                if exhausted {
                    self.give_up_on_peer(neighbor, services);
                } else {
                    self.persist_retx_state(frame, result, neighbor, services);
                    self.reschedule(services);
                }
            }

            Err(TxError::ChannelAccessFailure) | Err(TxError::Abort) => {
                self.persist_retx_state(frame, result, neighbor, services);
                self.reschedule(services);
            }
        }
    }

    /// Attempt cap reached: consider the peer out of sync, surface the
    /// failure and restart the attach process.
    fn give_up_on_peer(&mut self, neighbor: NeighborId, services: &mut Services<'_>) {
        let message = {
            let Some(peer) = services.neighbors.csl_peer_mut(neighbor) else {
                return;
            };
            peer.set_csl_synchronized(false);
            peer.reset_tx_attempts();
            peer.clear_pending_retx();
            warn!(addr = %peer.ext_addr(), "csl tx attempts exhausted, detaching");
            peer.indirect_message()
        };

        if let Some(message) = message {
            if services
                .forwarder
                .message_info(message)
                .is_some_and(|info| info.kind == MessageKind::Ip6)
            {
                services.forwarder.record_ip_tx(false);
            }
            services.forwarder.remove_message_if_no_pending_tx(message);
        }

        services.mle.become_detached();
    }

    /// Keep the sequence number and security material of a failed frame so
    /// the retry repeats them; the message itself survives until the attempt
    /// cap.
    fn persist_retx_state(
        &mut self,
        frame: &TxFrame,
        result: Result<(), TxError>,
        neighbor: NeighborId,
        services: &mut Services<'_>,
    ) {
        let secure_child_id_request = {
            let Some(peer) = services.neighbors.csl_peer_mut(neighbor) else {
                return;
            };

            if !frame.is_empty() {
                peer.set_indirect_dsn(frame.sequence());
                if frame.is_security_enabled() && frame.is_header_updated() {
                    peer.set_indirect_frame_counter(frame.frame_counter());
                    peer.set_indirect_key_id(frame.key_id());
                }
                peer.set_pending_retx();
            }

            peer.indirect_message()
                .and_then(|message| services.forwarder.message_info(message))
                .is_some_and(|info| {
                    info.kind == MessageKind::Ip6
                        && info.is_mle_child_id_request
                        && info.link_security_enabled
                })
        };

        // A secure Child ID Request can never complete over CSL; finish it
        // now and ask MLE for one that fits a single frame.
        if secure_child_id_request {
            self.finish_frame(frame, result, neighbor, services);
            services.mle.request_shorter_child_id_request();
        }
    }

    /// Advance fragmentation or finalize the current message, then
    /// reschedule.
    fn finish_frame(
        &mut self,
        _frame: &TxFrame,
        result: Result<(), TxError>,
        neighbor: NeighborId,
        services: &mut Services<'_>,
    ) {
        let next_offset = self.frame_context.message_next_offset;
        let message = services
            .neighbors
            .csl_peer(neighbor)
            .and_then(|peer| peer.indirect_message());

        if let Some(message) = message {
            let length = services
                .forwarder
                .message_info(message)
                .map_or(0, |info| info.length);

            if next_offset < length {
                if let Some(peer) = services.neighbors.csl_peer_mut(neighbor) {
                    peer.set_indirect_fragment_offset(next_offset);
                }
                self.reschedule(services);
                return;
            }

            // The indirect tx of this message to the peer is done.
            if let Some(peer) = services.neighbors.csl_peer_mut(neighbor) {
                peer.set_indirect_message(None);
                peer.link_stats_mut().record_message_tx(result.is_ok());
                peer.decrement_queued_count();
                match result {
                    Ok(()) => debug!(addr = %peer.ext_addr(), %message, "csl tx done"),
                    Err(error) => {
                        debug!(addr = %peer.ext_addr(), %message, %error, "csl tx failed")
                    }
                }
            }

            if services
                .forwarder
                .message_info(message)
                .is_some_and(|info| info.kind == MessageKind::Ip6)
            {
                services.forwarder.record_ip_tx(result.is_ok());
            }
            services.forwarder.remove_message_if_no_pending_tx(message);
        }

        self.reschedule(services);
    }
}

/// Delay until the peer's next usable sample window.
///
/// The window grid is anchored at the peer's last received CSL-IE frame plus
/// its advertised phase, repeating every period; the first window at least
/// `ahead_us` ahead of `radio_now_us` is chosen. Returns the delay from now
/// minus the ahead time, and the delay from the peer's last receive
/// timestamp.
fn next_csl_transmission_delay(peer: &CslPeer, ahead_us: u32, radio_now_us: u64) -> (u32, u32) {
    let period_us = u64::from(peer.csl_period()) * u64::from(TEN_SYMBOLS_US);
    let first_tx_window =
        peer.last_rx_timestamp_us() + u64::from(peer.csl_phase()) * u64::from(TEN_SYMBOLS_US);

    let mut next_tx_window = radio_now_us - (radio_now_us % period_us) + (first_tx_window % period_us);
    while next_tx_window < radio_now_us + u64::from(ahead_us) {
        next_tx_window += period_us;
    }

    let delay_us = (next_tx_window - radio_now_us - u64::from(ahead_us)) as u32;
    let delay_from_last_rx_us = (next_tx_window - peer.last_rx_timestamp_us()) as u32;

    (delay_us, delay_from_last_rx_us)
}
