//! Transmit and receive frame surfaces.
//!
//! [`TxFrame`] is the handoff record between this subsystem and the MAC
//! transmit path: schedulers fill in addressing, timing and retransmission
//! fields, the MAC consumes them. [`RxFrame`] carries the already
//! authenticated fields the replay table inspects.

use thiserror::Error;

use super::{ExtAddress, MacAddress, PanId};

/// Length of a wake-up frame on air, SHR included, in bytes.
pub const WAKEUP_FRAME_LENGTH: u32 = 54;

/// Length of an MLE Parent Request on air, SHR included, in bytes.
pub const PARENT_REQUEST_LENGTH: u32 = 78;

/// Size of a wake-up frame on the host-to-RCP bus, metadata included.
///
/// Determined experimentally so a scheduled wake-up frame reaches the RCP
/// early enough; it is deliberately larger than the on-air length.
pub const WAKEUP_FRAME_DATA_LENGTH: u32 = 100;

/// Errors building a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("address mode not valid for this frame type")]
    InvalidAddress,
}

/// Connection IE payload: how often and how many times the peripheral may
/// retry its link-establishment message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionIe {
    retry_interval: u8,
    retry_count: u8,
}

impl ConnectionIe {
    /// Create with the given retry interval and count.
    pub fn new(retry_interval: u8, retry_count: u8) -> Self {
        Self {
            retry_interval,
            retry_count,
        }
    }

    /// Retry interval in units of the wake-up frame interval.
    pub fn retry_interval(&self) -> u8 {
        self.retry_interval
    }

    /// Number of allowed retries.
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }
}

/// An outbound MAC frame being prepared for transmission.
#[derive(Clone, Debug, Default)]
pub struct TxFrame {
    destination: Option<MacAddress>,
    source: Option<MacAddress>,
    pan_id: Option<PanId>,
    length: u16,
    sequence: u8,
    tx_delay: u32,
    tx_delay_base_time: u32,
    csma_ca_enabled: bool,
    max_csma_backoffs: u8,
    max_frame_retries: u8,
    is_retransmission: bool,
    security_enabled: bool,
    header_updated: bool,
    frame_counter: u32,
    key_id: u8,
    csl_ie_present: bool,
    rendezvous_time: Option<u16>,
    connection_ie: Option<ConnectionIe>,
}

impl TxFrame {
    /// Create an empty frame slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been written into this frame slot yet.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Populate this slot as a wake-up frame.
    ///
    /// Wake-up frames are secured, extended-to-extended addressed, and carry
    /// the rendezvous and connection IEs written afterwards by the scheduler.
    pub fn generate_wakeup_frame(
        &mut self,
        pan_id: PanId,
        destination: MacAddress,
        source: MacAddress,
    ) -> Result<(), FrameError> {
        if destination.extended().is_none() || source.extended().is_none() {
            return Err(FrameError::InvalidAddress);
        }

        *self = Self {
            destination: Some(destination),
            source: Some(source),
            pan_id: Some(pan_id),
            length: WAKEUP_FRAME_LENGTH as u16,
            security_enabled: true,
            ..Self::default()
        };
        Ok(())
    }

    // === Addressing ===

    /// Destination address, once set.
    pub fn destination(&self) -> Option<MacAddress> {
        self.destination
    }

    /// Source address, once set.
    pub fn source(&self) -> Option<MacAddress> {
        self.source
    }

    /// Destination PAN, once set.
    pub fn pan_id(&self) -> Option<PanId> {
        self.pan_id
    }

    /// Set both MAC addresses (used when building data frames).
    pub fn set_addresses(&mut self, source: MacAddress, destination: MacAddress) {
        self.source = Some(source);
        self.destination = Some(destination);
    }

    /// Set the frame length in bytes.
    pub fn set_length(&mut self, length: u16) {
        self.length = length;
    }

    /// Frame length in bytes.
    pub fn length(&self) -> u16 {
        self.length
    }

    // === Sequence and security ===

    /// MAC data sequence number.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Set the MAC data sequence number.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Whether link security applies to this frame.
    pub fn is_security_enabled(&self) -> bool {
        self.security_enabled
    }

    /// Enable or disable link security.
    pub fn set_security_enabled(&mut self, enabled: bool) {
        self.security_enabled = enabled;
    }

    /// Whether the security header (counter, key id) has been filled in.
    pub fn is_header_updated(&self) -> bool {
        self.header_updated
    }

    /// Mark the security header as filled in.
    pub fn set_header_updated(&mut self, updated: bool) {
        self.header_updated = updated;
    }

    /// Security frame counter.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Overwrite the security frame counter (retransmission reuse).
    pub fn set_frame_counter(&mut self, counter: u32) {
        self.frame_counter = counter;
    }

    /// Security key index.
    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    /// Overwrite the security key index (retransmission reuse).
    pub fn set_key_id(&mut self, key_id: u8) {
        self.key_id = key_id;
    }

    /// Whether this is a retransmission of an earlier frame.
    pub fn is_retransmission(&self) -> bool {
        self.is_retransmission
    }

    /// Mark this frame as a retransmission.
    pub fn set_is_retransmission(&mut self, retransmission: bool) {
        self.is_retransmission = retransmission;
    }

    // === Scheduling ===

    /// Delay from the base time at which the radio transmits, in microseconds.
    pub fn tx_delay(&self) -> u32 {
        self.tx_delay
    }

    /// Set the transmit delay.
    pub fn set_tx_delay(&mut self, delay_us: u32) {
        self.tx_delay = delay_us;
    }

    /// Radio-clock base time the delay is measured from (low 32 bits).
    pub fn tx_delay_base_time(&self) -> u32 {
        self.tx_delay_base_time
    }

    /// Set the transmit delay base time.
    pub fn set_tx_delay_base_time(&mut self, base_time: u32) {
        self.tx_delay_base_time = base_time;
    }

    /// Whether CSMA-CA runs before transmission.
    pub fn is_csma_ca_enabled(&self) -> bool {
        self.csma_ca_enabled
    }

    /// Enable or disable CSMA-CA.
    pub fn set_csma_ca_enabled(&mut self, enabled: bool) {
        self.csma_ca_enabled = enabled;
    }

    /// Maximum CSMA backoff attempts.
    pub fn max_csma_backoffs(&self) -> u8 {
        self.max_csma_backoffs
    }

    /// Set the maximum CSMA backoff attempts.
    pub fn set_max_csma_backoffs(&mut self, backoffs: u8) {
        self.max_csma_backoffs = backoffs;
    }

    /// Maximum MAC-level retries.
    pub fn max_frame_retries(&self) -> u8 {
        self.max_frame_retries
    }

    /// Set the maximum MAC-level retries.
    pub fn set_max_frame_retries(&mut self, retries: u8) {
        self.max_frame_retries = retries;
    }

    // === Information elements ===

    /// Whether the frame carries a CSL IE.
    pub fn is_csl_ie_present(&self) -> bool {
        self.csl_ie_present
    }

    /// Record that the frame carries a CSL IE.
    pub fn set_csl_ie_present(&mut self, present: bool) {
        self.csl_ie_present = present;
    }

    /// Rendezvous time IE value in 10-symbol units, once written.
    pub fn rendezvous_time(&self) -> Option<u16> {
        self.rendezvous_time
    }

    /// Write the rendezvous time IE, in 10-symbol units.
    pub fn set_rendezvous_time(&mut self, ten_symbols: u16) {
        self.rendezvous_time = Some(ten_symbols);
    }

    /// Connection IE, once written.
    pub fn connection_ie(&self) -> Option<ConnectionIe> {
        self.connection_ie
    }

    /// Write the connection IE.
    pub fn set_connection_ie(&mut self, ie: ConnectionIe) {
        self.connection_ie = Some(ie);
    }
}

/// The authenticated fields of a received wake-up frame.
///
/// Built by the receive path after frame authentication succeeds; the key
/// sequence is transported big-endian in the 4 key-source bytes of the
/// auxiliary security header.
#[derive(Clone, Copy, Debug)]
pub struct RxFrame {
    src_addr: ExtAddress,
    key_source: [u8; 4],
    frame_counter: u32,
}

impl RxFrame {
    /// Create from authenticated frame fields.
    pub fn new(src_addr: ExtAddress, key_source: [u8; 4], frame_counter: u32) -> Self {
        Self {
            src_addr,
            key_source,
            frame_counter,
        }
    }

    /// Extended source address.
    pub fn src_addr(&self) -> ExtAddress {
        self.src_addr
    }

    /// Key sequence, read big-endian from the key-source bytes.
    pub fn key_sequence(&self) -> u32 {
        u32::from_be_bytes(self.key_source)
    }

    /// Security frame counter.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(val: u8) -> ExtAddress {
        ExtAddress::from_bytes([val; 8])
    }

    #[test]
    fn test_generate_wakeup_frame() {
        let mut frame = TxFrame::new();
        assert!(frame.is_empty());

        frame
            .generate_wakeup_frame(
                PanId::new(0xface),
                MacAddress::Extended(ext(2)),
                MacAddress::Extended(ext(1)),
            )
            .unwrap();

        assert!(!frame.is_empty());
        assert!(frame.is_security_enabled());
        assert_eq!(frame.destination(), Some(MacAddress::Extended(ext(2))));
        assert_eq!(frame.source(), Some(MacAddress::Extended(ext(1))));
        assert_eq!(frame.pan_id(), Some(PanId::new(0xface)));
    }

    #[test]
    fn test_generate_wakeup_frame_rejects_short_address() {
        let mut frame = TxFrame::new();
        let err = frame
            .generate_wakeup_frame(
                PanId::new(1),
                MacAddress::Short(0x1234),
                MacAddress::Extended(ext(1)),
            )
            .unwrap_err();
        assert_eq!(err, FrameError::InvalidAddress);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_key_sequence_is_big_endian() {
        let frame = RxFrame::new(ext(1), [0x00, 0x00, 0x01, 0x02], 7);
        assert_eq!(frame.key_sequence(), 0x0102);
        assert_eq!(frame.frame_counter(), 7);
    }
}
