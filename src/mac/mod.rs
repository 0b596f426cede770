//! IEEE 802.15.4 MAC addressing types and the transmit-request seam.

pub mod coord_table;
pub mod frame;

pub use coord_table::{ReplayError, WakeupCoord, WakeupCoordTable};
pub use frame::{ConnectionIe, FrameError, RxFrame, TxFrame};

use std::fmt;

/// 64-bit IEEE extended (EUI-64) address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ExtAddress([u8; 8]);

impl ExtAddress {
    /// Create from an 8-byte array.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for ExtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExtAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtAddress({})", self)
    }
}

/// 16-bit PAN identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PanId(u16);

impl PanId {
    /// Create from a raw u16.
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw value.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for PanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// A MAC frame address, short or extended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacAddress {
    /// 16-bit short address.
    Short(u16),
    /// 64-bit extended address.
    Extended(ExtAddress),
}

impl MacAddress {
    /// The extended address, if this is an extended-mode address.
    pub fn extended(&self) -> Option<ExtAddress> {
        match self {
            MacAddress::Extended(addr) => Some(*addr),
            MacAddress::Short(_) => None,
        }
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacAddress::Short(addr) => write!(f, "0x{:04x}", addr),
            MacAddress::Extended(addr) => write!(f, "{}", addr),
        }
    }
}

/// Transmit-request seam offered by the MAC layer.
///
/// Requests are non-blocking enqueues; the MAC answers later by pulling a
/// frame through the owning component's frame-request callback.
pub trait Mac {
    /// Ask for a CSL frame transmission opportunity after `delay_ms`.
    fn request_enh_csl_tx(&mut self, delay_ms: u32);

    /// Ask for the next wake-up frame to be pulled and transmitted.
    fn request_wakeup_tx(&mut self);
}
