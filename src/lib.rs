//! CSLINK: Coordinated Sampled Listening wake-up subsystem
//!
//! Scheduling machinery for IEEE 802.15.4 mesh nodes that keep their radio
//! off almost all of the time: a central's wake-up frame bursts, a
//! peripheral's enhanced CSL transmissions to its parent, and the anti-replay
//! table guarding against recorded wake-up frames.

pub mod config;
pub mod csl;
pub mod forwarder;
pub mod mac;
pub mod mle;
pub mod neighbor;
pub mod radio;
pub mod time;
pub mod wakeup;

#[cfg(test)]
pub(crate) mod testing;

// Re-export config types
pub use config::{Config, ConfigError, CslConfig, WakeupConfig};

// Re-export CSL sender types
pub use csl::{CslPeer, EnhCslSender, FrameContext, LinkStats, PrepareError, Services, TxError};

// Re-export forwarder contract types
pub use forwarder::{Forwarder, MessageId, MessageInfo, MessageKind};

// Re-export MAC types
pub use mac::{
    ConnectionIe, ExtAddress, FrameError, Mac, MacAddress, PanId, ReplayError, RxFrame, TxFrame,
    WakeupCoord, WakeupCoordTable,
};

// Re-export MLE contract
pub use mle::{Mle, Role};

// Re-export neighbor types
pub use neighbor::{NeighborId, NeighborTable};

// Re-export radio contracts and time units
pub use radio::{Radio, Timer, SYMBOL_DURATION_US, TEN_SYMBOLS_US};

// Re-export time types
pub use time::TimeMicro;

// Re-export wake-up scheduler types
pub use wakeup::{WakeupError, WakeupTxScheduler};
