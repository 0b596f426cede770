//! Wake-up sequence transmission.
//!
//! A central wakes a sleeping peripheral by emitting a dense burst of
//! identical wake-up frames at its extended address, each telling the
//! peripheral when to answer with its link-establishment message.

pub mod scheduler;

pub use scheduler::{WakeupError, WakeupTxScheduler};
