//! Trusted wake-up coordinator table.
//!
//! Tracks the (key sequence, frame counter) watermark of every coordinator
//! this device has recently accepted a wake-up frame from, so a replayed
//! frame cannot reactivate the device. The table is bounded; when full, the
//! oldest sufficiently stale entry is evicted to make room for a coordinator
//! heard while roaming.

use thiserror::Error;
use tracing::{info, warn};

use super::frame::RxFrame;
use super::ExtAddress;

/// Default capacity of the coordinator table.
pub const DEFAULT_MAX_WAKEUP_COORDS: usize = 8;

/// Default minimum age before an entry may be evicted, in seconds.
pub const DEFAULT_EVICT_AGE_SECS: u32 = 600;

/// Errors detecting a replayed wake-up frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// The frame's security watermark does not advance the stored one.
    #[error("stale key sequence or frame counter")]
    Security,

    /// The table is full and holds no evictable entry.
    #[error("coordinator table full")]
    NoBufs,
}

/// A trusted wake-up coordinator.
#[derive(Clone, Copy, Debug)]
pub struct WakeupCoord {
    ext_addr: ExtAddress,
    key_sequence: u32,
    frame_counter: u32,
    last_updated: u32,
}

impl WakeupCoord {
    /// Extended address of the coordinator.
    pub fn ext_addr(&self) -> ExtAddress {
        self.ext_addr
    }

    /// Last accepted key sequence.
    pub fn key_sequence(&self) -> u32 {
        self.key_sequence
    }

    /// Last accepted frame counter.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Time of the last accepted frame, in seconds.
    pub fn last_updated(&self) -> u32 {
        self.last_updated
    }
}

/// Bounded table of trusted wake-up coordinators.
#[derive(Debug)]
pub struct WakeupCoordTable {
    coords: Vec<WakeupCoord>,
    max_coords: usize,
    evict_age_secs: u32,
}

impl WakeupCoordTable {
    /// Create a table with the given capacity and eviction age.
    pub fn new(max_coords: usize, evict_age_secs: u32) -> Self {
        Self {
            coords: Vec::with_capacity(max_coords),
            max_coords,
            evict_age_secs,
        }
    }

    /// Create a table with default parameters.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_WAKEUP_COORDS, DEFAULT_EVICT_AGE_SECS)
    }

    /// Maximum number of entries.
    pub fn max_coords(&self) -> usize {
        self.max_coords
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Look up a coordinator by extended address.
    pub fn get(&self, ext_addr: &ExtAddress) -> Option<&WakeupCoord> {
        self.coords.iter().find(|c| c.ext_addr == *ext_addr)
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.coords.clear();
    }

    /// Check an authenticated wake-up frame against the stored watermark.
    ///
    /// A frame from a known coordinator is accepted only when its
    /// (key sequence, frame counter) pair strictly advances the stored pair.
    /// A frame from an unknown coordinator is accepted if a slot is free or
    /// can be freed by evicting a sufficiently old entry. On acceptance the
    /// entry is created or refreshed with the frame's values and
    /// `now_secs`; on rejection the table is left untouched.
    pub fn detect_replay(&mut self, frame: &RxFrame, now_secs: u32) -> Result<(), ReplayError> {
        let src_addr = frame.src_addr();
        let key_sequence = frame.key_sequence();
        let frame_counter = frame.frame_counter();

        match self.coords.iter_mut().find(|c| c.ext_addr == src_addr) {
            Some(coord) => {
                let advances = key_sequence > coord.key_sequence
                    || (key_sequence == coord.key_sequence
                        && frame_counter > coord.frame_counter);
                if !advances {
                    warn!(addr = %src_addr, "rejected replayed wake-up frame");
                    return Err(ReplayError::Security);
                }

                coord.key_sequence = key_sequence;
                coord.frame_counter = frame_counter;
                coord.last_updated = now_secs;
            }
            None => {
                if self.coords.len() >= self.max_coords {
                    self.evict(now_secs);
                }
                if self.coords.len() >= self.max_coords {
                    info!("wake-up frame received while the coordinator table was full");
                    return Err(ReplayError::NoBufs);
                }

                self.coords.push(WakeupCoord {
                    ext_addr: src_addr,
                    key_sequence,
                    frame_counter,
                    last_updated: now_secs,
                });
            }
        }

        Ok(())
    }

    /// Evict the least recently updated entry older than the eviction age.
    ///
    /// Entries younger than the eviction age are never evicted, and no
    /// eviction is attempted while the clock has not yet passed the eviction
    /// age (cold boot).
    fn evict(&mut self, now_secs: u32) {
        if now_secs <= self.evict_age_secs {
            return;
        }

        let mut oldest_updated = now_secs - self.evict_age_secs;
        let mut oldest: Option<usize> = None;

        for (index, coord) in self.coords.iter().enumerate() {
            if coord.last_updated < oldest_updated {
                oldest_updated = coord.last_updated;
                oldest = Some(index);
            }
        }

        if let Some(index) = oldest {
            let coord = self.coords.remove(index);
            info!(addr = %coord.ext_addr, "evicted wake-up coordinator");
        }
    }
}
