//! Wake-up frame burst scheduling.

use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::mac::frame::{
    ConnectionIe, TxFrame, PARENT_REQUEST_LENGTH, WAKEUP_FRAME_DATA_LENGTH, WAKEUP_FRAME_LENGTH,
};
use crate::mac::{ExtAddress, Mac, MacAddress, PanId};
use crate::radio::{bus_transfer_time_us, Radio, Timer, OCTET_DURATION_US, TEN_SYMBOLS_US};
use crate::time::TimeMicro;

/// Errors starting a wake-up sequence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WakeupError {
    /// A wake-up sequence is already in progress.
    #[error("a wake-up sequence is already in progress")]
    SequenceOngoing,
}

/// Scheduler emitting a timed burst of wake-up frames at one target.
///
/// The owned timer fires `request_ahead_us` before each slot; its expiry is
/// handed to [`WakeupTxScheduler::handle_timer`], which requests a wake-up
/// transmission from the MAC, and the MAC pulls the frame through
/// [`WakeupTxScheduler::handle_frame_request`], which immediately arms the
/// next slot — completion callbacks arrive too late to keep up with the
/// frame cadence on an RCP link.
pub struct WakeupTxScheduler<T: Timer> {
    target: ExtAddress,
    own_address: ExtAddress,
    pan_id: PanId,
    /// Start of the next wake-up frame.
    tx_time: TimeMicro,
    /// End of the burst; no frame starts at or after this point.
    tx_end_time: TimeMicro,
    interval_us: u16,
    /// How much ahead of `tx_time` the MAC operation is requested.
    request_ahead_us: u16,
    connection_retry_interval: u8,
    connection_retry_count: u8,
    timer: T,
    sequence_ongoing: bool,
}

impl<T: Timer> WakeupTxScheduler<T> {
    /// Create a scheduler; the request-ahead time absorbs the host-to-RCP
    /// transfer of one wake-up frame.
    pub fn new(
        config: &Config,
        radio: &dyn Radio,
        timer: T,
        own_address: ExtAddress,
        pan_id: PanId,
    ) -> Self {
        let request_ahead_us = config.csl.request_ahead_us
            + bus_transfer_time_us(WAKEUP_FRAME_DATA_LENGTH, radio.bus_speed_hz());

        Self {
            target: ExtAddress::default(),
            own_address,
            pan_id,
            tx_time: TimeMicro::default(),
            tx_end_time: TimeMicro::default(),
            interval_us: 0,
            request_ahead_us: request_ahead_us as u16,
            connection_retry_interval: config.wakeup.connection_retry_interval,
            connection_retry_count: config.wakeup.connection_retry_count,
            timer,
            sequence_ongoing: false,
        }
    }

    /// Start a wake-up sequence toward `target`.
    ///
    /// Frames go out every `interval_us` for `duration_ms`; the end time
    /// gets one extra interval so the last slot is still emittable.
    pub fn wake_up(
        &mut self,
        target: ExtAddress,
        interval_us: u16,
        duration_ms: u16,
        radio: &dyn Radio,
    ) -> Result<(), WakeupError> {
        if self.sequence_ongoing {
            return Err(WakeupError::SequenceOngoing);
        }

        let now = TimeMicro::from_now_us(radio.platform_now_us());
        self.target = target;
        self.tx_time = now.add_us(u32::from(self.request_ahead_us));
        self.tx_end_time = self
            .tx_time
            .add_us(u32::from(duration_ms) * 1000 + u32::from(interval_us));
        self.interval_us = interval_us;
        self.sequence_ongoing = true;

        info!(peer = %target, interval_us, duration_ms, "started wake-up sequence");

        self.schedule_next(true, radio);
        Ok(())
    }

    /// Cancel an in-progress wake-up sequence.
    pub fn stop(&mut self) {
        self.sequence_ongoing = false;
        self.timer.stop();
    }

    /// Whether a wake-up sequence is in progress.
    pub fn is_sequence_ongoing(&self) -> bool {
        self.sequence_ongoing
    }

    /// Time the burst is scheduled to end.
    pub fn tx_end_time(&self) -> TimeMicro {
        self.tx_end_time
    }

    /// Grace period after the burst during which the peripheral may still
    /// answer with its link-establishment message.
    pub fn connection_window_us(&self) -> u32 {
        u32::from(self.interval_us)
            * u32::from(self.connection_retry_interval)
            * u32::from(self.connection_retry_count)
    }

    /// Deliver an expired timer deadline.
    ///
    /// Asks the MAC for the wake-up frame scheduled at `tx_time`; the MAC
    /// answers by pulling it through
    /// [`WakeupTxScheduler::handle_frame_request`]. A deadline expiring
    /// after `stop()` is ignored.
    pub fn handle_timer(&mut self, mac: &mut dyn Mac) {
        if !self.sequence_ongoing {
            return;
        }

        mac.request_wakeup_tx();
    }

    /// Fill the next wake-up frame for the MAC. Returns false when the burst
    /// is over or the frame could not be built.
    pub fn handle_frame_request(&mut self, frame: &mut TxFrame, radio: &dyn Radio) -> bool {
        if !self.sequence_ongoing {
            return false;
        }

        let now = TimeMicro::from_now_us(radio.platform_now_us());
        let radio_now = TimeMicro::from_now_us(radio.radio_now_us());
        // Express the target slot on the radio clock; a 32-bit wrap is fine
        // because the value acts as a delay from "radio now".
        let radio_tx_time = radio_now.add_us(self.tx_time.duration_since(now));

        if frame
            .generate_wakeup_frame(
                self.pan_id,
                MacAddress::Extended(self.target),
                MacAddress::Extended(self.own_address),
            )
            .is_err()
        {
            return false;
        }

        frame.set_tx_delay_base_time(0);
        frame.set_tx_delay(radio_tx_time.value());
        frame.set_csma_ca_enabled(false);
        frame.set_max_csma_backoffs(0);
        frame.set_max_frame_retries(0);

        // Rendezvous Time is the gap between the end of this wake-up frame
        // and the start of the first payload frame, in 10-symbol units. Aim
        // the expected Parent Request at the middle of the empty slot behind
        // the next wake-up frame.
        let interval = u32::from(self.interval_us);
        let mut rendezvous_us = interval
            .saturating_sub((WAKEUP_FRAME_LENGTH + PARENT_REQUEST_LENGTH) * OCTET_DURATION_US)
            / 2;
        rendezvous_us += interval;
        frame.set_rendezvous_time((rendezvous_us / TEN_SYMBOLS_US) as u16);
        frame.set_connection_ie(ConnectionIe::new(
            self.connection_retry_interval,
            self.connection_retry_count,
        ));

        // Arm the next slot right away instead of waiting for the completion
        // callback.
        self.schedule_next(false, radio);
        true
    }

    /// Advance to the next slot and arm the timer, or finish the burst.
    fn schedule_next(&mut self, first_frame: bool, radio: &dyn Radio) {
        if !first_frame {
            let earliest = TimeMicro::from_now_us(radio.platform_now_us())
                .add_us(u32::from(self.request_ahead_us));
            // Advance by one interval, but never schedule into the past.
            self.tx_time = self
                .tx_time
                .add_us(u32::from(self.interval_us))
                .later_of(earliest);
        }

        // No frame is scheduled at this moment: this runs either at the start
        // of the sequence or right after a frame was handed over, so exiting
        // here cleanly ends the burst.
        if self.tx_time.is_at_or_after(self.tx_end_time) {
            self.sequence_ongoing = false;
            info!("stopped wake-up sequence");
            return;
        }

        self.timer
            .fire_at(self.tx_time.sub_us(u32::from(self.request_ahead_us)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeMac, FakeRadio, SharedTimer};

    fn config(request_ahead_us: u32) -> Config {
        let mut config = Config::default();
        config.csl.request_ahead_us = request_ahead_us;
        config.wakeup.connection_retry_interval = 4;
        config.wakeup.connection_retry_count = 8;
        config
    }

    fn scheduler(
        request_ahead_us: u32,
        radio: &FakeRadio,
    ) -> (WakeupTxScheduler<SharedTimer>, SharedTimer) {
        let timer = SharedTimer::default();
        let scheduler = WakeupTxScheduler::new(
            &config(request_ahead_us),
            radio,
            timer.clone(),
            ExtAddress::from_bytes([0x11; 8]),
            PanId::new(0xface),
        );
        (scheduler, timer)
    }

    fn target() -> ExtAddress {
        ExtAddress::from_bytes([0x22; 8])
    }

    #[test]
    fn test_burst_emits_expected_slots_then_stops() {
        let mut radio = FakeRadio::new();
        let mut mac = FakeMac::default();
        let (mut scheduler, timer) = scheduler(1500, &radio);

        scheduler.wake_up(target(), 10_000, 50, &radio).unwrap();
        assert!(scheduler.is_sequence_ongoing());
        assert_eq!(scheduler.tx_end_time(), TimeMicro::new(61_500));

        let mut tx_times = Vec::new();
        while scheduler.is_sequence_ongoing() {
            let armed_at = timer.armed_at().expect("timer armed while ongoing");
            radio.platform_now_us = u64::from(armed_at.value());
            radio.radio_now_us = radio.platform_now_us;

            scheduler.handle_timer(&mut mac);

            let mut frame = TxFrame::new();
            assert!(scheduler.handle_frame_request(&mut frame, &radio));
            tx_times.push(frame.tx_delay());
        }

        // Slots every interval from start+ahead, none at or past the end.
        assert_eq!(
            tx_times,
            vec![1_500, 11_500, 21_500, 31_500, 41_500, 51_500]
        );
        assert!(!scheduler.is_sequence_ongoing());
        // One arm at start plus one after each frame except the last, and
        // one MAC wake-up request per expired deadline.
        assert_eq!(timer.arm_count(), 6);
        assert_eq!(mac.wakeup_tx_requests, 6);
    }

    #[test]
    fn test_wake_up_while_ongoing_is_rejected() {
        let radio = FakeRadio::new();
        let (mut scheduler, _timer) = scheduler(1500, &radio);

        scheduler.wake_up(target(), 10_000, 50, &radio).unwrap();
        assert_eq!(
            scheduler.wake_up(target(), 10_000, 50, &radio),
            Err(WakeupError::SequenceOngoing)
        );
    }

    #[test]
    fn test_stop_cancels_burst() {
        let radio = FakeRadio::new();
        let mut mac = FakeMac::default();
        let (mut scheduler, timer) = scheduler(1500, &radio);

        scheduler.wake_up(target(), 10_000, 50, &radio).unwrap();
        scheduler.stop();

        assert!(!scheduler.is_sequence_ongoing());
        assert_eq!(timer.stop_count(), 1);

        // A deadline expiring after stop requests nothing, and a late frame
        // request produces no frame.
        scheduler.handle_timer(&mut mac);
        assert_eq!(mac.wakeup_tx_requests, 0);

        let mut frame = TxFrame::new();
        assert!(!scheduler.handle_frame_request(&mut frame, &radio));
        assert!(frame.is_empty());
    }

    #[test]
    fn test_preempted_scheduler_resynchronizes_to_now() {
        let mut radio = FakeRadio::new();
        let (mut scheduler, timer) = scheduler(1500, &radio);

        scheduler.wake_up(target(), 10_000, 200, &radio).unwrap();

        let mut frame = TxFrame::new();
        assert!(scheduler.handle_frame_request(&mut frame, &radio));

        // The event loop stalls well past the next few slots.
        radio.platform_now_us = 50_000;
        let mut frame = TxFrame::new();
        assert!(scheduler.handle_frame_request(&mut frame, &radio));

        // The slot after the stall is re-anchored at now + ahead, not at the
        // stale grid position.
        assert_eq!(timer.armed_at(), Some(TimeMicro::new(50_000)));
    }

    #[test]
    fn test_frame_fields() {
        let mut radio = FakeRadio::new();
        radio.radio_now_us = 5_000_000;
        let (mut scheduler, _timer) = scheduler(1500, &radio);

        scheduler.wake_up(target(), 10_000, 50, &radio).unwrap();

        let mut frame = TxFrame::new();
        assert!(scheduler.handle_frame_request(&mut frame, &radio));

        assert_eq!(frame.destination(), Some(MacAddress::Extended(target())));
        assert_eq!(
            frame.source(),
            Some(MacAddress::Extended(ExtAddress::from_bytes([0x11; 8])))
        );
        assert_eq!(frame.pan_id(), Some(PanId::new(0xface)));

        // Absolute radio-clock slot time: radio now + (tx_time - now).
        assert_eq!(frame.tx_delay(), 5_001_500);
        assert_eq!(frame.tx_delay_base_time(), 0);
        assert!(!frame.is_csma_ca_enabled());
        assert_eq!(frame.max_csma_backoffs(), 0);
        assert_eq!(frame.max_frame_retries(), 0);

        // (10000 - 132 * 32) / 2 + 10000 = 12888 us -> 80 ten-symbol units.
        assert_eq!(frame.rendezvous_time(), Some(80));
        let ie = frame.connection_ie().unwrap();
        assert_eq!(ie.retry_interval(), 4);
        assert_eq!(ie.retry_count(), 8);
    }

    #[test]
    fn test_connection_window() {
        let radio = FakeRadio::new();
        let (mut scheduler, _timer) = scheduler(1500, &radio);

        scheduler.wake_up(target(), 10_000, 50, &radio).unwrap();
        assert_eq!(scheduler.connection_window_us(), 10_000 * 4 * 8);
    }

    #[test]
    fn test_request_ahead_includes_bus_transfer_time() {
        let mut radio = FakeRadio::new();
        radio.bus_speed_hz = 1_000_000;
        let (mut scheduler, timer) = scheduler(2000, &radio);

        // 100 bytes at 1 Mbit/s adds 800 us of lead time.
        scheduler.wake_up(target(), 10_000, 50, &radio).unwrap();
        assert_eq!(timer.armed_at(), Some(TimeMicro::new(0)));
        assert_eq!(scheduler.tx_end_time(), TimeMicro::new(2_800 + 60_000));
    }
}
