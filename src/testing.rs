//! Shared test fixtures.
//!
//! Fake collaborators for driving the state machines deterministically:
//! clocks and timers are plain fields the tests advance by hand, and every
//! outward call is recorded for inspection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::csl::CslPeer;
use crate::forwarder::{Forwarder, MessageId, MessageInfo};
use crate::mac::{Mac, MacAddress, TxFrame};
use crate::mle::{Mle, Role};
use crate::neighbor::{NeighborId, NeighborTable};
use crate::radio::{Radio, Timer};
use crate::time::TimeMicro;

/// Radio with hand-advanced clocks.
pub(crate) struct FakeRadio {
    pub radio_now_us: u64,
    pub platform_now_us: u64,
    pub bus_speed_hz: u32,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            radio_now_us: 0,
            platform_now_us: 0,
            bus_speed_hz: 0,
        }
    }
}

impl Radio for FakeRadio {
    fn radio_now_us(&self) -> u64 {
        self.radio_now_us
    }

    fn platform_now_us(&self) -> u64 {
        self.platform_now_us
    }

    fn bus_speed_hz(&self) -> u32 {
        self.bus_speed_hz
    }
}

#[derive(Default)]
struct TimerState {
    armed_at: Option<TimeMicro>,
    arm_count: usize,
    stop_count: usize,
}

/// Timer handle that can be cloned into a scheduler and inspected from the
/// test afterwards.
#[derive(Clone, Default)]
pub(crate) struct SharedTimer(Rc<RefCell<TimerState>>);

impl SharedTimer {
    pub fn armed_at(&self) -> Option<TimeMicro> {
        self.0.borrow().armed_at
    }

    pub fn arm_count(&self) -> usize {
        self.0.borrow().arm_count
    }

    pub fn stop_count(&self) -> usize {
        self.0.borrow().stop_count
    }
}

impl Timer for SharedTimer {
    fn fire_at(&mut self, at: TimeMicro) {
        let mut state = self.0.borrow_mut();
        state.armed_at = Some(at);
        state.arm_count += 1;
    }

    fn stop(&mut self) {
        let mut state = self.0.borrow_mut();
        state.armed_at = None;
        state.stop_count += 1;
    }
}

/// MAC recording every requested transmission.
#[derive(Default)]
pub(crate) struct FakeMac {
    pub csl_tx_requests: Vec<u32>,
    pub wakeup_tx_requests: u32,
}

impl Mac for FakeMac {
    fn request_enh_csl_tx(&mut self, delay_ms: u32) {
        self.csl_tx_requests.push(delay_ms);
    }

    fn request_wakeup_tx(&mut self) {
        self.wakeup_tx_requests += 1;
    }
}

struct FakeMessage {
    info: MessageInfo,
    offset: u16,
}

/// Forwarder with an in-memory send queue.
///
/// Prepared frames get their fields from the `frame_*` knobs so tests can
/// stage exactly the sequence numbers and security material they expect
/// back.
pub(crate) struct FakeForwarder {
    queue: Vec<MessageId>,
    messages: HashMap<MessageId, FakeMessage>,
    pub removed: Vec<MessageId>,
    pub ip_tx_success: u32,
    pub ip_tx_failure: u32,
    pub frame_sequence: u8,
    pub frame_counter: u32,
    pub frame_key_id: u8,
    pub frame_csl_ie: bool,
    /// Bytes delivered per prepared frame.
    pub fragment_size: u16,
    pub mac_source: MacAddress,
    pub link_local_destination: MacAddress,
}

impl Default for FakeForwarder {
    fn default() -> Self {
        Self {
            queue: Vec::new(),
            messages: HashMap::new(),
            removed: Vec::new(),
            ip_tx_success: 0,
            ip_tx_failure: 0,
            frame_sequence: 0,
            frame_counter: 0,
            frame_key_id: 0,
            frame_csl_ie: false,
            fragment_size: u16::MAX,
            mac_source: MacAddress::Short(0xfffe),
            link_local_destination: MacAddress::Short(0x1234),
        }
    }
}

impl FakeForwarder {
    pub fn add_message(&mut self, id: MessageId, info: MessageInfo) {
        self.queue.push(id);
        self.messages.insert(id, FakeMessage { info, offset: 0 });
    }
}

impl Forwarder for FakeForwarder {
    fn send_queue_ids(&self) -> Vec<MessageId> {
        self.queue.clone()
    }

    fn message_info(&self, id: MessageId) -> Option<MessageInfo> {
        self.messages.get(&id).map(|message| message.info)
    }

    fn message_offset(&self, id: MessageId) -> u16 {
        self.messages.get(&id).map_or(0, |message| message.offset)
    }

    fn set_message_offset(&mut self, id: MessageId, offset: u16) {
        if let Some(message) = self.messages.get_mut(&id) {
            message.offset = offset;
        }
    }

    fn prepare_data_frame(
        &mut self,
        frame: &mut TxFrame,
        id: MessageId,
        source: MacAddress,
        destination: MacAddress,
    ) -> u16 {
        let message = self.messages.get(&id).expect("message in queue");
        let remaining = message.info.length.saturating_sub(message.offset);
        let taken = remaining.min(self.fragment_size);

        frame.set_addresses(source, destination);
        frame.set_length(taken);
        frame.set_sequence(self.frame_sequence);
        frame.set_csl_ie_present(self.frame_csl_ie);
        frame.set_security_enabled(message.info.link_security_enabled);
        if message.info.link_security_enabled {
            frame.set_header_updated(true);
            frame.set_frame_counter(self.frame_counter);
            frame.set_key_id(self.frame_key_id);
        }

        message.offset + taken
    }

    fn remove_message_if_no_pending_tx(&mut self, id: MessageId) {
        if self.messages.remove(&id).is_some() {
            self.queue.retain(|queued| *queued != id);
            self.removed.push(id);
        }
    }

    fn record_ip_tx(&mut self, success: bool) {
        if success {
            self.ip_tx_success += 1;
        } else {
            self.ip_tx_failure += 1;
        }
    }

    fn mac_source_address(&self, _id: MessageId) -> MacAddress {
        self.mac_source
    }

    fn mac_destination_address(&self, _id: MessageId) -> MacAddress {
        self.link_local_destination
    }
}

/// MLE recording detach, keep-alive and shorter-Child-ID requests.
#[derive(Default)]
pub(crate) struct FakeMle {
    pub role: Role,
    pub parent: Option<NeighborId>,
    pub parent_candidate: Option<NeighborId>,
    pub csl_central_present: bool,
    pub detach_requests: u32,
    pub shorter_child_id_requests: u32,
    pub child_update_requests: u32,
}

impl Mle for FakeMle {
    fn role(&self) -> Role {
        self.role
    }

    fn parent(&self) -> Option<NeighborId> {
        self.parent
    }

    fn parent_candidate(&self) -> Option<NeighborId> {
        self.parent_candidate
    }

    fn is_csl_central_present(&self) -> bool {
        self.csl_central_present
    }

    fn become_detached(&mut self) {
        self.detach_requests += 1;
    }

    fn request_shorter_child_id_request(&mut self) {
        self.shorter_child_id_requests += 1;
    }

    fn send_child_update_request(&mut self) {
        self.child_update_requests += 1;
    }
}

/// Neighbor table backed by a map.
#[derive(Default)]
pub(crate) struct FakeNeighbors {
    peers: HashMap<NeighborId, CslPeer>,
}

impl FakeNeighbors {
    pub fn insert(&mut self, id: NeighborId, peer: CslPeer) {
        self.peers.insert(id, peer);
    }

    pub fn get(&self, id: NeighborId) -> &CslPeer {
        self.peers.get(&id).expect("neighbor exists")
    }

    pub fn get_mut(&mut self, id: NeighborId) -> &mut CslPeer {
        self.peers.get_mut(&id).expect("neighbor exists")
    }
}

impl NeighborTable for FakeNeighbors {
    fn csl_peer(&self, id: NeighborId) -> Option<&CslPeer> {
        self.peers.get(&id)
    }

    fn csl_peer_mut(&mut self, id: NeighborId) -> Option<&mut CslPeer> {
        self.peers.get_mut(&id)
    }
}
