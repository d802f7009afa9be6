/// Test doubles to simulate the bus stack, the application listener, and
/// the cycle timer during integration tests.
use korri_comm::config::{ChannelConfig, UserConfig};
use korri_comm::core::{
    BusType, ChannelId, ChannelState, ComMode, GatewayType, NmVariant, PartitionId, PncId, UserId,
};
use korri_comm::protocol::traits::bus_adapter::BusAdapter;
use korri_comm::protocol::traits::cycle_timer::CycleTimer;
use korri_comm::protocol::traits::listener::{ListenerBusy, ModeListener};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub enum BusCall {
    Mode(u8, ComMode),
    NmRequest(u8),
    NmRelease(u8),
    NmPassive(u8),
    Eira(u8, u8, bool),
}

/// In-memory bus stack recording every call the manager makes.
#[derive(Clone, Default)]
pub struct MockBus {
    calls: Arc<Mutex<Vec<BusCall>>>,
    fail: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Drop the recorded history.
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every following call fail, to exercise the provided-service
    /// error path.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }

    fn record(&self, call: BusCall) -> Result<(), ()> {
        if *self.fail.lock().unwrap() {
            return Err(());
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl BusAdapter for MockBus {
    type Error = ();

    fn request_com_mode(&mut self, channel: ChannelId, mode: ComMode) -> Result<(), ()> {
        self.record(BusCall::Mode(channel.0, mode))
    }

    fn nm_network_request(&mut self, channel: ChannelId) -> Result<(), ()> {
        self.record(BusCall::NmRequest(channel.0))
    }

    fn nm_network_release(&mut self, channel: ChannelId) -> Result<(), ()> {
        self.record(BusCall::NmRelease(channel.0))
    }

    fn nm_passive_startup(&mut self, channel: ChannelId) -> Result<(), ()> {
        self.record(BusCall::NmPassive(channel.0))
    }

    fn send_eira(&mut self, channel: ChannelId, pnc: PncId, requested: bool) -> Result<(), ()> {
        self.record(BusCall::Eira(channel.0, pnc.0, requested))
    }
}

/// Application-side listener recording notifications, optionally rejecting
/// them to exercise the at-least-once retry.
#[derive(Clone, Default)]
pub struct MockListener {
    inner: Arc<Mutex<ListenerState>>,
}

#[derive(Default)]
struct ListenerState {
    notifications: Vec<(u8, ComMode)>,
    requester_lists: Vec<(u8, Vec<u8>)>,
    busy: bool,
}

#[allow(dead_code)]
impl MockListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(u8, ComMode)> {
        self.inner.lock().unwrap().notifications.clone()
    }

    pub fn requester_lists(&self) -> Vec<(u8, Vec<u8>)> {
        self.inner.lock().unwrap().requester_lists.clone()
    }

    pub fn set_busy(&self, busy: bool) {
        self.inner.lock().unwrap().busy = busy;
    }
}

impl ModeListener for MockListener {
    fn mode_notification(&mut self, user: UserId, mode: ComMode) -> Result<(), ListenerBusy> {
        let mut state = self.inner.lock().unwrap();
        if state.busy {
            return Err(ListenerBusy);
        }
        state.notifications.push((user.0, mode));
        Ok(())
    }

    fn requesters_changed(&mut self, channel: ChannelId, requesters: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .requester_lists
            .push((channel.0, requesters.to_vec()));
    }
}

#[allow(dead_code)]
/// Timer based on `tokio::time::sleep` to drive the supervisor in tests.
pub struct MockTimer;

impl CycleTimer for MockTimer {
    async fn delay_ms(&mut self, millis: u32) {
        sleep(Duration::from_millis(millis as u64)).await;
    }
}

#[allow(dead_code)]
/// CAN channel descriptor with sane test defaults.
pub fn can_channel(nm_variant: NmVariant) -> ChannelConfig {
    ChannelConfig {
        bus_type: BusType::Can,
        nm_variant,
        gateway: GatewayType::None,
        wakeup_target: ChannelState::FullComNetworkRequested,
        cycle_ms: 10,
        min_full_com_ms: 50,
        nm_light_ms: 30,
        partition: PartitionId::MASTER,
        managing_channel: None,
    }
}

#[allow(dead_code)]
/// FlexRay channel descriptor.
pub fn flexray_channel() -> ChannelConfig {
    ChannelConfig {
        bus_type: BusType::FlexRay,
        ..can_channel(NmVariant::Full)
    }
}

#[allow(dead_code)]
/// User mapping the given channel mask on the master partition.
pub fn user_on(channels: u32) -> UserConfig {
    UserConfig {
        channels,
        pncs: 0,
        partition: PartitionId::MASTER,
    }
}
