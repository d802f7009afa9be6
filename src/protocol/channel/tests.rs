//! Channel transition tests: startup handshakes, downward blocking,
//! convergence of the bounded transition loop, and timer decay.
use super::*;
use crate::config::{ChannelConfig, CommConfig};
use crate::core::{BusType, GatewayType, PncId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusCall {
    Mode(u8, ComMode),
    NmRequest(u8),
    NmRelease(u8),
    NmPassive(u8),
    Eira(u8, u8, bool),
}

/// In-memory bus stack recording every call, fixed capacity.
struct RecordingBus {
    calls: [Option<BusCall>; 32],
    len: usize,
}

impl RecordingBus {
    fn new() -> Self {
        Self {
            calls: [None; 32],
            len: 0,
        }
    }

    fn push(&mut self, call: BusCall) {
        self.calls[self.len] = Some(call);
        self.len += 1;
    }

    fn call(&self, index: usize) -> BusCall {
        self.calls[index].expect("recorded call")
    }
}

impl BusAdapter for RecordingBus {
    type Error = ();

    fn request_com_mode(&mut self, channel: ChannelId, mode: ComMode) -> Result<(), ()> {
        self.push(BusCall::Mode(channel.0, mode));
        Ok(())
    }

    fn nm_network_request(&mut self, channel: ChannelId) -> Result<(), ()> {
        self.push(BusCall::NmRequest(channel.0));
        Ok(())
    }

    fn nm_network_release(&mut self, channel: ChannelId) -> Result<(), ()> {
        self.push(BusCall::NmRelease(channel.0));
        Ok(())
    }

    fn nm_passive_startup(&mut self, channel: ChannelId) -> Result<(), ()> {
        self.push(BusCall::NmPassive(channel.0));
        Ok(())
    }

    fn send_eira(&mut self, channel: ChannelId, pnc: PncId, requested: bool) -> Result<(), ()> {
        self.push(BusCall::Eira(channel.0, pnc.0, requested));
        Ok(())
    }
}

fn channel_config(nm_variant: NmVariant) -> ChannelConfig {
    ChannelConfig {
        bus_type: BusType::Can,
        nm_variant,
        gateway: GatewayType::None,
        wakeup_target: ChannelState::FullComNetworkRequested,
        cycle_ms: 10,
        min_full_com_ms: 50,
        nm_light_ms: 30,
        partition: crate::core::PartitionId::MASTER,
        managing_channel: None,
    }
}

fn config(channels: &[ChannelConfig]) -> CommConfig<'_> {
    CommConfig {
        channels,
        users: &[],
        pncs: &[],
        partitions: 1,
        synchronous_wakeup: false,
        pnc_gateway_coordination: false,
        pnc_prepare_sleep_ms: 0,
        group_classification: 3,
    }
}

fn arb(target: ChannelState, internal: bool) -> Arbitration {
    Arbitration { target, internal }
}

const CH: ChannelId = ChannelId(0);

#[test]
/// An internal request on an NM-FULL channel starts the bus and requests
/// the network within one cycle.
fn internal_request_starts_network() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::FullComNetworkRequested, true),
        &mut bus,
        false,
    )
    .unwrap();

    assert_eq!(entry.state, ChannelState::FullComNetworkRequested);
    assert_eq!(bus.call(0), BusCall::Mode(0, ComMode::FullCom));
    assert_eq!(bus.call(1), BusCall::NmRequest(0));
    // Internal requests govern their own lifetime; no minimum window.
    assert_eq!(entry.min_full_com_timer, 0);
}

#[test]
/// Communication not allowed parks the request in the pending state
/// without touching the bus.
fn startup_gate_blocks_until_allowed() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::FullComNetworkRequested, true),
        &mut bus,
        false,
    )
    .unwrap();

    assert_eq!(entry.state, ChannelState::NoComRequestPending);
    assert_eq!(bus.len, 0);

    entry.comm_allowed = true;
    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::FullComNetworkRequested, true),
        &mut bus,
        false,
    )
    .unwrap();
    assert_eq!(entry.state, ChannelState::FullComNetworkRequested);
}

#[test]
/// A bus-side rise joins passively and arms the minimum full-com window.
fn passive_rise_arms_minimum_window() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::FullComNetworkRequested, false),
        &mut bus,
        false,
    )
    .unwrap();

    assert_eq!(entry.state, ChannelState::FullComNetworkRequested);
    assert_eq!(bus.call(1), BusCall::NmPassive(0));
    // 50 ms at a 10 ms cycle.
    assert_eq!(entry.min_full_com_timer, 5);
}

#[test]
/// Dropping the request releases the network and stops at ready-sleep
/// until the Nm sleep handshake confirms.
fn downward_path_stops_at_ready_sleep() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    entry.state = ChannelState::FullComNetworkRequested;
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::NoComNoPendingRequest, false),
        &mut bus,
        false,
    )
    .unwrap();

    assert_eq!(entry.state, ChannelState::FullComReadySleep);
    assert_eq!(bus.call(0), BusCall::NmRelease(0));
    assert_eq!(bus.len, 1);
}

#[test]
/// Ready-sleep re-enters network-requested directly.
fn ready_sleep_can_rerequest_network() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    entry.state = ChannelState::FullComReadySleep;
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::FullComNetworkRequested, true),
        &mut bus,
        false,
    )
    .unwrap();

    assert_eq!(entry.state, ChannelState::FullComNetworkRequested);
    assert_eq!(bus.call(0), BusCall::NmRequest(0));
}

#[test]
/// Silent reception falls to NO_COM only after the bus-state-manager
/// confirms; the request is issued once, not repeated every cycle.
fn silent_to_no_com_waits_for_confirmation() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    entry.state = ChannelState::SilentCom;
    let mut bus = RecordingBus::new();

    for _ in 0..3 {
        advance(
            &config,
            CH,
            &mut entry,
            &arb(ChannelState::NoComNoPendingRequest, false),
            &mut bus,
            false,
        )
        .unwrap();
    }

    assert_eq!(entry.state, ChannelState::SilentCom);
    assert_eq!(bus.len, 1);
    assert_eq!(bus.call(0), BusCall::Mode(0, ComMode::NoCom));
}

#[test]
/// A LIN slave only asks for shutdown once the master commanded sleep.
fn lin_slave_waits_for_sleep_command() {
    let channels = [channel_config(NmVariant::LinSlave)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    entry.state = ChannelState::FullComReadySleep;
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::NoComNoPendingRequest, false),
        &mut bus,
        false,
    )
    .unwrap();
    assert_eq!(bus.len, 0);

    entry.bus_sleep_indicated = true;
    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::NoComNoPendingRequest, false),
        &mut bus,
        false,
    )
    .unwrap();
    assert_eq!(bus.call(0), BusCall::Mode(0, ComMode::NoCom));
}

#[test]
/// With the Nm stack on another partition the handshake calls are
/// marshalled instead of performed.
fn deferred_nm_calls_land_in_the_cell() {
    let channels = [channel_config(NmVariant::Full)];
    let config = config(&channels);
    let mut entry = ChannelEntry::new();
    entry.comm_allowed = true;
    let mut bus = RecordingBus::new();

    advance(
        &config,
        CH,
        &mut entry,
        &arb(ChannelState::FullComNetworkRequested, true),
        &mut bus,
        true,
    )
    .unwrap();

    assert_eq!(entry.state, ChannelState::FullComNetworkRequested);
    // Only the bus-state-manager call runs locally.
    assert_eq!(bus.len, 1);
    assert_eq!(bus.call(0), BusCall::Mode(0, ComMode::FullCom));
    assert!(entry.forwarded_nm.is_pending());
    assert_eq!(
        entry.forwarded_nm.peek(),
        Some(NmService::NetworkRequest)
    );
}

#[test]
/// Every (current, target) pair settles within one bounded advance call:
/// a second call with unchanged inputs makes no further progress.
fn transition_loop_converges_for_all_pairs() {
    use ChannelState::*;
    let states = [
        NoComNoPendingRequest,
        NoComRequestPending,
        SilentCom,
        FullComNetworkRequested,
        FullComReadySleep,
    ];

    for variant in [
        NmVariant::None,
        NmVariant::Light,
        NmVariant::Full,
        NmVariant::LinSlave,
    ] {
        let channels = [channel_config(variant)];
        let config = config(&channels);
        for current in states {
            for target in states {
                for internal in [false, true] {
                    let mut entry = ChannelEntry::new();
                    entry.comm_allowed = true;
                    entry.state = current;
                    let mut bus = RecordingBus::new();
                    let arbitration = arb(target, internal);

                    advance(&config, CH, &mut entry, &arbitration, &mut bus, false)
                        .unwrap();
                    let settled = entry.state;
                    advance(&config, CH, &mut entry, &arbitration, &mut bus, false)
                        .unwrap();

                    assert_eq!(
                        entry.state, settled,
                        "{:?}: {:?} -> {:?} did not settle",
                        variant, current, target
                    );
                }
            }
        }
    }
}

#[test]
/// Timers decrement once per tick and never wrap below zero.
fn timers_are_monotonic() {
    let channel = channel_config(NmVariant::Full);
    let mut entry = ChannelEntry::new();
    entry.min_full_com_timer = 2;
    entry.nm_light_timer = 1;

    decay_timers(&channel, &mut entry, false);
    assert_eq!(entry.min_full_com_timer, 1);
    assert_eq!(entry.nm_light_timer, 0);

    decay_timers(&channel, &mut entry, false);
    assert_eq!(entry.min_full_com_timer, 0);
    assert_eq!(entry.nm_light_timer, 0);

    decay_timers(&channel, &mut entry, false);
    assert_eq!(entry.min_full_com_timer, 0);
}

#[test]
/// Minimum-window expiry requests ready-sleep on NM-FULL channels and a
/// plain NO_COM everywhere else.
fn minimum_window_expiry_values() {
    let full = channel_config(NmVariant::Full);
    let mut entry = ChannelEntry::new();
    entry.min_full_com_timer = 1;
    decay_timers(&full, &mut entry, false);
    assert_eq!(entry.bus_requested, ChannelState::FullComReadySleep);

    let light = channel_config(NmVariant::Light);
    let mut entry = ChannelEntry::new();
    entry.min_full_com_timer = 1;
    decay_timers(&light, &mut entry, false);
    assert_eq!(entry.bus_requested, ChannelState::NoComNoPendingRequest);
}

#[test]
/// An internal request on an NM-LIGHT channel force-expires the minimum
/// window; waiting serves no purpose once a local requester took over.
fn light_internal_request_force_expires_minimum_window() {
    let light = channel_config(NmVariant::Light);
    let mut entry = ChannelEntry::new();
    entry.min_full_com_timer = 10;

    decay_timers(&light, &mut entry, true);
    assert_eq!(entry.min_full_com_timer, 0);
    assert_eq!(entry.bus_requested, ChannelState::NoComNoPendingRequest);
}

#[test]
/// Nm-light expiry clears the bus-side request.
fn nm_light_expiry_clears_bus_request() {
    let light = channel_config(NmVariant::Light);
    let mut entry = ChannelEntry::new();
    entry.bus_requested = ChannelState::FullComNetworkRequested;
    entry.nm_light_timer = 2;

    decay_timers(&light, &mut entry, false);
    assert_eq!(entry.bus_requested, ChannelState::FullComNetworkRequested);
    decay_timers(&light, &mut entry, false);
    assert_eq!(entry.bus_requested, ChannelState::NoComNoPendingRequest);
}
