//! Passive wake-up fan-out tests.
use super::*;
use crate::config::{ChannelConfig, CommConfig, PncConfig, UserConfig};
use crate::core::{BusType, ChannelState, GatewayType, NmVariant, PartitionId, PncState};

fn channel_config(managing_channel: Option<ChannelId>) -> ChannelConfig {
    ChannelConfig {
        bus_type: BusType::Can,
        nm_variant: NmVariant::Full,
        gateway: GatewayType::None,
        wakeup_target: ChannelState::FullComNetworkRequested,
        cycle_ms: 10,
        min_full_com_ms: 0,
        nm_light_ms: 0,
        partition: PartitionId::MASTER,
        managing_channel,
    }
}

fn config<'a>(
    channels: &'a [ChannelConfig],
    users: &'a [UserConfig],
    pncs: &'a [PncConfig],
    synchronous: bool,
) -> CommConfig<'a> {
    CommConfig {
        channels,
        users,
        pncs,
        partitions: 1,
        synchronous_wakeup: synchronous,
        pnc_gateway_coordination: false,
        pnc_prepare_sleep_ms: 20,
        group_classification: 3,
    }
}

#[test]
/// A wake-up raises the bus-side request to the configured target.
fn wakeup_raises_bus_request() {
    let channels = [channel_config(None)];
    let config = config(&channels, &[], &[], false);
    let mut channel_entries = [ChannelEntry::new(); 1];
    let mut pnc_entries: [crate::protocol::pnc::PncEntry; 0] = [];

    channel_wakeup(&config, &mut channel_entries, &mut pnc_entries, ChannelId(0), 2);
    assert_eq!(
        channel_entries[0].bus_requested,
        ChannelState::FullComNetworkRequested
    );
}

#[test]
/// Wake-ups are ignored on channels already in full communication and on
/// channels with the wake-up inhibition set.
fn wakeup_ignored_when_awake_or_inhibited() {
    let channels = [channel_config(None), channel_config(None)];
    let config = config(&channels, &[], &[], false);
    let mut channel_entries = [ChannelEntry::new(); 2];
    let mut pnc_entries: [crate::protocol::pnc::PncEntry; 0] = [];

    channel_entries[0].state = ChannelState::FullComReadySleep;
    channel_wakeup(&config, &mut channel_entries, &mut pnc_entries, ChannelId(0), 2);
    assert_eq!(
        channel_entries[0].bus_requested,
        ChannelState::NoComNoPendingRequest
    );

    channel_entries[1].inhibition = InhibitionStatus::PREVENT_WAKE_UP;
    channel_wakeup(&config, &mut channel_entries, &mut pnc_entries, ChannelId(1), 2);
    assert_eq!(
        channel_entries[1].bus_requested,
        ChannelState::NoComNoPendingRequest
    );
}

#[test]
/// During a FlexRay shutdown the wake-up is parked and the bus-side
/// request stays untouched.
fn wakeup_queued_during_flexray_shutdown() {
    let channels = [channel_config(None)];
    let config = config(&channels, &[], &[], false);
    let mut channel_entries = [ChannelEntry::new(); 1];
    let mut pnc_entries: [crate::protocol::pnc::PncEntry; 0] = [];

    channel_entries[0].fr_shutdown = true;
    channel_wakeup(&config, &mut channel_entries, &mut pnc_entries, ChannelId(0), 2);

    assert_eq!(
        channel_entries[0].bus_requested,
        ChannelState::NoComNoPendingRequest
    );
    assert_eq!(
        channel_entries[0].post_shutdown_wakeup,
        Some(ChannelState::FullComNetworkRequested)
    );
}

#[test]
/// Waking a managing channel wakes the channels it manages.
fn managing_channel_fans_out() {
    let channels = [channel_config(None), channel_config(Some(ChannelId(0)))];
    let config = config(&channels, &[], &[], false);
    let mut channel_entries = [ChannelEntry::new(); 2];
    let mut pnc_entries: [crate::protocol::pnc::PncEntry; 0] = [];

    channel_wakeup(&config, &mut channel_entries, &mut pnc_entries, ChannelId(0), 2);
    assert_eq!(
        channel_entries[1].bus_requested,
        ChannelState::FullComNetworkRequested
    );
}

#[test]
/// Synchronous wake-up is never partial: every sleeping channel rises and
/// every cluster is activated.
fn synchronous_wakeup_wakes_everything() {
    let channels = [channel_config(None), channel_config(None)];
    let pnc_configs = [PncConfig { channels: 0 }];
    let config = config(&channels, &[], &pnc_configs, true);
    let mut channel_entries = [ChannelEntry::new(); 2];
    let mut pnc_entries = [crate::protocol::pnc::PncEntry::new(); 1];

    channel_wakeup(&config, &mut channel_entries, &mut pnc_entries, ChannelId(0), 3);

    for entry in channel_entries.iter() {
        assert_eq!(entry.bus_requested, ChannelState::FullComNetworkRequested);
    }
    assert_eq!(pnc_entries[0].state, PncState::RequestedPassive);
    assert_eq!(pnc_entries[0].prepare_sleep_timer, 3);
}

#[test]
/// A cluster wake-up activates the cluster and wakes its mapped channels.
fn pnc_wakeup_wakes_mapped_channels() {
    let channels = [channel_config(None), channel_config(None)];
    let pnc_configs = [PncConfig { channels: 0b01 }];
    let config = config(&channels, &[], &pnc_configs, false);
    let mut channel_entries = [ChannelEntry::new(); 2];
    let mut pnc_entries = [crate::protocol::pnc::PncEntry::new(); 1];

    pnc_wakeup(&config, &mut channel_entries, &mut pnc_entries, PncId(0), 2);

    assert_eq!(pnc_entries[0].state, PncState::RequestedPassive);
    assert_eq!(
        channel_entries[0].bus_requested,
        ChannelState::FullComNetworkRequested
    );
    // Channel 1 is not part of the cluster.
    assert_eq!(
        channel_entries[1].bus_requested,
        ChannelState::NoComNoPendingRequest
    );
}
