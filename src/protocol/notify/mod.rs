//! Notification dispatch: pushes mode changes to registered users with
//! duplicate suppression and at-least-once retry, and reports FULL_COM
//! requester-list deltas. Listener callbacks are always invoked without any
//! internal state borrowed across the call.
use crate::config::CommConfig;
use crate::core::{ChannelId, ComMode, PartitionId, UserId};
use crate::protocol::channel::{ChannelEntry, RequesterList};
use crate::protocol::pnc::PncEntry;
use crate::protocol::traits::listener::ModeListener;
use crate::protocol::user::UserEntry;

/// Aggregated mode of one user: the lowest mode across every channel the
/// user maps, directly or through its clusters. Users mapping only
/// channel-less clusters aggregate the cluster modes instead.
pub(crate) fn user_current_mode(
    config: &CommConfig<'_>,
    channels: &[ChannelEntry],
    pncs: &[PncEntry],
    user: UserId,
) -> ComMode {
    let user_cfg = config.user(user);
    let mut lowest: Option<ComMode> = None;
    let mut merge = |mode: ComMode| {
        lowest = Some(match lowest {
            Some(current) => current.min(mode),
            None => mode,
        });
    };

    for index in 0..config.channels.len() {
        if user_cfg.maps_channel(ChannelId(index as u8)) {
            merge(channels[index].state.com_mode());
        }
    }
    for (index, pnc_cfg) in config.pncs.iter().enumerate() {
        if user_cfg.pncs & (1u32 << index) == 0 {
            continue;
        }
        if pnc_cfg.channels == 0 {
            merge(pncs[index].state.com_mode());
            continue;
        }
        for channel_index in 0..config.channels.len() {
            if pnc_cfg.maps_channel(ChannelId(channel_index as u8)) {
                merge(channels[channel_index].state.com_mode());
            }
        }
    }

    lowest.unwrap_or(ComMode::NoCom)
}

/// Satellite-side variant of [`user_current_mode`] reading the published
/// mirrors of `partition` instead of the authoritative state.
pub(crate) fn user_mode_from_published(
    config: &CommConfig<'_>,
    channels: &[ChannelEntry],
    user: UserId,
    partition: PartitionId,
) -> ComMode {
    let user_cfg = config.user(user);
    let mut lowest: Option<ComMode> = None;
    for index in 0..config.channels.len() {
        let channel = ChannelId(index as u8);
        let mapped = user_cfg.maps_channel(channel)
            || user_cfg.pncs & config.pncs_of_channel(channel) != 0;
        if mapped {
            let mode = channels[index].published[partition.index()]
                .peek()
                .com_mode();
            lowest = Some(lowest.map_or(mode, |current: ComMode| current.min(mode)));
        }
    }
    lowest.unwrap_or(ComMode::NoCom)
}

/// Deliver pending mode notifications to every user of `channel` owned by
/// `partition`. A busy listener keeps the channel's state-changed flag set
/// so the identical notification is retried next cycle; a successful
/// delivery records the value and suppresses duplicates from then on.
pub(crate) fn notify_users_of_channel<L: ModeListener>(
    config: &CommConfig<'_>,
    channels: &mut [ChannelEntry],
    pncs: &[PncEntry],
    users: &mut [UserEntry],
    listener: &mut L,
    channel: ChannelId,
    partition: PartitionId,
) {
    if !channels[channel.index()].state_changed {
        return;
    }

    let pncs_here = config.pncs_of_channel(channel);
    let mut all_delivered = true;
    for (index, user_cfg) in config.users.iter().enumerate() {
        if user_cfg.partition != partition {
            continue;
        }
        if !user_cfg.maps_channel(channel) && user_cfg.pncs & pncs_here == 0 {
            continue;
        }
        let user = UserId(index as u8);
        let current = user_current_mode(config, channels, pncs, user);
        if users[index].last_notified == current {
            continue;
        }
        match listener.mode_notification(user, current) {
            Ok(()) => users[index].last_notified = current,
            Err(_) => all_delivered = false,
        }
    }

    if all_delivered {
        channels[channel.index()].state_changed = false;
    }
}

/// Satellite-side notification pass: deliver mode changes derived from the
/// published mirrors to the users owned by `partition`. Duplicate
/// suppression and busy-listener retry behave exactly as on the master.
pub(crate) fn notify_satellite_users<L: ModeListener>(
    config: &CommConfig<'_>,
    channels: &[ChannelEntry],
    users: &mut [UserEntry],
    listener: &mut L,
    channel: ChannelId,
    partition: PartitionId,
) {
    let pncs_here = config.pncs_of_channel(channel);
    for (index, user_cfg) in config.users.iter().enumerate() {
        if user_cfg.partition != partition {
            continue;
        }
        if !user_cfg.maps_channel(channel) && user_cfg.pncs & pncs_here == 0 {
            continue;
        }
        let user = UserId(index as u8);
        let mode = user_mode_from_published(config, channels, user, partition);
        if users[index].last_notified == mode {
            continue;
        }
        if listener.mode_notification(user, mode).is_ok() {
            users[index].last_notified = mode;
        }
    }
}

/// Recompute the FULL_COM requester snapshot of `channel` and report it
/// only when the set actually changed.
pub(crate) fn update_requester_list<L: ModeListener>(
    config: &CommConfig<'_>,
    channels: &mut [ChannelEntry],
    users: &[UserEntry],
    listener: &mut L,
    channel: ChannelId,
) {
    let mut list = RequesterList::new();
    for (index, user_cfg) in config.users.iter().enumerate() {
        if user_cfg.maps_channel(channel) && users[index].request.peek() == ComMode::FullCom {
            list.push(index as u8);
        }
    }

    let entry = &mut channels[channel.index()];
    if entry.requesters != list {
        entry.requesters = list;
        listener.requesters_changed(channel, list.as_slice());
    }
}
