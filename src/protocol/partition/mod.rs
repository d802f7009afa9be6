//! Cross-partition synchronization: absorbing satellite-written request
//! cells into the master's cycle, publishing authoritative state back to
//! the satellites, and marshalling Nm handshake calls to the partition that
//! owns a channel's bus stack. All of it rides on
//! [`VersionedCell`](crate::infra::sync::VersionedCell); nothing here
//! blocks either side.
use crate::config::CommConfig;
use crate::core::{ChannelId, ChannelState, PartitionId};
use crate::protocol::channel::ChannelEntry;
use crate::protocol::traits::bus_adapter::BusAdapter;
use crate::protocol::user::UserEntry;

/// One Nm handshake call marshalled between partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmService {
    /// Actively request the network.
    NetworkRequest,
    /// Release this node's network request.
    NetworkRelease,
    /// Join a network started by another node.
    PassiveStartup,
}

/// Absorb the request cells of every user relevant to `channel`, making
/// satellite writes from the previous cycle visible to this cycle's
/// arbitration. Absorbing is idempotent, so users mapped to several
/// channels are safely consumed once per channel.
pub(crate) fn absorb_user_requests(
    config: &CommConfig<'_>,
    users: &mut [UserEntry],
    channel: ChannelId,
) {
    let pncs_here = config.pncs_of_channel(channel);
    for (user_cfg, user) in config.users.iter().zip(users.iter_mut()) {
        if user_cfg.maps_channel(channel) || user_cfg.pncs & pncs_here != 0 {
            let _ = user.request.consume();
        }
    }
}

/// Absorb every user cell. Anchored to channel 0 so users mapping only
/// channel-less clusters are still consumed exactly once per cycle.
pub(crate) fn absorb_all_user_requests(users: &mut [UserEntry]) {
    for user in users.iter_mut() {
        let _ = user.request.consume();
    }
}

/// Publish the channel's authoritative state towards every satellite
/// partition. Only a changed value bumps the cell, so an idle channel does
/// not generate handoff traffic.
pub(crate) fn publish_channel_state(
    config: &CommConfig<'_>,
    entry: &mut ChannelEntry,
) {
    for partition in 1..config.partitions {
        let cell = &mut entry.published[partition];
        if cell.peek() != entry.state {
            cell.write(entry.state);
        }
    }
}

/// Satellite side: absorb the published mirror for `partition`.
pub(crate) fn consume_published(entry: &mut ChannelEntry, partition: PartitionId) -> ChannelState {
    entry.published[partition.index()].consume()
}

/// Satellite side: perform a marshalled Nm call on the local bus stack.
/// Stale values are never replayed; a fresh value runs exactly once.
pub(crate) fn run_forwarded_nm<B: BusAdapter>(
    entry: &mut ChannelEntry,
    bus: &mut B,
    channel: ChannelId,
) -> Result<(), B::Error> {
    if let Some(Some(service)) = entry.forwarded_nm.take_pending() {
        match service {
            NmService::NetworkRequest => bus.nm_network_request(channel)?,
            NmService::NetworkRelease => bus.nm_network_release(channel)?,
            NmService::PassiveStartup => bus.nm_passive_startup(channel)?,
        }
    }
    Ok(())
}

/// Master side: pick up a wake-up indication marshalled from a satellite.
pub(crate) fn take_forwarded_wakeup(entry: &mut ChannelEntry) -> bool {
    matches!(entry.forwarded_wakeup.take_pending(), Some(true))
}
