//! Partial network cluster state machine: cluster-level arbitration, the
//! prepare-sleep countdown, and EIRA routing limitation towards the mapped
//! channels.
//!
//! The whole cluster pass is anchored to channel 0's main function and runs
//! once per overall cycle, clusters without mapped channels included.
use bitflags::bitflags;

use crate::config::CommConfig;
use crate::core::{ChannelId, ComMode, PncId, PncState, MAX_CHANNELS};
use crate::infra::sync::VersionedCell;
use crate::protocol::channel::ChannelEntry;
use crate::protocol::traits::bus_adapter::BusAdapter;
use crate::protocol::user::UserEntry;

bitflags! {
    /// Routing status of one cluster on one mapped channel. An empty set
    /// means routing is not limited.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PncRoutingState: u8 {
        /// Relaying of the cluster request bit on this channel is
        /// suppressed.
        const LIMITED = 0b0000_0001;
        /// The channel's Nm is in repeat-message state; an active
        /// limitation is held off while this is set.
        const NM_REPEAT_MESSAGE = 0b0000_0010;
    }
}

impl PncRoutingState {
    /// True when the request bit must go out as 1 for a requested cluster.
    pub fn transmits(&self) -> bool {
        !self.contains(PncRoutingState::LIMITED)
            || self.contains(PncRoutingState::NM_REPEAT_MESSAGE)
    }
}

/// Runtime state of one partial network cluster.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PncEntry {
    /// Active cluster state.
    pub state: PncState,
    /// Bus-side request aggregation (ERA) seen for this cluster. Writable
    /// from the partition receiving the signal, absorbed once per pass.
    pub bus_requested: VersionedCell<bool>,
    /// Remaining alive-window ticks while in PREPARE_SLEEP or
    /// REQUESTED_PASSIVE (0 = expired / not running).
    pub prepare_sleep_timer: u32,
    /// Per-channel routing status.
    pub routing: [PncRoutingState; MAX_CHANNELS],
    /// Queued routing-limitation changes, applied at the next pass.
    pub pending_limit: [Option<bool>; MAX_CHANNELS],
    /// Last transmitted EIRA bit per channel, for delta suppression.
    pub last_eira: [bool; MAX_CHANNELS],
    /// A synchronized shutdown was forwarded; local requests are ignored
    /// for one pass so the cluster falls back to READY_SLEEP.
    pub sync_shutdown: bool,
}

impl PncEntry {
    pub(crate) const fn new() -> Self {
        Self {
            state: PncState::NoCommunication,
            bus_requested: VersionedCell::new(false),
            prepare_sleep_timer: 0,
            routing: [PncRoutingState::empty(); MAX_CHANNELS],
            pending_limit: [None; MAX_CHANNELS],
            last_eira: [false; MAX_CHANNELS],
            sync_shutdown: false,
        }
    }

    /// Back to power-on defaults.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    pub(crate) fn set_state(&mut self, state: PncState) {
        if self.state != state {
            #[cfg(feature = "defmt")]
            defmt::debug!("pnc state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    /// True when the routing limitation currently suppresses the request
    /// bit on `channel`.
    pub(crate) fn routing_limited(&self, channel: ChannelId) -> bool {
        self.routing[channel.index()].contains(PncRoutingState::LIMITED)
    }

    /// Queue a routing-limitation change; it takes effect at the next pass.
    pub(crate) fn queue_routing_limit(&mut self, channel: ChannelId, limited: bool) {
        self.pending_limit[channel.index()] = Some(limited);
    }

    /// Activate the cluster from a passive wake-up for at least the
    /// prepare-sleep window. Never lowers an already requested cluster.
    pub(crate) fn passive_activate(&mut self, alive_ticks: u32) {
        match self.state {
            PncState::Requested | PncState::ReadySleep | PncState::RequestedPassive => {}
            PncState::NoCommunication | PncState::PrepareSleep => {
                self.set_state(PncState::RequestedPassive);
            }
        }
        if self.state == PncState::RequestedPassive {
            self.prepare_sleep_timer = self.prepare_sleep_timer.max(alive_ticks);
        }
    }
}

/// True when any user mapped to the cluster currently requests FULL_COM.
pub(crate) fn user_requests(config: &CommConfig<'_>, pnc: PncId, users: &[UserEntry]) -> bool {
    config
        .users
        .iter()
        .zip(users.iter())
        .any(|(user_cfg, user)| {
            user_cfg.maps_pnc(pnc) && user.request.peek() == ComMode::FullCom
        })
}

/// Run the once-per-cycle cluster pass: absorb bus-side requests, apply
/// queued routing limits, arbitrate and transition every cluster, decay the
/// prepare-sleep windows, and flush EIRA deltas to the bus.
pub(crate) fn pass<B: BusAdapter>(
    config: &CommConfig<'_>,
    pncs: &mut [PncEntry],
    channels: &[ChannelEntry],
    users: &[UserEntry],
    prepare_sleep_ticks: u32,
    bus: &mut B,
) -> Result<(), B::Error> {
    for index in 0..config.pncs.len() {
        let entry = &mut pncs[index];
        let id = PncId(index as u8);
        let pnc_cfg = config.pnc(id);

        // Mirror the per-channel Nm repeat-message state and apply queued
        // limitation changes before anything reads the routing flags.
        for channel_index in 0..config.channels.len() {
            if pnc_cfg.maps_channel(ChannelId(channel_index as u8)) {
                let routing = &mut entry.routing[channel_index];
                routing.set(
                    PncRoutingState::NM_REPEAT_MESSAGE,
                    channels[channel_index].nm_repeat_message,
                );
                if let Some(limited) = entry.pending_limit[channel_index].take() {
                    routing.set(PncRoutingState::LIMITED, limited);
                }
            }
        }

        let bus_requested = entry.bus_requested.consume();
        let mut requested_by_user = user_requests(config, id, users);
        if entry.sync_shutdown {
            // One pass without local requests drops the cluster to the
            // bus-driven state, completing the coordinated shutdown.
            entry.sync_shutdown = false;
            requested_by_user = false;
        }

        arbitrate(entry, requested_by_user, bus_requested, prepare_sleep_ticks);
        flush_eira(config, id, entry, bus)?;
    }
    Ok(())
}

/// Cluster-level highest-wins ladder plus timer decay.
fn arbitrate(
    entry: &mut PncEntry,
    requested_by_user: bool,
    bus_requested: bool,
    prepare_sleep_ticks: u32,
) {
    use PncState::*;

    let next = if requested_by_user {
        Requested
    } else if entry.state == RequestedPassive
        && (bus_requested || entry.prepare_sleep_timer > 0)
    {
        // The passive alive-window is still open.
        RequestedPassive
    } else if bus_requested {
        ReadySleep
    } else {
        match entry.state {
            Requested | ReadySleep | RequestedPassive => PrepareSleep,
            PrepareSleep => {
                if entry.prepare_sleep_timer > 0 {
                    PrepareSleep
                } else {
                    NoCommunication
                }
            }
            NoCommunication => NoCommunication,
        }
    };

    let entered = next != entry.state;
    entry.set_state(next);

    match next {
        Requested | ReadySleep => entry.prepare_sleep_timer = 0,
        PrepareSleep => {
            if entered {
                entry.prepare_sleep_timer = prepare_sleep_ticks;
            } else if entry.prepare_sleep_timer > 0 {
                entry.prepare_sleep_timer -= 1;
            }
        }
        RequestedPassive => {
            if entry.prepare_sleep_timer > 0 {
                entry.prepare_sleep_timer -= 1;
            }
        }
        NoCommunication => entry.prepare_sleep_timer = 0,
    }
}

/// Transmit changed request bits on every mapped, non-passive channel.
fn flush_eira<B: BusAdapter>(
    config: &CommConfig<'_>,
    id: PncId,
    entry: &mut PncEntry,
    bus: &mut B,
) -> Result<(), B::Error> {
    use crate::core::GatewayType;

    let pnc_cfg = config.pnc(id);
    for channel_index in 0..config.channels.len() {
        let channel = ChannelId(channel_index as u8);
        if !pnc_cfg.maps_channel(channel) {
            continue;
        }
        // Passive gateways listen without relaying.
        if config.channel(channel).gateway == GatewayType::Passive {
            continue;
        }
        let bit = entry.state == PncState::Requested
            && entry.routing[channel_index].transmits();
        if bit != entry.last_eira[channel_index] {
            bus.send_eira(channel, id, bit)?;
            entry.last_eira[channel_index] = bit;
        }
    }
    Ok(())
}
