//! Highest-wins mode arbitration: computes, per channel, the single target
//! state from all concurrent request sources (users, diagnostics, clusters,
//! bus-side requests), applying the precedence ladder and the routing
//! limitation exceptions.
use crate::config::CommConfig;
use crate::core::{ChannelId, ChannelState, ComMode, GatewayType, NmVariant, PncState};
use crate::protocol::channel::{ChannelEntry, InhibitionStatus};
use crate::protocol::pnc::PncEntry;
use crate::protocol::user::UserEntry;

/// Result of one arbitration round for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    /// State the transition engine must drive towards.
    pub target: ChannelState,
    /// True when the target stems from a local requester (user or
    /// diagnostic session) rather than from the bus side.
    pub internal: bool,
}

/// Wakefulness ordering of the channel states. Arbitration steps may only
/// raise the target along this ordering, never lower it.
pub(crate) fn rank(state: ChannelState) -> u8 {
    match state {
        ChannelState::NoComNoPendingRequest => 0,
        ChannelState::NoComRequestPending => 1,
        ChannelState::SilentCom => 2,
        ChannelState::FullComReadySleep => 3,
        ChannelState::FullComNetworkRequested => 4,
    }
}

/// Raise `target` to `candidate` when the candidate is more awake.
pub(crate) fn raise(target: &mut ChannelState, candidate: ChannelState) {
    if rank(candidate) > rank(*target) {
        *target = candidate;
    }
}

/// True when user FULL_COM requests are administratively suppressed on the
/// channel. Diagnostic requests bypass this.
pub(crate) fn channel_limited(entry: &ChannelEntry, ecu_limited: bool) -> bool {
    !entry.comm_allowed
        || entry.inhibition.contains(InhibitionStatus::LIMIT_TO_NO_COM)
        || ecu_limited
}

/// Compute the highest requested state for one channel.
///
/// Runs with exclusive access to the channel entry and the cluster table:
/// the computation conditionally clears request memory (LIN-slave sleep
/// re-arm, stale passive wake-ups) atomically with the reads.
pub(crate) fn compute(
    config: &CommConfig<'_>,
    id: ChannelId,
    entry: &mut ChannelEntry,
    users: &[UserEntry],
    pncs: &[PncEntry],
    ecu_limited: bool,
) -> Arbitration {
    let channel = config.channel(id);
    let mut target = ChannelState::NoComNoPendingRequest;
    let mut internal = false;

    // An in-progress coordinated FlexRay shutdown suppresses all internal
    // requests for the cycle; re-arbitrating against it would re-open the
    // clique problem the shutdown is avoiding.
    if !entry.fr_shutdown {
        let limited = channel_limited(entry, ecu_limited);
        if !limited && user_requests_full_com(config, id, users) {
            target = ChannelState::FullComNetworkRequested;
            internal = true;
            if channel.nm_variant == NmVariant::LinSlave {
                // A sleep notification must be able to re-arm.
                entry.bus_sleep_indicated = false;
            }
        } else if channel.nm_variant == NmVariant::LinSlave
            && entry.state == ChannelState::FullComNetworkRequested
        {
            // Nobody requests the LIN slave anymore: fall back to ready
            // sleep and forget the passive wake-up that raised it, so the
            // channel cannot bounce back into NETWORK_REQUESTED.
            target = ChannelState::FullComReadySleep;
            entry.bus_requested = ChannelState::NoComNoPendingRequest;
        }

        if entry.dcm_active {
            raise(&mut target, ChannelState::FullComNetworkRequested);
            internal = true;
        }
    }

    if config.pnc_enabled() {
        let mapped = config.pncs_of_channel(id);
        if mapped != 0 {
            if config.pnc_gateway_coordination
                && !internal
                && channel.gateway == GatewayType::Active
                && any_mapped_pnc(mapped, pncs, |pnc| {
                    matches!(pnc.state, PncState::Requested | PncState::RequestedPassive)
                })
            {
                // Active gateway channels wake together with their
                // clusters; passive gateways only listen.
                raise(&mut target, ChannelState::FullComNetworkRequested);
                internal = true;
            }

            // A cluster already in full communication keeps the channel
            // minimally awake as a relay, unless routing is limited.
            for index in 0..pncs.len() {
                if mapped & (1u32 << index) == 0 {
                    continue;
                }
                let pnc = &pncs[index];
                if pnc.state.is_full_com() && !pnc.routing_limited(id) {
                    raise(&mut target, ChannelState::FullComReadySleep);
                }
            }
        }
    }

    // Bus communication requests shall always be granted: a bus-side
    // NETWORK_REQUESTED wins outright, and with no internal target at all
    // the bus-side request governs whatever it holds.
    if entry.bus_requests_full_com() || !internal {
        raise(&mut target, entry.bus_requested);
    }

    Arbitration { target, internal }
}

/// True when at least one mapped user requests FULL_COM. Cluster users
/// count as channel requesters only while cluster gateway coordination is
/// disabled; with coordination the cluster state machine carries their
/// influence instead.
fn user_requests_full_com(config: &CommConfig<'_>, id: ChannelId, users: &[UserEntry]) -> bool {
    let pncs_here = config.pncs_of_channel(id);
    config
        .users
        .iter()
        .zip(users.iter())
        .any(|(user_cfg, user)| {
            let direct = user_cfg.maps_channel(id);
            let via_pnc = !config.pnc_gateway_coordination && user_cfg.pncs & pncs_here != 0;
            (direct || via_pnc) && user.request.peek() == ComMode::FullCom
        })
}

fn any_mapped_pnc(mapped: u32, pncs: &[PncEntry], pred: impl Fn(&PncEntry) -> bool) -> bool {
    pncs.iter()
        .enumerate()
        .any(|(index, pnc)| mapped & (1u32 << index) != 0 && pred(pnc))
}
