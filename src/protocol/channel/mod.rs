//! Per-channel state machine: the active-mode entry, the bounded transition
//! convergence loop, and the channel timers (minimum full-com, Nm-light).
//!
//! Upward transitions (towards FULL_COM) complete within one cycle. Downward
//! transitions stop at the point where a collaborator confirmation is
//! required and are completed by the matching indication callback; the
//! convergence loop reports them as blocked for the current cycle.
use bitflags::bitflags;

use crate::config::{ChannelConfig, CommConfig};
use crate::core::{
    ChannelId, ChannelState, ComMode, NmVariant, RamCheckStatus, MAX_PARTITIONS, MAX_USERS,
    NO_USER,
};
use crate::infra::sync::VersionedCell;
use crate::protocol::arbitration::Arbitration;
use crate::protocol::partition::NmService;
use crate::protocol::traits::bus_adapter::BusAdapter;

/// Upper bound for the transition convergence loop. The longest chain in
/// the state graph is NO_COM → pending gate → FULL_COM plus one corrective
/// hop, so four steps always suffice.
pub const MAX_TRANSITION_STEPS: usize = 4;

bitflags! {
    /// Active mode inhibitions on one channel. An empty set means the
    /// channel is not inhibited.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InhibitionStatus: u8 {
        /// Passive wake-up indications are ignored on the channel.
        const PREVENT_WAKE_UP = 0b0000_0001;
        /// User FULL_COM requests are suppressed on the channel.
        const LIMIT_TO_NO_COM = 0b0000_0010;
    }
}

/// Snapshot of the users currently requesting FULL_COM on a channel.
/// Ascending user indices, sentinel-filled tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequesterList {
    users: [u8; MAX_USERS],
    len: usize,
}

impl RequesterList {
    pub(crate) const fn new() -> Self {
        Self {
            users: [NO_USER; MAX_USERS],
            len: 0,
        }
    }

    /// Append a user index. Callers iterate the user table in order, so the
    /// list stays sorted by construction.
    pub(crate) fn push(&mut self, user: u8) {
        if self.len < MAX_USERS {
            self.users[self.len] = user;
            self.len += 1;
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.users[..self.len]
    }
}

/// Runtime state of one channel.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelEntry {
    /// Active mode; mutated only by the transition engine and the
    /// confirmation callbacks.
    pub state: ChannelState,
    /// Bus-side requested state (passive wake-ups, timer expiry values).
    /// Feeds the final "bus communication requests shall always be
    /// granted" override of the arbitration.
    pub bus_requested: ChannelState,
    /// Last mode requested from the bus-state-manager, for duplicate
    /// suppression while a downward transition waits for its confirmation.
    pub last_bus_request: Option<ComMode>,
    /// An active diagnostic session holds the channel awake.
    pub dcm_active: bool,
    /// Startup gate controlled by `communication_allowed`.
    pub comm_allowed: bool,
    /// Wake-up / no-com inhibitions.
    pub inhibition: InhibitionStatus,
    /// Remaining minimum full-com ticks (0 = not running).
    pub min_full_com_timer: u32,
    /// Remaining Nm-light shutdown ticks (0 = not running).
    pub nm_light_timer: u32,
    /// A coordinated FlexRay shutdown is in progress; internal requests are
    /// suppressed and wake-ups are queued until the bus confirms NO_COM.
    pub fr_shutdown: bool,
    /// Wake-up that arrived during a FlexRay shutdown, applied when the
    /// shutdown completes.
    pub post_shutdown_wakeup: Option<ChannelState>,
    /// LIN-slave memory: the master commanded sleep and no user request has
    /// re-armed the channel since.
    pub bus_sleep_indicated: bool,
    /// The channel's Nm is currently in repeat-message state; cluster
    /// routing limitations are held off while set.
    pub nm_repeat_message: bool,
    /// Extended RAM check result (CAN channels only); caps `get_state`.
    pub ram_check: RamCheckStatus,
    /// Set on every state change, cleared once the notification pass ran.
    pub state_changed: bool,
    /// Last reported FULL_COM requester snapshot.
    pub requesters: RequesterList,
    /// Master-published state mirror, one cell per satellite partition.
    pub published: [VersionedCell<ChannelState>; MAX_PARTITIONS],
    /// Nm handshake calls marshalled to the channel's owning partition when
    /// that partition is not the master.
    pub forwarded_nm: VersionedCell<Option<NmService>>,
    /// Wake-up indication marshalled from a satellite partition to the
    /// master's next cycle.
    pub forwarded_wakeup: VersionedCell<bool>,
}

impl ChannelEntry {
    pub(crate) const fn new() -> Self {
        Self {
            state: ChannelState::NoComNoPendingRequest,
            bus_requested: ChannelState::NoComNoPendingRequest,
            last_bus_request: None,
            dcm_active: false,
            comm_allowed: false,
            inhibition: InhibitionStatus::empty(),
            min_full_com_timer: 0,
            nm_light_timer: 0,
            fr_shutdown: false,
            post_shutdown_wakeup: None,
            bus_sleep_indicated: false,
            nm_repeat_message: false,
            ram_check: RamCheckStatus::Ok,
            state_changed: false,
            requesters: RequesterList::new(),
            published: [VersionedCell::new(ChannelState::NoComNoPendingRequest); MAX_PARTITIONS],
            forwarded_nm: VersionedCell::new(None),
            forwarded_wakeup: VersionedCell::new(false),
        }
    }

    /// Back to power-on defaults.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Set the active state and flag the change for the notification pass.
    pub(crate) fn set_state(&mut self, state: ChannelState) {
        if self.state != state {
            #[cfg(feature = "defmt")]
            defmt::debug!("channel state {} -> {}", self.state, state);
            self.state = state;
            self.state_changed = true;
        }
    }

    /// True while a bus-side FULL_COM request is live.
    pub(crate) fn bus_requests_full_com(&self) -> bool {
        self.bus_requested.is_full_com()
    }
}

/// Outcome of one convergence step.
#[derive(Debug, PartialEq, Eq)]
enum StepOutcome {
    /// Current state equals the target.
    Reached,
    /// State moved one hop towards the target.
    Progressed,
    /// No further progress possible this cycle (confirmation pending or
    /// startup gated).
    Blocked,
}

/// Drive the channel from its current state towards the arbitrated target,
/// re-entering the transition function until the target is reached or the
/// transition is impossible this cycle. The loop is bounded by
/// [`MAX_TRANSITION_STEPS`]; the state graph is small enough that the bound
/// is never the limiting factor.
pub(crate) fn advance<B: BusAdapter>(
    config: &CommConfig<'_>,
    id: ChannelId,
    entry: &mut ChannelEntry,
    arb: &Arbitration,
    bus: &mut B,
    defer_nm: bool,
) -> Result<(), B::Error> {
    for _ in 0..MAX_TRANSITION_STEPS {
        match step(config, id, entry, arb, bus, defer_nm)? {
            StepOutcome::Reached | StepOutcome::Blocked => break,
            StepOutcome::Progressed => {}
        }
    }
    Ok(())
}

fn step<B: BusAdapter>(
    config: &CommConfig<'_>,
    id: ChannelId,
    entry: &mut ChannelEntry,
    arb: &Arbitration,
    bus: &mut B,
    defer_nm: bool,
) -> Result<StepOutcome, B::Error> {
    use ChannelState::*;

    let channel = config.channel(id);
    let target = arb.target;
    if entry.state == target {
        return Ok(StepOutcome::Reached);
    }

    let outcome = match (entry.state, target) {
        // Rise from a bus-down state. The communication-allowed gate is a
        // hard physical precondition; a gated request parks the channel in
        // the pending state.
        (NoComNoPendingRequest | NoComRequestPending, FullComNetworkRequested)
        | (NoComNoPendingRequest | NoComRequestPending, FullComReadySleep) => {
            if !entry.comm_allowed {
                if entry.state == NoComNoPendingRequest {
                    entry.set_state(NoComRequestPending);
                    StepOutcome::Progressed
                } else {
                    StepOutcome::Blocked
                }
            } else {
                enter_full_com(config, id, entry, arb, target, bus, defer_nm)?;
                StepOutcome::Progressed
            }
        }

        (NoComNoPendingRequest, NoComRequestPending) => {
            entry.set_state(NoComRequestPending);
            StepOutcome::Progressed
        }
        (NoComRequestPending, NoComNoPendingRequest) => {
            entry.set_state(NoComNoPendingRequest);
            StepOutcome::Progressed
        }

        // Silent reception: rising re-runs the full startup handshake,
        // falling asks the bus-state-manager and waits for its indication.
        (SilentCom, FullComNetworkRequested) | (SilentCom, FullComReadySleep) => {
            enter_full_com(config, id, entry, arb, target, bus, defer_nm)?;
            StepOutcome::Progressed
        }
        (SilentCom, NoComNoPendingRequest) | (SilentCom, NoComRequestPending) => {
            request_bus(entry, id, ComMode::NoCom, bus)?;
            StepOutcome::Blocked
        }

        // Stop requesting the network; FULL variant releases towards Nm,
        // LIGHT arms the emulated shutdown timer.
        (FullComNetworkRequested, _) => {
            match channel.nm_variant {
                NmVariant::Full => nm_call(entry, id, NmService::NetworkRelease, bus, defer_nm)?,
                NmVariant::Light => {
                    entry.nm_light_timer = config.ticks(id, channel.nm_light_ms);
                }
                NmVariant::None | NmVariant::LinSlave => {}
            }
            entry.set_state(FullComReadySleep);
            StepOutcome::Progressed
        }

        // Re-request the network from ready-sleep.
        (FullComReadySleep, FullComNetworkRequested) => {
            if channel.nm_variant == NmVariant::Full {
                nm_call(entry, id, NmService::NetworkRequest, bus, defer_nm)?;
            }
            entry.nm_light_timer = 0;
            entry.set_state(FullComNetworkRequested);
            StepOutcome::Progressed
        }

        // Leave full communication downwards. FULL waits for the Nm sleep
        // handshake; LIGHT and LINSLAVE ask the bus-state-manager once
        // their own precondition holds; all wait for the confirmation.
        (FullComReadySleep, _) => {
            match channel.nm_variant {
                NmVariant::Full => {}
                NmVariant::LinSlave => {
                    if entry.bus_sleep_indicated {
                        request_bus(entry, id, ComMode::NoCom, bus)?;
                    }
                }
                NmVariant::Light | NmVariant::None => {
                    if entry.nm_light_timer == 0 {
                        request_bus(entry, id, ComMode::NoCom, bus)?;
                    }
                }
            }
            StepOutcome::Blocked
        }

        _ => StepOutcome::Blocked,
    };

    Ok(outcome)
}

/// Common startup path into one of the FULL_COM sub-states.
fn enter_full_com<B: BusAdapter>(
    config: &CommConfig<'_>,
    id: ChannelId,
    entry: &mut ChannelEntry,
    arb: &Arbitration,
    target: ChannelState,
    bus: &mut B,
    defer_nm: bool,
) -> Result<(), B::Error> {
    let channel = config.channel(id);
    request_bus(entry, id, ComMode::FullCom, bus)?;
    if channel.nm_variant == NmVariant::Full {
        let service = if arb.internal {
            NmService::NetworkRequest
        } else {
            NmService::PassiveStartup
        };
        nm_call(entry, id, service, bus, defer_nm)?;
    }
    // A bus-side wake-up guarantees a minimum awake window; internal
    // requests govern their own lifetime.
    if !arb.internal {
        entry.min_full_com_timer = config.ticks(id, channel.min_full_com_ms);
    }
    if target == ChannelState::FullComReadySleep
        && channel.nm_variant == NmVariant::Light
        && entry.nm_light_timer == 0
    {
        entry.nm_light_timer = config.ticks(id, channel.nm_light_ms);
    }
    entry.set_state(target);
    Ok(())
}

/// Ask the bus-state-manager for `mode`, suppressing duplicates while a
/// confirmation is outstanding.
fn request_bus<B: BusAdapter>(
    entry: &mut ChannelEntry,
    id: ChannelId,
    mode: ComMode,
    bus: &mut B,
) -> Result<(), B::Error> {
    if entry.last_bus_request == Some(mode) {
        return Ok(());
    }
    bus.request_com_mode(id, mode)?;
    entry.last_bus_request = Some(mode);
    Ok(())
}

/// Perform an Nm handshake call, or marshal it to the channel's owning
/// partition when the Nm stack lives there.
fn nm_call<B: BusAdapter>(
    entry: &mut ChannelEntry,
    id: ChannelId,
    service: NmService,
    bus: &mut B,
    defer: bool,
) -> Result<(), B::Error> {
    if defer {
        entry.forwarded_nm.write(Some(service));
        return Ok(());
    }
    match service {
        NmService::NetworkRequest => bus.nm_network_request(id),
        NmService::NetworkRelease => bus.nm_network_release(id),
        NmService::PassiveStartup => bus.nm_passive_startup(id),
    }
}

/// Once-per-cycle timer decay. Runs after arbitration and notification so
/// an expiry becomes visible at the next cycle's arbitration, never in the
/// middle of the current one.
pub(crate) fn decay_timers(
    channel: &ChannelConfig,
    entry: &mut ChannelEntry,
    internal_request: bool,
) {
    if entry.min_full_com_timer > 0 {
        // An internal request on an NM-LIGHT channel makes the minimum
        // window pointless; expire it right away.
        if channel.nm_variant == NmVariant::Light && internal_request {
            entry.min_full_com_timer = 1;
        }
        entry.min_full_com_timer -= 1;
        if entry.min_full_com_timer == 0 {
            entry.bus_requested = match channel.nm_variant {
                NmVariant::Full => ChannelState::FullComReadySleep,
                _ => ChannelState::NoComNoPendingRequest,
            };
        }
    }

    if entry.nm_light_timer > 0 {
        entry.nm_light_timer -= 1;
        if entry.nm_light_timer == 0 {
            entry.bus_requested = ChannelState::NoComNoPendingRequest;
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
