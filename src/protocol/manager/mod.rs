//! Manager facade: lifecycle, the validated public API envelope, inbound
//! collaborator callbacks, and the periodic main functions driving
//! arbitration, transitions, notification, and timer decay.
//!
//! Every mutating or query entry point funnels through the same envelope:
//! initialization-status check, handle-range check against the configured
//! table sizes, then the operation. A failed check degrades to a no-op and
//! returns the matching [`CommError`]; one invalid channel never aborts a
//! whole cycle.
use crate::config::CommConfig;
use crate::core::{
    BusType, ChannelId, ChannelState, ComMode, InitStatus, NmVariant, PartitionId, PncId,
    RamCheckStatus, UserId, MAX_CHANNELS, MAX_PNCS, MAX_USERS,
};
use crate::error::{CommError, InitError};
use crate::protocol::arbitration::{self, rank, raise};
use crate::protocol::channel::{self, ChannelEntry, InhibitionStatus};
use crate::protocol::notify;
use crate::protocol::partition;
use crate::protocol::pnc::{self, PncEntry};
use crate::protocol::traits::bus_adapter::BusAdapter;
use crate::protocol::traits::listener::ModeListener;
use crate::protocol::user::UserEntry;
use crate::protocol::wakeup;

/// The communication manager: owns the authoritative per-channel, per-user,
/// and per-cluster state and the collaborator seams.
///
/// The manager itself is synchronous; drive [`main_function`]
/// (respectively [`main_function_satellite`]) once per configured cycle per
/// channel, from one task context per partition.
///
/// [`main_function`]: CommManager::main_function
/// [`main_function_satellite`]: CommManager::main_function_satellite
pub struct CommManager<'cfg, B: BusAdapter, L: ModeListener> {
    config: &'cfg CommConfig<'cfg>,
    bus: B,
    listener: L,
    status: InitStatus,
    channels: [ChannelEntry; MAX_CHANNELS],
    users: [UserEntry; MAX_USERS],
    pncs: [PncEntry; MAX_PNCS],
    /// ECU group classification (0..=3) gating which inhibitions apply.
    group_classification: u8,
    /// ECU-wide limit-to-NO_COM switch.
    ecu_limited: bool,
    /// Saturating count of FULL_COM requests rejected by an inhibition.
    inhibit_counter: u16,
}

impl<'cfg, B: BusAdapter, L: ModeListener> CommManager<'cfg, B, L> {
    /// Bind the configuration and the collaborator seams. The instance
    /// starts uninitialized; run the lifecycle ladder before using it.
    pub fn new(config: &'cfg CommConfig<'cfg>, bus: B, listener: L) -> Self {
        Self {
            config,
            bus,
            listener,
            status: InitStatus::Uninit,
            channels: [ChannelEntry::new(); MAX_CHANNELS],
            users: [UserEntry::new(); MAX_USERS],
            pncs: [PncEntry::new(); MAX_PNCS],
            group_classification: config.group_classification,
            ecu_limited: false,
            inhibit_counter: 0,
        }
    }

    //==============================================================================Lifecycle

    /// First lifecycle rung. Must run exactly once after power-on (or after
    /// [`init_memory`](Self::init_memory)).
    pub fn pre_init(&mut self) -> Result<(), InitError> {
        if self.status != InitStatus::Uninit {
            return Err(InitError::AlreadyInitialized);
        }
        self.status = InitStatus::PreInit;
        Ok(())
    }

    /// Validate the configuration tables and reset every runtime entry to
    /// its power-on default. Requires `pre_init`.
    pub fn init(&mut self) -> Result<(), InitError> {
        match self.status {
            InitStatus::PreInit => {}
            InitStatus::Uninit => return Err(InitError::OutOfOrder),
            InitStatus::Init | InitStatus::PostInit => {
                return Err(InitError::AlreadyInitialized)
            }
        }
        self.config.validate()?;

        for entry in self.channels.iter_mut() {
            entry.reset();
        }
        for user in self.users.iter_mut() {
            user.reset();
        }
        for entry in self.pncs.iter_mut() {
            entry.reset();
        }
        self.group_classification = self.config.group_classification;
        self.ecu_limited = false;
        self.inhibit_counter = 0;

        self.status = InitStatus::Init;
        Ok(())
    }

    /// Final lifecycle rung; afterwards the full API is live and the main
    /// functions start doing work.
    pub fn post_init(&mut self) -> Result<(), InitError> {
        match self.status {
            InitStatus::Init => {}
            InitStatus::PostInit => return Err(InitError::AlreadyInitialized),
            InitStatus::Uninit | InitStatus::PreInit => return Err(InitError::OutOfOrder),
        }
        self.status = InitStatus::PostInit;
        Ok(())
    }

    /// Shut the module down. Requires `post_init` and every channel resting
    /// in a NO_COM state; afterwards `init` may run again.
    pub fn de_init(&mut self) -> Result<(), InitError> {
        if self.status != InitStatus::PostInit {
            return Err(InitError::OutOfOrder);
        }
        let active = self
            .config
            .channels
            .iter()
            .enumerate()
            .any(|(index, _)| {
                !matches!(
                    self.channels[index].state,
                    ChannelState::NoComNoPendingRequest | ChannelState::NoComRequestPending
                )
            });
        if active {
            return Err(InitError::ChannelsActive);
        }
        self.status = InitStatus::PreInit;
        Ok(())
    }

    /// Emulate uninitialized RAM: hard-reset everything, dropping back to
    /// the very start of the lifecycle. Never fails.
    pub fn init_memory(&mut self) {
        for entry in self.channels.iter_mut() {
            entry.reset();
        }
        for user in self.users.iter_mut() {
            user.reset();
        }
        for entry in self.pncs.iter_mut() {
            entry.reset();
        }
        self.ecu_limited = false;
        self.inhibit_counter = 0;
        self.status = InitStatus::Uninit;
    }

    //==============================================================================Queries

    /// Current rung of the initialization ladder. Usable at any time.
    pub fn get_status(&self) -> InitStatus {
        self.status
    }

    /// Reported state of a channel. While the active state is
    /// NO_COM_NO_PENDING_REQUEST but a request is actually pending (user,
    /// diagnostic, bus side, or cluster), the pending variant is reported
    /// instead; on CAN channels a degraded RAM check caps the report.
    pub fn get_state(
        &self,
        channel: ChannelId,
    ) -> Result<ChannelState, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;

        let entry = &self.channels[channel.index()];
        let mut reported = entry.state;
        if reported == ChannelState::NoComNoPendingRequest && self.request_pending(channel) {
            reported = ChannelState::NoComRequestPending;
        }

        // While the channel is still down, a degraded RAM check lowers the
        // reported ceiling: a partial result caps the report at the
        // pending state (already the maximum in this region), a failed one
        // hides the pending request entirely.
        if rank(reported) <= rank(ChannelState::NoComRequestPending)
            && matches!(
                self.config.channel(channel).bus_type,
                BusType::Can | BusType::J1939
            )
        {
            reported = match entry.ram_check {
                RamCheckStatus::Ok | RamCheckStatus::Partial => reported,
                RamCheckStatus::Failed => ChannelState::NoComNoPendingRequest,
            };
        }

        Ok(reported)
    }

    /// Remaining ticks of the minimum full-com window (0 = not running).
    pub fn get_min_full_com_timer(
        &self,
        channel: ChannelId,
    ) -> Result<u32, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        Ok(self.channels[channel.index()].min_full_com_timer)
    }

    /// Active inhibitions on a channel.
    pub fn get_inhibition_status(
        &self,
        channel: ChannelId,
    ) -> Result<InhibitionStatus, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        Ok(self.channels[channel.index()].inhibition)
    }

    /// Highest mode the user may currently obtain, i.e. the minimum over
    /// its mapped channels of the per-channel ceiling set by inhibitions.
    pub fn get_max_com_mode(&self, user: UserId) -> Result<ComMode, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_user(user)?;

        let mut ceiling: Option<ComMode> = None;
        self.for_user_channels(user, |entry| {
            let allowed =
                if entry.inhibition.contains(InhibitionStatus::LIMIT_TO_NO_COM) || self.ecu_limited
                {
                    ComMode::NoCom
                } else {
                    ComMode::FullCom
                };
            ceiling = Some(ceiling.map_or(allowed, |current| current.min(allowed)));
        });
        // Users of channel-less clusters are capped only by the ECU switch.
        Ok(ceiling.unwrap_or(if self.ecu_limited {
            ComMode::NoCom
        } else {
            ComMode::FullCom
        }))
    }

    /// Mode most recently requested by the user.
    pub fn get_requested_com_mode(
        &self,
        user: UserId,
    ) -> Result<ComMode, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_user(user)?;
        Ok(self.users[user.index()].request.peek())
    }

    /// Aggregated current mode of the user: lowest across mapped channels.
    pub fn get_current_com_mode(
        &self,
        user: UserId,
    ) -> Result<ComMode, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_user(user)?;
        Ok(notify::user_current_mode(
            self.config,
            &self.channels,
            &self.pncs,
            user,
        ))
    }

    /// Aggregated cluster mode of a cluster user: lowest across the user's
    /// mapped clusters. Rejects users without cluster mapping.
    pub fn get_current_pnc_com_mode(
        &self,
        user: UserId,
    ) -> Result<ComMode, CommError<B::Error>> {
        self.require_post_init()?;
        self.check_user(user)?;
        let user_cfg = self.config.user(user);
        if !user_cfg.is_pnc_user() {
            return Err(CommError::WrongParameters);
        }

        let mut lowest: Option<ComMode> = None;
        for index in 0..self.config.pncs.len() {
            if user_cfg.pncs & (1u32 << index) != 0 {
                let mode = self.pncs[index].state.com_mode();
                lowest = Some(lowest.map_or(mode, |current| current.min(mode)));
            }
        }
        Ok(lowest.unwrap_or(ComMode::NoCom))
    }

    /// Number of FULL_COM requests rejected by an inhibition since the last
    /// reset. Saturates at `u16::MAX`.
    pub fn read_inhibit_counter(&self) -> Result<u16, CommError<B::Error>> {
        self.require_post_init()?;
        Ok(self.inhibit_counter)
    }

    //==============================================================================Requests

    /// Request a mode on behalf of a master-partition user.
    pub fn request_com_mode(
        &mut self,
        user: UserId,
        mode: ComMode,
    ) -> Result<(), CommError<B::Error>> {
        self.request_com_mode_from(user, mode, PartitionId::MASTER)
    }

    /// Request a mode on behalf of a user from its owning partition. A
    /// satellite write lands in the user's counter-pair cell and becomes
    /// visible to arbitration when the master absorbs it on its next cycle.
    pub fn request_com_mode_from(
        &mut self,
        user: UserId,
        mode: ComMode,
        partition: PartitionId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_user(user)?;
        self.check_partition(partition)?;
        if self.config.user(user).partition != partition {
            return Err(CommError::InvalidPartition);
        }
        // Users request the extremes only; SILENT is an arbitration result.
        if mode == ComMode::SilentCom {
            return Err(CommError::WrongParameters);
        }

        if mode == ComMode::FullCom && self.user_fully_inhibited(user) {
            self.inhibit_counter = self.inhibit_counter.saturating_add(1);
            return Err(CommError::ModeLimitation);
        }

        self.users[user.index()].request.write(mode);
        Ok(())
    }

    /// Startup gate from the ECU state manager: communication may only
    /// start on a channel once it is allowed.
    pub fn communication_allowed(
        &mut self,
        channel: ChannelId,
        allowed: bool,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        self.channels[channel.index()].comm_allowed = allowed;
        Ok(())
    }

    /// Enable or disable the wake-up inhibition on a channel. Honoured only
    /// when the ECU group classification includes wake-up inhibition.
    pub fn prevent_wake_up(
        &mut self,
        channel: ChannelId,
        prevent: bool,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        if self.group_classification & InhibitionStatus::PREVENT_WAKE_UP.bits() == 0 {
            return Err(CommError::ModeLimitation);
        }
        self.channels[channel.index()]
            .inhibition
            .set(InhibitionStatus::PREVENT_WAKE_UP, prevent);
        Ok(())
    }

    /// Enable or disable the NO_COM limitation on a channel. Honoured only
    /// when the ECU group classification includes the limitation.
    pub fn limit_channel_to_no_com(
        &mut self,
        channel: ChannelId,
        limit: bool,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        if self.group_classification & InhibitionStatus::LIMIT_TO_NO_COM.bits() == 0 {
            return Err(CommError::ModeLimitation);
        }
        self.channels[channel.index()]
            .inhibition
            .set(InhibitionStatus::LIMIT_TO_NO_COM, limit);
        Ok(())
    }

    /// ECU-wide variant of [`limit_channel_to_no_com`](Self::limit_channel_to_no_com).
    pub fn limit_ecu_to_no_com(&mut self, limit: bool) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        if self.group_classification & InhibitionStatus::LIMIT_TO_NO_COM.bits() == 0 {
            return Err(CommError::ModeLimitation);
        }
        self.ecu_limited = limit;
        Ok(())
    }

    /// Change the ECU group classification (0..=3).
    pub fn set_ecu_group_classification(
        &mut self,
        classification: u8,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        if classification > 3 {
            return Err(CommError::WrongParameters);
        }
        self.group_classification = classification;
        Ok(())
    }

    /// Reset the inhibited-request counter.
    pub fn reset_inhibit_counter(&mut self) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.inhibit_counter = 0;
        Ok(())
    }

    /// Queue a routing-limitation change for one cluster on one of its
    /// channels. Applied on the next cluster pass, and held off while the
    /// channel's Nm sits in repeat-message state.
    pub fn limit_pnc_to_channel_routing(
        &mut self,
        pnc: PncId,
        channel: ChannelId,
        limited: bool,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_pnc(pnc)?;
        self.check_channel(channel)?;
        if !self.config.pnc(pnc).maps_channel(channel) {
            return Err(CommError::WrongParameters);
        }
        self.pncs[pnc.index()].queue_routing_limit(channel, limited);
        Ok(())
    }

    //==============================================================================Indications

    /// Mode confirmation from the bus-state-manager. Completes the downward
    /// transitions the cycle function left blocked, and ends a FlexRay
    /// shutdown window when NO_COM is confirmed.
    pub fn bus_sm_mode_indication(
        &mut self,
        channel: ChannelId,
        mode: ComMode,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let entry = &mut self.channels[channel.index()];
        entry.last_bus_request = None;

        if entry.fr_shutdown && mode != ComMode::NoCom {
            // Mid-shutdown noise; only the final NO_COM confirmation acts.
            return Ok(());
        }

        match mode {
            ComMode::FullCom => {
                if !entry.state.is_full_com() {
                    entry.set_state(ChannelState::FullComNetworkRequested);
                }
            }
            ComMode::SilentCom => {
                entry.set_state(ChannelState::SilentCom);
            }
            ComMode::NoCom => {
                entry.set_state(ChannelState::NoComNoPendingRequest);
                entry.min_full_com_timer = 0;
                entry.nm_light_timer = 0;
                entry.fr_shutdown = false;
                if let Some(target) = entry.post_shutdown_wakeup.take() {
                    raise(&mut entry.bus_requested, target);
                }
            }
        }
        Ok(())
    }

    /// LIN bus sleep commanded by the LIN master. Remembers the sleep so
    /// the slave's shutdown can proceed, until a user request re-arms the
    /// channel.
    pub fn bus_sm_bus_sleep_mode(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let entry = &mut self.channels[channel.index()];
        entry.bus_sleep_indicated = true;
        entry.bus_requested = ChannelState::NoComNoPendingRequest;
        Ok(())
    }

    /// An active diagnostic session needs the channel awake. Bypasses
    /// administrative limitations.
    pub fn dcm_active_diagnostic(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        self.channels[channel.index()].dcm_active = true;
        Ok(())
    }

    /// The diagnostic session ended.
    pub fn dcm_inactive_diagnostic(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        self.channels[channel.index()].dcm_active = false;
        Ok(())
    }

    /// Passive wake-up from the ECU state manager (master partition).
    pub fn ecum_wakeup_indication(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let alive = self.pnc_alive_ticks();
        wakeup::channel_wakeup(self.config, &mut self.channels, &mut self.pncs, channel, alive);
        Ok(())
    }

    /// Passive wake-up indicated on an arbitrary partition. Satellite
    /// indications are marshalled through the channel's counter-pair cell
    /// and fan out on the master's next cycle.
    pub fn ecum_wakeup_indication_from(
        &mut self,
        channel: ChannelId,
        partition: PartitionId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        self.check_partition(partition)?;
        if partition.is_master() {
            return self.ecum_wakeup_indication(channel);
        }
        self.channels[channel.index()].forwarded_wakeup.write(true);
        Ok(())
    }

    /// Cluster wake-up (e.g. from a wake-up frame carrying cluster bits).
    pub fn ecum_pnc_wakeup_indication(
        &mut self,
        pnc: PncId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_pnc(pnc)?;
        let alive = self.pnc_alive_ticks();
        wakeup::pnc_wakeup(self.config, &mut self.channels, &mut self.pncs, pnc, alive);
        Ok(())
    }

    /// Another node started the network; join passively.
    pub fn nm_network_start_indication(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let alive = self.pnc_alive_ticks();
        wakeup::channel_wakeup(self.config, &mut self.channels, &mut self.pncs, channel, alive);
        Ok(())
    }

    /// Nm entered network mode: full communication is established.
    pub fn nm_network_mode(&mut self, channel: ChannelId) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let entry = &mut self.channels[channel.index()];
        if !entry.state.is_full_com() {
            entry.set_state(ChannelState::FullComNetworkRequested);
        }
        Ok(())
    }

    /// Nm announced the network-wide sleep preparation.
    pub fn nm_prepare_bus_sleep_mode(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let entry = &mut self.channels[channel.index()];
        if entry.state.is_full_com() {
            entry.set_state(ChannelState::FullComReadySleep);
        }
        Ok(())
    }

    /// Nm confirmed bus sleep. On FlexRay a confirmation arriving while the
    /// channel still holds NETWORK_REQUESTED marks an in-progress
    /// coordinated shutdown instead of acting; see the shutdown guard in
    /// the arbitration and wake-up paths.
    pub fn nm_bus_sleep_mode(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let bus_type = self.config.channel(channel).bus_type;
        let nm_variant = self.config.channel(channel).nm_variant;
        let entry = &mut self.channels[channel.index()];

        if bus_type == BusType::FlexRay && entry.state == ChannelState::FullComNetworkRequested {
            entry.fr_shutdown = true;
            return Ok(());
        }

        match nm_variant {
            NmVariant::LinSlave => {
                entry.bus_sleep_indicated = true;
                entry.bus_requested = ChannelState::NoComNoPendingRequest;
            }
            _ => {
                if entry.state == ChannelState::FullComReadySleep {
                    entry.set_state(ChannelState::SilentCom);
                    entry.bus_requested = ChannelState::NoComNoPendingRequest;
                }
            }
        }
        Ok(())
    }

    /// Nm restarted after an aborted shutdown; treated as a passive
    /// wake-up.
    pub fn nm_restart_indication(
        &mut self,
        channel: ChannelId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        let alive = self.pnc_alive_ticks();
        wakeup::channel_wakeup(self.config, &mut self.channels, &mut self.pncs, channel, alive);
        Ok(())
    }

    /// Nm repeat-message state changed on a channel. While active, cluster
    /// routing limitations on the channel are held off.
    pub fn nm_repeat_message_indication(
        &mut self,
        channel: ChannelId,
        active: bool,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        self.channels[channel.index()].nm_repeat_message = active;
        Ok(())
    }

    /// Extended RAM check result from the CAN driver.
    pub fn can_ram_check_status(
        &mut self,
        channel: ChannelId,
        status: RamCheckStatus,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_channel(channel)?;
        if !matches!(
            self.config.channel(channel).bus_type,
            BusType::Can | BusType::J1939
        ) {
            return Err(CommError::WrongParameters);
        }
        self.channels[channel.index()].ram_check = status;
        Ok(())
    }

    /// A coordinated cluster shutdown was forwarded by a gateway; the
    /// cluster falls back to READY_SLEEP on the next cluster pass.
    pub fn synchronized_pnc_shutdown(
        &mut self,
        pnc: PncId,
    ) -> Result<(), CommError<B::Error>> {
        self.require_post_init()?;
        self.check_pnc(pnc)?;
        self.pncs[pnc.index()].sync_shutdown = true;
        Ok(())
    }

    //==============================================================================Cycle

    /// Master-partition cycle function for one channel. Silent no-op while
    /// the module is not post-initialized.
    ///
    /// Per-tick ordering for a channel: satellite absorb, then (anchored to
    /// channel 0) the cluster pass, then arbitration, transition,
    /// notification, publication, and timer decay. The order is
    /// load-bearing: a satellite request absorbed after arbitration would
    /// stay invisible for a whole extra cycle.
    pub fn main_function(&mut self, channel: ChannelId) -> Result<(), CommError<B::Error>> {
        if self.status != InitStatus::PostInit {
            return Ok(());
        }
        self.check_channel(channel)?;
        let config = self.config;

        // Satellite absorb: user request cells, then marshalled wake-ups.
        if channel.index() == 0 {
            partition::absorb_all_user_requests(&mut self.users);
        } else {
            partition::absorb_user_requests(config, &mut self.users, channel);
        }
        if partition::take_forwarded_wakeup(&mut self.channels[channel.index()]) {
            let alive = self.pnc_alive_ticks();
            wakeup::channel_wakeup(config, &mut self.channels, &mut self.pncs, channel, alive);
        }

        let mut service_error = None;

        // Cluster pass, once per overall cycle.
        if channel.index() == 0 && config.pnc_enabled() {
            let alive = self.pnc_alive_ticks();
            if let Err(error) = pnc::pass(
                config,
                &mut self.pncs,
                &self.channels,
                &self.users,
                alive,
                &mut self.bus,
            ) {
                service_error = Some(error);
            }
        }

        let arb = arbitration::compute(
            config,
            channel,
            &mut self.channels[channel.index()],
            &self.users,
            &self.pncs,
            self.ecu_limited,
        );

        let defer_nm = !config.channel(channel).partition.is_master();
        if let Err(error) = channel::advance(
            config,
            channel,
            &mut self.channels[channel.index()],
            &arb,
            &mut self.bus,
            defer_nm,
        ) {
            service_error = Some(error);
        }

        // Listener callbacks run with no internal borrow held across them.
        notify::notify_users_of_channel(
            config,
            &mut self.channels,
            &self.pncs,
            &mut self.users,
            &mut self.listener,
            channel,
            PartitionId::MASTER,
        );
        notify::update_requester_list(
            config,
            &mut self.channels,
            &self.users,
            &mut self.listener,
            channel,
        );

        partition::publish_channel_state(config, &mut self.channels[channel.index()]);

        channel::decay_timers(
            config.channel(channel),
            &mut self.channels[channel.index()],
            arb.internal,
        );

        match service_error {
            Some(error) => Err(CommError::ProvidedService(error)),
            None => Ok(()),
        }
    }

    /// Satellite-partition cycle function for one channel: absorb the
    /// published mirror, run marshalled Nm calls for channels whose bus
    /// stack lives on this partition, and notify the partition's users.
    pub fn main_function_satellite(
        &mut self,
        channel: ChannelId,
        partition: PartitionId,
    ) -> Result<(), CommError<B::Error>> {
        if self.status != InitStatus::PostInit {
            return Ok(());
        }
        self.check_channel(channel)?;
        self.check_partition(partition)?;
        if partition.is_master() {
            return Err(CommError::InvalidPartition);
        }
        let config = self.config;

        let _ = partition::consume_published(&mut self.channels[channel.index()], partition);

        if config.channel(channel).partition == partition {
            if let Err(error) = partition::run_forwarded_nm(
                &mut self.channels[channel.index()],
                &mut self.bus,
                channel,
            ) {
                return Err(CommError::ProvidedService(error));
            }
        }

        notify::notify_satellite_users(
            config,
            &self.channels,
            &mut self.users,
            &mut self.listener,
            channel,
            partition,
        );
        Ok(())
    }

    //==============================================================================Helpers

    /// Number of configured channels, for integrators iterating the cycle.
    pub fn channel_count(&self) -> usize {
        self.config.channels.len()
    }

    /// Borrow the listener, e.g. to inspect a recording test double.
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Borrow the bus adapter.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn require_post_init(&self) -> Result<(), CommError<B::Error>> {
        match self.status {
            InitStatus::PostInit => Ok(()),
            InitStatus::Init => Err(CommError::NotPostInitialized),
            InitStatus::Uninit | InitStatus::PreInit => Err(CommError::NotInitialized),
        }
    }

    fn check_channel(&self, channel: ChannelId) -> Result<(), CommError<B::Error>> {
        if self.config.has_channel(channel) {
            Ok(())
        } else {
            Err(CommError::WrongParameters)
        }
    }

    fn check_user(&self, user: UserId) -> Result<(), CommError<B::Error>> {
        if self.config.has_user(user) {
            Ok(())
        } else {
            Err(CommError::WrongParameters)
        }
    }

    fn check_pnc(&self, pnc: PncId) -> Result<(), CommError<B::Error>> {
        if self.config.has_pnc(pnc) {
            Ok(())
        } else {
            Err(CommError::WrongParameters)
        }
    }

    fn check_partition(&self, partition: PartitionId) -> Result<(), CommError<B::Error>> {
        if self.config.has_partition(partition) {
            Ok(())
        } else {
            Err(CommError::WrongParameters)
        }
    }

    /// Alive window granted to clusters on a passive wake-up, in ticks of
    /// channel 0's cycle.
    fn pnc_alive_ticks(&self) -> u32 {
        self.config
            .ticks(ChannelId(0), self.config.pnc_prepare_sleep_ms)
    }

    /// True when any request source would keep the channel awake.
    fn request_pending(&self, channel: ChannelId) -> bool {
        let entry = &self.channels[channel.index()];
        if entry.dcm_active || entry.bus_requests_full_com() {
            return true;
        }

        let pncs_here = self.config.pncs_of_channel(channel);
        let user_pending = self
            .config
            .users
            .iter()
            .zip(self.users.iter())
            .any(|(user_cfg, user)| {
                (user_cfg.maps_channel(channel) || user_cfg.pncs & pncs_here != 0)
                    && user.request.peek() == ComMode::FullCom
            });
        if user_pending {
            return true;
        }

        // A cluster already in full communication counts as pending demand,
        // channel-less clusters included.
        self.config.pncs.iter().enumerate().any(|(index, pnc_cfg)| {
            let relevant = pnc_cfg.maps_channel(channel) || pnc_cfg.channels == 0;
            relevant && self.pncs[index].state.is_full_com()
        })
    }

    /// True when every channel the user maps is closed by an inhibition.
    fn user_fully_inhibited(&self, user: UserId) -> bool {
        let mut any_open = false;
        let mut any_channel = false;
        self.for_user_channels(user, |entry| {
            any_channel = true;
            if !entry.inhibition.contains(InhibitionStatus::LIMIT_TO_NO_COM) && !self.ecu_limited {
                any_open = true;
            }
        });
        if !any_channel {
            // Channel-less cluster users fall under the ECU switch only.
            return self.ecu_limited;
        }
        !any_open
    }

    /// Visit the channel entries mapped by a user, directly or through its
    /// clusters.
    fn for_user_channels(&self, user: UserId, mut visit: impl FnMut(&ChannelEntry)) {
        let user_cfg = self.config.user(user);
        for index in 0..self.config.channels.len() {
            let channel = ChannelId(index as u8);
            let mapped = user_cfg.maps_channel(channel)
                || user_cfg.pncs & self.config.pncs_of_channel(channel) != 0;
            if mapped {
                visit(&self.channels[index]);
            }
        }
    }
}
