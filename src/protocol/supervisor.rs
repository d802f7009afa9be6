//! Supervisor built on top of [`CommManager`].
//!
//! It drives the periodic cycle and optionally offers a command handle
//! (`CommHandle`) so producer tasks can queue requests and indications
//! without touching the manager directly.
//!
//! Firmware decides which features it needs by providing a pre-allocated
//! [`embassy_sync::channel::Channel`] instance. No allocation is performed
//! by the library and there is no dependency on a particular BSP.
//!
//! The cycle tick comes from a [`CycleTimer`] implementation. With
//! `embassy-time` available this is a one-liner:
//!
//! ```rust,ignore
//! use embassy_time::Timer;
//! use korri_comm::protocol::traits::cycle_timer::CycleTimer;
//!
//! struct EmbassyTimer;
//!
//! impl CycleTimer for EmbassyTimer {
//!     async fn delay_ms(&mut self, millis: u32) {
//!         Timer::after_millis(millis as u64).await;
//!     }
//! }
//! ```

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Sender},
};
use futures_util::{future::select, future::Either, pin_mut};

use crate::core::{ChannelId, ComMode, PartitionId, PncId, UserId};
use crate::protocol::manager::CommManager;
use crate::protocol::traits::bus_adapter::BusAdapter;
use crate::protocol::traits::cycle_timer::CycleTimer;
use crate::protocol::traits::listener::ModeListener;

/// Commands queued by producer tasks.
#[derive(Debug, Clone, Copy)]
pub enum CommCommand {
    /// User mode request from its owning partition.
    RequestComMode {
        user: UserId,
        mode: ComMode,
        partition: PartitionId,
    },
    /// Startup gate change from the ECU state manager.
    CommunicationAllowed { channel: ChannelId, allowed: bool },
    /// Passive wake-up indication.
    PassiveWakeup {
        channel: ChannelId,
        partition: PartitionId,
    },
    /// Cluster wake-up indication.
    PncWakeup { pnc: PncId },
    /// Diagnostic session opened on a channel.
    DcmActiveDiagnostic { channel: ChannelId },
    /// Diagnostic session closed on a channel.
    DcmInactiveDiagnostic { channel: ChannelId },
    /// Mode confirmation from the bus-state-manager.
    BusModeIndication { channel: ChannelId, mode: ComMode },
}

/// Service assembling the supervisor components.
pub struct CommService<'a, 'cfg, B, L, T, const CMD_CAP: usize>
where
    B: BusAdapter,
    L: ModeListener,
    T: CycleTimer,
{
    manager: CommManager<'cfg, B, L>,
    timer: T,
    cycle_ms: u32,
    command_channel: Option<&'a Channel<CriticalSectionRawMutex, CommCommand, CMD_CAP>>,
}

impl<'a, 'cfg, B, L, T, const CMD_CAP: usize> CommService<'a, 'cfg, B, L, T, CMD_CAP>
where
    B: BusAdapter,
    L: ModeListener,
    T: CycleTimer,
{
    /// Wrap an already post-initialized [`CommManager`]. `cycle_ms` is the
    /// base tick driving every channel's main function.
    pub fn new(
        manager: CommManager<'cfg, B, L>,
        timer: T,
        cycle_ms: u32,
        command_channel: Option<&'a Channel<CriticalSectionRawMutex, CommCommand, CMD_CAP>>,
    ) -> Self {
        Self {
            manager,
            timer,
            cycle_ms,
            command_channel,
        }
    }

    /// Split into handle/runner components.
    pub fn into_parts(self) -> CommServiceParts<'a, 'cfg, B, L, T, CMD_CAP> {
        let handle = self.command_channel.map(|channel| CommHandle {
            sender: channel.sender(),
        });
        CommServiceParts {
            handle,
            runner: CommRunner {
                manager: self.manager,
                timer: self.timer,
                cycle_ms: self.cycle_ms,
                commands: self.command_channel,
            },
        }
    }
}

/// Bundle returned by [`CommService::into_parts`].
pub struct CommServiceParts<'a, 'cfg, B, L, T, const CMD_CAP: usize>
where
    B: BusAdapter,
    L: ModeListener,
    T: CycleTimer,
{
    pub handle: Option<CommHandle<'a, CMD_CAP>>,
    pub runner: CommRunner<'a, 'cfg, B, L, T, CMD_CAP>,
}

/// Runner that drives the supervisor loop on the master partition.
pub struct CommRunner<'a, 'cfg, B, L, T, const CMD_CAP: usize>
where
    B: BusAdapter,
    L: ModeListener,
    T: CycleTimer,
{
    manager: CommManager<'cfg, B, L>,
    timer: T,
    cycle_ms: u32,
    commands: Option<&'a Channel<CriticalSectionRawMutex, CommCommand, CMD_CAP>>,
}

impl<'a, 'cfg, B, L, T, const CMD_CAP: usize> CommRunner<'a, 'cfg, B, L, T, CMD_CAP>
where
    B: BusAdapter,
    L: ModeListener,
    T: CycleTimer,
{
    /// Run the cycle loop forever: every `cycle_ms` milliseconds the main
    /// function of every channel executes; queued commands are applied as
    /// they arrive. Per-call failures are reported and the loop keeps
    /// going; the manager never aborts a cycle on a single bad input.
    pub async fn drive(mut self) -> ! {
        let commands = self.commands;

        loop {
            let mut command_to_process = None;
            let mut run_cycle = false;

            match commands {
                Some(command_channel) => {
                    let tick = self.timer.delay_ms(self.cycle_ms);
                    let command = command_channel.receive();
                    pin_mut!(tick);
                    pin_mut!(command);

                    match select(tick, command).await {
                        Either::Left(((), pending_command)) => {
                            drop(pending_command);
                            run_cycle = true;
                        }
                        Either::Right((command, pending_tick)) => {
                            drop(pending_tick);
                            command_to_process = Some(command);
                        }
                    }
                }
                None => {
                    self.timer.delay_ms(self.cycle_ms).await;
                    run_cycle = true;
                }
            }

            if run_cycle {
                self.run_cycle();
            }
            if let Some(command) = command_to_process {
                self.apply(command);
            }
        }
    }

    fn run_cycle(&mut self) {
        let channel_count = self.manager.channel_count();
        for index in 0..channel_count {
            if let Err(_error) = self.manager.main_function(ChannelId(index as u8)) {
                #[cfg(feature = "defmt")]
                defmt::warn!("main function reported {}", defmt::Debug2Format(&_error));
            }
        }
    }

    fn apply(&mut self, command: CommCommand) {
        let result = match command {
            CommCommand::RequestComMode {
                user,
                mode,
                partition,
            } => self.manager.request_com_mode_from(user, mode, partition),
            CommCommand::CommunicationAllowed { channel, allowed } => {
                self.manager.communication_allowed(channel, allowed)
            }
            CommCommand::PassiveWakeup { channel, partition } => self
                .manager
                .ecum_wakeup_indication_from(channel, partition),
            CommCommand::PncWakeup { pnc } => self.manager.ecum_pnc_wakeup_indication(pnc),
            CommCommand::DcmActiveDiagnostic { channel } => {
                self.manager.dcm_active_diagnostic(channel)
            }
            CommCommand::DcmInactiveDiagnostic { channel } => {
                self.manager.dcm_inactive_diagnostic(channel)
            }
            CommCommand::BusModeIndication { channel, mode } => {
                self.manager.bus_sm_mode_indication(channel, mode)
            }
        };
        if let Err(_error) = result {
            #[cfg(feature = "defmt")]
            defmt::warn!("command rejected: {}", defmt::Debug2Format(&_error));
        }
    }
}

/// Transmission handle (optional).
pub struct CommHandle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, CommCommand, CMD_CAP>,
}

impl<'a, const CMD_CAP: usize> CommHandle<'a, CMD_CAP> {
    /// Queue a user mode request.
    pub async fn request_com_mode(&self, user: UserId, mode: ComMode, partition: PartitionId) {
        self.sender
            .send(CommCommand::RequestComMode {
                user,
                mode,
                partition,
            })
            .await;
    }

    /// Queue a startup gate change.
    pub async fn communication_allowed(&self, channel: ChannelId, allowed: bool) {
        self.sender
            .send(CommCommand::CommunicationAllowed { channel, allowed })
            .await;
    }

    /// Queue a passive wake-up indication.
    pub async fn passive_wakeup(&self, channel: ChannelId, partition: PartitionId) {
        self.sender
            .send(CommCommand::PassiveWakeup { channel, partition })
            .await;
    }

    /// Queue a cluster wake-up indication.
    pub async fn pnc_wakeup(&self, pnc: PncId) {
        self.sender.send(CommCommand::PncWakeup { pnc }).await;
    }

    /// Queue a bus-state-manager mode confirmation.
    pub async fn bus_mode_indication(&self, channel: ChannelId, mode: ComMode) {
        self.sender
            .send(CommCommand::BusModeIndication { channel, mode })
            .await;
    }

    /// Queue any other command.
    pub async fn send(&self, command: CommCommand) {
        self.sender.send(command).await;
    }
}
