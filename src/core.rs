//! Core data types shared by the configuration tables and the protocol
//! engine: communication modes, per-channel and per-PNC state enums,
//! bus/network-management variants, and strongly-typed table handles.

// Capacity bounds for the static tables. Membership masks are `u32`,
// so none of these may exceed 32.
/// Maximum number of communication channels.
pub const MAX_CHANNELS: usize = 16;
/// Maximum number of partial network clusters.
pub const MAX_PNCS: usize = 16;
/// Maximum number of communication users.
pub const MAX_USERS: usize = 32;
/// Maximum number of execution partitions (master included).
pub const MAX_PARTITIONS: usize = 4;

/// Sentinel filling the unused tail of a requester list snapshot.
pub const NO_USER: u8 = 0xFF;

/// Aggregated communication mode, ordered so that comparisons implement
/// the "highest wins" rule directly: `FullCom > SilentCom > NoCom`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ComMode {
    /// No transmission, no reception.
    NoCom = 0,
    /// Reception only; the node stays silent on the bus.
    SilentCom = 1,
    /// Full transmission and reception.
    FullCom = 2,
}

/// Active state of one channel. A subset applies depending on the bus type
/// and network-management variant; the transition rules live in
/// [`crate::protocol::channel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// Bus down and nobody asked for it.
    NoComNoPendingRequest,
    /// Bus down but a request exists and is gated (communication not yet
    /// allowed, or the transition has not run).
    NoComRequestPending,
    /// Receive path alive, transmit path silent.
    SilentCom,
    /// Full communication, this node actively requests the network.
    FullComNetworkRequested,
    /// Full communication, network kept alive by other nodes only.
    FullComReadySleep,
}

impl ChannelState {
    /// Collapse the detailed state into the tri-state mode reported to users.
    pub fn com_mode(&self) -> ComMode {
        match self {
            ChannelState::NoComNoPendingRequest | ChannelState::NoComRequestPending => {
                ComMode::NoCom
            }
            ChannelState::SilentCom => ComMode::SilentCom,
            ChannelState::FullComNetworkRequested | ChannelState::FullComReadySleep => {
                ComMode::FullCom
            }
        }
    }

    /// True for both FULL_COM sub-states.
    pub fn is_full_com(&self) -> bool {
        self.com_mode() == ComMode::FullCom
    }
}

/// Active state of one partial network cluster.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PncState {
    /// Cluster fully asleep.
    NoCommunication,
    /// Nobody requests the cluster anymore; the prepare-sleep countdown is
    /// running before the cluster is declared down.
    PrepareSleep,
    /// Kept alive by other nodes on the bus (ERA) without a local request.
    ReadySleep,
    /// Actively requested by a local user; the EIRA bit is transmitted.
    Requested,
    /// Awake through a passive wake-up or a passive gateway; behaves like
    /// `Requested` on the receive side but never claims the cluster itself.
    RequestedPassive,
}

impl PncState {
    /// Tri-state mode reported to PNC users.
    pub fn com_mode(&self) -> ComMode {
        match self {
            PncState::NoCommunication | PncState::PrepareSleep => ComMode::NoCom,
            PncState::ReadySleep | PncState::Requested | PncState::RequestedPassive => {
                ComMode::FullCom
            }
        }
    }

    /// True while the cluster participates in full communication.
    pub fn is_full_com(&self) -> bool {
        matches!(
            self,
            PncState::ReadySleep | PncState::Requested | PncState::RequestedPassive
        )
    }
}

/// Physical bus technology behind a channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusType {
    Can,
    Lin,
    FlexRay,
    /// CAN channel running the J1939 stack on top.
    J1939,
}

/// Network-management variant of a channel. The variant selects which
/// transitions are Nm-driven and which are timer-driven.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NmVariant {
    /// No network management; shutdown is timer-driven only.
    None,
    /// Timer-emulated network management (no Nm peer protocol).
    Light,
    /// Full Nm peer protocol with network request/release handshake.
    Full,
    /// LIN slave: sleep is commanded by the LIN master.
    LinSlave,
}

/// Gateway role of a channel with respect to partial network clusters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GatewayType {
    /// Not a gateway channel.
    None,
    /// Wakes up together with its clusters and relays their request bits.
    Active,
    /// Listens to cluster requests without relaying them.
    Passive,
}

/// Result of the extended RAM check run by the CAN driver at wake-up.
/// A degraded result caps the state reported by `get_state` on CAN channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RamCheckStatus {
    /// Check passed or not configured; no ceiling applies.
    Ok,
    /// Check partially failed; reported state is capped to
    /// [`ChannelState::NoComRequestPending`].
    Partial,
    /// Check failed; reported state is capped to
    /// [`ChannelState::NoComNoPendingRequest`].
    Failed,
}

/// Initialization ladder of the module. Each lifecycle call requires the
/// previous rung and moves exactly one step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitStatus {
    Uninit,
    PreInit,
    Init,
    PostInit,
}

macro_rules! handle_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub u8);

        impl $name {
            /// Table index behind the handle.
            #[inline]
            pub fn index(&self) -> usize {
                self.0 as usize
            }

            /// Membership-mask bit for the handle.
            #[inline]
            pub fn bit(&self) -> u32 {
                1u32 << self.0
            }
        }
    };
}

handle_type!(
    /// Handle of one communication channel.
    ChannelId
);
handle_type!(
    /// Handle of one partial network cluster.
    PncId
);
handle_type!(
    /// Handle of one communication user.
    UserId
);
handle_type!(
    /// Handle of one execution partition. Partition 0 is the master.
    PartitionId
);

impl PartitionId {
    /// The master partition owns the authoritative state.
    pub const MASTER: PartitionId = PartitionId(0);

    /// True for the master partition.
    #[inline]
    pub fn is_master(&self) -> bool {
        self.0 == 0
    }
}
