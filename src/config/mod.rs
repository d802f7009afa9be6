//! Static configuration tables: the read-only, per-variant description of
//! channels, users, partial network clusters, and partitions.
//!
//! The tables are authored by the integrator (typically as `static` items),
//! handed to the manager at `pre_init`, and validated once at `init`. All
//! timer durations are given in milliseconds and scaled to cycle ticks of
//! the channel that owns the timer.
use crate::core::{
    BusType, ChannelId, ChannelState, GatewayType, NmVariant, PartitionId, PncId, UserId,
    MAX_CHANNELS, MAX_PARTITIONS, MAX_PNCS, MAX_USERS,
};
use crate::error::ConfigError;

/// Descriptor for a single communication channel.
#[derive(Debug)]
pub struct ChannelConfig {
    /// 1. Bus technology behind the channel.
    pub bus_type: BusType,
    /// 2. Network-management variant driving the shutdown handshake.
    pub nm_variant: NmVariant,
    /// 3. Gateway role for partial network clusters.
    pub gateway: GatewayType,
    /// 4. Bus-side state requested when a passive wake-up hits the channel.
    pub wakeup_target: ChannelState,
    /// 5. Main-function cycle time for this channel, in milliseconds.
    pub cycle_ms: u32,
    /// 6. Minimum time the channel stays in FULL_COM after a bus-side
    ///    wake-up (0 disables the timer).
    pub min_full_com_ms: u32,
    /// 7. Timer emulating the Nm shutdown on LIGHT channels (0 disables).
    pub nm_light_ms: u32,
    /// 8. Partition executing this channel's main function.
    pub partition: PartitionId,
    /// 9. Channel whose wake-up also wakes this one (LIN schedule owners,
    ///    managed sub-buses). `None` for independent channels.
    pub managing_channel: Option<ChannelId>,
}

/// Descriptor for a single communication user.
#[derive(Debug)]
pub struct UserConfig {
    /// Membership mask over the channel table (bit n = channel n).
    pub channels: u32,
    /// Membership mask over the cluster table (bit n = cluster n).
    pub pncs: u32,
    /// Partition owning this user; requests from any other partition are
    /// rejected.
    pub partition: PartitionId,
}

impl UserConfig {
    /// True when the user maps the given channel directly.
    #[inline]
    pub fn maps_channel(&self, channel: ChannelId) -> bool {
        self.channels & channel.bit() != 0
    }

    /// True when the user maps the given cluster.
    #[inline]
    pub fn maps_pnc(&self, pnc: PncId) -> bool {
        self.pncs & pnc.bit() != 0
    }

    /// True for users attached to at least one cluster.
    #[inline]
    pub fn is_pnc_user(&self) -> bool {
        self.pncs != 0
    }
}

/// Descriptor for a single partial network cluster.
#[derive(Debug)]
pub struct PncConfig {
    /// Membership mask over the channel table. May be empty: channel-less
    /// clusters still arbitrate from user requests alone.
    pub channels: u32,
}

impl PncConfig {
    /// True when the cluster spans the given channel.
    #[inline]
    pub fn maps_channel(&self, channel: ChannelId) -> bool {
        self.channels & channel.bit() != 0
    }
}

/// Complete module configuration handed to the manager at `pre_init`.
#[derive(Debug)]
pub struct CommConfig<'cfg> {
    /// Channel table, indexed by [`ChannelId`].
    pub channels: &'cfg [ChannelConfig],
    /// User table, indexed by [`UserId`].
    pub users: &'cfg [UserConfig],
    /// Cluster table, indexed by [`PncId`]. Empty disables PNC handling.
    pub pncs: &'cfg [PncConfig],
    /// Number of execution partitions (master included, so at least 1).
    pub partitions: usize,
    /// Wake every channel and every cluster on any single wake-up
    /// indication (coupled network topologies).
    pub synchronous_wakeup: bool,
    /// Let active-gateway channels wake up together with their clusters.
    pub pnc_gateway_coordination: bool,
    /// Time a cluster stays alive after its last requester drops, in
    /// milliseconds of channel 0's cycle.
    pub pnc_prepare_sleep_ms: u32,
    /// Initial ECU group classification (0..=3) gating which inhibitions
    /// are honoured.
    pub group_classification: u8,
}

impl<'cfg> CommConfig<'cfg> {
    /// True when at least one cluster is configured.
    #[inline]
    pub fn pnc_enabled(&self) -> bool {
        !self.pncs.is_empty()
    }

    /// Channel descriptor behind a validated handle.
    #[inline]
    pub fn channel(&self, channel: ChannelId) -> &ChannelConfig {
        &self.channels[channel.index()]
    }

    /// User descriptor behind a validated handle.
    #[inline]
    pub fn user(&self, user: UserId) -> &UserConfig {
        &self.users[user.index()]
    }

    /// Cluster descriptor behind a validated handle.
    #[inline]
    pub fn pnc(&self, pnc: PncId) -> &PncConfig {
        &self.pncs[pnc.index()]
    }

    /// Range check for a channel handle.
    #[inline]
    pub fn has_channel(&self, channel: ChannelId) -> bool {
        channel.index() < self.channels.len()
    }

    /// Range check for a user handle.
    #[inline]
    pub fn has_user(&self, user: UserId) -> bool {
        user.index() < self.users.len()
    }

    /// Range check for a cluster handle.
    #[inline]
    pub fn has_pnc(&self, pnc: PncId) -> bool {
        pnc.index() < self.pncs.len()
    }

    /// Range check for a partition handle.
    #[inline]
    pub fn has_partition(&self, partition: PartitionId) -> bool {
        partition.index() < self.partitions
    }

    /// Union of the channel masks of every cluster mapping `channel`.
    pub fn pncs_of_channel(&self, channel: ChannelId) -> u32 {
        let mut mask = 0u32;
        for (index, pnc) in self.pncs.iter().enumerate() {
            if pnc.maps_channel(channel) {
                mask |= 1u32 << index;
            }
        }
        mask
    }

    /// Scale a millisecond duration to ticks of the given channel's cycle,
    /// rounding up so a non-zero duration never collapses to zero ticks.
    pub fn ticks(&self, channel: ChannelId, duration_ms: u32) -> u32 {
        let cycle = self.channel(channel).cycle_ms.max(1);
        duration_ms.div_ceil(cycle)
    }

    /// Validate the whole table set. Called once by the manager at `init`;
    /// any violation aborts initialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if self.channels.len() > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels {
                count: self.channels.len(),
            });
        }
        if self.users.len() > MAX_USERS {
            return Err(ConfigError::TooManyUsers {
                count: self.users.len(),
            });
        }
        if self.pncs.len() > MAX_PNCS {
            return Err(ConfigError::TooManyPncs {
                count: self.pncs.len(),
            });
        }
        if self.partitions == 0 || self.partitions > MAX_PARTITIONS {
            return Err(ConfigError::BadPartitionCount {
                count: self.partitions,
            });
        }

        let channel_bits = mask_of(self.channels.len());
        let pnc_bits = mask_of(self.pncs.len());

        for (index, channel) in self.channels.iter().enumerate() {
            let id = ChannelId(index as u8);
            if channel.cycle_ms == 0 {
                return Err(ConfigError::ZeroCycleTime(id));
            }
            if !self.has_partition(channel.partition) {
                return Err(ConfigError::ChannelPartitionOutOfRange(id));
            }
            if let Some(manager) = channel.managing_channel {
                if !self.has_channel(manager) {
                    return Err(ConfigError::ManagingChannelOutOfRange(id));
                }
            }
        }

        for (index, user) in self.users.iter().enumerate() {
            let id = UserId(index as u8);
            if user.channels == 0 && user.pncs == 0 {
                return Err(ConfigError::EmptyUserMapping(id));
            }
            if user.channels & !channel_bits != 0 {
                return Err(ConfigError::UserChannelOutOfRange(id));
            }
            if user.pncs & !pnc_bits != 0 {
                return Err(ConfigError::UserPncOutOfRange(id));
            }
            if !self.has_partition(user.partition) {
                return Err(ConfigError::UserPartitionOutOfRange(id, user.partition));
            }
        }

        for (index, pnc) in self.pncs.iter().enumerate() {
            if pnc.channels & !channel_bits != 0 {
                return Err(ConfigError::PncChannelOutOfRange(PncId(index as u8)));
            }
        }

        Ok(())
    }
}

/// Mask with the lowest `len` bits set.
#[inline]
fn mask_of(len: usize) -> u32 {
    if len >= 32 {
        u32::MAX
    } else {
        (1u32 << len) - 1
    }
}
