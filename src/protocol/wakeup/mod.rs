//! Passive wake-up handling: translates external wake-up indications
//! (EcuM, Nm network start, cluster wake-ups) into bus-side mode requests,
//! fanning out across managed channels and cluster members, or across the
//! whole system when synchronous wake-up is configured.
use crate::config::CommConfig;
use crate::core::{ChannelId, PncId};
use crate::protocol::arbitration::raise;
use crate::protocol::channel::{ChannelEntry, InhibitionStatus};
use crate::protocol::pnc::PncEntry;

/// Wake one channel and everything coupled to it.
pub(crate) fn channel_wakeup(
    config: &CommConfig<'_>,
    channels: &mut [ChannelEntry],
    pncs: &mut [PncEntry],
    id: ChannelId,
    pnc_alive_ticks: u32,
) {
    wake_single(config, channels, id);

    // A wake-up on a managing channel also wakes the channels it manages.
    for index in 0..config.channels.len() {
        if config.channels[index].managing_channel == Some(id) {
            wake_single(config, channels, ChannelId(index as u8));
        }
    }

    if config.synchronous_wakeup {
        wake_everything(config, channels, pncs, pnc_alive_ticks);
    }
}

/// Wake a cluster: activate it for at least the prepare-sleep window and
/// bring up every mapped channel that is not already in full communication.
pub(crate) fn pnc_wakeup(
    config: &CommConfig<'_>,
    channels: &mut [ChannelEntry],
    pncs: &mut [PncEntry],
    id: PncId,
    pnc_alive_ticks: u32,
) {
    pncs[id.index()].passive_activate(pnc_alive_ticks);

    for index in 0..config.channels.len() {
        let channel = ChannelId(index as u8);
        if config.pnc(id).maps_channel(channel) {
            wake_single(config, channels, channel);
        }
    }

    if config.synchronous_wakeup {
        wake_everything(config, channels, pncs, pnc_alive_ticks);
    }
}

/// Synchronous wake-up policy: wake-up is never partial across a coupled
/// topology. Every sleeping or silent channel comes up and every cluster
/// is activated.
fn wake_everything(
    config: &CommConfig<'_>,
    channels: &mut [ChannelEntry],
    pncs: &mut [PncEntry],
    pnc_alive_ticks: u32,
) {
    for index in 0..config.channels.len() {
        wake_single(config, channels, ChannelId(index as u8));
    }
    for pnc in pncs.iter_mut().take(config.pncs.len()) {
        pnc.passive_activate(pnc_alive_ticks);
    }
}

/// Apply one wake-up indication to one channel, honouring the wake-up
/// inhibition, the FlexRay shutdown guard, and the already-awake check.
fn wake_single(config: &CommConfig<'_>, channels: &mut [ChannelEntry], id: ChannelId) {
    let entry = &mut channels[id.index()];
    if entry.inhibition.contains(InhibitionStatus::PREVENT_WAKE_UP) {
        return;
    }
    let target = config.channel(id).wakeup_target;
    if entry.fr_shutdown {
        // Do not interrupt the coordinated shutdown; park the wake-up until
        // the bus confirms NO_COM.
        entry.post_shutdown_wakeup = Some(target);
        return;
    }
    if entry.state.is_full_com() {
        return;
    }
    #[cfg(feature = "defmt")]
    defmt::info!("passive wake-up on channel {}", id.0);
    raise(&mut entry.bus_requested, target);
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
