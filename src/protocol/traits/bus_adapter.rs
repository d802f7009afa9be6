//! Abstraction over the per-bus collaborators the manager commands: the
//! bus-state-manager that powers the physical bus up and down, the Nm layer
//! negotiating network-wide sleep, and the signal path carrying cluster
//! request bits. Allows the library to plug into any bus driver stack.
use crate::core::{ChannelId, ComMode, PncId};

/// Contract for every side effect the manager pushes towards the bus stack.
///
/// All calls are synchronous and bounded; the manager never holds internal
/// state across a call, so implementations may re-enter the public query
/// API. A returned error is reported once per offending call and the
/// operation is retried naturally on a later cycle when the arbitration
/// still wants it.
pub trait BusAdapter {
    type Error: core::fmt::Debug;

    /// Ask the bus-state-manager to bring the channel to `mode`.
    fn request_com_mode(&mut self, channel: ChannelId, mode: ComMode)
        -> Result<(), Self::Error>;

    /// Actively request the network from the Nm layer (NM-FULL channels).
    fn nm_network_request(&mut self, channel: ChannelId) -> Result<(), Self::Error>;

    /// Release this node's network request (NM-FULL channels).
    fn nm_network_release(&mut self, channel: ChannelId) -> Result<(), Self::Error>;

    /// Join a network started by another node without requesting it.
    fn nm_passive_startup(&mut self, channel: ChannelId) -> Result<(), Self::Error>;

    /// Transmit the cluster request bit for `pnc` on `channel`. Only deltas
    /// are sent; the manager tracks the last transmitted value.
    fn send_eira(
        &mut self,
        channel: ChannelId,
        pnc: PncId,
        requested: bool,
    ) -> Result<(), Self::Error>;
}
