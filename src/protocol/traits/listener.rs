//! Contracts towards the application side: per-user mode notifications and
//! the FULL_COM requester list reporting sink.
use crate::core::{ChannelId, ComMode, UserId};

/// Returned by a listener that cannot take the notification right now.
/// The manager keeps the pending state and retries on the next cycle
/// (at-least-once delivery); the rejection is not treated as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerBusy;

/// Consumer of mode changes and requester-list updates.
pub trait ModeListener {
    /// A user's aggregated mode changed. For multi-channel users the mode
    /// is the lowest across all mapped channels. Returning
    /// `Err(ListenerBusy)` postpones the delivery to the next cycle; the
    /// same value is never delivered twice after a success.
    fn mode_notification(&mut self, user: UserId, mode: ComMode) -> Result<(), ListenerBusy>;

    /// The set of users requesting FULL_COM on `channel` changed.
    /// `requesters` holds the user indices in ascending order.
    fn requesters_changed(&mut self, channel: ChannelId, requesters: &[u8]);
}
