//! Per-user runtime entry: the partition-writable request cell and the
//! notification memory used for duplicate suppression.
use crate::core::ComMode;
use crate::infra::sync::VersionedCell;

/// Runtime state of one communication user.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UserEntry {
    /// Requested mode. Written by the user's owning partition, absorbed by
    /// the master on every cycle; the absorb is idempotent so a user mapped
    /// to several channels is consumed once per channel without harm.
    pub request: VersionedCell<ComMode>,
    /// Mode delivered by the last successful notification. A failed
    /// listener call leaves this untouched, which re-arms the delivery on
    /// the next cycle.
    pub last_notified: ComMode,
}

impl UserEntry {
    pub(crate) const fn new() -> Self {
        Self {
            request: VersionedCell::new(ComMode::NoCom),
            last_notified: ComMode::NoCom,
        }
    }

    /// Back to power-on defaults.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}
