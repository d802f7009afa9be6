//! High-level components of the communication manager: mode arbitration,
//! channel and cluster state machines, wake-up handling, notification,
//! partition synchronization, and the manager facade.
pub mod arbitration;
pub mod channel;
pub mod manager;
pub mod notify;
pub mod partition;
pub mod pnc;
pub mod supervisor;
pub mod traits;
pub(crate) mod user;
pub mod wakeup;
