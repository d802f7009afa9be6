//! Cross-cutting primitives shared by the protocol modules.
/// Paired-counter cell implementing the lock-free cross-partition handoff.
pub mod sync;
