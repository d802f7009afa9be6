//! `korri-comm` library: communication mode management for multi-bus
//! embedded systems in a `no_std` environment. The crate arbitrates, per
//! channel and per partial network cluster, the active communication mode
//! from concurrent requesters (users, diagnostics, bus indications, passive
//! wake-ups) and synchronizes that state across execution partitions.
#![no_std]
//==================================================================================
/// Core data types shared by the configuration tables and the protocol engine.
pub mod core;
/// Domain errors (lifecycle ordering, invalid parameters, configuration
/// validation, forwarded-service failures).
pub mod error;
/// Static configuration tables describing channels, users, clusters, and
/// partitions.
pub mod config;
/// Cross-cutting primitives: the paired-counter cell backing cross-partition
/// state handoff.
pub mod infra;
/// Protocol implementation: arbitration, channel and cluster state machines,
/// wake-up handling, notification, partition sync, and the manager facade.
pub mod protocol;
//==================================================================================
