// src/locks/mod.rs

//! Named resource locks shared between nodes.

pub mod registry;

pub use registry::{HeldLocks, ResourceLockRegistry};
