//! Shared store boundary
//!
//! This module provides:
//! - [`SharedStore`] trait, the key-value store every execution context shares
//! - [`InMemorySharedStore`] for tests, demos and single-process deployments
//! - [`typed`] helpers that apply the engine's read/write failure policy

#[cfg(test)]
pub(crate) mod faulty;
mod memory;
mod traits;
pub mod typed;

pub use memory::InMemorySharedStore;
pub use traits::{ChangeKind, SharedStore, StoreChange, StoreError};
