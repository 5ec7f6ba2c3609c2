//! Domain types and pure logic of the voting pipeline.

pub mod commitment;
pub mod entities;
pub mod invariants;

pub use commitment::{commitment_message, commitment_root};
pub use entities::{InstanceState, PubRandCommit};
