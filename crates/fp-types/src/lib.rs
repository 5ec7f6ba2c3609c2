//! # fp-types
//!
//! Shared domain primitives used across the finality-provider crates.
//!
//! ## Clusters
//!
//! - **Identity**: `BtcPublicKey`, `ChainPublicKey`, `ProofOfPossession`
//! - **Chain observation**: `BlockInfo`, `TxResponse`
//! - **EOTS material**: `PublicRandomness`, `SchnorrSignature`, `EotsSignature`

pub mod entities;

pub use entities::{
    short_hex, BlockInfo, BtcPublicKey, ChainPublicKey, EotsSignature, Hash, ProofOfPossession,
    PublicRandomness, SchnorrSignature, TxResponse,
};
