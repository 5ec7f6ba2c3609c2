//! Port definitions (hexagonal boundaries).

pub mod inbound;
pub mod outbound;

pub use inbound::FinalityProviderManager;
pub use outbound::{ChainController, EotsSigner, FinalityVote};
