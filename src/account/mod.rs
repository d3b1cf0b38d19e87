//! Identity and authorization core.
//!
//! Maps addresses to stable numeric account ids, resolves "who may act on
//! behalf of account X" across the platform's delegation mechanisms, and
//! verifies signed, replay-protected instructions submitted on a signer's
//! behalf. Every asset ledger builds on this module.

pub mod authorization;
pub mod core;
pub mod nonce;
pub mod registry;
pub mod types;

pub use authorization::{AuthQuery, AuthorizationResolver, Capability};
pub use core::{AccountCore, AccountState};
pub use nonce::NonceRegistry;
pub use registry::AccountRegistry;
pub use types::{Account, AccountId, Action, Address, Caller, RelayProof, Timestamp, ACCOUNT_NONE};
