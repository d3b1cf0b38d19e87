//! Identity type definitions for the Meridian platform

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::MeridianError;

/// Stable numeric account identifier
pub type AccountId = u64;

/// Id 0 is reserved and never assigned: the universal "no account / burn
/// target" sentinel.
pub const ACCOUNT_NONE: AccountId = 0;

/// Milliseconds since the unix epoch, supplied by the host as block time
pub type Timestamp = u64;

/// A platform address: 32 bytes, lowercase hex. Wallet addresses are Ed25519
/// public keys; contract addresses are opaque digests.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self, MeridianError> {
        let s = s.trim().trim_start_matches("0x").to_lowercase();
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MeridianError::InvalidAddress);
        }
        Ok(Address(s))
    }

    pub fn from_public_key(key: &ed25519_dalek::VerifyingKey) -> Self {
        Address(hex::encode(key.to_bytes()))
    }

    pub fn from_digest(digest: [u8; 32]) -> Self {
        Address(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Main account record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub primary_address: Address,
    pub frozen: bool,
    /// Additional addresses resolving to this account
    pub auth_addresses: BTreeSet<Address>,
    /// Relay-only actors; these never resolve
    pub proxy_addresses: BTreeSet<Address>,
}

impl Account {
    pub fn new(id: AccountId, primary_address: Address) -> Self {
        Self {
            id,
            primary_address,
            frozen: false,
            auth_addresses: BTreeSet::new(),
            proxy_addresses: BTreeSet::new(),
        }
    }

    /// Number of addresses that resolve to this account
    pub fn resolvable_count(&self) -> usize {
        1 + self.auth_addresses.len()
    }
}

/// Operation classes the authorization resolver distinguishes. Every class
/// originates *from* the account; receiving value is not an action and never
/// consults the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Transfer,
    Approve,
    ManageAccount,
    Trust,
    Freeze,
}

impl Action {
    /// Proxy addresses may only move and approve assets
    pub fn proxy_eligible(self) -> bool {
        matches!(self, Action::Transfer | Action::Approve)
    }
}

/// Off-band authorization for a relayed call: the signer consents to one
/// operation payload at one nonce, valid until `deadline`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayProof {
    pub signer: Address,
    pub nonce: u64,
    pub deadline: Timestamp,
    /// Hex-encoded Ed25519 signature over the typed-payload digest
    pub signature: String,
}

/// Who is making a call. Direct and relayed calls share every code path and
/// differ only in the verification step; the logical actor of a relayed call
/// is the signer, never the submitter.
#[derive(Clone, Debug)]
pub enum Caller {
    Direct(Address),
    Relayed { submitter: Address, proof: RelayProof },
}

impl Caller {
    /// The address the action is attributed to
    pub fn actor(&self) -> &Address {
        match self {
            Caller::Direct(address) => address,
            Caller::Relayed { proof, .. } => &proof.signer,
        }
    }

    /// The address that physically submitted the call
    pub fn submitter(&self) -> &Address {
        match self {
            Caller::Direct(address) => address,
            Caller::Relayed { submitter, .. } => submitter,
        }
    }

    pub fn proof(&self) -> Option<&RelayProof> {
        match self {
            Caller::Direct(_) => None,
            Caller::Relayed { proof, .. } => Some(proof),
        }
    }

    pub fn is_relayed(&self) -> bool {
        matches!(self, Caller::Relayed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_normalizes() {
        let raw = format!("0x{}", "AB".repeat(32));
        let addr = Address::parse(&raw).unwrap();
        assert_eq!(addr.as_str(), "ab".repeat(32));
    }

    #[test]
    fn address_parse_rejects_garbage() {
        assert_eq!(Address::parse(""), Err(MeridianError::InvalidAddress));
        assert_eq!(Address::parse("zz".repeat(32).as_str()), Err(MeridianError::InvalidAddress));
        assert_eq!(Address::parse("abcd"), Err(MeridianError::InvalidAddress));
    }

    #[test]
    fn relayed_actor_is_the_signer() {
        let signer = Address::from_digest([1u8; 32]);
        let submitter = Address::from_digest([2u8; 32]);
        let caller = Caller::Relayed {
            submitter: submitter.clone(),
            proof: RelayProof {
                signer: signer.clone(),
                nonce: 0,
                deadline: 0,
                signature: String::new(),
            },
        };
        assert_eq!(caller.actor(), &signer);
        assert_eq!(caller.submitter(), &submitter);
        assert!(caller.is_relayed());
    }
}
