//! Structured-payload signatures for relayed (meta-transaction) calls.
//!
//! A signer authorizes one operation by signing the digest of a canonical
//! string built from a per-core domain, the operation payload, the signer's
//! nonce and a deadline. Domains differ per core instance, so a signature
//! captured on one contract can never be replayed against another.

use sha2::{Digest, Sha256};

use crate::account::types::{Address, RelayProof, Timestamp};
use crate::crypto;
use crate::error::MeridianError;

/// Fixed signing domain of one core instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Domain {
    pub fn new(name: &str, version: &str, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    /// Hex digest committing to all four domain fields
    pub fn separator(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "{}:{}:{}:{}",
                self.name, self.version, self.chain_id, self.verifying_contract
            )
            .as_bytes(),
        );
        hex::encode(hasher.finalize())
    }
}

/// One operation's typed payload: an operation tag plus ordered fields
#[derive(Clone, Debug)]
pub struct Payload {
    pub op: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl Payload {
    pub fn new(op: &'static str) -> Self {
        Self { op, params: vec![] }
    }

    pub fn field(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }

    fn canonical(&self) -> String {
        let fields: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}|{}", self.op, fields.join(":"))
    }
}

/// Digest a signer commits to: domain separator, payload, nonce, deadline
pub fn signing_digest(
    domain: &Domain,
    payload: &Payload,
    nonce: u64,
    deadline: Timestamp,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}|{}|nonce={}|deadline={}",
            domain.separator(),
            payload.canonical(),
            nonce,
            deadline
        )
        .as_bytes(),
    );
    hasher.finalize().into()
}

/// Off-band signing helper for wallets and tests
pub fn sign(
    domain: &Domain,
    payload: &Payload,
    nonce: u64,
    deadline: Timestamp,
    key: &crypto::KeyPair,
) -> RelayProof {
    let digest = signing_digest(domain, payload, nonce, deadline);
    RelayProof {
        signer: key.address(),
        nonce,
        deadline,
        signature: key.sign_hex(&digest),
    }
}

/// Validate a relay proof against the expected signer nonce and the host's
/// current time. Never consumes the nonce; consumption is a separate step the
/// cores run only once every other check has passed.
pub fn verify(
    domain: &Domain,
    payload: &Payload,
    proof: &RelayProof,
    expected_nonce: u64,
    now: Timestamp,
) -> Result<(), MeridianError> {
    if now > proof.deadline {
        return Err(MeridianError::SignatureExpired);
    }
    if proof.nonce != expected_nonce {
        return Err(MeridianError::NonceMismatch {
            expected: expected_nonce,
            got: proof.nonce,
        });
    }
    let digest = signing_digest(domain, payload, proof.nonce, proof.deadline);
    if !crypto::verify_with_address(&digest, &proof.signature, &proof.signer) {
        return Err(MeridianError::SignatureMismatch);
    }
    Ok(())
}

/// Payload constructors, one per relayable operation
pub mod payloads {
    use super::Payload;
    use crate::account::types::{AccountId, Address};

    pub fn freeze(account: AccountId) -> Payload {
        Payload::new("account.freeze").field("account", account)
    }

    pub fn add_auth_address(account: AccountId, address: &Address) -> Payload {
        Payload::new("account.add-auth-address")
            .field("account", account)
            .field("address", address)
    }

    pub fn remove_auth_address(account: AccountId, address: &Address) -> Payload {
        Payload::new("account.remove-auth-address")
            .field("account", account)
            .field("address", address)
    }

    pub fn add_proxy_address(account: AccountId, address: &Address) -> Payload {
        Payload::new("account.add-proxy-address")
            .field("account", account)
            .field("address", address)
    }

    pub fn remove_proxy_address(account: AccountId, address: &Address) -> Payload {
        Payload::new("account.remove-proxy-address")
            .field("account", account)
            .field("address", address)
    }

    pub fn set_trust_world(account: AccountId, flag: bool) -> Payload {
        Payload::new("account.set-trust-world")
            .field("account", account)
            .field("flag", flag)
    }

    pub fn set_trust_contract(account: AccountId, contract: &Address, flag: bool) -> Payload {
        Payload::new("account.set-trust-contract")
            .field("account", account)
            .field("contract", contract)
            .field("flag", flag)
    }

    pub fn transfer(from: AccountId, to: &str, amount: u64) -> Payload {
        Payload::new("fungible.transfer")
            .field("from", from)
            .field("to", to.to_string())
            .field("amount", amount)
    }

    pub fn approve(owner: AccountId, spender: AccountId, amount: u64) -> Payload {
        Payload::new("fungible.approve")
            .field("owner", owner)
            .field("spender", spender)
            .field("amount", amount)
    }

    pub fn set_operator(owner: AccountId, operator: AccountId, flag: bool) -> Payload {
        Payload::new("ledger.set-operator")
            .field("owner", owner)
            .field("operator", operator)
            .field("flag", flag)
    }

    pub fn transfer_item(token: u64, to: &str) -> Payload {
        Payload::new("item.transfer")
            .field("token", token)
            .field("to", to.to_string())
    }

    pub fn approve_item(token: u64, spender: AccountId) -> Payload {
        Payload::new("item.approve")
            .field("token", token)
            .field("spender", spender)
    }
}
