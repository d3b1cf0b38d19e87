//! Asset ledgers and the seam they consume the identity core through.
//!
//! A ledger never compares raw addresses. Before any balance or ownership
//! mutation it resolves parties to ids, verifies relay proofs against its own
//! domain, asks the authorization resolver who is acting, and only then
//! touches its own storage.

pub mod fungible;
pub mod items;

use crate::account::core::AccountCore;
use crate::account::types::{AccountId, Action, Address, RelayProof, Timestamp, ACCOUNT_NONE};
use crate::account::Capability;
use crate::error::MeridianError;
use crate::signature::{Domain, Payload};
use crate::wiring::Shell;

/// What a ledger needs from the identity core. Implemented by the account
/// shell, so ledgers keep working across core upgrades.
pub trait IdentityHub: Send + Sync {
    fn resolve(&self, address: &Address) -> Result<AccountId, MeridianError>;
    fn get_or_create(&self, address: &Address) -> Result<AccountId, MeridianError>;
    fn account_exists(&self, id: AccountId) -> Result<bool, MeridianError>;
    fn is_frozen(&self, id: AccountId) -> Result<bool, MeridianError>;
    fn authorize(
        &self,
        acting: &Address,
        account: AccountId,
        action: Action,
        calling_contract: Option<&Address>,
    ) -> Result<Capability, MeridianError>;
    fn verify_relayed(
        &self,
        domain: &Domain,
        payload: &Payload,
        proof: &RelayProof,
        now: Timestamp,
    ) -> Result<(), MeridianError>;
    fn consume_nonce(&self, signer: &Address, expected: u64) -> Result<(), MeridianError>;
}

impl IdentityHub for Shell<AccountCore> {
    fn resolve(&self, address: &Address) -> Result<AccountId, MeridianError> {
        Ok(self.core()?.resolve(address))
    }

    fn get_or_create(&self, address: &Address) -> Result<AccountId, MeridianError> {
        self.core()?.get_or_create_account_id(address)
    }

    fn account_exists(&self, id: AccountId) -> Result<bool, MeridianError> {
        Ok(self.core()?.account_exists(id))
    }

    fn is_frozen(&self, id: AccountId) -> Result<bool, MeridianError> {
        self.core()?.is_frozen(id)
    }

    fn authorize(
        &self,
        acting: &Address,
        account: AccountId,
        action: Action,
        calling_contract: Option<&Address>,
    ) -> Result<Capability, MeridianError> {
        self.core()?.authorize(acting, account, action, calling_contract)
    }

    fn verify_relayed(
        &self,
        domain: &Domain,
        payload: &Payload,
        proof: &RelayProof,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.core()?.verify_relayed(domain, payload, proof, now)
    }

    fn consume_nonce(&self, signer: &Address, expected: u64) -> Result<(), MeridianError> {
        self.core()?.consume_nonce(signer, expected)
    }
}

/// Party of a ledger operation: an existing id, or an address to resolve
#[derive(Clone, Debug)]
pub enum AccountRef {
    Id(AccountId),
    Addr(Address),
}

impl AccountRef {
    /// Canonical form signers commit to in relayed payloads
    pub fn canonical(&self) -> String {
        match self {
            AccountRef::Id(id) => format!("id:{}", id),
            AccountRef::Addr(address) => format!("addr:{}", address),
        }
    }
}

/// Resolve the source of a value-moving operation; sources must exist
pub fn resolve_source(
    hub: &dyn IdentityHub,
    party: &AccountRef,
) -> Result<AccountId, MeridianError> {
    match party {
        AccountRef::Id(id) => {
            if *id == ACCOUNT_NONE || !hub.account_exists(*id)? {
                return Err(MeridianError::UnknownAccount);
            }
            Ok(*id)
        }
        AccountRef::Addr(address) => {
            let id = hub.resolve(address)?;
            if id == ACCOUNT_NONE {
                return Err(MeridianError::UnknownAccount);
            }
            Ok(id)
        }
    }
}

/// Resolve the destination of a transfer. Id 0 is the burn target, not an
/// error; a fresh address gets an account on the spot.
pub fn resolve_dest(hub: &dyn IdentityHub, party: &AccountRef) -> Result<AccountId, MeridianError> {
    match party {
        AccountRef::Id(id) => {
            if *id != ACCOUNT_NONE && !hub.account_exists(*id)? {
                return Err(MeridianError::UnknownAccount);
            }
            Ok(*id)
        }
        AccountRef::Addr(address) => hub.get_or_create(address),
    }
}
