//! Account core: every identity entry point, direct and relayed.
//!
//! A call flows shell -> core -> backing. The core verifies relay proofs,
//! consults the authorization resolver, consumes nonces and mutates state,
//! all inside one backing write, so a failure at any step rolls the whole
//! call back, nonce increments included.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use super::authorization::{AuthQuery, AuthorizationResolver, Capability};
use super::nonce::NonceRegistry;
use super::registry::AccountRegistry;
use super::types::{
    Account, AccountId, Action, Address, Caller, RelayProof, Timestamp, ACCOUNT_NONE,
};
use crate::config::PlatformInfo;
use crate::crypto;
use crate::error::MeridianError;
use crate::events::{Event, EventLog};
use crate::signature::{self, payloads, Domain, Payload};
use crate::wiring::{next_core_id, Backing, CoreId};

/// Durable state of the identity subsystem
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountState {
    pub registry: AccountRegistry,
    pub nonces: NonceRegistry,
    pub trust_world: HashSet<AccountId>,
    pub trust_contract: HashSet<(AccountId, Address)>,
    /// Platform-curated allowlist, independent of user trust flags
    pub safe_contracts: HashSet<Address>,
    pub admins: HashSet<Address>,
    pub relayer: Option<Address>,
    pub events: EventLog,
}

impl AccountState {
    pub fn new(id_offset: u64, admins: HashSet<Address>, relayer: Option<Address>) -> Self {
        Self {
            registry: AccountRegistry::new(id_offset),
            nonces: NonceRegistry::new(),
            trust_world: HashSet::new(),
            trust_contract: HashSet::new(),
            safe_contracts: HashSet::new(),
            admins,
            relayer,
            events: EventLog::new(),
        }
    }
}

/// Replaceable logic tier of the identity subsystem
pub struct AccountCore {
    core_id: CoreId,
    domain: Domain,
    resolver: AuthorizationResolver,
    backing: Arc<Backing<AccountState>>,
    shell: RwLock<Option<Address>>,
}

impl AccountCore {
    /// Deploy a core against a backing. The backing refuses this core's
    /// writes until the wiring step binds it.
    pub fn new(info: &PlatformInfo, backing: Arc<Backing<AccountState>>) -> Arc<Self> {
        let core_id = next_core_id();
        let address = crypto::contract_address(&format!("account-core/{}", core_id));
        Arc::new(Self {
            core_id,
            domain: info.domain_for(address),
            resolver: AuthorizationResolver::default(),
            backing,
            shell: RwLock::new(None),
        })
    }

    pub fn id(&self) -> CoreId {
        self.core_id
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Wiring step: record the shell this core answers behind
    pub fn bind_shell(&self, address: Address) {
        *self.shell.write().expect("shell lock poisoned") = Some(address);
    }

    pub fn shell_address(&self) -> Result<Address, MeridianError> {
        self.shell
            .read()
            .expect("shell lock poisoned")
            .clone()
            .ok_or(MeridianError::NotWired)
    }

    // --- Reads ---

    pub fn resolve(&self, address: &Address) -> AccountId {
        self.backing.read(|s| s.registry.resolve(address))
    }

    pub fn account(&self, id: AccountId) -> Result<Account, MeridianError> {
        self.backing.read(|s| s.registry.account(id).cloned())
    }

    pub fn account_exists(&self, id: AccountId) -> bool {
        self.backing.read(|s| s.registry.contains(id))
    }

    pub fn is_frozen(&self, id: AccountId) -> Result<bool, MeridianError> {
        self.backing.read(|s| s.registry.is_frozen(id))
    }

    pub fn current_nonce(&self, signer: &Address) -> u64 {
        self.backing.read(|s| s.nonces.current(signer))
    }

    pub fn trusts_world(&self, id: AccountId) -> bool {
        self.backing.read(|s| s.trust_world.contains(&id))
    }

    pub fn trusts_contract(&self, id: AccountId, contract: &Address) -> bool {
        self.backing
            .read(|s| s.trust_contract.contains(&(id, contract.clone())))
    }

    pub fn is_safe_contract(&self, contract: &Address) -> bool {
        self.backing.read(|s| s.safe_contracts.contains(contract))
    }

    /// The resolver's capability order, for inspection
    pub fn priority(&self) -> Vec<Capability> {
        self.resolver.priority().to_vec()
    }

    pub fn authorize(
        &self,
        acting: &Address,
        account: AccountId,
        action: Action,
        calling_contract: Option<&Address>,
    ) -> Result<Capability, MeridianError> {
        self.backing.read(|s| {
            self.resolver.authorize(
                s,
                &AuthQuery {
                    acting,
                    account,
                    action,
                    calling_contract,
                },
            )
        })
    }

    pub fn events_for_account(&self, id: AccountId) -> Vec<Event> {
        self.backing
            .read(|s| s.events.for_account(id).into_iter().cloned().collect())
    }

    pub fn events_for_address(&self, address: &Address) -> Vec<Event> {
        self.backing
            .read(|s| s.events.for_address(address).into_iter().cloned().collect())
    }

    // --- Relay plumbing, also consumed by the asset ledgers ---

    /// Check a relay proof against the signer's current nonce and the host
    /// time. Never consumes the nonce.
    pub fn verify_relayed(
        &self,
        domain: &Domain,
        payload: &Payload,
        proof: &RelayProof,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        let expected = self.current_nonce(&proof.signer);
        signature::verify(domain, payload, proof, expected, now)
    }

    /// Consume a verified nonce. Ledgers call this once every other check of
    /// theirs has passed.
    pub fn consume_nonce(&self, signer: &Address, expected: u64) -> Result<(), MeridianError> {
        self.backing
            .write(self.core_id, |s| s.nonces.consume(signer, expected))
    }

    // --- Writes ---

    /// Create an account for an unused address. Permissionless: ledgers and
    /// users both mint ids this way. `trust_admin` seeds the trust-world flag.
    pub fn create_account(
        &self,
        address: &Address,
        trust_admin: bool,
    ) -> Result<AccountId, MeridianError> {
        self.backing.write(self.core_id, |state| {
            let id = state.registry.create(address)?;
            if trust_admin {
                state.trust_world.insert(id);
            }
            state.events.record(Event::AccountCreated {
                id,
                address: address.clone(),
                trust_admin,
            });
            Ok(id)
        })
    }

    /// Idempotent id lookup, creating an account with default flags if absent
    pub fn get_or_create_account_id(&self, address: &Address) -> Result<AccountId, MeridianError> {
        let existing = self.resolve(address);
        if existing != ACCOUNT_NONE {
            return Ok(existing);
        }
        self.backing.write(self.core_id, |state| {
            let (id, created) = state.registry.get_or_create(address)?;
            if created {
                state.events.record(Event::AccountCreated {
                    id,
                    address: address.clone(),
                    trust_admin: false,
                });
            }
            Ok(id)
        })
    }

    /// Self-service freeze, through the resolver like any other action
    pub fn freeze(&self, caller: &Caller, id: AccountId, now: Timestamp) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::freeze(id);
            self.gate(state, caller, &payload, id, Action::Freeze, now)?;
            state.registry.set_frozen(id, true)?;
            state.events.record(Event::AccountFrozen { id });
            Ok(())
        })
    }

    /// Admin-only unfreeze, optionally rebinding the primary address so a
    /// holder who lost their key can recover the account
    pub fn unfreeze(
        &self,
        sender: &Address,
        id: AccountId,
        new_address: Option<&Address>,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            if !state.registry.contains(id) {
                return Err(MeridianError::UnknownAccount);
            }
            if let Some(new) = new_address {
                state.registry.rebind_primary(id, new)?;
            }
            state.registry.set_frozen(id, false)?;
            state.events.record(Event::AccountUnfrozen {
                id,
                new_address: new_address.cloned(),
            });
            Ok(())
        })
    }

    /// Bind an additional resolvable address. The caller must be authorized
    /// for the account AND the new address must consent with its own
    /// signature, checked against its own nonce.
    pub fn add_auth_address(
        &self,
        caller: &Caller,
        id: AccountId,
        new_address: &Address,
        consent: &RelayProof,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::add_auth_address(id, new_address);
            self.gate(state, caller, &payload, id, Action::ManageAccount, now)?;
            self.consume_consent(state, &payload, new_address, consent, now)?;
            state.registry.bind_auth(id, new_address)?;
            state.events.record(Event::AuthAddressAdded {
                id,
                address: new_address.clone(),
                relayed: caller.is_relayed(),
                sender: caller.submitter().clone(),
                nonce: caller.proof().map(|p| p.nonce),
            });
            Ok(())
        })
    }

    /// Unbind a resolvable address; authorization for the account suffices
    pub fn remove_auth_address(
        &self,
        caller: &Caller,
        id: AccountId,
        address: &Address,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::remove_auth_address(id, address);
            self.gate(state, caller, &payload, id, Action::ManageAccount, now)?;
            state.registry.unbind_auth(id, address)?;
            state.events.record(Event::AuthAddressRemoved {
                id,
                address: address.clone(),
                relayed: caller.is_relayed(),
                sender: caller.submitter().clone(),
                nonce: caller.proof().map(|p| p.nonce),
            });
            Ok(())
        })
    }

    /// Register a relay-only proxy actor; consent works like auth addresses
    pub fn add_proxy_address(
        &self,
        caller: &Caller,
        id: AccountId,
        new_address: &Address,
        consent: &RelayProof,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::add_proxy_address(id, new_address);
            self.gate(state, caller, &payload, id, Action::ManageAccount, now)?;
            self.consume_consent(state, &payload, new_address, consent, now)?;
            state.registry.bind_proxy(id, new_address)?;
            state.events.record(Event::ProxyAddressAdded {
                id,
                address: new_address.clone(),
                relayed: caller.is_relayed(),
                sender: caller.submitter().clone(),
                nonce: caller.proof().map(|p| p.nonce),
            });
            Ok(())
        })
    }

    pub fn remove_proxy_address(
        &self,
        caller: &Caller,
        id: AccountId,
        address: &Address,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::remove_proxy_address(id, address);
            self.gate(state, caller, &payload, id, Action::ManageAccount, now)?;
            state.registry.unbind_proxy(id, address)?;
            state.events.record(Event::ProxyAddressRemoved {
                id,
                address: address.clone(),
                relayed: caller.is_relayed(),
                sender: caller.submitter().clone(),
                nonce: caller.proof().map(|p| p.nonce),
            });
            Ok(())
        })
    }

    /// Blanket delegation to the platform relayer. Idempotent flag.
    pub fn set_trust_world(
        &self,
        caller: &Caller,
        id: AccountId,
        flag: bool,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::set_trust_world(id, flag);
            self.gate(state, caller, &payload, id, Action::Trust, now)?;
            if flag {
                state.trust_world.insert(id);
            } else {
                state.trust_world.remove(&id);
            }
            state.events.record(Event::TrustWorldChanged {
                id,
                flag,
                relayed: caller.is_relayed(),
                sender: caller.submitter().clone(),
                nonce: caller.proof().map(|p| p.nonce),
            });
            Ok(())
        })
    }

    /// Delegation scoped to one contract; effective only while the contract
    /// is also on the platform's safe list
    pub fn set_trust_contract(
        &self,
        caller: &Caller,
        id: AccountId,
        contract: &Address,
        flag: bool,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            let payload = payloads::set_trust_contract(id, contract, flag);
            self.gate(state, caller, &payload, id, Action::Trust, now)?;
            if flag {
                state.trust_contract.insert((id, contract.clone()));
            } else {
                state.trust_contract.remove(&(id, contract.clone()));
            }
            state.events.record(Event::TrustContractChanged {
                id,
                contract: contract.clone(),
                flag,
                relayed: caller.is_relayed(),
                sender: caller.submitter().clone(),
                nonce: caller.proof().map(|p| p.nonce),
            });
            Ok(())
        })
    }

    pub fn add_safe_contract(
        &self,
        sender: &Address,
        contract: &Address,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            if state.safe_contracts.insert(contract.clone()) {
                state.events.record(Event::SafeContractAdded {
                    contract: contract.clone(),
                });
            }
            Ok(())
        })
    }

    pub fn remove_safe_contract(
        &self,
        sender: &Address,
        contract: &Address,
    ) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            if state.safe_contracts.remove(contract) {
                state.events.record(Event::SafeContractRemoved {
                    contract: contract.clone(),
                });
            }
            Ok(())
        })
    }

    // --- Internals ---

    fn require_admin(state: &AccountState, sender: &Address) -> Result<(), MeridianError> {
        if state.admins.contains(sender) {
            Ok(())
        } else {
            Err(MeridianError::NotAuthorized)
        }
    }

    /// Shared gate for direct and relayed calls: verify the proof when
    /// relayed, resolve authorization, then consume the caller's nonce.
    /// Runs inside a backing write, so failures after this roll it back too.
    fn gate(
        &self,
        state: &mut AccountState,
        caller: &Caller,
        payload: &Payload,
        account: AccountId,
        action: Action,
        now: Timestamp,
    ) -> Result<Capability, MeridianError> {
        if let Caller::Relayed { proof, .. } = caller {
            let expected = state.nonces.current(&proof.signer);
            signature::verify(&self.domain, payload, proof, expected, now)?;
        }
        let capability = self.resolver.authorize(
            state,
            &AuthQuery {
                acting: caller.actor(),
                account,
                action,
                calling_contract: None,
            },
        )?;
        if let Caller::Relayed { proof, .. } = caller {
            state.nonces.consume(&proof.signer, proof.nonce)?;
        }
        Ok(capability)
    }

    /// Proof of consent from a newly bound address: signed by that address
    /// itself, against its own nonce
    fn consume_consent(
        &self,
        state: &mut AccountState,
        payload: &Payload,
        expected_signer: &Address,
        consent: &RelayProof,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        if consent.signer != *expected_signer {
            return Err(MeridianError::SignatureMismatch);
        }
        let expected = state.nonces.current(&consent.signer);
        signature::verify(&self.domain, payload, consent, expected, now)?;
        state.nonces.consume(&consent.signer, consent.nonce)
    }
}
