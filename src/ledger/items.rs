//! Item (non-fungible) ledger.
//!
//! Same pre-mutation gate as the fungible ledger, with per-token approvals
//! on top of the blanket operator flag. Burning (destination id 0) clears
//! ownership but tombstones the record, so external token references keep
//! dereferencing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::{resolve_dest, resolve_source, AccountRef, IdentityHub};
use crate::account::types::{AccountId, Action, Address, Caller, Timestamp, ACCOUNT_NONE};
use crate::config::PlatformInfo;
use crate::crypto;
use crate::error::MeridianError;
use crate::events::{Event, EventLog};
use crate::signature::{payloads, Domain};
use crate::wiring::{next_core_id, Backing, CoreId};

pub type TokenId = u64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub uri: String,
    /// 0 once burned
    pub owner: AccountId,
    /// Single approved spender, cleared on every transfer
    pub approved: Option<AccountId>,
    pub burned: bool,
}

/// Durable state of one item ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemState {
    pub symbol: String,
    next_token: TokenId,
    tokens: HashMap<TokenId, Token>,
    holdings: HashMap<AccountId, BTreeSet<TokenId>>,
    operators: HashSet<(AccountId, AccountId)>,
    minters: HashSet<Address>,
    events: EventLog,
}

impl ItemState {
    pub fn new(symbol: &str, minters: HashSet<Address>) -> Self {
        Self {
            symbol: symbol.to_string(),
            next_token: 1,
            tokens: HashMap::new(),
            holdings: HashMap::new(),
            operators: HashSet::new(),
            minters,
            events: EventLog::new(),
        }
    }
}

/// How a non-owner actor may move a token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Custody {
    Owner,
    Approved,
    Operator,
}

pub struct ItemCore {
    core_id: CoreId,
    domain: Domain,
    hub: Arc<dyn IdentityHub>,
    backing: Arc<Backing<ItemState>>,
    shell: RwLock<Option<Address>>,
}

impl ItemCore {
    pub fn new(
        info: &PlatformInfo,
        backing: Arc<Backing<ItemState>>,
        hub: Arc<dyn IdentityHub>,
    ) -> Arc<Self> {
        let core_id = next_core_id();
        let address = crypto::contract_address(&format!("item-core/{}", core_id));
        Arc::new(Self {
            core_id,
            domain: info.domain_for(address),
            hub,
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

    pub fn symbol(&self) -> String {
        self.backing.read(|s| s.symbol.clone())
    }

    /// Owner of a live token; burned and unknown tokens have none
    pub fn owner_of(&self, token: TokenId) -> Result<AccountId, MeridianError> {
        self.backing.read(|s| match s.tokens.get(&token) {
            Some(t) if !t.burned => Ok(t.owner),
            _ => Err(MeridianError::UnknownToken),
        })
    }

    /// Full record, tombstones included
    pub fn token(&self, token: TokenId) -> Result<Token, MeridianError> {
        self.backing
            .read(|s| s.tokens.get(&token).cloned().ok_or(MeridianError::UnknownToken))
    }

    pub fn approved(&self, token: TokenId) -> Result<Option<AccountId>, MeridianError> {
        self.backing.read(|s| match s.tokens.get(&token) {
            Some(t) if !t.burned => Ok(t.approved),
            _ => Err(MeridianError::UnknownToken),
        })
    }

    pub fn balance_of(&self, id: AccountId) -> usize {
        self.backing
            .read(|s| s.holdings.get(&id).map(|h| h.len()).unwrap_or(0))
    }

    pub fn total_supply(&self) -> u64 {
        self.backing
            .read(|s| s.tokens.values().filter(|t| !t.burned).count() as u64)
    }

    pub fn is_operator(&self, owner: AccountId, operator: AccountId) -> bool {
        self.backing.read(|s| s.operators.contains(&(owner, operator)))
    }

    pub fn events_for_account(&self, id: AccountId) -> Vec<Event> {
        self.backing
            .read(|s| s.events.for_account(id).into_iter().cloned().collect())
    }

    // --- Writes ---

    /// Mint a fresh token. Admin-gated; the burn sentinel is not a valid
    /// mint target.
    pub fn mint(
        &self,
        sender: &Address,
        to: &AccountRef,
        uri: &str,
    ) -> Result<TokenId, MeridianError> {
        let to_id = resolve_dest(self.hub.as_ref(), to)?;
        if to_id == ACCOUNT_NONE {
            return Err(MeridianError::UnknownAccount);
        }
        let uri = uri.to_string();
        self.backing.write(self.core_id, |state| {
            if !state.minters.contains(sender) {
                return Err(MeridianError::NotAuthorized);
            }
            let token = state.next_token;
            state.next_token += 1;
            state.tokens.insert(
                token,
                Token {
                    id: token,
                    uri: uri.clone(),
                    owner: to_id,
                    approved: None,
                    burned: false,
                },
            );
            state.holdings.entry(to_id).or_default().insert(token);
            state.events.record(Event::ItemMinted { token, to: to_id });
            Ok(token)
        })
    }

    /// Move a token. Destination id 0 burns it: ownership is cleared and the
    /// record tombstoned, never deleted. Frozen owners are refused no matter
    /// who is acting; frozen destinations still receive.
    pub fn transfer(
        &self,
        caller: &Caller,
        token: TokenId,
        to: &AccountRef,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        let owner = self.owner_of(token)?;
        let to_id = resolve_dest(self.hub.as_ref(), to)?;
        let payload = payloads::transfer_item(token, &to.canonical());
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.verify_relayed(&self.domain, &payload, proof, now)?;
        }
        self.custody_rights(caller.actor(), owner, token, Action::Transfer)?;
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.consume_nonce(&proof.signer, proof.nonce)?;
        }
        let relayed = caller.is_relayed();
        self.backing.write(self.core_id, |state| {
            let record = match state.tokens.get_mut(&token) {
                Some(t) if !t.burned && t.owner == owner => t,
                _ => return Err(MeridianError::UnknownToken),
            };
            record.approved = None;
            if to_id == ACCOUNT_NONE {
                record.owner = ACCOUNT_NONE;
                record.burned = true;
            } else {
                record.owner = to_id;
            }
            if let Some(held) = state.holdings.get_mut(&owner) {
                held.remove(&token);
            }
            if to_id != ACCOUNT_NONE {
                state.holdings.entry(to_id).or_default().insert(token);
            }
            state.events.record(Event::ItemTransfer {
                token,
                from: owner,
                to: to_id,
                relayed,
            });
            Ok(())
        })
    }

    /// Name a single approved spender for the token; spender 0 clears it
    pub fn approve(
        &self,
        caller: &Caller,
        token: TokenId,
        spender: AccountId,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        let owner = self.owner_of(token)?;
        let payload = payloads::approve_item(token, spender);
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.verify_relayed(&self.domain, &payload, proof, now)?;
        }
        let custody = self.custody_rights(caller.actor(), owner, token, Action::Approve)?;
        if custody == Custody::Approved {
            // an approved spender moves the token, it does not re-delegate
            return Err(MeridianError::NotAuthorized);
        }
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.consume_nonce(&proof.signer, proof.nonce)?;
        }
        self.backing.write(self.core_id, |state| {
            let record = match state.tokens.get_mut(&token) {
                Some(t) if !t.burned => t,
                _ => return Err(MeridianError::UnknownToken),
            };
            record.approved = if spender == ACCOUNT_NONE {
                None
            } else {
                Some(spender)
            };
            state.events.record(Event::ItemApproval {
                token,
                owner,
                spender,
            });
            Ok(())
        })
    }

    /// Toggle a blanket operator for the owner. Owner capability only.
    pub fn set_operator(
        &self,
        caller: &Caller,
        owner: &AccountRef,
        operator: AccountId,
        flag: bool,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        let owner_id = resolve_source(self.hub.as_ref(), owner)?;
        let payload = payloads::set_operator(owner_id, operator, flag);
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.verify_relayed(&self.domain, &payload, proof, now)?;
        }
        let shell = self.shell_address()?;
        self.hub
            .authorize(caller.actor(), owner_id, Action::Approve, Some(&shell))?;
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.consume_nonce(&proof.signer, proof.nonce)?;
        }
        self.backing.write(self.core_id, |state| {
            if flag {
                state.operators.insert((owner_id, operator));
            } else {
                state.operators.remove(&(owner_id, operator));
            }
            state.events.record(Event::OperatorSet {
                owner: owner_id,
                operator,
                flag,
            });
            Ok(())
        })
    }

    /// Owner capability through the resolver, then this ledger's own token
    /// approval and operator relations
    fn custody_rights(
        &self,
        actor: &Address,
        owner: AccountId,
        token: TokenId,
        action: Action,
    ) -> Result<Custody, MeridianError> {
        let shell = self.shell_address()?;
        match self.hub.authorize(actor, owner, action, Some(&shell)) {
            Ok(_) => Ok(Custody::Owner),
            Err(MeridianError::NotAuthorized) => {
                let spender = self.hub.resolve(actor)?;
                if spender == ACCOUNT_NONE {
                    return Err(MeridianError::NotAuthorized);
                }
                if self.approved(token)? == Some(spender) {
                    return Ok(Custody::Approved);
                }
                if self.is_operator(owner, spender) {
                    return Ok(Custody::Operator);
                }
                Err(MeridianError::NotAuthorized)
            }
            Err(e) => Err(e),
        }
    }
}
