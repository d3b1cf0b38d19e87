//! Fungible asset ledger.
//!
//! Balance bookkeeping is deliberately dumb; everything interesting happens
//! in the pre-mutation gate: party resolution, relay verification against
//! this ledger's own domain, and authorization through the identity core.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::{resolve_dest, resolve_source, AccountRef, IdentityHub};
use crate::account::types::{AccountId, Action, Address, Caller, Timestamp, ACCOUNT_NONE};
use crate::config::PlatformInfo;
use crate::crypto;
use crate::error::MeridianError;
use crate::events::{Event, EventLog};
use crate::signature::{payloads, Domain};
use crate::wiring::{next_core_id, Backing, CoreId};

/// Durable state of one fungible ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FungibleState {
    pub symbol: String,
    balances: HashMap<AccountId, u64>,
    /// (owner, spender) -> remaining grant
    allowances: HashMap<(AccountId, AccountId), u64>,
    /// (owner, operator) blanket flags
    operators: HashSet<(AccountId, AccountId)>,
    total_supply: u64,
    minters: HashSet<Address>,
    events: EventLog,
}

impl FungibleState {
    pub fn new(symbol: &str, minters: HashSet<Address>) -> Self {
        Self {
            symbol: symbol.to_string(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
            operators: HashSet::new(),
            total_supply: 0,
            minters,
            events: EventLog::new(),
        }
    }
}

/// How a non-owner actor is allowed to touch an owner's balance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Spend {
    Owner,
    Operator,
    Allowance(AccountId),
}

pub struct FungibleCore {
    core_id: CoreId,
    domain: Domain,
    hub: Arc<dyn IdentityHub>,
    backing: Arc<Backing<FungibleState>>,
    shell: RwLock<Option<Address>>,
}

impl FungibleCore {
    pub fn new(
        info: &PlatformInfo,
        backing: Arc<Backing<FungibleState>>,
        hub: Arc<dyn IdentityHub>,
    ) -> Arc<Self> {
        let core_id = next_core_id();
        let address = crypto::contract_address(&format!("fungible-core/{}", core_id));
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

    pub fn balance_of(&self, id: AccountId) -> u64 {
        self.backing.read(|s| s.balances.get(&id).copied().unwrap_or(0))
    }

    pub fn total_supply(&self) -> u64 {
        self.backing.read(|s| s.total_supply)
    }

    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> u64 {
        self.backing
            .read(|s| s.allowances.get(&(owner, spender)).copied().unwrap_or(0))
    }

    pub fn is_operator(&self, owner: AccountId, operator: AccountId) -> bool {
        self.backing.read(|s| s.operators.contains(&(owner, operator)))
    }

    pub fn events_for_account(&self, id: AccountId) -> Vec<Event> {
        self.backing
            .read(|s| s.events.for_account(id).into_iter().cloned().collect())
    }

    // --- Writes ---

    /// Issue new units to an account. Admin-gated; the burn sentinel is not
    /// a valid mint target.
    pub fn mint(
        &self,
        sender: &Address,
        to: &AccountRef,
        amount: u64,
    ) -> Result<AccountId, MeridianError> {
        let to_id = resolve_dest(self.hub.as_ref(), to)?;
        if to_id == ACCOUNT_NONE {
            return Err(MeridianError::UnknownAccount);
        }
        self.backing.write(self.core_id, |state| {
            if !state.minters.contains(sender) {
                return Err(MeridianError::NotAuthorized);
            }
            state.total_supply = state
                .total_supply
                .checked_add(amount)
                .ok_or(MeridianError::Overflow)?;
            let credit = state.balances.entry(to_id).or_insert(0);
            *credit = credit.checked_add(amount).ok_or(MeridianError::Overflow)?;
            state.events.record(Event::Minted { to: to_id, amount });
            Ok(to_id)
        })
    }

    /// Move units between accounts. A destination id of 0 burns them:
    /// the source is debited, total supply shrinks, no destination entry is
    /// created. Frozen sources are refused no matter who is acting; frozen
    /// destinations still receive.
    pub fn transfer(
        &self,
        caller: &Caller,
        from: &AccountRef,
        to: &AccountRef,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        let from_id = resolve_source(self.hub.as_ref(), from)?;
        let to_id = resolve_dest(self.hub.as_ref(), to)?;
        let payload = payloads::transfer(from_id, &to.canonical(), amount);
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.verify_relayed(&self.domain, &payload, proof, now)?;
        }
        let spend = self.spending_rights(caller.actor(), from_id, Action::Transfer, amount)?;
        if self.balance_of(from_id) < amount {
            return Err(MeridianError::InsufficientBalance);
        }
        // all checks passed; the nonce is consumed last so a refused call
        // never burns it
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.consume_nonce(&proof.signer, proof.nonce)?;
        }
        let relayed = caller.is_relayed();
        self.backing.write(self.core_id, |state| {
            let balance = state.balances.get(&from_id).copied().unwrap_or(0);
            if balance < amount {
                return Err(MeridianError::InsufficientBalance);
            }
            if let Spend::Allowance(spender) = spend {
                let key = (from_id, spender);
                let granted = state.allowances.get(&key).copied().unwrap_or(0);
                if granted < amount {
                    return Err(MeridianError::InsufficientAllowance);
                }
                if granted == amount {
                    state.allowances.remove(&key);
                } else {
                    state.allowances.insert(key, granted - amount);
                }
            }
            if balance == amount {
                state.balances.remove(&from_id);
            } else {
                state.balances.insert(from_id, balance - amount);
            }
            if to_id == ACCOUNT_NONE {
                state.total_supply -= amount;
            } else {
                let credit = state.balances.entry(to_id).or_insert(0);
                *credit = credit.checked_add(amount).ok_or(MeridianError::Overflow)?;
            }
            state.events.record(Event::Transfer {
                from: from_id,
                to: to_id,
                amount,
                relayed,
            });
            Ok(())
        })
    }

    /// Grant a spender a withdrawal limit. Owner (or operator) only.
    pub fn approve(
        &self,
        caller: &Caller,
        owner: &AccountRef,
        spender: AccountId,
        amount: u64,
        now: Timestamp,
    ) -> Result<(), MeridianError> {
        let owner_id = resolve_source(self.hub.as_ref(), owner)?;
        let payload = payloads::approve(owner_id, spender, amount);
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.verify_relayed(&self.domain, &payload, proof, now)?;
        }
        self.spending_rights(caller.actor(), owner_id, Action::Approve, 0)?;
        if let Caller::Relayed { proof, .. } = caller {
            self.hub.consume_nonce(&proof.signer, proof.nonce)?;
        }
        self.backing.write(self.core_id, |state| {
            let key = (owner_id, spender);
            if amount == 0 {
                state.allowances.remove(&key);
            } else {
                state.allowances.insert(key, amount);
            }
            state.events.record(Event::Approval {
                owner: owner_id,
                spender,
                amount,
            });
            Ok(())
        })
    }

    /// Toggle a blanket operator for the owner. Owner capability only; an
    /// operator cannot appoint further operators.
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
        let spend = self.spending_rights(caller.actor(), owner_id, Action::Approve, 0)?;
        if spend != Spend::Owner {
            return Err(MeridianError::NotAuthorized);
        }
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

    /// Owner-capability check through the resolver, falling back to the
    /// ledger's own spender relations. Never raw address equality.
    fn spending_rights(
        &self,
        actor: &Address,
        owner: AccountId,
        action: Action,
        amount: u64,
    ) -> Result<Spend, MeridianError> {
        let shell = self.shell_address()?;
        match self.hub.authorize(actor, owner, action, Some(&shell)) {
            Ok(_) => Ok(Spend::Owner),
            Err(MeridianError::NotAuthorized) => {
                let spender = self.hub.resolve(actor)?;
                if spender == ACCOUNT_NONE {
                    return Err(MeridianError::NotAuthorized);
                }
                if self.is_operator(owner, spender) {
                    return Ok(Spend::Operator);
                }
                if action == Action::Transfer {
                    let granted = self.allowance(owner, spender);
                    if granted >= amount {
                        return Ok(Spend::Allowance(spender));
                    }
                    if granted > 0 {
                        return Err(MeridianError::InsufficientAllowance);
                    }
                }
                Err(MeridianError::NotAuthorized)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeridianConfig;
    use crate::crypto::KeyPair;
    use crate::init::{bootstrap, Platform};
    use crate::signature;

    const NOW: Timestamp = 1_700_000_000_000;
    const DEADLINE: Timestamp = NOW + 60_000;

    fn key(n: u8) -> KeyPair {
        KeyPair::from_seed([n; 32])
    }

    fn admin() -> KeyPair {
        key(99)
    }

    fn relayer() -> KeyPair {
        key(98)
    }

    fn deploy() -> Platform {
        let mut config = MeridianConfig::default();
        config.platform.admins = vec![admin().address().to_string()];
        config.platform.relayer = Some(relayer().address().to_string());
        bootstrap(&config, None).unwrap()
    }

    #[test]
    fn mint_is_admin_gated_and_tracks_supply() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let alice = key(1).address();

        assert_eq!(
            ledger.mint(&key(1).address(), &AccountRef::Addr(alice.clone()), 100),
            Err(MeridianError::NotAuthorized)
        );
        let id = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice), 100)
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(ledger.balance_of(id), 100);
        assert_eq!(ledger.total_supply(), 100);
    }

    #[test]
    fn direct_transfer_between_accounts() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let alice = key(1);
        let bob = key(2);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 1000)
            .unwrap();

        ledger
            .transfer(
                &Caller::Direct(alice.address()),
                &AccountRef::Id(a),
                &AccountRef::Addr(bob.address()),
                400,
                NOW,
            )
            .unwrap();
        let b = platform.accounts.shell.core().unwrap().resolve(&bob.address());
        assert_ne!(b, ACCOUNT_NONE);
        assert_eq!(ledger.balance_of(a), 600);
        assert_eq!(ledger.balance_of(b), 400);
        assert_eq!(ledger.total_supply(), 1000);
    }

    #[test]
    fn strangers_cannot_move_other_balances() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let alice = key(1);
        let mallory = key(3);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 100)
            .unwrap();
        // mallory has an account of her own, just no rights over alice's
        platform
            .accounts
            .shell
            .core()
            .unwrap()
            .create_account(&mallory.address(), false)
            .unwrap();
        assert_eq!(
            ledger.transfer(
                &Caller::Direct(mallory.address()),
                &AccountRef::Id(a),
                &AccountRef::Addr(mallory.address()),
                1,
                NOW,
            ),
            Err(MeridianError::NotAuthorized)
        );
    }

    #[test]
    fn burn_to_id_zero_reduces_supply() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let alice = key(1);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 1000)
            .unwrap();

        ledger
            .transfer(
                &Caller::Direct(alice.address()),
                &AccountRef::Id(a),
                &AccountRef::Id(ACCOUNT_NONE),
                300,
                NOW,
            )
            .unwrap();
        assert_eq!(ledger.balance_of(a), 700);
        assert_eq!(ledger.balance_of(ACCOUNT_NONE), 0);
        // pre-transfer supply == post-transfer supply + burned amount
        assert_eq!(ledger.total_supply(), 700);
    }

    #[test]
    fn insufficient_balance_is_refused() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let alice = key(1);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 10)
            .unwrap();
        assert_eq!(
            ledger.transfer(
                &Caller::Direct(alice.address()),
                &AccountRef::Id(a),
                &AccountRef::Id(ACCOUNT_NONE),
                11,
                NOW,
            ),
            Err(MeridianError::InsufficientBalance)
        );
        assert_eq!(ledger.balance_of(a), 10);
    }

    #[test]
    fn allowance_spending_decrements_the_grant() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        let alice = key(1);
        let spender = key(2);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 1000)
            .unwrap();
        let s = accounts.create_account(&spender.address(), false).unwrap();

        ledger
            .approve(&Caller::Direct(alice.address()), &AccountRef::Id(a), s, 500, NOW)
            .unwrap();
        assert_eq!(ledger.allowance(a, s), 500);

        ledger
            .transfer(
                &Caller::Direct(spender.address()),
                &AccountRef::Id(a),
                &AccountRef::Id(s),
                200,
                NOW,
            )
            .unwrap();
        assert_eq!(ledger.allowance(a, s), 300);
        assert_eq!(ledger.balance_of(s), 200);

        // overdrawing the remaining grant
        assert_eq!(
            ledger.transfer(
                &Caller::Direct(spender.address()),
                &AccountRef::Id(a),
                &AccountRef::Id(s),
                301,
                NOW,
            ),
            Err(MeridianError::InsufficientAllowance)
        );
    }

    #[test]
    fn operators_spend_without_a_grant() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        let alice = key(1);
        let operator = key(2);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 100)
            .unwrap();
        let o = accounts.create_account(&operator.address(), false).unwrap();

        ledger
            .set_operator(&Caller::Direct(alice.address()), &AccountRef::Id(a), o, true, NOW)
            .unwrap();
        ledger
            .transfer(
                &Caller::Direct(operator.address()),
                &AccountRef::Id(a),
                &AccountRef::Id(o),
                60,
                NOW,
            )
            .unwrap();
        assert_eq!(ledger.balance_of(o), 60);

        // an operator cannot appoint further operators
        assert_eq!(
            ledger.set_operator(
                &Caller::Direct(operator.address()),
                &AccountRef::Id(a),
                o,
                true,
                NOW
            ),
            Err(MeridianError::NotAuthorized)
        );
    }

    #[test]
    fn frozen_sources_cannot_send_but_still_receive() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        let alice = key(1);
        let bob = key(2);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 100)
            .unwrap();
        let b = ledger
            .mint(&admin().address(), &AccountRef::Addr(bob.address()), 100)
            .unwrap();

        accounts.freeze(&Caller::Direct(alice.address()), a, NOW).unwrap();
        assert_eq!(
            ledger.transfer(
                &Caller::Direct(alice.address()),
                &AccountRef::Id(a),
                &AccountRef::Id(b),
                10,
                NOW,
            ),
            Err(MeridianError::AccountFrozen)
        );
        assert_eq!(
            ledger.approve(&Caller::Direct(alice.address()), &AccountRef::Id(a), b, 10, NOW),
            Err(MeridianError::AccountFrozen)
        );

        // inbound still works
        ledger
            .transfer(
                &Caller::Direct(bob.address()),
                &AccountRef::Id(b),
                &AccountRef::Id(a),
                25,
                NOW,
            )
            .unwrap();
        assert_eq!(ledger.balance_of(a), 125);
    }

    #[test]
    fn trust_world_gates_relayed_transfers() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        let alice = key(1);
        let bob = key(2);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 100)
            .unwrap();
        accounts.create_account(&bob.address(), false).unwrap();

        // the relayer signs the transfer itself, acting for alice's account
        let to = AccountRef::Addr(bob.address());
        let payload = payloads::transfer(a, &to.canonical(), 40);
        let proof = signature::sign(ledger.domain(), &payload, 0, DEADLINE, &relayer());
        let caller = Caller::Relayed {
            submitter: relayer().address(),
            proof,
        };

        // without trust-world: denied, and the relayer's nonce survives
        assert_eq!(
            ledger.transfer(&caller, &AccountRef::Id(a), &to, 40, NOW),
            Err(MeridianError::NotAuthorized)
        );
        assert_eq!(accounts.current_nonce(&relayer().address()), 0);

        // alice flips the flag herself; the identical call now lands
        accounts
            .set_trust_world(&Caller::Direct(alice.address()), a, true, NOW)
            .unwrap();
        ledger.transfer(&caller, &AccountRef::Id(a), &to, 40, NOW).unwrap();
        assert_eq!(ledger.balance_of(a), 60);

        // and replaying it reverts on the nonce
        assert_eq!(
            ledger.transfer(&caller, &AccountRef::Id(a), &to, 40, NOW),
            Err(MeridianError::NonceMismatch { expected: 1, got: 0 })
        );

        // the same payload re-signed at the next nonce goes through
        let proof = signature::sign(ledger.domain(), &payload, 1, DEADLINE, &relayer());
        ledger
            .transfer(
                &Caller::Relayed {
                    submitter: relayer().address(),
                    proof,
                },
                &AccountRef::Id(a),
                &to,
                40,
                NOW,
            )
            .unwrap();
        assert_eq!(ledger.balance_of(a), 20);
    }

    #[test]
    fn relayed_transfer_signed_by_the_owner() {
        let platform = deploy();
        let ledger = platform.fungible.shell.core().unwrap();
        let alice = key(1);
        let bob = key(2);
        let a = ledger
            .mint(&admin().address(), &AccountRef::Addr(alice.address()), 100)
            .unwrap();

        let to = AccountRef::Addr(bob.address());
        let payload = payloads::transfer(a, &to.canonical(), 30);
        let proof = signature::sign(ledger.domain(), &payload, 0, DEADLINE, &alice);
        ledger
            .transfer(
                &Caller::Relayed {
                    submitter: relayer().address(),
                    proof,
                },
                &AccountRef::Id(a),
                &to,
                30,
                NOW,
            )
            .unwrap();
        assert_eq!(ledger.balance_of(a), 70);
    }
}
