//! Account storage: id assignment and address binding.
//!
//! Pure state-machine layer. Signature checks and authorization live in the
//! account core; every invariant about ids and address uniqueness is enforced
//! here at insertion time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{Account, AccountId, Address, ACCOUNT_NONE};
use crate::error::MeridianError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRegistry {
    next_id: AccountId,
    accounts: HashMap<AccountId, Account>,
    /// primary + auth addresses; at most one account per address
    by_address: HashMap<Address, AccountId>,
    /// relay-only proxy addresses, tracked separately so they never resolve
    proxies: HashMap<Address, AccountId>,
}

impl AccountRegistry {
    /// Registry assigning ids sequentially from `id_offset + 1`
    pub fn new(id_offset: u64) -> Self {
        Self {
            next_id: id_offset + 1,
            accounts: HashMap::new(),
            by_address: HashMap::new(),
            proxies: HashMap::new(),
        }
    }

    fn address_in_use(&self, address: &Address) -> bool {
        self.by_address.contains_key(address) || self.proxies.contains_key(address)
    }

    /// Create an account bound to an unused address
    pub fn create(&mut self, address: &Address) -> Result<AccountId, MeridianError> {
        if self.address_in_use(address) {
            return Err(MeridianError::AddressInUse);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.accounts.insert(id, Account::new(id, address.clone()));
        self.by_address.insert(address.clone(), id);
        Ok(id)
    }

    /// Idempotent create; the bool reports whether a new account was made
    pub fn get_or_create(&mut self, address: &Address) -> Result<(AccountId, bool), MeridianError> {
        match self.by_address.get(address) {
            Some(id) => Ok((*id, false)),
            None => Ok((self.create(address)?, true)),
        }
    }

    /// Pure lookup: the account an address resolves to, 0 if unknown.
    /// Proxy addresses deliberately do not resolve.
    pub fn resolve(&self, address: &Address) -> AccountId {
        self.by_address.get(address).copied().unwrap_or(ACCOUNT_NONE)
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.accounts.contains_key(&id)
    }

    pub fn account(&self, id: AccountId) -> Result<&Account, MeridianError> {
        self.accounts.get(&id).ok_or(MeridianError::UnknownAccount)
    }

    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account, MeridianError> {
        self.accounts.get_mut(&id).ok_or(MeridianError::UnknownAccount)
    }

    pub fn is_frozen(&self, id: AccountId) -> Result<bool, MeridianError> {
        Ok(self.account(id)?.frozen)
    }

    pub fn set_frozen(&mut self, id: AccountId, frozen: bool) -> Result<(), MeridianError> {
        self.account_mut(id)?.frozen = frozen;
        Ok(())
    }

    /// Rebind the primary address, for unfreeze recovery. The old primary
    /// stops resolving; binding to an address of another account fails.
    pub fn rebind_primary(&mut self, id: AccountId, new: &Address) -> Result<(), MeridianError> {
        match self.by_address.get(new) {
            Some(owner) if *owner != id => return Err(MeridianError::AddressInUse),
            _ => {}
        }
        if self.proxies.contains_key(new) {
            return Err(MeridianError::AddressInUse);
        }
        let account = self.accounts.get_mut(&id).ok_or(MeridianError::UnknownAccount)?;
        if account.primary_address == *new {
            return Ok(());
        }
        let old = account.primary_address.clone();
        // promoting one of the account's own auth addresses is a plain swap
        account.auth_addresses.remove(new);
        account.primary_address = new.clone();
        self.by_address.remove(&old);
        self.by_address.insert(new.clone(), id);
        Ok(())
    }

    /// Bind an additional resolvable address to the account
    pub fn bind_auth(&mut self, id: AccountId, address: &Address) -> Result<(), MeridianError> {
        if self.address_in_use(address) {
            return Err(MeridianError::AddressInUse);
        }
        let account = self.account_mut(id)?;
        account.auth_addresses.insert(address.clone());
        self.by_address.insert(address.clone(), id);
        Ok(())
    }

    /// Unbind a resolvable address. The primary may be demoted when another
    /// auth address can take its place; an account never loses its last
    /// resolvable address.
    pub fn unbind_auth(&mut self, id: AccountId, address: &Address) -> Result<(), MeridianError> {
        let account = self.accounts.get_mut(&id).ok_or(MeridianError::UnknownAccount)?;
        if account.resolvable_count() == 1 {
            return Err(MeridianError::LastAddress);
        }
        if account.primary_address == *address {
            let promoted = match account.auth_addresses.iter().next() {
                Some(a) => a.clone(),
                None => return Err(MeridianError::LastAddress),
            };
            account.auth_addresses.remove(&promoted);
            account.primary_address = promoted;
        } else if !account.auth_addresses.remove(address) {
            return Err(MeridianError::InvalidAddress);
        }
        self.by_address.remove(address);
        Ok(())
    }

    /// Register a relay-only proxy actor for the account
    pub fn bind_proxy(&mut self, id: AccountId, address: &Address) -> Result<(), MeridianError> {
        if self.address_in_use(address) {
            return Err(MeridianError::AddressInUse);
        }
        let account = self.account_mut(id)?;
        account.proxy_addresses.insert(address.clone());
        self.proxies.insert(address.clone(), id);
        Ok(())
    }

    pub fn unbind_proxy(&mut self, id: AccountId, address: &Address) -> Result<(), MeridianError> {
        let account = self.accounts.get_mut(&id).ok_or(MeridianError::UnknownAccount)?;
        if !account.proxy_addresses.remove(address) {
            return Err(MeridianError::InvalidAddress);
        }
        self.proxies.remove(address);
        Ok(())
    }

    pub fn is_proxy_for(&self, address: &Address, id: AccountId) -> bool {
        self.proxies.get(address) == Some(&id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::contract_address;

    fn addr(n: u8) -> Address {
        Address::from_digest([n; 32])
    }

    #[test]
    fn unknown_addresses_resolve_to_zero() {
        let registry = AccountRegistry::new(0);
        assert_eq!(registry.resolve(&addr(1)), ACCOUNT_NONE);
    }

    #[test]
    fn ids_are_sequential_from_the_offset() {
        let mut registry = AccountRegistry::new(500);
        assert_eq!(registry.create(&addr(1)).unwrap(), 501);
        assert_eq!(registry.create(&addr(2)).unwrap(), 502);
        assert_eq!(registry.resolve(&addr(2)), 502);
    }

    #[test]
    fn zero_is_never_assigned() {
        let mut registry = AccountRegistry::new(0);
        assert_eq!(registry.create(&addr(1)).unwrap(), 1);
    }

    #[test]
    fn bound_addresses_cannot_be_reused() {
        let mut registry = AccountRegistry::new(0);
        registry.create(&addr(1)).unwrap();
        assert_eq!(registry.create(&addr(1)), Err(MeridianError::AddressInUse));
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut registry = AccountRegistry::new(0);
        let (id, created) = registry.get_or_create(&addr(1)).unwrap();
        let (again, created_again) = registry.get_or_create(&addr(1)).unwrap();
        assert_eq!(id, again);
        assert!(created);
        assert!(!created_again);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn auth_addresses_resolve_and_unbind() {
        let mut registry = AccountRegistry::new(0);
        let id = registry.create(&addr(1)).unwrap();
        registry.bind_auth(id, &addr(2)).unwrap();
        assert_eq!(registry.resolve(&addr(2)), id);
        registry.unbind_auth(id, &addr(2)).unwrap();
        assert_eq!(registry.resolve(&addr(2)), ACCOUNT_NONE);
    }

    #[test]
    fn demoting_the_primary_promotes_an_auth_address() {
        let mut registry = AccountRegistry::new(0);
        let id = registry.create(&addr(1)).unwrap();
        registry.bind_auth(id, &addr(2)).unwrap();
        registry.unbind_auth(id, &addr(1)).unwrap();
        assert_eq!(registry.resolve(&addr(1)), ACCOUNT_NONE);
        assert_eq!(registry.resolve(&addr(2)), id);
        assert_eq!(registry.account(id).unwrap().primary_address, addr(2));
    }

    #[test]
    fn the_last_resolvable_address_stays() {
        let mut registry = AccountRegistry::new(0);
        let id = registry.create(&addr(1)).unwrap();
        assert_eq!(registry.unbind_auth(id, &addr(1)), Err(MeridianError::LastAddress));
        assert_eq!(registry.resolve(&addr(1)), id);
    }

    #[test]
    fn proxies_never_resolve() {
        let mut registry = AccountRegistry::new(0);
        let id = registry.create(&addr(1)).unwrap();
        registry.bind_proxy(id, &addr(2)).unwrap();
        assert_eq!(registry.resolve(&addr(2)), ACCOUNT_NONE);
        assert!(registry.is_proxy_for(&addr(2), id));
        // a proxy address is still "in use"
        assert_eq!(registry.create(&addr(2)), Err(MeridianError::AddressInUse));
    }

    #[test]
    fn rebind_primary_for_recovery() {
        let mut registry = AccountRegistry::new(0);
        let id = registry.create(&addr(1)).unwrap();
        registry.rebind_primary(id, &addr(9)).unwrap();
        assert_eq!(registry.resolve(&addr(1)), ACCOUNT_NONE);
        assert_eq!(registry.resolve(&addr(9)), id);

        let other = registry.create(&contract_address("other")).unwrap();
        assert_eq!(
            registry.rebind_primary(other, &addr(9)),
            Err(MeridianError::AddressInUse)
        );
    }
}
