//! Multi-mechanism authorization resolution.
//!
//! "May `acting` perform `action` for account X" is decided by an ordered
//! chain of independent capability checks; the first one that grants wins and
//! is reported back to the caller. The priority list is a plain inspectable
//! value, not a nest of conditionals, so each mechanism can be tested and
//! reasoned about on its own.

use serde::{Deserialize, Serialize};

use super::core::AccountState;
use super::types::{AccountId, Action, Address};
use crate::error::MeridianError;

/// One delegation mechanism, in the order the resolver consults them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    /// Acting address resolves (primary or auth) to the account
    DirectControl,
    /// Acting address is a registered relay-only proxy of the account
    RelayProxy,
    /// Account blanket-trusts the platform-designated relayer
    WorldRelayer,
    /// Account trusts this specific contract and the platform has vetted it
    TrustedContract,
}

pub struct AuthQuery<'a> {
    pub acting: &'a Address,
    pub account: AccountId,
    pub action: Action,
    /// The contract the call arrives through, when a ledger is asking
    pub calling_contract: Option<&'a Address>,
}

#[derive(Clone, Debug)]
pub struct AuthorizationResolver {
    priority: Vec<Capability>,
}

impl Default for AuthorizationResolver {
    fn default() -> Self {
        Self {
            priority: vec![
                Capability::DirectControl,
                Capability::RelayProxy,
                Capability::WorldRelayer,
                Capability::TrustedContract,
            ],
        }
    }
}

impl AuthorizationResolver {
    pub fn priority(&self) -> &[Capability] {
        &self.priority
    }

    /// Decide permission, returning the first capability that grants it.
    /// Frozen accounts deny outbound actions before any capability is
    /// consulted; unmatched queries deny.
    pub fn authorize(
        &self,
        state: &AccountState,
        query: &AuthQuery<'_>,
    ) -> Result<Capability, MeridianError> {
        if state.registry.is_frozen(query.account)? {
            return Err(MeridianError::AccountFrozen);
        }
        self.priority
            .iter()
            .copied()
            .find(|cap| Self::grants(*cap, state, query))
            .ok_or(MeridianError::NotAuthorized)
    }

    fn grants(capability: Capability, state: &AccountState, query: &AuthQuery<'_>) -> bool {
        match capability {
            Capability::DirectControl => state.registry.resolve(query.acting) == query.account,
            Capability::RelayProxy => {
                query.action.proxy_eligible()
                    && state.registry.is_proxy_for(query.acting, query.account)
            }
            Capability::WorldRelayer => {
                state.trust_world.contains(&query.account)
                    && state.relayer.as_ref() == Some(query.acting)
            }
            // SafeContract membership is curated by the platform independently
            // of user trust flags; both must hold, so a trust decision cannot
            // be repointed at an unreviewed contract.
            Capability::TrustedContract => match query.calling_contract {
                Some(contract) => {
                    query.acting == contract
                        && state.safe_contracts.contains(contract)
                        && state
                            .trust_contract
                            .contains(&(query.account, contract.clone()))
                }
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::core::AccountState;
    use crate::account::types::Address;
    use std::collections::HashSet;

    fn addr(n: u8) -> Address {
        Address::from_digest([n; 32])
    }

    fn state_with_relayer(relayer: &Address) -> AccountState {
        AccountState::new(0, HashSet::new(), Some(relayer.clone()))
    }

    fn query<'a>(acting: &'a Address, account: AccountId, action: Action) -> AuthQuery<'a> {
        AuthQuery {
            acting,
            account,
            action,
            calling_contract: None,
        }
    }

    #[test]
    fn priority_list_is_inspectable_and_ordered() {
        let resolver = AuthorizationResolver::default();
        assert_eq!(
            resolver.priority(),
            &[
                Capability::DirectControl,
                Capability::RelayProxy,
                Capability::WorldRelayer,
                Capability::TrustedContract,
            ]
        );
    }

    #[test]
    fn owner_wins_before_relayer_trust() {
        let relayer = addr(9);
        let mut state = state_with_relayer(&relayer);
        let id = state.registry.create(&addr(1)).unwrap();
        state.registry.bind_auth(id, &relayer).unwrap();
        state.trust_world.insert(id);

        let resolver = AuthorizationResolver::default();
        // the relayer is ALSO an auth address: rule 1 matches first
        let cap = resolver
            .authorize(&state, &query(&relayer, id, Action::Transfer))
            .unwrap();
        assert_eq!(cap, Capability::DirectControl);

        // revoking trust-world does not revoke rule-1 authorization
        state.trust_world.remove(&id);
        let cap = resolver
            .authorize(&state, &query(&relayer, id, Action::Transfer))
            .unwrap();
        assert_eq!(cap, Capability::DirectControl);

        // unbinding the auth address does
        state.registry.unbind_auth(id, &relayer).unwrap();
        assert_eq!(
            resolver.authorize(&state, &query(&relayer, id, Action::Transfer)),
            Err(MeridianError::NotAuthorized)
        );
    }

    #[test]
    fn world_relayer_requires_both_flag_and_identity() {
        let relayer = addr(9);
        let mut state = state_with_relayer(&relayer);
        let id = state.registry.create(&addr(1)).unwrap();

        let resolver = AuthorizationResolver::default();
        assert_eq!(
            resolver.authorize(&state, &query(&relayer, id, Action::Transfer)),
            Err(MeridianError::NotAuthorized)
        );

        state.trust_world.insert(id);
        assert_eq!(
            resolver
                .authorize(&state, &query(&relayer, id, Action::Transfer))
                .unwrap(),
            Capability::WorldRelayer
        );
        // trusting the world does not open the door for arbitrary senders
        assert_eq!(
            resolver.authorize(&state, &query(&addr(8), id, Action::Transfer)),
            Err(MeridianError::NotAuthorized)
        );
    }

    #[test]
    fn proxies_are_limited_to_asset_actions() {
        let mut state = state_with_relayer(&addr(9));
        let id = state.registry.create(&addr(1)).unwrap();
        let proxy = addr(2);
        state.registry.bind_proxy(id, &proxy).unwrap();

        let resolver = AuthorizationResolver::default();
        assert_eq!(
            resolver
                .authorize(&state, &query(&proxy, id, Action::Transfer))
                .unwrap(),
            Capability::RelayProxy
        );
        assert_eq!(
            resolver
                .authorize(&state, &query(&proxy, id, Action::Approve))
                .unwrap(),
            Capability::RelayProxy
        );
        assert_eq!(
            resolver.authorize(&state, &query(&proxy, id, Action::ManageAccount)),
            Err(MeridianError::NotAuthorized)
        );
        assert_eq!(
            resolver.authorize(&state, &query(&proxy, id, Action::Trust)),
            Err(MeridianError::NotAuthorized)
        );
    }

    #[test]
    fn trusted_contract_needs_the_safe_list() {
        let contract = addr(7);
        let mut state = state_with_relayer(&addr(9));
        let id = state.registry.create(&addr(1)).unwrap();
        state.trust_contract.insert((id, contract.clone()));

        let resolver = AuthorizationResolver::default();
        let q = AuthQuery {
            acting: &contract,
            account: id,
            action: Action::Transfer,
            calling_contract: Some(&contract),
        };
        // trusted by the user but not vetted by the platform: deny
        assert_eq!(resolver.authorize(&state, &q), Err(MeridianError::NotAuthorized));

        state.safe_contracts.insert(contract.clone());
        assert_eq!(resolver.authorize(&state, &q).unwrap(), Capability::TrustedContract);

        // vetting alone is not trust
        state.trust_contract.remove(&(id, contract.clone()));
        assert_eq!(resolver.authorize(&state, &q), Err(MeridianError::NotAuthorized));
    }

    #[test]
    fn frozen_accounts_deny_before_any_capability() {
        let relayer = addr(9);
        let mut state = state_with_relayer(&relayer);
        let id = state.registry.create(&addr(1)).unwrap();
        state.trust_world.insert(id);
        state.registry.set_frozen(id, true).unwrap();

        let resolver = AuthorizationResolver::default();
        // even the owner is refused
        assert_eq!(
            resolver.authorize(&state, &query(&addr(1), id, Action::Transfer)),
            Err(MeridianError::AccountFrozen)
        );
        assert_eq!(
            resolver.authorize(&state, &query(&relayer, id, Action::Transfer)),
            Err(MeridianError::AccountFrozen)
        );
    }

    #[test]
    fn unknown_accounts_error_rather_than_grant() {
        let state = state_with_relayer(&addr(9));
        let resolver = AuthorizationResolver::default();
        assert_eq!(
            resolver.authorize(&state, &query(&addr(1), 42, Action::Transfer)),
            Err(MeridianError::UnknownAccount)
        );
    }
}
