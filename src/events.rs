//! Append-only outcome events, kept per subsystem and mirrored to tracing

use serde::{Deserialize, Serialize};

use crate::account::types::{AccountId, Address};
use crate::directory::{AssetId, AssetKind, MetaverseId, WorldId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Event {
    AccountCreated {
        id: AccountId,
        address: Address,
        trust_admin: bool,
    },
    AccountFrozen {
        id: AccountId,
    },
    AccountUnfrozen {
        id: AccountId,
        new_address: Option<Address>,
    },
    AuthAddressAdded {
        id: AccountId,
        address: Address,
        relayed: bool,
        sender: Address,
        nonce: Option<u64>,
    },
    AuthAddressRemoved {
        id: AccountId,
        address: Address,
        relayed: bool,
        sender: Address,
        nonce: Option<u64>,
    },
    ProxyAddressAdded {
        id: AccountId,
        address: Address,
        relayed: bool,
        sender: Address,
        nonce: Option<u64>,
    },
    ProxyAddressRemoved {
        id: AccountId,
        address: Address,
        relayed: bool,
        sender: Address,
        nonce: Option<u64>,
    },
    TrustWorldChanged {
        id: AccountId,
        flag: bool,
        relayed: bool,
        sender: Address,
        nonce: Option<u64>,
    },
    TrustContractChanged {
        id: AccountId,
        contract: Address,
        flag: bool,
        relayed: bool,
        sender: Address,
        nonce: Option<u64>,
    },
    SafeContractAdded {
        contract: Address,
    },
    SafeContractRemoved {
        contract: Address,
    },
    Minted {
        to: AccountId,
        amount: u64,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: u64,
        relayed: bool,
    },
    Approval {
        owner: AccountId,
        spender: AccountId,
        amount: u64,
    },
    OperatorSet {
        owner: AccountId,
        operator: AccountId,
        flag: bool,
    },
    ItemMinted {
        token: u64,
        to: AccountId,
    },
    ItemTransfer {
        token: u64,
        from: AccountId,
        to: AccountId,
        relayed: bool,
    },
    ItemApproval {
        token: u64,
        owner: AccountId,
        spender: AccountId,
    },
    MetaverseCreated {
        id: MetaverseId,
        name: String,
    },
    WorldRegistered {
        id: WorldId,
        metaverse: MetaverseId,
        name: String,
        contract: Address,
    },
    WorldDisabled {
        id: WorldId,
    },
    AssetRegistered {
        id: AssetId,
        world: WorldId,
        contract: Address,
        kind: AssetKind,
    },
    AssetDisabled {
        id: AssetId,
    },
}

impl Event {
    /// Whether the event concerns the given account id
    pub fn touches(&self, account: AccountId) -> bool {
        match self {
            Event::AccountCreated { id, .. }
            | Event::AccountFrozen { id }
            | Event::AccountUnfrozen { id, .. }
            | Event::AuthAddressAdded { id, .. }
            | Event::AuthAddressRemoved { id, .. }
            | Event::ProxyAddressAdded { id, .. }
            | Event::ProxyAddressRemoved { id, .. }
            | Event::TrustWorldChanged { id, .. }
            | Event::TrustContractChanged { id, .. } => *id == account,
            Event::Minted { to, .. } | Event::ItemMinted { to, .. } => *to == account,
            Event::Transfer { from, to, .. } | Event::ItemTransfer { from, to, .. } => {
                *from == account || *to == account
            }
            Event::Approval { owner, spender, .. } | Event::ItemApproval { owner, spender, .. } => {
                *owner == account || *spender == account
            }
            Event::OperatorSet { owner, operator, .. } => {
                *owner == account || *operator == account
            }
            Event::SafeContractAdded { .. }
            | Event::SafeContractRemoved { .. }
            | Event::MetaverseCreated { .. }
            | Event::WorldRegistered { .. }
            | Event::WorldDisabled { .. }
            | Event::AssetRegistered { .. }
            | Event::AssetDisabled { .. } => false,
        }
    }

    /// Whether the event mentions the given address
    pub fn mentions(&self, address: &Address) -> bool {
        match self {
            Event::AccountCreated { address: a, .. } => a == address,
            Event::AccountUnfrozen { new_address, .. } => new_address.as_ref() == Some(address),
            Event::AuthAddressAdded { address: a, sender, .. }
            | Event::AuthAddressRemoved { address: a, sender, .. }
            | Event::ProxyAddressAdded { address: a, sender, .. }
            | Event::ProxyAddressRemoved { address: a, sender, .. } => {
                a == address || sender == address
            }
            Event::TrustWorldChanged { sender, .. } => sender == address,
            Event::TrustContractChanged { contract, sender, .. } => {
                contract == address || sender == address
            }
            Event::SafeContractAdded { contract } | Event::SafeContractRemoved { contract } => {
                contract == address
            }
            Event::WorldRegistered { contract, .. } | Event::AssetRegistered { contract, .. } => {
                contract == address
            }
            _ => false,
        }
    }
}

/// Append-only event log. Entries are never rewritten or dropped.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventLog {
    entries: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: Event) {
        tracing::info!(event = ?event, "event");
        self.entries.push(event);
    }

    pub fn all(&self) -> &[Event] {
        &self.entries
    }

    pub fn for_account(&self, account: AccountId) -> Vec<&Event> {
        self.entries.iter().filter(|e| e.touches(account)).collect()
    }

    pub fn for_address(&self, address: &Address) -> Vec<&Event> {
        self.entries.iter().filter(|e| e.mentions(address)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
