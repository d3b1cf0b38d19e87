//! Platform registries: Worlds under a Metaverse, Assets under a World.
//!
//! Registration records are append-only and disable-only. Nothing is ever
//! deleted, so external references to a world or asset id stay valid for the
//! life of the platform; disabling is the only lifecycle transition.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::account::types::Address;
use crate::error::MeridianError;
use crate::events::{Event, EventLog};
use crate::wiring::{next_core_id, Backing, CoreId};

pub type MetaverseId = u64;
pub type WorldId = u64;
pub type AssetId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    Fungible,
    Item,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaverseRecord {
    pub id: MetaverseId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldRecord {
    pub id: WorldId,
    pub metaverse: MetaverseId,
    pub name: String,
    pub contract: Address,
    pub enabled: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub world: WorldId,
    pub contract: Address,
    pub kind: AssetKind,
    pub enabled: bool,
}

/// Durable state of the directory subsystem
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryState {
    next_metaverse: MetaverseId,
    next_world: WorldId,
    next_asset: AssetId,
    metaverses: BTreeMap<MetaverseId, MetaverseRecord>,
    worlds: BTreeMap<WorldId, WorldRecord>,
    assets: BTreeMap<AssetId, AssetRecord>,
    world_contracts: HashMap<Address, WorldId>,
    asset_contracts: HashMap<Address, AssetId>,
    admins: HashSet<Address>,
    events: EventLog,
}

impl DirectoryState {
    pub fn new(admins: HashSet<Address>) -> Self {
        Self {
            next_metaverse: 1,
            next_world: 1,
            next_asset: 1,
            metaverses: BTreeMap::new(),
            worlds: BTreeMap::new(),
            assets: BTreeMap::new(),
            world_contracts: HashMap::new(),
            asset_contracts: HashMap::new(),
            admins,
            events: EventLog::new(),
        }
    }

    fn contract_taken(&self, contract: &Address) -> bool {
        self.world_contracts.contains_key(contract) || self.asset_contracts.contains_key(contract)
    }
}

pub struct DirectoryCore {
    core_id: CoreId,
    backing: Arc<Backing<DirectoryState>>,
    shell: RwLock<Option<Address>>,
}

impl DirectoryCore {
    pub fn new(backing: Arc<Backing<DirectoryState>>) -> Arc<Self> {
        Arc::new(Self {
            core_id: next_core_id(),
            backing,
            shell: RwLock::new(None),
        })
    }

    pub fn id(&self) -> CoreId {
        self.core_id
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

    pub fn metaverse(&self, id: MetaverseId) -> Result<MetaverseRecord, MeridianError> {
        self.backing
            .read(|s| s.metaverses.get(&id).cloned().ok_or(MeridianError::NotRegistered))
    }

    pub fn world(&self, id: WorldId) -> Result<WorldRecord, MeridianError> {
        self.backing
            .read(|s| s.worlds.get(&id).cloned().ok_or(MeridianError::NotRegistered))
    }

    pub fn asset(&self, id: AssetId) -> Result<AssetRecord, MeridianError> {
        self.backing
            .read(|s| s.assets.get(&id).cloned().ok_or(MeridianError::NotRegistered))
    }

    pub fn world_for_contract(&self, contract: &Address) -> Option<WorldId> {
        self.backing.read(|s| s.world_contracts.get(contract).copied())
    }

    pub fn asset_for_contract(&self, contract: &Address) -> Option<AssetId> {
        self.backing.read(|s| s.asset_contracts.get(contract).copied())
    }

    pub fn worlds_in(&self, metaverse: MetaverseId) -> Vec<WorldRecord> {
        self.backing.read(|s| {
            s.worlds
                .values()
                .filter(|w| w.metaverse == metaverse)
                .cloned()
                .collect()
        })
    }

    pub fn assets_in(&self, world: WorldId) -> Vec<AssetRecord> {
        self.backing.read(|s| {
            s.assets
                .values()
                .filter(|a| a.world == world)
                .cloned()
                .collect()
        })
    }

    // --- Writes (all admin-curated) ---

    pub fn create_metaverse(
        &self,
        sender: &Address,
        name: &str,
    ) -> Result<MetaverseId, MeridianError> {
        let name = name.to_string();
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            let id = state.next_metaverse;
            state.next_metaverse += 1;
            state.metaverses.insert(id, MetaverseRecord { id, name: name.clone() });
            state.events.record(Event::MetaverseCreated { id, name: name.clone() });
            Ok(id)
        })
    }

    pub fn register_world(
        &self,
        sender: &Address,
        metaverse: MetaverseId,
        name: &str,
        contract: &Address,
    ) -> Result<WorldId, MeridianError> {
        let name = name.to_string();
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            if !state.metaverses.contains_key(&metaverse) {
                return Err(MeridianError::NotRegistered);
            }
            if state.contract_taken(contract) {
                return Err(MeridianError::AlreadyRegistered);
            }
            let id = state.next_world;
            state.next_world += 1;
            state.worlds.insert(
                id,
                WorldRecord {
                    id,
                    metaverse,
                    name: name.clone(),
                    contract: contract.clone(),
                    enabled: true,
                },
            );
            state.world_contracts.insert(contract.clone(), id);
            state.events.record(Event::WorldRegistered {
                id,
                metaverse,
                name: name.clone(),
                contract: contract.clone(),
            });
            Ok(id)
        })
    }

    /// Worlds are never deleted; disabling is final visibility-wise but the
    /// record and its id stay dereferenceable
    pub fn disable_world(&self, sender: &Address, world: WorldId) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            let record = state.worlds.get_mut(&world).ok_or(MeridianError::NotRegistered)?;
            if record.enabled {
                record.enabled = false;
                state.events.record(Event::WorldDisabled { id: world });
            }
            Ok(())
        })
    }

    pub fn register_asset(
        &self,
        sender: &Address,
        world: WorldId,
        contract: &Address,
        kind: AssetKind,
    ) -> Result<AssetId, MeridianError> {
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            match state.worlds.get(&world) {
                Some(w) if w.enabled => {}
                _ => return Err(MeridianError::NotRegistered),
            }
            if state.contract_taken(contract) {
                return Err(MeridianError::AlreadyRegistered);
            }
            let id = state.next_asset;
            state.next_asset += 1;
            state.assets.insert(
                id,
                AssetRecord {
                    id,
                    world,
                    contract: contract.clone(),
                    kind,
                    enabled: true,
                },
            );
            state.asset_contracts.insert(contract.clone(), id);
            state.events.record(Event::AssetRegistered {
                id,
                world,
                contract: contract.clone(),
                kind,
            });
            Ok(id)
        })
    }

    pub fn disable_asset(&self, sender: &Address, asset: AssetId) -> Result<(), MeridianError> {
        self.backing.write(self.core_id, |state| {
            Self::require_admin(state, sender)?;
            let record = state.assets.get_mut(&asset).ok_or(MeridianError::NotRegistered)?;
            if record.enabled {
                record.enabled = false;
                state.events.record(Event::AssetDisabled { id: asset });
            }
            Ok(())
        })
    }

    fn require_admin(state: &DirectoryState, sender: &Address) -> Result<(), MeridianError> {
        if state.admins.contains(sender) {
            Ok(())
        } else {
            Err(MeridianError::NotAuthorized)
        }
    }
}
