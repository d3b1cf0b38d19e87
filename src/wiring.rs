//! Shell / Core / Storage three-tier indirection.
//!
//! Every subsystem is deployed as a triple: a `Shell` holding the stable
//! externally-visible address, a core holding the logic, and a `Backing`
//! holding the durable state. The backing accepts writes only from the single
//! core it currently recognizes, which is what makes logic replacement safe:
//! an upgrade binds a new core to the same backing and repoints the shell,
//! after which the old core's writes fail `StaleCore` while the state and the
//! shell address survive untouched.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::account::types::Address;
use crate::crypto;
use crate::error::MeridianError;
use crate::storage::Storage;

pub type CoreId = u64;

static CORE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Unique stamp for a core instance; a backing recognizes exactly one at a time
pub fn next_core_id() -> CoreId {
    CORE_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Storage tier: durable state plus the core currently allowed to write it
pub struct Backing<S> {
    label: String,
    state: RwLock<S>,
    core: RwLock<Option<CoreId>>,
    disk: Option<Arc<Storage>>,
}

impl<S: Clone + Serialize + DeserializeOwned> Backing<S> {
    pub fn new(label: &str, initial: S) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            state: RwLock::new(initial),
            core: RwLock::new(None),
            disk: None,
        })
    }

    /// Durable backing: reloads the last committed snapshot if one exists
    pub fn open(label: &str, disk: Arc<Storage>, initial: S) -> Result<Arc<Self>, MeridianError> {
        let state = disk.get::<S>(label)?.unwrap_or(initial);
        Ok(Arc::new(Self {
            label: label.to_string(),
            state: RwLock::new(state),
            core: RwLock::new(None),
            disk: Some(disk),
        }))
    }

    /// Wiring step: hand the write end to a core
    pub fn bind_core(&self, core: CoreId) {
        *self.core.write().expect("core lock poisoned") = Some(core);
    }

    pub fn current_core(&self) -> Option<CoreId> {
        *self.core.read().expect("core lock poisoned")
    }

    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read().expect("state lock poisoned"))
    }

    /// Run a mutation on behalf of `core`. The closure works on a copy that is
    /// committed only on `Ok`, so a failed call leaves no trace, nonce
    /// increments included.
    pub fn write<R>(
        &self,
        core: CoreId,
        f: impl FnOnce(&mut S) -> Result<R, MeridianError>,
    ) -> Result<R, MeridianError> {
        match self.current_core() {
            None => return Err(MeridianError::NotWired),
            Some(current) if current != core => return Err(MeridianError::StaleCore),
            Some(_) => {}
        }
        let mut guard = self.state.write().expect("state lock poisoned");
        let mut next = guard.clone();
        let out = f(&mut next)?;
        *guard = next;
        if let Some(disk) = &self.disk {
            disk.put(&self.label, &*guard)?;
        }
        Ok(out)
    }
}

/// Stable externally-visible handle of a subsystem. The address never changes;
/// upgrades only repoint the core reference.
pub struct Shell<C> {
    address: Address,
    core: RwLock<Option<Arc<C>>>,
}

impl<C> Shell<C> {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            address: crypto::contract_address(label),
            core: RwLock::new(None),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Wiring step: point the shell at its (new) core
    pub fn point_at(&self, core: Arc<C>) {
        *self.core.write().expect("core lock poisoned") = Some(core);
    }

    /// The core currently answering for this shell
    pub fn core(&self) -> Result<Arc<C>, MeridianError> {
        self.core
            .read()
            .expect("core lock poisoned")
            .clone()
            .ok_or(MeridianError::NotWired)
    }
}
