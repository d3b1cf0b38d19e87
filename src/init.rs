//! Platform bootstrap.
//!
//! Wires each subsystem as a Shell/Core/Backing triple in the fixed order:
//! (a) backing, (b) core bound to the backing and the backing bound back to
//! the core, (c) shell, cross-wired with the core. Until all links exist the
//! subsystem is inert; every call fails `NotWired`.

use std::collections::HashSet;
use std::sync::Arc;

use crate::account::core::{AccountCore, AccountState};
use crate::account::types::Address;
use crate::config::{MeridianConfig, PlatformInfo};
use crate::directory::{DirectoryCore, DirectoryState};
use crate::error::MeridianError;
use crate::ledger::fungible::{FungibleCore, FungibleState};
use crate::ledger::items::{ItemCore, ItemState};
use crate::ledger::IdentityHub;
use crate::storage::Storage;
use crate::wiring::{Backing, Shell};

pub const FUNGIBLE_SYMBOL: &str = "ORB";
pub const ITEM_SYMBOL: &str = "RELIC";

/// One wired subsystem: the stable shell plus its durable backing. The
/// backing is kept so a later core replacement can rebind it.
pub struct Subsystem<C, S> {
    pub shell: Arc<Shell<C>>,
    pub backing: Arc<Backing<S>>,
}

pub struct Platform {
    pub accounts: Subsystem<AccountCore, AccountState>,
    pub fungible: Subsystem<FungibleCore, FungibleState>,
    pub items: Subsystem<ItemCore, ItemState>,
    pub directory: Subsystem<DirectoryCore, DirectoryState>,
}

fn parse_addresses(raw: &[String]) -> Result<HashSet<Address>, MeridianError> {
    raw.iter().map(|s| Address::parse(s)).collect()
}

fn backing_for<S>(
    label: &str,
    disk: &Option<Arc<Storage>>,
    initial: S,
) -> Result<Arc<Backing<S>>, MeridianError>
where
    S: Clone + serde::Serialize + serde::de::DeserializeOwned,
{
    match disk {
        Some(d) => Backing::open(label, d.clone(), initial),
        None => Ok(Backing::new(label, initial)),
    }
}

/// Deploy and cross-wire the whole platform. With a storage handle, each
/// backing reloads its last committed snapshot, so a restart resumes where
/// the previous process stopped.
pub fn bootstrap(
    config: &MeridianConfig,
    disk: Option<Arc<Storage>>,
) -> Result<Platform, MeridianError> {
    let info = config.platform.info();
    let admins = parse_addresses(&config.platform.admins)?;
    let relayer = config
        .platform
        .relayer
        .as_deref()
        .map(Address::parse)
        .transpose()?;

    // identity core first; the ledgers consume it
    let account_backing = backing_for(
        "accounts",
        &disk,
        AccountState::new(config.platform.id_offset, admins.clone(), relayer),
    )?;
    let account_core = AccountCore::new(&info, account_backing.clone());
    account_backing.bind_core(account_core.id());
    let accounts: Arc<Shell<AccountCore>> = Shell::new("meridian/accounts");
    account_core.bind_shell(accounts.address().clone());
    accounts.point_at(account_core);
    tracing::info!(address = %accounts.address(), "account subsystem wired");

    let hub: Arc<dyn IdentityHub> = accounts.clone();

    let fungible_backing = backing_for(
        "fungible",
        &disk,
        FungibleState::new(FUNGIBLE_SYMBOL, admins.clone()),
    )?;
    let fungible_core = FungibleCore::new(&info, fungible_backing.clone(), hub.clone());
    fungible_backing.bind_core(fungible_core.id());
    let fungible: Arc<Shell<FungibleCore>> = Shell::new("meridian/fungible");
    fungible_core.bind_shell(fungible.address().clone());
    fungible.point_at(fungible_core);
    tracing::info!(address = %fungible.address(), symbol = FUNGIBLE_SYMBOL, "fungible ledger wired");

    let item_backing = backing_for("items", &disk, ItemState::new(ITEM_SYMBOL, admins.clone()))?;
    let item_core = ItemCore::new(&info, item_backing.clone(), hub);
    item_backing.bind_core(item_core.id());
    let items: Arc<Shell<ItemCore>> = Shell::new("meridian/items");
    item_core.bind_shell(items.address().clone());
    items.point_at(item_core);
    tracing::info!(address = %items.address(), symbol = ITEM_SYMBOL, "item ledger wired");

    let directory_backing = backing_for("directory", &disk, DirectoryState::new(admins))?;
    let directory_core = DirectoryCore::new(directory_backing.clone());
    directory_backing.bind_core(directory_core.id());
    let directory: Arc<Shell<DirectoryCore>> = Shell::new("meridian/directory");
    directory_core.bind_shell(directory.address().clone());
    directory.point_at(directory_core);
    tracing::info!(address = %directory.address(), "directory wired");

    Ok(Platform {
        accounts: Subsystem {
            shell: accounts,
            backing: account_backing,
        },
        fungible: Subsystem {
            shell: fungible,
            backing: fungible_backing,
        },
        items: Subsystem {
            shell: items,
            backing: item_backing,
        },
        directory: Subsystem {
            shell: directory,
            backing: directory_backing,
        },
    })
}

/// Upgrade path: a fresh account core over the same backing. The shell
/// address and all durable state survive; the previous core is fenced out
/// and its writes fail `StaleCore` from here on.
pub fn replace_account_core(
    subsystem: &Subsystem<AccountCore, AccountState>,
    info: &PlatformInfo,
) -> Arc<AccountCore> {
    let core = AccountCore::new(info, subsystem.backing.clone());
    subsystem.backing.bind_core(core.id());
    core.bind_shell(subsystem.shell.address().clone());
    subsystem.shell.point_at(core.clone());
    tracing::info!(core = core.id(), "account core replaced");
    core
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::{Caller, ACCOUNT_NONE};
    use crate::crypto::KeyPair;
    use crate::ledger::AccountRef;

    fn key(n: u8) -> KeyPair {
        KeyPair::from_seed([n; 32])
    }

    fn config() -> MeridianConfig {
        let mut config = MeridianConfig::default();
        config.platform.admins = vec![key(99).address().to_string()];
        config.platform.relayer = Some(key(98).address().to_string());
        config
    }

    #[test]
    fn bootstrap_wires_every_subsystem() {
        let platform = bootstrap(&config(), None).unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        let id = accounts.create_account(&key(1).address(), false).unwrap();
        assert_eq!(id, 1);
        assert_eq!(platform.fungible.shell.core().unwrap().total_supply(), 0);
        assert_eq!(platform.items.shell.core().unwrap().total_supply(), 0);
        assert!(platform.directory.shell.core().unwrap().shell_address().is_ok());
    }

    #[test]
    fn id_offset_is_honored() {
        let mut cfg = config();
        cfg.platform.id_offset = 1000;
        let platform = bootstrap(&cfg, None).unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        assert_eq!(accounts.create_account(&key(1).address(), false).unwrap(), 1001);
    }

    #[test]
    fn core_upgrade_preserves_state_and_fences_the_old_core() {
        let cfg = config();
        let platform = bootstrap(&cfg, None).unwrap();
        let old_core = platform.accounts.shell.core().unwrap();
        let alice = key(1).address();
        let id = old_core.create_account(&alice, false).unwrap();

        let new_core = replace_account_core(&platform.accounts, &cfg.platform.info());

        // state survived under the same shell address
        assert_eq!(platform.accounts.shell.core().unwrap().resolve(&alice), id);
        assert_eq!(new_core.resolve(&alice), id);

        // the old core can still read but no longer write
        assert_eq!(old_core.resolve(&alice), id);
        assert_eq!(
            old_core.create_account(&key(2).address(), false),
            Err(MeridianError::StaleCore)
        );
        // the new one writes on
        assert_eq!(new_core.create_account(&key(2).address(), false).unwrap(), id + 1);
    }

    #[test]
    fn snapshots_survive_a_restart() {
        let disk = Arc::new(Storage::temporary().unwrap());
        let cfg = config();
        let alice = key(1).address();
        let id = {
            let platform = bootstrap(&cfg, Some(disk.clone())).unwrap();
            platform
                .accounts
                .shell
                .core()
                .unwrap()
                .create_account(&alice, true)
                .unwrap()
        };
        // a second bootstrap over the same storage resumes the state
        let platform = bootstrap(&cfg, Some(disk)).unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        assert_eq!(accounts.resolve(&alice), id);
        assert!(accounts.trusts_world(id));
        assert_ne!(accounts.resolve(&alice), ACCOUNT_NONE);
    }

    #[test]
    fn admin_wires_the_safe_contract_list_to_the_ledgers() {
        let platform = bootstrap(&config(), None).unwrap();
        let accounts = platform.accounts.shell.core().unwrap();
        let ledger = platform.fungible.shell.core().unwrap();
        let admin = key(99).address();

        // vet the fungible shell address, then have a user trust it
        accounts
            .add_safe_contract(&admin, platform.fungible.shell.address())
            .unwrap();
        let alice = key(1);
        let id = ledger
            .mint(&admin, &AccountRef::Addr(alice.address()), 10)
            .unwrap();
        accounts
            .set_trust_contract(
                &Caller::Direct(alice.address()),
                id,
                platform.fungible.shell.address(),
                true,
                0,
            )
            .unwrap();
        assert!(accounts.trusts_contract(id, platform.fungible.shell.address()));
    }
}
