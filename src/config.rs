use serde::{Deserialize, Serialize};

use crate::account::types::Address;
use crate::signature::Domain;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MeridianConfig {
    pub platform: PlatformConfig,
    pub node: NodeConfig,
}

/// Platform-level knobs: signature domain fields, id assignment, trusted roles.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlatformConfig {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    /// Account ids are assigned sequentially starting at `id_offset + 1`.
    /// Id 0 is the reserved "no account / burn" sentinel.
    #[serde(default)]
    pub id_offset: u64,
    /// Hex addresses allowed to unfreeze accounts, curate safe contracts,
    /// mint and manage the directory.
    #[serde(default)]
    pub admins: Vec<String>,
    /// The platform-designated relayer honored by trust-world delegation.
    #[serde(default)]
    pub relayer: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub db_path: String,
    pub log_level: String,
}

/// The domain fields shared by every core deployed for this platform
#[derive(Clone, Debug)]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
}

impl PlatformInfo {
    /// Signing domain of one core instance; `verifying_contract` makes it
    /// unique so signatures cannot replay across cores
    pub fn domain_for(&self, verifying_contract: Address) -> Domain {
        Domain::new(&self.name, &self.version, self.chain_id, verifying_contract)
    }
}

impl PlatformConfig {
    pub fn info(&self) -> PlatformInfo {
        PlatformInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id: self.chain_id,
        }
    }
}

impl Default for MeridianConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig {
                name: "meridian".to_string(),
                version: "1".to_string(),
                chain_id: 1,
                id_offset: 0,
                admins: vec![],
                relayer: None,
            },
            node: NodeConfig {
                db_path: "./data/meridian".to_string(),
                log_level: "info".to_string(),
            },
        }
    }
}

impl MeridianConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        println!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        eprintln!("Error parsing config: {}. Using Defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    eprintln!("Error reading config: {}. Using Defaults.", e);
                    Self::default()
                }
            }
        } else {
            println!("Config file not found at '{}'. Creating default.", path);
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }
}
