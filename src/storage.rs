use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MeridianError;

/// Durable key-value store behind the subsystem backings
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    pub fn open(path: &str) -> Result<Self, MeridianError> {
        let db = sled::open(path).map_err(|e| MeridianError::Storage(e.to_string()))?;
        Ok(Storage { db })
    }

    /// Throwaway database for tests and ephemeral runs
    pub fn temporary() -> Result<Self, MeridianError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| MeridianError::Storage(e.to_string()))?;
        Ok(Storage { db })
    }

    // Generic Helper: Put
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), MeridianError> {
        let serialized =
            bincode::serialize(value).map_err(|e| MeridianError::Storage(e.to_string()))?;
        self.db
            .insert(key.as_bytes(), serialized)
            .map_err(|e| MeridianError::Storage(e.to_string()))?;
        Ok(())
    }

    // Generic Helper: Get
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MeridianError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(data)) => {
                let deserialized = bincode::deserialize(&data)
                    .map_err(|e| MeridianError::Storage(e.to_string()))?;
                Ok(Some(deserialized))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(MeridianError::Storage(e.to_string())),
        }
    }

    pub fn flush(&self) -> Result<(), MeridianError> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| MeridianError::Storage(e.to_string()))
    }
}
