//! Per-signer replay counters.
//!
//! A counter is implicitly 0 until first use, advances by exactly 1 on each
//! successfully consumed signature, and only ever on success. Consumption is
//! strict equality-then-increment: "greater than" would make replay
//! protection nondeterministic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::Address;
use crate::error::MeridianError;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NonceRegistry {
    counters: HashMap<Address, u64>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nonce the signer's next signature must carry
    pub fn current(&self, signer: &Address) -> u64 {
        self.counters.get(signer).copied().unwrap_or(0)
    }

    /// Consume `expected` for the signer, advancing the counter by one
    pub fn consume(&mut self, signer: &Address, expected: u64) -> Result<(), MeridianError> {
        let current = self.current(signer);
        if current != expected {
            return Err(MeridianError::NonceMismatch {
                expected: current,
                got: expected,
            });
        }
        self.counters.insert(signer.clone(), current + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::contract_address;

    #[test]
    fn counters_start_at_zero() {
        let nonces = NonceRegistry::new();
        assert_eq!(nonces.current(&contract_address("a")), 0);
    }

    #[test]
    fn consume_advances_by_one() {
        let mut nonces = NonceRegistry::new();
        let signer = contract_address("a");
        nonces.consume(&signer, 0).unwrap();
        nonces.consume(&signer, 1).unwrap();
        assert_eq!(nonces.current(&signer), 2);
    }

    #[test]
    fn only_strict_equality_is_accepted() {
        let mut nonces = NonceRegistry::new();
        let signer = contract_address("a");
        nonces.consume(&signer, 0).unwrap();
        // replay of the consumed nonce
        assert_eq!(
            nonces.consume(&signer, 0),
            Err(MeridianError::NonceMismatch { expected: 1, got: 0 })
        );
        // skipping ahead is just as invalid
        assert_eq!(
            nonces.consume(&signer, 5),
            Err(MeridianError::NonceMismatch { expected: 1, got: 5 })
        );
        assert_eq!(nonces.current(&signer), 1);
    }
}
