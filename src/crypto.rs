use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::account::types::Address;
use crate::error::MeridianError;

pub struct KeyPair {
    pub signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new Ed25519 keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        KeyPair {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic keypair from a 32-byte seed (fixtures, tooling)
    pub fn from_seed(seed: [u8; 32]) -> Self {
        KeyPair {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The wallet address controlled by this keypair: the hex public key
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.signing_key.verifying_key())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message with the private key
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// Sign a message and return hex string
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message).to_bytes())
    }
}

/// Public key for a wallet address; fails for addresses that are not
/// well-formed Ed25519 keys (e.g. contract addresses).
pub fn verifying_key(address: &Address) -> Result<VerifyingKey, MeridianError> {
    let bytes = hex::decode(address.as_str()).map_err(|_| MeridianError::InvalidAddress)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| MeridianError::InvalidAddress)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| MeridianError::InvalidAddress)
}

/// Verify a hex signature against a message with the key behind an address
pub fn verify_with_address(message: &[u8], signature_hex: &str, address: &Address) -> bool {
    if let (Ok(key), Ok(sig_bytes)) = (verifying_key(address), hex::decode(signature_hex)) {
        if let Ok(signature) = Signature::from_slice(&sig_bytes) {
            return key.verify(message, &signature).is_ok();
        }
    }
    false
}

/// Stable opaque address for a deployed contract, derived from its label
pub fn contract_address(label: &str) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"meridian-contract:");
    hasher.update(label.as_bytes());
    Address::from_digest(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = KeyPair::from_seed([7u8; 32]);
        let sig = kp.sign_hex(b"hello world");
        assert!(verify_with_address(b"hello world", &sig, &kp.address()));
        assert!(!verify_with_address(b"hello worlds", &sig, &kp.address()));
    }

    #[test]
    fn wrong_key_rejected() {
        let a = KeyPair::from_seed([1u8; 32]);
        let b = KeyPair::from_seed([2u8; 32]);
        let sig = a.sign_hex(b"msg");
        assert!(!verify_with_address(b"msg", &sig, &b.address()));
    }

    #[test]
    fn contract_addresses_are_stable_and_distinct() {
        assert_eq!(contract_address("accounts"), contract_address("accounts"));
        assert_ne!(contract_address("accounts"), contract_address("items"));
    }
}
