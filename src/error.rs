use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeridianError {
    #[error("invalid address")]
    InvalidAddress,
    #[error("address already in use")]
    AddressInUse,
    #[error("unknown account")]
    UnknownAccount,
    #[error("account is frozen")]
    AccountFrozen,
    #[error("not authorized")]
    NotAuthorized,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("signature expired")]
    SignatureExpired,
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("not registered")]
    NotRegistered,
    #[error("already registered")]
    AlreadyRegistered,
    #[error("cannot remove the last resolvable address of an account")]
    LastAddress,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient allowance")]
    InsufficientAllowance,
    #[error("unknown token")]
    UnknownToken,
    #[error("balance overflow")]
    Overflow,
    #[error("subsystem is not fully wired")]
    NotWired,
    #[error("write attempted by a stale core")]
    StaleCore,
    #[error("storage error: {0}")]
    Storage(String),
}
