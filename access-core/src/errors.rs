use crate::ledger::LedgerError;
use thiserror::Error;

/// Typed failures of the core. None of these are recovered locally; callers decide messaging.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// AEAD tag mismatch: corrupted ciphertext, corrupted tag or wrong key.
    #[error("authentication failed")]
    Authentication,

    #[error("identity set is empty")]
    EmptySet,

    #[error("identity is not a member of the authorized set")]
    NotAMember,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("ledger error: {0}")]
    Ledger(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<LedgerError> for CoreError {
    fn from(e: LedgerError) -> Self {
        CoreError::Ledger(e.to_string())
    }
}
