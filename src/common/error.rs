//! Common Error Types for the leafmint Backend
//!
//! Folds the per-module error enums into one root type so API handlers and
//! the CLI deal with a single error surface. Retryability is an explicit
//! property of the error, not something callers infer from messages.

use thiserror::Error;

/// Root error type for the leafmint backend
#[derive(Debug, Error)]
pub enum LeafmintError {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Payer account absent or not a parseable address
    #[error("missing account: {0}")]
    MissingAccount(String),

    /// Proof path errors (canopy trimming)
    #[error("proof error: {0}")]
    Proof(#[from] crate::tree::proof::ProofError),

    /// Instruction assembly errors (metadata validation, serialization)
    #[error("instruction error: {0}")]
    Instruction(#[from] crate::tree::instructions::InstructionError),

    /// Tree account parsing errors
    #[error("tree account error: {0}")]
    TreeAccount(#[from] crate::tree::types::TreeAccountError),

    /// Transaction assembly errors
    #[error("transaction error: {0}")]
    Assemble(#[from] crate::transaction::AssembleError),

    /// Changelog decoding errors
    #[error("changelog error: {0}")]
    Changelog(#[from] crate::tree::changelog::ChangelogError),

    /// The ledger rejected a mutation against a root we no longer hold.
    /// The caller should refetch the proof and rebuild the instruction.
    #[error("stale proof: {0}")]
    StaleProof(String),

    /// Ledger RPC errors
    #[error("rpc error: {0}")]
    Rpc(#[from] crate::rpc::RpcError),

    /// Proof provider (DAS) errors
    #[error("proof provider error: {0}")]
    Provider(#[from] crate::das::DasError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeafmintError {
    /// Create a missing-account error
    pub fn missing_account(msg: impl Into<String>) -> Self {
        Self::MissingAccount(msg.into())
    }

    /// Create a stale-proof error
    pub fn stale_proof(msg: impl Into<String>) -> Self {
        Self::StaleProof(msg.into())
    }

    /// Check if this error is resolved by refetching the stale dependency
    /// (anchor, proof) and re-invoking the same build call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LeafmintError::StaleProof(_)
                | LeafmintError::Proof(_)
                | LeafmintError::Assemble(crate::transaction::AssembleError::ExpiredAnchor { .. })
                | LeafmintError::Rpc(_)
                | LeafmintError::Provider(_)
                | LeafmintError::Io(_)
        )
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            LeafmintError::Config(_) => "CONFIG_ERROR",
            LeafmintError::Logging(_) => "LOGGING_ERROR",
            LeafmintError::MissingAccount(_) => "MISSING_ACCOUNT",
            LeafmintError::Proof(crate::tree::proof::ProofError::TooShort { .. }) => {
                "PROOF_TOO_SHORT"
            }
            LeafmintError::Proof(crate::tree::proof::ProofError::DepthMismatch { .. }) => {
                "STALE_PROOF"
            }
            LeafmintError::Instruction(
                crate::tree::instructions::InstructionError::InvalidMetadata(_),
            ) => "INVALID_METADATA",
            LeafmintError::Instruction(_) => "INSTRUCTION_ERROR",
            LeafmintError::TreeAccount(_) => "TREE_ACCOUNT_ERROR",
            LeafmintError::Assemble(crate::transaction::AssembleError::ExpiredAnchor {
                ..
            }) => "EXPIRED_ANCHOR",
            LeafmintError::Assemble(_) => "TRANSACTION_ERROR",
            LeafmintError::Changelog(_) => "LEAF_INDEX_NOT_FOUND",
            LeafmintError::StaleProof(_) => "STALE_PROOF",
            LeafmintError::Rpc(_) => "RPC_ERROR",
            LeafmintError::Provider(_) => "PROVIDER_ERROR",
            LeafmintError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if this is a caller mistake (rejected up front, never retried).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LeafmintError::MissingAccount(_)
                | LeafmintError::Instruction(
                    crate::tree::instructions::InstructionError::InvalidMetadata(_),
                )
        )
    }
}

/// Result type alias using LeafmintError
pub type Result<T> = std::result::Result<T, LeafmintError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::instructions::InstructionError;
    use crate::tree::proof::ProofError;

    #[test]
    fn test_error_codes() {
        let err = LeafmintError::missing_account("no payer given");
        assert_eq!(err.error_code(), "MISSING_ACCOUNT");
        assert!(err.to_string().contains("no payer given"));

        let err: LeafmintError = ProofError::TooShort {
            proof_len: 3,
            canopy_depth: 5,
        }
        .into();
        assert_eq!(err.error_code(), "PROOF_TOO_SHORT");
    }

    #[test]
    fn test_retryable_classification() {
        // Staleness errors are retryable after refetching.
        assert!(LeafmintError::stale_proof("root mismatch").is_retryable());
        let proof: LeafmintError = ProofError::TooShort {
            proof_len: 0,
            canopy_depth: 1,
        }
        .into();
        assert!(proof.is_retryable());

        // Validation errors never are.
        let invalid: LeafmintError =
            InstructionError::InvalidMetadata("shares sum to 90".to_string()).into();
        assert!(!invalid.is_retryable());
        assert!(invalid.is_validation());
        assert!(!LeafmintError::missing_account("x").is_retryable());
    }
}
