//! Proof Path Trimming
//!
//! Raw proofs arrive ordered leaf-to-root with one node per tree level. The
//! near-root levels covered by the tree's canopy are cached on-chain and must
//! not be transmitted, so only the prefix of length `proof_len - canopy_depth`
//! goes into the instruction's account list.

use solana_sdk::instruction::AccountMeta;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Proof path errors
#[derive(Debug, Error)]
pub enum ProofError {
    /// The fetched proof has fewer nodes than the canopy covers. The proof
    /// is stale or corrupt; refetch it and retry.
    #[error("proof of length {proof_len} is shorter than the canopy depth {canopy_depth}")]
    TooShort {
        proof_len: usize,
        canopy_depth: usize,
    },

    /// The proof does not cover every level of the tree. The proof is stale
    /// relative to the tree's geometry; refetch it and retry.
    #[error("proof of length {proof_len} does not match the tree depth {tree_depth}")]
    DepthMismatch {
        proof_len: usize,
        tree_depth: usize,
    },
}

/// Check that a proof covers every level of a tree of the given depth.
pub fn expect_depth(proof: &[Pubkey], tree_depth: usize) -> Result<(), ProofError> {
    if proof.len() != tree_depth {
        return Err(ProofError::DepthMismatch {
            proof_len: proof.len(),
            tree_depth,
        });
    }
    Ok(())
}

/// Trim the canopy-covered suffix off a proof path, preserving order.
pub fn trim_canopy(proof: &[Pubkey], canopy_depth: usize) -> Result<&[Pubkey], ProofError> {
    if proof.len() < canopy_depth {
        return Err(ProofError::TooShort {
            proof_len: proof.len(),
            canopy_depth,
        });
    }
    Ok(&proof[..proof.len() - canopy_depth])
}

/// Trim a proof and convert it into the readonly non-signer account metas
/// appended to transfer/burn instructions.
pub fn proof_accounts(
    proof: &[Pubkey],
    canopy_depth: usize,
) -> Result<Vec<AccountMeta>, ProofError> {
    let trimmed = trim_canopy(proof, canopy_depth)?;
    Ok(trimmed
        .iter()
        .map(|node| AccountMeta::new_readonly(*node, false))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof_of(len: usize) -> Vec<Pubkey> {
        (0..len).map(|_| Pubkey::new_unique()).collect()
    }

    #[test]
    fn test_trim_is_order_preserving_prefix() {
        let proof = proof_of(14);
        for canopy in 0..=14usize {
            let trimmed = trim_canopy(&proof, canopy).unwrap();
            assert_eq!(trimmed.len(), proof.len() - canopy);
            assert_eq!(trimmed, &proof[..proof.len() - canopy]);
        }
    }

    #[test]
    fn test_trim_zero_canopy_is_identity() {
        let proof = proof_of(5);
        assert_eq!(trim_canopy(&proof, 0).unwrap(), proof.as_slice());
    }

    #[test]
    fn test_trim_full_canopy_is_empty() {
        let proof = proof_of(5);
        assert!(trim_canopy(&proof, 5).unwrap().is_empty());
    }

    #[test]
    fn test_short_proof_rejected() {
        let proof = proof_of(3);
        let err = trim_canopy(&proof, 5).unwrap_err();
        assert!(matches!(
            err,
            ProofError::TooShort {
                proof_len: 3,
                canopy_depth: 5
            }
        ));
    }

    #[test]
    fn test_expect_depth() {
        let proof = proof_of(5);
        assert!(expect_depth(&proof, 5).is_ok());
        assert!(matches!(
            expect_depth(&proof, 6),
            Err(ProofError::DepthMismatch {
                proof_len: 5,
                tree_depth: 6
            })
        ));
    }

    #[test]
    fn test_proof_accounts_are_readonly_non_signers() {
        let proof = proof_of(6);
        let metas = proof_accounts(&proof, 2).unwrap();
        assert_eq!(metas.len(), 4);
        for (meta, node) in metas.iter().zip(proof.iter()) {
            assert_eq!(meta.pubkey, *node);
            assert!(!meta.is_signer);
            assert!(!meta.is_writable);
        }
    }
}
