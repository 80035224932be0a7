//! Transaction Assembly
//!
//! Wraps built instructions into a serialized, partially signed transaction.
//! The server signs with whichever keys it holds (typically the tree
//! delegate); the fee payer's slot is left open for the end user's wallet.
//! Instruction order is preserved exactly; nothing is added or reordered.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

/// A recent validity anchor: the blockhash the transaction is built against
/// and the block height after which the ledger will refuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentAnchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Transaction assembly errors
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The anchor expired before assembly; fetch a fresh one and retry.
    #[error("validity anchor expired at height {expiry}, current height {current}")]
    ExpiredAnchor { expiry: u64, current: u64 },

    /// A provided keypair is not among the transaction's required signers
    #[error("signing failed: {0}")]
    Signing(String),

    /// Wire serialization failure
    #[error("failed to serialize transaction: {0}")]
    Serialize(String),
}

/// Assemble a partially signed transaction and encode it for transport.
///
/// `current_height` is the ledger's block height at assembly time; pass the
/// freshest value available so expired anchors are rejected here instead of
/// at submission.
pub fn assemble(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    anchor: &RecentAnchor,
    current_height: u64,
    signers: &[&Keypair],
) -> Result<String, AssembleError> {
    let transaction = partially_signed(instructions, fee_payer, anchor, current_height, signers)?;
    let bytes =
        bincode::serialize(&transaction).map_err(|e| AssembleError::Serialize(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// As `assemble`, but returns the transaction object for callers that
/// submit directly instead of handing the payload to a wallet.
pub fn partially_signed(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    anchor: &RecentAnchor,
    current_height: u64,
    signers: &[&Keypair],
) -> Result<Transaction, AssembleError> {
    if current_height > anchor.last_valid_block_height {
        return Err(AssembleError::ExpiredAnchor {
            expiry: anchor.last_valid_block_height,
            current: current_height,
        });
    }

    let mut transaction = Transaction::new_with_payer(instructions, Some(fee_payer));
    transaction
        .try_partial_sign(signers, anchor.blockhash)
        .map_err(|e| AssembleError::Signing(e.to_string()))?;
    Ok(transaction)
}

/// Decode a base64 transaction payload back into a transaction.
pub fn decode(payload: &str) -> Result<Transaction, AssembleError> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| AssembleError::Serialize(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| AssembleError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::instructions;
    use crate::tree::pda;
    use crate::tree::types::{Creator, DepthSizePair, LeafMetadata};
    use solana_sdk::signature::Signer;

    fn anchor() -> RecentAnchor {
        RecentAnchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 100,
        }
    }

    #[test]
    fn test_expired_anchor_rejected() {
        let payer = Pubkey::new_unique();
        let err = assemble(&[], &payer, &anchor(), 101, &[]).unwrap_err();
        assert!(matches!(
            err,
            AssembleError::ExpiredAnchor {
                expiry: 100,
                current: 101
            }
        ));
    }

    #[test]
    fn test_anchor_at_expiry_height_still_valid() {
        let payer = Pubkey::new_unique();
        assert!(assemble(&[], &payer, &anchor(), 100, &[]).is_ok());
    }

    #[test]
    fn test_create_tree_and_mint_assembly() {
        // End to end: a create-tree pair for {depth 3, buffer 8, canopy 0}
        // plus a mint with a single 100%-share creator must produce a
        // transaction with the payer as fee payer and the derived tree
        // authority among its accounts.
        let payer = Keypair::new();
        let tree = Keypair::new();
        let creator = Keypair::new();

        let pair = DepthSizePair {
            max_depth: 3,
            max_buffer_size: 8,
        };
        let [alloc, init] =
            instructions::create_tree(&payer.pubkey(), &tree.pubkey(), pair, 0, 1_000_000).unwrap();

        let metadata = LeafMetadata::non_fungible("RGB", "RGB", "https://example.com/rgb.json")
            .with_creators(vec![Creator {
                address: creator.pubkey(),
                verified: false,
                share: 100,
            }]);
        let mint = instructions::mint_v1(
            &payer.pubkey(),
            &tree.pubkey(),
            &payer.pubkey(),
            &payer.pubkey(),
            &creator.pubkey(),
            &metadata,
        )
        .unwrap();

        let payload = assemble(
            &[alloc, init, mint],
            &payer.pubkey(),
            &anchor(),
            50,
            &[&creator],
        )
        .unwrap();

        let decoded = decode(&payload).unwrap();
        let keys = &decoded.message.account_keys;

        assert_eq!(keys[0], payer.pubkey(), "fee payer leads the account table");
        let (authority, _) = pda::tree_authority(&tree.pubkey());
        assert!(keys.contains(&authority), "derived tree authority referenced");
        assert_eq!(
            decoded.message.instructions.len(),
            3,
            "instruction order and count preserved"
        );
    }

    #[test]
    fn test_partial_signature_leaves_payer_slot_open() {
        let payer = Keypair::new();
        let tree = Pubkey::new_unique();
        let delegate = Keypair::new();

        let metadata = LeafMetadata::non_fungible("RGB", "RGB", "https://example.com/rgb.json");
        let mint = instructions::mint_v1(
            &payer.pubkey(),
            &tree,
            &payer.pubkey(),
            &payer.pubkey(),
            &delegate.pubkey(),
            &metadata,
        )
        .unwrap();

        let payload = assemble(&[mint], &payer.pubkey(), &anchor(), 1, &[&delegate]).unwrap();
        let decoded = decode(&payload).unwrap();

        let payer_position = decoded
            .message
            .account_keys
            .iter()
            .position(|key| *key == payer.pubkey())
            .unwrap();
        let delegate_position = decoded
            .message
            .account_keys
            .iter()
            .position(|key| *key == delegate.pubkey())
            .unwrap();

        assert_eq!(
            decoded.signatures[payer_position],
            solana_sdk::signature::Signature::default(),
            "end-user slot stays unsigned"
        );
        assert_ne!(
            decoded.signatures[delegate_position],
            solana_sdk::signature::Signature::default(),
            "server-held delegate signature applied"
        );
    }
}
