//! Program-Derived Address Derivation
//!
//! Deterministic derivation of the program-owned addresses the asset-tree
//! program expects. All derivations are pure; the returned bump guarantees
//! the address is off the ed25519 curve and cannot collide with a
//! user-controlled signing key.

use solana_sdk::pubkey::Pubkey;

// ============================================================================
// Program IDs
// ============================================================================

/// Asset-tree (compressed NFT) program ID
pub const ASSET_TREE_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("BGUMAp9Gq7iTEuizy4pqaxsTyUCBK68MDcK76GfwuaLu");

/// State-compression program ID (owns the Merkle tree accounts)
pub const ACCOUNT_COMPRESSION_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("cmtDvXumGCrqC1Age74AVPhSRVXJMd8PJS91L8KbNCK");

/// No-op log wrapper program ID (carries changelog events)
pub const NOOP_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("noopb9bkMVfRPU8AsbpTUg8AQkHtKwMYZiFUjNRtMmV");

/// Token metadata program ID (collection metadata / master editions)
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Seed for the collection-verification signer PDA
const COLLECTION_CPI_SEED: &[u8] = b"collection_cpi";

/// Seed prefix for leaf asset IDs
const ASSET_SEED: &[u8] = b"asset";

// ============================================================================
// Derivations
// ============================================================================

/// Derive a program address and bump from raw seeds
pub fn derive(seeds: &[&[u8]], program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(seeds, program_id)
}

/// Tree authority PDA (the tree's config account), seeded by the tree address
pub fn tree_authority(tree: &Pubkey) -> (Pubkey, u8) {
    derive(&[tree.as_ref()], &ASSET_TREE_PROGRAM_ID)
}

/// Collection-verification signer PDA, used by the asset-tree program when
/// minting into a verified collection
pub fn collection_cpi_signer() -> (Pubkey, u8) {
    derive(&[COLLECTION_CPI_SEED], &ASSET_TREE_PROGRAM_ID)
}

/// Asset ID of a leaf, seeded by the tree address and the leaf index
pub fn leaf_asset_id(tree: &Pubkey, leaf_index: u64) -> (Pubkey, u8) {
    derive(
        &[ASSET_SEED, tree.as_ref(), &leaf_index.to_le_bytes()],
        &ASSET_TREE_PROGRAM_ID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_authority_round_trip() {
        let tree = Pubkey::new_unique();

        let (addr_a, bump_a) = tree_authority(&tree);
        let (addr_b, bump_b) = tree_authority(&tree);

        // Identical inputs must derive the identical address and bump.
        assert_eq!(addr_a, addr_b);
        assert_eq!(bump_a, bump_b);
        assert_ne!(addr_a, tree);
    }

    #[test]
    fn test_derived_addresses_are_off_curve() {
        let tree = Pubkey::new_unique();

        let (authority, _) = tree_authority(&tree);
        let (signer, _) = collection_cpi_signer();
        let (asset, _) = leaf_asset_id(&tree, 0);

        assert!(!authority.is_on_curve());
        assert!(!signer.is_on_curve());
        assert!(!asset.is_on_curve());
    }

    #[test]
    fn test_leaf_asset_ids_distinct_per_index() {
        let tree = Pubkey::new_unique();

        let (asset_0, _) = leaf_asset_id(&tree, 0);
        let (asset_1, _) = leaf_asset_id(&tree, 1);
        assert_ne!(asset_0, asset_1);
    }
}
