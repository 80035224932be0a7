//! Core Types for Compressed-Asset Tree Operations
//!
//! Data model for trees, leaves and leaf metadata, plus the parser for the
//! on-chain tree account header. The metadata structs are borsh-serialized
//! directly into instruction payloads, so field order here is the on-wire
//! order expected by the asset-tree program.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::tree::pda;

// ============================================================================
// Tree
// ============================================================================

/// Tree geometry: how many leaves it can hold and how many concurrent
/// mutations its changelog buffer absorbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthSizePair {
    pub max_depth: u32,
    pub max_buffer_size: u32,
}

/// Handle to an existing tree. The authority address is always derived from
/// the tree address, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHandle {
    /// Address of the tree account
    pub tree: Pubkey,
    /// Tree depth at creation
    pub max_depth: u32,
    /// Changelog buffer size at creation
    pub max_buffer_size: u32,
    /// Number of near-root proof levels cached on-chain
    pub canopy_depth: u32,
}

impl TreeHandle {
    /// Derive the tree authority PDA
    pub fn authority(&self) -> Pubkey {
        pda::tree_authority(&self.tree).0
    }
}

/// Location of a leaf within a tree. The index is assigned at mint time and
/// is the only stable identifier; the nonce mirrors it for leaves that have
/// never been transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafLocation {
    pub tree: Pubkey,
    pub leaf_index: u64,
}

impl LeafLocation {
    pub fn new(tree: Pubkey, leaf_index: u64) -> Self {
        Self { tree, leaf_index }
    }

    /// The leaf nonce, which mirrors the leaf index
    pub fn nonce(&self) -> u64 {
        self.leaf_index
    }

    /// Derive the asset ID for this leaf
    pub fn asset_id(&self) -> Pubkey {
        pda::leaf_asset_id(&self.tree, self.leaf_index).0
    }
}

// ============================================================================
// Leaf Metadata
// ============================================================================

/// Royalty share recipient
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    pub address: Pubkey,
    pub verified: bool,
    /// Share percentage; all creator shares must sum to 100
    pub share: u8,
}

/// Reference to a collection the leaf belongs to
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub verified: bool,
    pub key: Pubkey,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseMethod {
    Burn,
    Multiple,
    Single,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Uses {
    pub use_method: UseMethod,
    pub remaining: u64,
    pub total: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStandard {
    NonFungible,
    FungibleAsset,
    Fungible,
    NonFungibleEdition,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenProgramVersion {
    Original,
    Token2022,
}

/// Metadata of a compressed leaf. Immutable once minted; this engine only
/// validates it, the protocol enforces immutability.
///
/// Field order is the on-wire borsh order of the asset-tree program's
/// metadata argument. Do not reorder.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct LeafMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
    pub primary_sale_happened: bool,
    pub is_mutable: bool,
    pub edition_nonce: Option<u8>,
    pub token_standard: Option<TokenStandard>,
    pub collection: Option<CollectionRef>,
    pub uses: Option<Uses>,
    pub token_program_version: TokenProgramVersion,
    pub creators: Vec<Creator>,
}

/// Metadata field limits enforced by the token metadata program
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_SYMBOL_LEN: usize = 10;
pub const MAX_URI_LEN: usize = 200;
pub const MAX_CREATORS: usize = 5;
pub const MAX_SELLER_FEE_BASIS_POINTS: u16 = 10_000;

impl LeafMetadata {
    /// Plain non-fungible leaf metadata with sane defaults
    pub fn non_fungible(
        name: impl Into<String>,
        symbol: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            uri: uri.into(),
            seller_fee_basis_points: 0,
            primary_sale_happened: false,
            is_mutable: false,
            edition_nonce: Some(0),
            token_standard: Some(TokenStandard::NonFungible),
            collection: None,
            uses: None,
            token_program_version: TokenProgramVersion::Original,
            creators: Vec::new(),
        }
    }

    /// Attach an unverified collection reference; the asset-tree program
    /// verifies it during a collection mint.
    pub fn with_collection(mut self, collection_mint: Pubkey) -> Self {
        self.collection = Some(CollectionRef {
            verified: false,
            key: collection_mint,
        });
        self
    }

    /// Replace the creator list
    pub fn with_creators(mut self, creators: Vec<Creator>) -> Self {
        self.creators = creators;
        self
    }

    /// Validate the metadata before it is baked into a mint instruction.
    pub fn validate(&self) -> Result<(), super::instructions::InstructionError> {
        use super::instructions::InstructionError::InvalidMetadata;

        if self.name.len() > MAX_NAME_LEN {
            return Err(InvalidMetadata(format!(
                "name exceeds {} bytes",
                MAX_NAME_LEN
            )));
        }
        if self.symbol.len() > MAX_SYMBOL_LEN {
            return Err(InvalidMetadata(format!(
                "symbol exceeds {} bytes",
                MAX_SYMBOL_LEN
            )));
        }
        if self.uri.len() > MAX_URI_LEN {
            return Err(InvalidMetadata(format!("uri exceeds {} bytes", MAX_URI_LEN)));
        }
        if self.seller_fee_basis_points > MAX_SELLER_FEE_BASIS_POINTS {
            return Err(InvalidMetadata(format!(
                "seller fee {} exceeds {} basis points",
                self.seller_fee_basis_points, MAX_SELLER_FEE_BASIS_POINTS
            )));
        }
        if self.creators.len() > MAX_CREATORS {
            return Err(InvalidMetadata(format!(
                "{} creators exceeds the maximum of {}",
                self.creators.len(),
                MAX_CREATORS
            )));
        }
        if !self.creators.is_empty() {
            let total: u32 = self.creators.iter().map(|c| u32::from(c.share)).sum();
            if total != 100 {
                return Err(InvalidMetadata(format!(
                    "creator shares sum to {}, expected 100",
                    total
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tree Account Parsing
// ============================================================================

/// Tree account parsing errors
#[derive(Debug, Error)]
pub enum TreeAccountError {
    #[error("account data too short: {0} bytes")]
    TooShort(usize),

    #[error("account is not a concurrent merkle tree (type {0})")]
    NotATree(u8),

    #[error("unsupported tree header version: {0}")]
    UnsupportedVersion(u8),

    #[error("account size {got} does not match geometry (expected at least {expected})")]
    SizeMismatch { got: usize, expected: usize },
}

/// Account type tag for an initialized concurrent merkle tree
const TREE_ACCOUNT_TYPE: u8 = 1;
/// Header version tag this parser understands
const TREE_HEADER_V1: u8 = 0;
/// Header: type(1) + version(1) + max_buffer_size(4) + max_depth(4)
///         + authority(32) + creation_slot(8) + padding(6)
const TREE_HEADER_LEN: usize = 56;

/// Parsed view of an on-chain tree account's header and geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeAccount {
    pub max_depth: u32,
    pub max_buffer_size: u32,
    pub authority: Pubkey,
    pub creation_slot: u64,
    pub canopy_depth: u32,
}

impl TreeAccount {
    /// Parse the header of a tree account and infer its canopy depth from
    /// the account length.
    pub fn parse(data: &[u8]) -> Result<Self, TreeAccountError> {
        if data.len() < TREE_HEADER_LEN {
            return Err(TreeAccountError::TooShort(data.len()));
        }
        if data[0] != TREE_ACCOUNT_TYPE {
            return Err(TreeAccountError::NotATree(data[0]));
        }
        if data[1] != TREE_HEADER_V1 {
            return Err(TreeAccountError::UnsupportedVersion(data[1]));
        }

        let max_buffer_size = u32::from_le_bytes(data[2..6].try_into().unwrap());
        let max_depth = u32::from_le_bytes(data[6..10].try_into().unwrap());
        let authority = Pubkey::try_from(&data[10..42]).unwrap();
        let creation_slot = u64::from_le_bytes(data[42..50].try_into().unwrap());

        let body = tree_body_size(max_depth, max_buffer_size);
        let minimum = TREE_HEADER_LEN + body;
        if data.len() < minimum {
            return Err(TreeAccountError::SizeMismatch {
                got: data.len(),
                expected: minimum,
            });
        }

        let canopy_bytes = data.len() - minimum;
        let canopy_depth = canopy_depth_for_bytes(canopy_bytes);

        Ok(Self {
            max_depth,
            max_buffer_size,
            authority,
            creation_slot,
            canopy_depth,
        })
    }

    /// Build a handle from the parsed account
    pub fn handle(&self, tree: Pubkey) -> TreeHandle {
        TreeHandle {
            tree,
            max_depth: self.max_depth,
            max_buffer_size: self.max_buffer_size,
            canopy_depth: self.canopy_depth,
        }
    }
}

/// Size of the tree body past the header: sequence number, active index and
/// buffer size counters, the changelog ring buffer, and the rightmost path.
fn tree_body_size(max_depth: u32, max_buffer_size: u32) -> usize {
    let depth = max_depth as usize;
    // changelog entry and rightmost path are both: 32 * depth + 40 bytes
    let entry = 32 * depth + 40;
    24 + (max_buffer_size as usize + 1) * entry
}

/// Number of cached canopy node bytes for a given canopy depth
fn canopy_size(canopy_depth: u32) -> usize {
    if canopy_depth == 0 {
        return 0;
    }
    ((1usize << (canopy_depth + 1)) - 2) * 32
}

/// Invert `canopy_size`, rounding down for unexpected trailing bytes
fn canopy_depth_for_bytes(canopy_bytes: usize) -> u32 {
    let nodes = canopy_bytes / 32;
    let mut depth = 0u32;
    while ((1usize << (depth + 2)) - 2) <= nodes {
        depth += 1;
    }
    depth
}

/// Total account size for a tree with the given geometry. This is the size
/// the allocation instruction must request.
pub fn merkle_tree_account_size(
    max_depth: u32,
    max_buffer_size: u32,
    canopy_depth: u32,
) -> usize {
    TREE_HEADER_LEN + tree_body_size(max_depth, max_buffer_size) + canopy_size(canopy_depth)
}
