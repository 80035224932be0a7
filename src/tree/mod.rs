//! Compressed-Asset Tree Operations
//!
//! Everything needed to mutate an on-chain compressed-asset tree from the
//! server side:
//! - PDA derivation for the tree authority and related signers
//! - Canopy-aware proof path trimming
//! - Instruction builders for create/mint/transfer/burn
//! - Changelog event decoding to recover a freshly minted leaf index

pub mod changelog;
pub mod instructions;
pub mod pda;
pub mod proof;
pub mod types;

pub use changelog::{extract_leaf_index, ChangelogError, ExecutionTrace};
pub use instructions::InstructionError;
pub use proof::ProofError;
pub use types::{
    Creator, DepthSizePair, LeafLocation, LeafMetadata, TreeAccount, TreeAccountError, TreeHandle,
};
