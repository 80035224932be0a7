//! Instruction Builders for Tree Mutations
//!
//! Builds the mutation instructions the asset-tree program accepts:
//! tree creation, leaf minting (plain and into a verified collection),
//! leaf transfer and leaf burn. Builders are pure; they compose in-memory
//! instruction descriptors and never touch the network.
//!
//! Argument payloads are an 8-byte instruction discriminator followed by
//! borsh-serialized arguments. Discriminators are derived from the
//! instruction name the same way the program's framework derives them.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use solana_sdk::system_program;
use thiserror::Error;

use crate::tree::pda::{
    self, ACCOUNT_COMPRESSION_PROGRAM_ID, ASSET_TREE_PROGRAM_ID, NOOP_PROGRAM_ID,
    TOKEN_METADATA_PROGRAM_ID,
};
use crate::tree::proof;
use crate::tree::types::{
    merkle_tree_account_size, DepthSizePair, LeafLocation, LeafMetadata, TreeHandle,
};

/// Instruction assembly errors
#[derive(Debug, Error)]
pub enum InstructionError {
    /// Metadata failed validation; rejected up front, never retried
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Proof trimming failed (stale or corrupt proof)
    #[error(transparent)]
    Proof(#[from] proof::ProofError),

    /// A leaf index too large to encode in the instruction payload
    #[error("leaf index {0} does not fit the instruction payload")]
    LeafIndexOverflow(u64),

    /// Borsh serialization failure
    #[error("failed to serialize instruction arguments: {0}")]
    Serialize(String),
}

/// 8-byte instruction discriminator: sha256("global:<name>")[..8]
fn discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    digest[..8].try_into().unwrap()
}

/// Discriminator followed by borsh-serialized arguments
fn instruction_data<T: BorshSerialize>(name: &str, args: &T) -> Result<Vec<u8>, InstructionError> {
    let mut data = discriminator(name).to_vec();
    args.serialize(&mut data)
        .map_err(|e| InstructionError::Serialize(e.to_string()))?;
    Ok(data)
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(BorshSerialize, BorshDeserialize, Debug)]
struct CreateTreeArgs {
    max_depth: u32,
    max_buffer_size: u32,
    public: Option<bool>,
}

/// Fixed argument tuple shared by transfer and burn. The nonce and index
/// both carry the leaf index.
#[derive(BorshSerialize, BorshDeserialize, Debug)]
struct LeafArgs {
    root: [u8; 32],
    data_hash: [u8; 32],
    creator_hash: [u8; 32],
    nonce: u64,
    index: u32,
}

impl LeafArgs {
    fn new(
        leaf: &LeafLocation,
        root: [u8; 32],
        data_hash: [u8; 32],
        creator_hash: [u8; 32],
    ) -> Result<Self, InstructionError> {
        let index = u32::try_from(leaf.leaf_index)
            .map_err(|_| InstructionError::LeafIndexOverflow(leaf.leaf_index))?;
        Ok(Self {
            root,
            data_hash,
            creator_hash,
            nonce: leaf.nonce(),
            index,
        })
    }
}

/// Addresses of a pre-existing collection the leaf is minted into
#[derive(Debug, Clone, Copy)]
pub struct CollectionAccounts {
    /// Authority over the collection (must sign)
    pub authority: Pubkey,
    /// Collection mint address
    pub mint: Pubkey,
    /// Collection metadata account
    pub metadata: Pubkey,
    /// Collection master edition account
    pub master_edition: Pubkey,
}

// ============================================================================
// Builders
// ============================================================================

/// Build the create-tree instruction pair: allocate the tree account under
/// the compression program, then initialize it with a derived authority.
/// The payer is the fee payer and becomes the initial tree delegate.
///
/// `rent_lamports` is the rent-exempt minimum for the allocated size; the
/// caller fetches it from the ledger for `merkle_tree_account_size`.
pub fn create_tree(
    payer: &Pubkey,
    tree: &Pubkey,
    pair: DepthSizePair,
    canopy_depth: u32,
    rent_lamports: u64,
) -> Result<[Instruction; 2], InstructionError> {
    let size = merkle_tree_account_size(pair.max_depth, pair.max_buffer_size, canopy_depth);
    let alloc = system_instruction::create_account(
        payer,
        tree,
        rent_lamports,
        size as u64,
        &ACCOUNT_COMPRESSION_PROGRAM_ID,
    );

    let (tree_authority, _) = pda::tree_authority(tree);
    let accounts = vec![
        AccountMeta::new(tree_authority, false),
        AccountMeta::new(*tree, false),
        AccountMeta::new(*payer, true),
        // tree creator; the payer holds the delegate role after creation
        AccountMeta::new_readonly(*payer, true),
        AccountMeta::new_readonly(NOOP_PROGRAM_ID, false),
        AccountMeta::new_readonly(ACCOUNT_COMPRESSION_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    let data = instruction_data(
        "create_tree",
        &CreateTreeArgs {
            max_depth: pair.max_depth,
            max_buffer_size: pair.max_buffer_size,
            public: Some(true),
        },
    )?;

    let init = Instruction {
        program_id: ASSET_TREE_PROGRAM_ID,
        accounts,
        data,
    };
    Ok([alloc, init])
}

/// Build a mint instruction for a fresh leaf. Minting targets an as-yet
/// unset leaf, so no proof is required.
pub fn mint_v1(
    payer: &Pubkey,
    tree: &Pubkey,
    leaf_owner: &Pubkey,
    leaf_delegate: &Pubkey,
    tree_delegate: &Pubkey,
    metadata: &LeafMetadata,
) -> Result<Instruction, InstructionError> {
    metadata.validate()?;

    let (tree_authority, _) = pda::tree_authority(tree);
    let accounts = vec![
        AccountMeta::new(tree_authority, false),
        AccountMeta::new_readonly(*leaf_owner, false),
        AccountMeta::new_readonly(*leaf_delegate, false),
        AccountMeta::new(*tree, false),
        AccountMeta::new_readonly(*payer, true),
        AccountMeta::new_readonly(*tree_delegate, true),
        AccountMeta::new_readonly(NOOP_PROGRAM_ID, false),
        AccountMeta::new_readonly(ACCOUNT_COMPRESSION_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Ok(Instruction {
        program_id: ASSET_TREE_PROGRAM_ID,
        accounts,
        data: instruction_data("mint_v1", metadata)?,
    })
}

/// Build a mint instruction that also verifies membership in an existing
/// collection. Requires the collection-verification signer PDA and the
/// collection's mint/metadata/master-edition accounts.
pub fn mint_to_collection_v1(
    payer: &Pubkey,
    tree: &Pubkey,
    leaf_owner: &Pubkey,
    leaf_delegate: &Pubkey,
    tree_delegate: &Pubkey,
    collection: &CollectionAccounts,
    metadata: &LeafMetadata,
) -> Result<Instruction, InstructionError> {
    metadata.validate()?;

    let (tree_authority, _) = pda::tree_authority(tree);
    let (collection_signer, _) = pda::collection_cpi_signer();
    let accounts = vec![
        AccountMeta::new(tree_authority, false),
        AccountMeta::new_readonly(*leaf_owner, false),
        AccountMeta::new_readonly(*leaf_delegate, false),
        AccountMeta::new(*tree, false),
        AccountMeta::new_readonly(*payer, true),
        AccountMeta::new_readonly(*tree_delegate, true),
        AccountMeta::new_readonly(collection.authority, true),
        // no delegated collection authority record; the program id marks "none"
        AccountMeta::new_readonly(ASSET_TREE_PROGRAM_ID, false),
        AccountMeta::new_readonly(collection.mint, false),
        AccountMeta::new(collection.metadata, false),
        AccountMeta::new_readonly(collection.master_edition, false),
        AccountMeta::new_readonly(collection_signer, false),
        AccountMeta::new_readonly(NOOP_PROGRAM_ID, false),
        AccountMeta::new_readonly(ACCOUNT_COMPRESSION_PROGRAM_ID, false),
        AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Ok(Instruction {
        program_id: ASSET_TREE_PROGRAM_ID,
        accounts,
        data: instruction_data("mint_to_collection_v1", metadata)?,
    })
}

/// Build a transfer instruction for an existing leaf. The proof is trimmed
/// to the tree's canopy depth and appended as readonly accounts.
///
/// Either the current owner or the current delegate must sign the final
/// transaction; the owner slot carries the signer flag here.
#[allow(clippy::too_many_arguments)]
pub fn transfer(
    tree: &TreeHandle,
    leaf: &LeafLocation,
    owner: &Pubkey,
    delegate: &Pubkey,
    new_owner: &Pubkey,
    proof_path: &[Pubkey],
    root: [u8; 32],
    data_hash: [u8; 32],
    creator_hash: [u8; 32],
) -> Result<Instruction, InstructionError> {
    proof::expect_depth(proof_path, tree.max_depth as usize)?;
    let args = LeafArgs::new(leaf, root, data_hash, creator_hash)?;

    let mut accounts = vec![
        AccountMeta::new_readonly(tree.authority(), false),
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new_readonly(*delegate, false),
        AccountMeta::new_readonly(*new_owner, false),
        AccountMeta::new(tree.tree, false),
        AccountMeta::new_readonly(NOOP_PROGRAM_ID, false),
        AccountMeta::new_readonly(ACCOUNT_COMPRESSION_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    accounts.extend(proof::proof_accounts(
        proof_path,
        tree.canopy_depth as usize,
    )?);

    Ok(Instruction {
        program_id: ASSET_TREE_PROGRAM_ID,
        accounts,
        data: instruction_data("transfer", &args)?,
    })
}

/// Build a burn instruction for an existing leaf. Same proof handling and
/// signer rules as transfer.
#[allow(clippy::too_many_arguments)]
pub fn burn(
    tree: &TreeHandle,
    leaf: &LeafLocation,
    owner: &Pubkey,
    delegate: &Pubkey,
    proof_path: &[Pubkey],
    root: [u8; 32],
    data_hash: [u8; 32],
    creator_hash: [u8; 32],
) -> Result<Instruction, InstructionError> {
    proof::expect_depth(proof_path, tree.max_depth as usize)?;
    let args = LeafArgs::new(leaf, root, data_hash, creator_hash)?;

    let mut accounts = vec![
        AccountMeta::new_readonly(tree.authority(), false),
        AccountMeta::new_readonly(*owner, true),
        AccountMeta::new_readonly(*delegate, false),
        AccountMeta::new(tree.tree, false),
        AccountMeta::new_readonly(NOOP_PROGRAM_ID, false),
        AccountMeta::new_readonly(ACCOUNT_COMPRESSION_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    accounts.extend(proof::proof_accounts(
        proof_path,
        tree.canopy_depth as usize,
    )?);

    Ok(Instruction {
        program_id: ASSET_TREE_PROGRAM_ID,
        accounts,
        data: instruction_data("burn", &args)?,
    })
}

/// Append a reference marker to an instruction as a readonly non-signer
/// account, making the resulting transaction locatable by watchers.
pub fn append_reference(instruction: &mut Instruction, reference: &Pubkey) {
    instruction
        .accounts
        .push(AccountMeta::new_readonly(*reference, false));
}
