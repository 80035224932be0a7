//! Mint Service
//!
//! Wires the engine together behind the operations the HTTP layer and CLI
//! consume: building (partially signed) mint transactions, creating trees,
//! transferring and burning leaves, recovering minted leaf indexes, and
//! watching for payment confirmations.
//!
//! Each call is independent and stateless; proofs and validity anchors are
//! fetched immediately before use so staleness windows stay minimal. The
//! ledger itself serializes conflicting mutations.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};

use crate::common::{LeafmintError, Result};
use crate::config::LeafmintConfig;
use crate::das::{DasClient, ProofProvider};
use crate::payment::{self, PaymentValidator, PaymentWatchHandle, PaymentWatcherConfig};
use crate::rpc::{LedgerRpc, RpcError, SolanaRpc};
use crate::transaction;
use crate::tree::changelog;
use crate::tree::instructions::{self, CollectionAccounts};
use crate::tree::pda::{self, ASSET_TREE_PROGRAM_ID};
use crate::tree::types::{
    merkle_tree_account_size, DepthSizePair, LeafLocation, TreeAccount,
};
use crate::uri::{MetadataSupplier, UriPool};

/// Message returned alongside payment-request transactions
const MINT_MESSAGE: &str = "Please approve the transaction to mint your NFT!";

/// A payable mint transaction plus its wallet-facing message
#[derive(Debug, Clone)]
pub struct PayableMint {
    pub transaction: String,
    pub message: String,
}

/// Outcome of creating a new tree
#[derive(Debug, Clone)]
pub struct CreatedTree {
    pub tree: Pubkey,
    pub signature: Signature,
}

/// The mint service
pub struct MintService {
    config: LeafmintConfig,
    rpc: Arc<dyn LedgerRpc>,
    proofs: Arc<dyn ProofProvider>,
    metadata: Arc<dyn MetadataSupplier>,
}

impl MintService {
    /// Create a service with production clients from configuration
    pub fn from_config(config: LeafmintConfig) -> Self {
        let rpc = Arc::new(SolanaRpc::new(config.solana_rpc.clone()));
        let proofs = Arc::new(DasClient::new(config.das_rpc.clone()));
        let metadata = Arc::new(UriPool::new(
            config.label.clone(),
            config.label.clone(),
            config.uris.clone(),
        ));
        Self::with_parts(config, rpc, proofs, metadata)
    }

    /// Create a service from explicit collaborators
    pub fn with_parts(
        config: LeafmintConfig,
        rpc: Arc<dyn LedgerRpc>,
        proofs: Arc<dyn ProofProvider>,
        metadata: Arc<dyn MetadataSupplier>,
    ) -> Self {
        Self {
            config,
            rpc,
            proofs,
            metadata,
        }
    }

    /// Display label for payment requests
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Display icon for payment requests
    pub fn icon(&self) -> &str {
        &self.config.icon
    }

    // ========================================================================
    // Mint Transactions
    // ========================================================================

    /// Build a partially signed mint transaction for `payer`. The payer
    /// becomes leaf owner, leaf delegate and fee payer; the tree creator
    /// co-signs as tree delegate and the payer's slot stays open.
    pub async fn build_mint_transaction(&self, payer: Option<&str>) -> Result<String> {
        let payer = parse_required_account(payer, "account")?;
        let ix = self.mint_instruction(&payer, None)?;
        self.assemble_for(&payer, &[ix]).await
    }

    /// As `build_mint_transaction`, with a reference marker appended so
    /// watchers can locate the submitted transaction.
    pub async fn build_payable_mint_transaction(
        &self,
        payer: Option<&str>,
        reference: Option<&str>,
    ) -> Result<PayableMint> {
        let payer = parse_required_account(payer, "account")?;
        let reference = parse_required_account(reference, "reference")?;

        let ix = self.mint_instruction(&payer, Some(&reference))?;
        let transaction = self.assemble_for(&payer, &[ix]).await?;
        Ok(PayableMint {
            transaction,
            message: MINT_MESSAGE.to_string(),
        })
    }

    /// Build a partially signed mint into a verified collection. The tree
    /// creator signs both as tree delegate and collection authority.
    pub async fn build_collection_mint_transaction(
        &self,
        payer: Option<&str>,
        collection_mint: &Pubkey,
        collection_metadata: &Pubkey,
        collection_master_edition: &Pubkey,
    ) -> Result<String> {
        let payer = parse_required_account(payer, "account")?;
        let tree = self.config.require_tree_address()?;
        let creator = self.config.require_tree_creator()?;

        let collection = CollectionAccounts {
            authority: creator.pubkey(),
            mint: *collection_mint,
            metadata: *collection_metadata,
            master_edition: *collection_master_edition,
        };
        let metadata = self
            .metadata
            .leaf_metadata(None)
            .with_collection(*collection_mint);

        let ix = instructions::mint_to_collection_v1(
            &payer,
            &tree,
            &payer,
            &payer,
            &creator.pubkey(),
            &collection,
            &metadata,
        )?;
        self.assemble_for(&payer, &[ix]).await
    }

    fn mint_instruction(
        &self,
        payer: &Pubkey,
        reference: Option<&Pubkey>,
    ) -> Result<solana_sdk::instruction::Instruction> {
        let tree = self.config.require_tree_address()?;
        let creator = self.config.require_tree_creator()?;
        let metadata = self.metadata.leaf_metadata(None);

        let mut ix =
            instructions::mint_v1(payer, &tree, payer, payer, &creator.pubkey(), &metadata)?;
        if let Some(reference) = reference {
            instructions::append_reference(&mut ix, reference);
        }
        Ok(ix)
    }

    /// Fetch a fresh anchor and assemble a transport-encoded transaction
    /// co-signed by the tree creator.
    async fn assemble_for(
        &self,
        fee_payer: &Pubkey,
        ixs: &[solana_sdk::instruction::Instruction],
    ) -> Result<String> {
        let creator = self.config.require_tree_creator()?;
        let anchor = self.rpc.get_recent_anchor().await?;
        let height = self.rpc.get_block_height().await?;
        Ok(transaction::assemble(
            ixs,
            fee_payer,
            &anchor,
            height,
            &[creator.as_ref()],
        )?)
    }

    // ========================================================================
    // Tree Lifecycle
    // ========================================================================

    /// Create a new tree: allocate and initialize in one transaction signed
    /// by the tree creator and the fresh tree keypair, then submit.
    pub async fn create_tree(
        &self,
        pair: DepthSizePair,
        canopy_depth: u32,
    ) -> Result<CreatedTree> {
        let creator = self.config.require_tree_creator()?;
        let tree_keypair = Keypair::new();

        let size = merkle_tree_account_size(pair.max_depth, pair.max_buffer_size, canopy_depth);
        let rent = self.rpc.minimum_balance_for_rent_exemption(size).await?;

        let ixs = instructions::create_tree(
            &creator.pubkey(),
            &tree_keypair.pubkey(),
            pair,
            canopy_depth,
            rent,
        )?;

        let anchor = self.rpc.get_recent_anchor().await?;
        let height = self.rpc.get_block_height().await?;
        let tx = transaction::partially_signed(
            &ixs,
            &creator.pubkey(),
            &anchor,
            height,
            &[creator.as_ref(), &tree_keypair],
        )?;

        let signature = self.rpc.send_transaction(&tx).await?;
        tracing::info!(tree = %tree_keypair.pubkey(), %signature, "tree created");
        Ok(CreatedTree {
            tree: tree_keypair.pubkey(),
            signature,
        })
    }

    // ========================================================================
    // Leaf Mutations
    // ========================================================================

    /// Transfer a leaf to a new owner, signing and submitting with the
    /// current owner's key. Fetches the freshest proof and tree state
    /// immediately before building.
    pub async fn transfer_leaf(
        &self,
        asset_id: &Pubkey,
        owner: &Keypair,
        new_owner: &Pubkey,
    ) -> Result<Signature> {
        let (details, proof) = tokio::join!(
            self.proofs.get_asset(asset_id),
            self.proofs.get_asset_proof(asset_id)
        );
        let details = details?;
        let proof = proof?;

        let handle = self.tree_handle(&details.tree).await?;
        let leaf = LeafLocation::new(details.tree, details.leaf_index);

        let ix = instructions::transfer(
            &handle,
            &leaf,
            &details.owner,
            &details.effective_delegate(),
            new_owner,
            &proof.proof,
            proof.root,
            details.data_hash,
            details.creator_hash,
        )?;
        self.sign_and_submit(&[ix], owner).await
    }

    /// Burn a leaf, signing and submitting with the current owner's key.
    pub async fn burn_leaf(&self, asset_id: &Pubkey, owner: &Keypair) -> Result<Signature> {
        let (details, proof) = tokio::join!(
            self.proofs.get_asset(asset_id),
            self.proofs.get_asset_proof(asset_id)
        );
        let details = details?;
        let proof = proof?;

        let handle = self.tree_handle(&details.tree).await?;
        let leaf = LeafLocation::new(details.tree, details.leaf_index);

        let ix = instructions::burn(
            &handle,
            &leaf,
            &details.owner,
            &details.effective_delegate(),
            &proof.proof,
            proof.root,
            details.data_hash,
            details.creator_hash,
        )?;
        self.sign_and_submit(&[ix], owner).await
    }

    async fn tree_handle(&self, tree: &Pubkey) -> Result<crate::tree::types::TreeHandle> {
        let data = self.rpc.get_account_data(tree).await?;
        let account = TreeAccount::parse(&data)?;
        Ok(account.handle(*tree))
    }

    async fn sign_and_submit(
        &self,
        ixs: &[solana_sdk::instruction::Instruction],
        signer: &Keypair,
    ) -> Result<Signature> {
        let anchor = self.rpc.get_recent_anchor().await?;
        let height = self.rpc.get_block_height().await?;
        let tx =
            transaction::partially_signed(ixs, &signer.pubkey(), &anchor, height, &[signer])?;
        self.rpc
            .send_transaction(&tx)
            .await
            .map_err(classify_rejection)
    }

    // ========================================================================
    // Result Resolution
    // ========================================================================

    /// Recover the index of the leaf a confirmed mint created. A failure
    /// here means "mint submitted, index unresolved" - the mint itself may
    /// well have landed.
    pub async fn extract_leaf_index(&self, signature: &Signature) -> Result<u64> {
        let trace = self.rpc.get_execution_trace(signature).await?;
        Ok(changelog::extract_leaf_index(&trace, &ASSET_TREE_PROGRAM_ID)?)
    }

    /// Recover the asset ID of the leaf a confirmed mint created.
    pub async fn extract_asset_id(&self, signature: &Signature) -> Result<Pubkey> {
        let tree = self.config.require_tree_address()?;
        let leaf_index = self.extract_leaf_index(signature).await?;
        Ok(pda::leaf_asset_id(&tree, leaf_index).0)
    }

    // ========================================================================
    // Payment Watching
    // ========================================================================

    /// Start watching for a confirmed transaction carrying `reference`.
    pub fn watch_payment(
        &self,
        reference: Pubkey,
        validator: PaymentValidator,
    ) -> PaymentWatchHandle {
        payment::watch(
            self.rpc.clone(),
            reference,
            validator,
            PaymentWatcherConfig {
                poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            },
        )
    }
}

/// Parse an account string that must be present and well-formed.
fn parse_required_account(value: Option<&str>, what: &str) -> Result<Pubkey> {
    let value = value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LeafmintError::missing_account(format!("{what} not provided")))?;
    Pubkey::from_str(value)
        .map_err(|_| LeafmintError::missing_account(format!("{what} is not a valid address")))
}

/// Classify a submission rejection. The engine cannot verify roots itself;
/// the compression program's rejection of a mismatched root is the stale
/// signal, and it names the proof or root in its message.
fn classify_rejection(error: RpcError) -> LeafmintError {
    let message = error.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("root") || lowered.contains("proof") {
        LeafmintError::stale_proof(message)
    } else {
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::das::{AssetDetails, AssetProof, MockProofProvider};
    use crate::rpc::MockLedgerRpc;
    use crate::transaction::RecentAnchor;
    use crate::tree::changelog::{ExecutionTrace, InnerInstructions, TraceInstruction};
    use crate::tree::pda::NOOP_PROGRAM_ID;
    use borsh::BorshSerialize;
    use solana_sdk::hash::Hash;

    fn test_config(creator: &Keypair) -> LeafmintConfig {
        LeafmintConfig {
            network: crate::config::Network::Devnet,
            solana_rpc: "http://localhost:8899".to_string(),
            das_rpc: "http://localhost:8899".to_string(),
            tree_address: Some(Pubkey::new_unique()),
            tree_creator: Some(Arc::new(
                Keypair::try_from(creator.to_bytes().as_slice()).unwrap(),
            )),
            label: "CNFT".to_string(),
            icon: "https://example.com/icon.svg".to_string(),
            uris: vec!["https://example.com/rgb.json".to_string()],
            poll_interval_ms: 1,
            log_level: "info".to_string(),
        }
    }

    fn anchored_rpc() -> MockLedgerRpc {
        let mut rpc = MockLedgerRpc::new();
        rpc.expect_get_recent_anchor().returning(|| {
            Ok(RecentAnchor {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 1_000,
            })
        });
        rpc.expect_get_block_height().returning(|| Ok(500));
        rpc
    }

    fn service(config: LeafmintConfig, rpc: MockLedgerRpc) -> MintService {
        MintService::with_parts(
            config,
            Arc::new(rpc),
            Arc::new(MockProofProvider::new()),
            Arc::new(UriPool::default()),
        )
    }

    #[tokio::test]
    async fn test_build_mint_transaction() {
        let creator = Keypair::new();
        let payer = Keypair::new();
        let config = test_config(&creator);
        let tree = config.tree_address.unwrap();
        let service = service(config, anchored_rpc());

        let payload = service
            .build_mint_transaction(Some(&payer.pubkey().to_string()))
            .await
            .unwrap();

        let decoded = transaction::decode(&payload).unwrap();
        assert_eq!(decoded.message.account_keys[0], payer.pubkey());
        let (authority, _) = pda::tree_authority(&tree);
        assert!(decoded.message.account_keys.contains(&authority));
        assert!(decoded.message.account_keys.contains(&creator.pubkey()));
    }

    #[tokio::test]
    async fn test_missing_payer_rejected() {
        let creator = Keypair::new();
        let service = service(test_config(&creator), MockLedgerRpc::new());

        let err = service.build_mint_transaction(None).await.unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ACCOUNT");

        let err = service
            .build_mint_transaction(Some("definitely-not-an-address"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ACCOUNT");
    }

    #[tokio::test]
    async fn test_payable_mint_appends_reference() {
        let creator = Keypair::new();
        let payer = Keypair::new();
        let reference = Pubkey::new_unique();
        let service = service(test_config(&creator), anchored_rpc());

        let payable = service
            .build_payable_mint_transaction(
                Some(&payer.pubkey().to_string()),
                Some(&reference.to_string()),
            )
            .await
            .unwrap();

        let decoded = transaction::decode(&payable.transaction).unwrap();
        assert!(decoded.message.account_keys.contains(&reference));
        assert_eq!(payable.message, MINT_MESSAGE);
    }

    #[tokio::test]
    async fn test_payable_mint_requires_reference() {
        let creator = Keypair::new();
        let payer = Keypair::new();
        let service = service(test_config(&creator), MockLedgerRpc::new());

        let err = service
            .build_payable_mint_transaction(Some(&payer.pubkey().to_string()), None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_ACCOUNT");
    }

    #[tokio::test]
    async fn test_extract_leaf_index_from_trace() {
        let creator = Keypair::new();
        let config = test_config(&creator);

        let event = crate::tree::changelog::ChangelogEventV1 {
            id: [1u8; 32],
            path: vec![],
            seq: 1,
            index: 42,
        };
        let mut payload = vec![0u8, 0u8];
        event.serialize(&mut payload).unwrap();

        let trace = ExecutionTrace {
            account_keys: vec![ASSET_TREE_PROGRAM_ID, NOOP_PROGRAM_ID],
            instructions: vec![TraceInstruction {
                program_id_index: 0,
                accounts: vec![],
                data: vec![],
            }],
            inner_instructions: vec![InnerInstructions {
                index: 0,
                instructions: vec![TraceInstruction {
                    program_id_index: 1,
                    accounts: vec![],
                    data: payload,
                }],
            }],
            pre_balances: vec![],
            post_balances: vec![],
        };

        let mut rpc = MockLedgerRpc::new();
        rpc.expect_get_execution_trace()
            .returning(move |_| Ok(trace.clone()));
        let service = service(config, rpc);

        let index = service
            .extract_leaf_index(&Signature::default())
            .await
            .unwrap();
        assert_eq!(index, 42);
    }

    #[tokio::test]
    async fn test_transfer_leaf_builds_and_submits() {
        let creator = Keypair::new();
        let owner = Keypair::new();
        let new_owner = Pubkey::new_unique();
        let asset_id = Pubkey::new_unique();
        let tree = Pubkey::new_unique();

        let owner_pub = owner.pubkey();
        let mut proofs = MockProofProvider::new();
        proofs.expect_get_asset().returning(move |_| {
            Ok(AssetDetails {
                tree,
                owner: owner_pub,
                delegate: None,
                data_hash: [2u8; 32],
                creator_hash: [3u8; 32],
                leaf_index: 5,
            })
        });
        proofs.expect_get_asset_proof().returning(|_| {
            Ok(AssetProof {
                proof: (0..3).map(|_| Pubkey::new_unique()).collect(),
                root: [1u8; 32],
            })
        });

        // depth-3 tree account with no canopy
        let mut account = vec![0u8; merkle_tree_account_size(3, 8, 0)];
        account[0] = 1;
        account[2..6].copy_from_slice(&8u32.to_le_bytes());
        account[6..10].copy_from_slice(&3u32.to_le_bytes());

        let mut rpc = anchored_rpc();
        rpc.expect_get_account_data()
            .returning(move |_| Ok(account.clone()));
        rpc.expect_send_transaction()
            .returning(|_| Ok(Signature::default()));

        let service = MintService::with_parts(
            test_config(&creator),
            Arc::new(rpc),
            Arc::new(proofs),
            Arc::new(UriPool::default()),
        );

        let signature = service
            .transfer_leaf(&asset_id, &owner, &new_owner)
            .await
            .unwrap();
        assert_eq!(signature, Signature::default());
    }

    #[tokio::test]
    async fn test_stale_root_rejection_classified() {
        let error = RpcError::Request(
            "transaction simulation failed: invalid root recomputed from proof".to_string(),
        );
        let classified = classify_rejection(error);
        assert_eq!(classified.error_code(), "STALE_PROOF");
        assert!(classified.is_retryable());

        let other = RpcError::Request("connection reset".to_string());
        assert_eq!(classify_rejection(other).error_code(), "RPC_ERROR");
    }
}
