//! leafmint Backend - Compressed-Asset Mint Server
//!
//! Server-side engine for minting and mutating compressed assets on an
//! on-chain Merkle tree:
//!
//! 1. **Mint API** - builds partially signed mint transactions for wallets
//!    (plain and payment-request flavored)
//! 2. **Tree operations** - create/transfer/burn against the asset tree,
//!    with canopy-aware proof handling
//! 3. **Changelog decoding** - recovers a freshly minted leaf's index from
//!    a confirmed transaction's execution trace
//! 4. **Payment watcher** - polls for a confirmed transaction carrying a
//!    reference marker
//!
//! End-user signing and submission happen in the wallet; the server only
//! co-signs with the tree creator key it holds.

pub mod api;
pub mod common;
pub mod config;
pub mod das;
pub mod logging;
pub mod payment;
pub mod rpc;
pub mod service;
pub mod transaction;
pub mod tree;
pub mod uri;

// Re-exports: root error type
pub use common::{LeafmintError, Result};

// Re-exports: configuration
pub use config::{load_keypair_from_file, ConfigError, LeafmintConfig, Network};

// Re-exports: service surface
pub use service::{CreatedTree, MintService, PayableMint};

// Re-exports: tree operations
pub use tree::{
    extract_leaf_index, ChangelogError, DepthSizePair, ExecutionTrace, LeafLocation,
    LeafMetadata, ProofError, TreeHandle,
};

// Re-exports: transaction assembly
pub use transaction::{AssembleError, RecentAnchor};

// Re-exports: payment watching
pub use payment::{PaymentState, PaymentValidator, PaymentWatchHandle, PaymentWatcherConfig};

// Re-exports: collaborator traits
pub use das::{AssetDetails, AssetProof, DasClient, ProofProvider};
pub use rpc::{LedgerRpc, SolanaRpc};
