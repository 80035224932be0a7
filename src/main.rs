//! leafmint Backend - Mint API and Tree Operations
//!
//! Run modes:
//!   cargo run -- api          - Start REST API (for wallets/frontend)
//!   cargo run -- create-tree  - Create a new asset tree
//!   cargo run -- demo         - Offline walkthrough of derivations/sizing

use leafmint::config::LeafmintConfig;
use leafmint::service::MintService;
use leafmint::tree::types::{merkle_tree_account_size, DepthSizePair};
use leafmint::{api, logging};
use std::env;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => run_api_server(&args[2..]).await,
        "create-tree" => run_create_tree(&args[2..]).await,
        "demo" => run_demo(),
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("leafmint Backend - Compressed-Asset Mint Server");
    println!();
    println!("Usage:");
    println!("  leafmint-api api [--port <port>]                Start REST API server (default: 3001)");
    println!("  leafmint-api create-tree [--depth <n>] [--buffer <n>] [--canopy <n>]");
    println!("                                                  Create a new asset tree");
    println!("  leafmint-api demo                               Offline derivation walkthrough");
    println!();
    println!("Environment Variables:");
    println!("  LEAFMINT_NETWORK        mainnet | testnet | devnet (default: devnet)");
    println!("  LEAFMINT_SOLANA_RPC     Ledger RPC endpoint");
    println!("  LEAFMINT_DAS_RPC        Proof provider endpoint (default: ledger RPC)");
    println!("  LEAFMINT_TREE_ADDRESS   Tree the mint endpoint targets");
    println!("  LEAFMINT_TREE_CREATOR   Tree creator keypair (JSON byte array)");
    println!("  LEAFMINT_LOG_LEVEL      Logging level (default: info)");
    println!("  API_PORT                REST API port (default: 3001)");
}

fn load_config() -> Option<LeafmintConfig> {
    match LeafmintConfig::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            None
        }
    }
}

/// Start REST API server
async fn run_api_server(args: &[String]) {
    let mut port: u16 = env::var("API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    // Parse arguments
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port = args[i + 1].parse().unwrap_or(3001);
                i += 2;
            }
            _ => i += 1,
        }
    }

    let Some(config) = load_config() else { return };
    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }
    config.print_summary();

    if config.require_tree_address().is_err() || config.require_tree_creator().is_err() {
        eprintln!("API mode needs LEAFMINT_TREE_ADDRESS and LEAFMINT_TREE_CREATOR set.");
        eprintln!("Run `leafmint-api create-tree` first to create a tree.");
        return;
    }

    let service = MintService::from_config(config);
    if let Err(e) = api::start_server(service, port).await {
        eprintln!("API server error: {}", e);
    }
}

/// Create a new asset tree and print the address to configure
async fn run_create_tree(args: &[String]) {
    let mut depth: u32 = 14;
    let mut buffer: u32 = 64;
    let mut canopy: u32 = 0;

    // Parse arguments
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--depth" if i + 1 < args.len() => {
                depth = args[i + 1].parse().unwrap_or(14);
                i += 2;
            }
            "--buffer" if i + 1 < args.len() => {
                buffer = args[i + 1].parse().unwrap_or(64);
                i += 2;
            }
            "--canopy" if i + 1 < args.len() => {
                canopy = args[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            _ => i += 1,
        }
    }

    let Some(config) = load_config() else { return };
    if config.require_tree_creator().is_err() {
        eprintln!("create-tree needs LEAFMINT_TREE_CREATOR set (JSON byte array).");
        return;
    }
    let network = config.network;

    println!("=== leafmint Tree Creation ===");
    println!();
    println!("Geometry:");
    println!("  Max depth:   {} ({} leaves)", depth, 1u64 << depth);
    println!("  Buffer size: {}", buffer);
    println!("  Canopy:      {}", canopy);
    println!(
        "  Account:     {} bytes",
        merkle_tree_account_size(depth, buffer, canopy)
    );
    println!();

    let service = MintService::from_config(config);
    let pair = DepthSizePair {
        max_depth: depth,
        max_buffer_size: buffer,
    };

    match service.create_tree(pair, canopy).await {
        Ok(created) => {
            println!("Tree created: {}", created.tree);
            println!(
                "https://explorer.solana.com/tx/{}{}",
                created.signature,
                network.explorer_suffix()
            );
            println!();
            println!("Set LEAFMINT_TREE_ADDRESS={} to serve mints from it.", created.tree);
        }
        Err(e) => eprintln!("Failed to create tree: {}", e),
    }
}

/// Offline walkthrough: derivations and account sizing, no network
fn run_demo() {
    use leafmint::tree::pda;
    use solana_sdk::signature::{Keypair, Signer};

    println!("\n=== leafmint Demo ===\n");

    let tree = Keypair::new().pubkey();
    let (authority, authority_bump) = pda::tree_authority(&tree);
    let (collection_signer, _) = pda::collection_cpi_signer();
    let (asset_0, _) = pda::leaf_asset_id(&tree, 0);

    println!("Sample tree:        {}", tree);
    println!("Tree authority:     {} (bump {})", authority, authority_bump);
    println!("Collection signer:  {}", collection_signer);
    println!("Asset ID of leaf 0: {}", asset_0);
    println!();

    println!("Account sizes:");
    for (depth, buffer, canopy) in [(3u32, 8u32, 0u32), (14, 64, 0), (14, 64, 10), (20, 256, 10)] {
        println!(
            "  depth {:>2}, buffer {:>3}, canopy {:>2}: {:>9} bytes ({} leaves)",
            depth,
            buffer,
            canopy,
            merkle_tree_account_size(depth, buffer, canopy),
            1u64 << depth,
        );
    }
    println!();

    println!("=== Flow Overview ===");
    println!();
    println!("1. CREATE (server-side, once):");
    println!("   - leafmint-api create-tree allocates and initializes the tree");
    println!();
    println!("2. MINT (wallet-facing):");
    println!("   - Wallet POSTs its account to /api/mint");
    println!("   - Server builds the mint, co-signs as tree delegate");
    println!("   - Wallet signs as fee payer and submits");
    println!("   - Changelog decoding recovers the new leaf index");
    println!();
    println!("3. PAYABLE MINT:");
    println!("   - As above with a reference marker appended");
    println!("   - Payment watcher polls until the marker lands on-chain");
    println!();
    println!("=== Demo Complete ===");
}
