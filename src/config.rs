//! Environment-based Configuration for the leafmint Backend
//!
//! All secrets come from environment variables, never from hardcoded
//! values. The tree-creator signing key is an explicit credential carried
//! by this struct so several trees/identities can be served concurrently;
//! nothing key-related lives in module state.
//!
//! # Environment Variables
//!
//! - `LEAFMINT_NETWORK` - "mainnet", "testnet", or "devnet" (default: "devnet")
//! - `LEAFMINT_SOLANA_RPC` - Ledger RPC endpoint URL
//! - `LEAFMINT_DAS_RPC` - Proof provider endpoint URL (default: the ledger RPC)
//! - `LEAFMINT_TREE_ADDRESS` - Address of the tree to mint into
//! - `LEAFMINT_TREE_CREATOR` - Tree creator keypair, JSON byte array
//! - `LEAFMINT_LABEL` - Display label for payment requests (default: "CNFT")
//! - `LEAFMINT_ICON` - Display icon URL for payment requests
//! - `LEAFMINT_URIS` - Comma-separated metadata URI pool (optional)
//! - `LEAFMINT_POLL_INTERVAL_MS` - Payment poll interval (default: 500)
//! - `LEAFMINT_LOG_LEVEL` - Logging level (default: "info")

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(ConfigError::InvalidValue(
                "LEAFMINT_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get default ledger RPC for this network
    pub fn default_rpc(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.mainnet-beta.solana.com",
            Network::Testnet => "https://api.testnet.solana.com",
            Network::Devnet => "https://api.devnet.solana.com",
        }
    }

    /// Explorer cluster query suffix for printed transaction links
    pub fn explorer_suffix(&self) -> &'static str {
        match self {
            Network::Mainnet => "",
            Network::Testnet => "?cluster=testnet",
            Network::Devnet => "?cluster=devnet",
        }
    }
}

/// Main configuration struct
#[derive(Clone)]
pub struct LeafmintConfig {
    /// Network environment
    pub network: Network,

    /// Ledger RPC endpoint
    pub solana_rpc: String,

    /// Proof provider (DAS) endpoint
    pub das_rpc: String,

    /// Tree the mint endpoint targets, once one exists
    pub tree_address: Option<Pubkey>,

    /// Tree creator keypair; signs as tree delegate on server-built mints
    pub tree_creator: Option<Arc<Keypair>>,

    /// Display label for payment requests
    pub label: String,

    /// Display icon URL for payment requests
    pub icon: String,

    /// Metadata URI pool; empty means built-in defaults
    pub uris: Vec<String>,

    /// Payment watcher poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Log level
    pub log_level: String,
}

impl LeafmintConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let network: Network = env::var("LEAFMINT_NETWORK")
            .unwrap_or_else(|_| "devnet".to_string())
            .parse()?;

        let solana_rpc = env::var("LEAFMINT_SOLANA_RPC")
            .unwrap_or_else(|_| network.default_rpc().to_string());

        // the proof provider is usually the same DAS-capable endpoint
        let das_rpc = env::var("LEAFMINT_DAS_RPC").unwrap_or_else(|_| solana_rpc.clone());

        let tree_address = match env::var("LEAFMINT_TREE_ADDRESS") {
            Ok(value) => Some(Pubkey::from_str(&value).map_err(|e| {
                ConfigError::InvalidValue("LEAFMINT_TREE_ADDRESS".to_string(), e.to_string())
            })?),
            Err(_) => None,
        };

        let tree_creator = match env::var("LEAFMINT_TREE_CREATOR") {
            Ok(value) => Some(Arc::new(parse_keypair_json(
                "LEAFMINT_TREE_CREATOR",
                &value,
            )?)),
            Err(_) => None,
        };

        let label = env::var("LEAFMINT_LABEL").unwrap_or_else(|_| "CNFT".to_string());
        let icon = env::var("LEAFMINT_ICON").unwrap_or_else(|_| {
            "https://solana.com/src/img/branding/solanaLogoMark.svg".to_string()
        });

        let uris = env::var("LEAFMINT_URIS")
            .map(|value| {
                value
                    .split(',')
                    .map(|uri| uri.trim().to_string())
                    .filter(|uri| !uri.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let poll_interval_ms = env::var("LEAFMINT_POLL_INTERVAL_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(500);

        let log_level = env::var("LEAFMINT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            network,
            solana_rpc,
            das_rpc,
            tree_address,
            tree_creator,
            label,
            icon,
            uris,
            poll_interval_ms,
            log_level,
        })
    }

    /// The tree address, required for any mint-serving mode
    pub fn require_tree_address(&self) -> Result<Pubkey, ConfigError> {
        self.tree_address
            .ok_or_else(|| ConfigError::MissingEnvVar("LEAFMINT_TREE_ADDRESS".to_string()))
    }

    /// The tree creator keypair, required for signing server-built mints
    pub fn require_tree_creator(&self) -> Result<Arc<Keypair>, ConfigError> {
        self.tree_creator
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("LEAFMINT_TREE_CREATOR".to_string()))
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        use solana_sdk::signature::Signer;

        println!("=== leafmint Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Ledger RPC: {}", self.solana_rpc);
        println!("Proof provider: {}", self.das_rpc);
        match self.tree_address {
            Some(tree) => println!("Tree: {}", tree),
            None => println!("Tree: (not configured)"),
        }
        match &self.tree_creator {
            Some(keypair) => println!("Tree creator: {}", keypair.pubkey()),
            None => println!("Tree creator: (not configured)"),
        }
        println!("Poll interval: {} ms", self.poll_interval_ms);
        println!("Log level: {}", self.log_level);
        println!("==============================");
    }
}

/// Parse a keypair from the JSON byte-array format wallets export
fn parse_keypair_json(var_name: &str, value: &str) -> Result<Keypair, ConfigError> {
    let bytes: Vec<u8> = serde_json::from_str(value)
        .map_err(|e| ConfigError::InvalidValue(var_name.to_string(), e.to_string()))?;
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| ConfigError::InvalidValue(var_name.to_string(), e.to_string()))
}

/// Load a keypair from a JSON byte-array file
pub fn load_keypair_from_file(path: &str) -> Result<Keypair, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::InvalidValue(path.to_string(), e.to_string()))?;
    parse_keypair_json(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Signer;

    #[test]
    fn test_network_parsing() {
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Mainnet)));
        assert!(matches!("testnet".parse::<Network>(), Ok(Network::Testnet)));
        assert!(matches!("devnet".parse::<Network>(), Ok(Network::Devnet)));
        assert!("invalid".parse::<Network>().is_err());
    }

    #[test]
    fn test_keypair_json_round_trip() {
        let keypair = Keypair::new();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        let parsed = parse_keypair_json("TEST_KEY", &json).unwrap();
        assert_eq!(parsed.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_keypair_json_rejects_garbage() {
        assert!(parse_keypair_json("TEST_KEY", "not json").is_err());
        assert!(parse_keypair_json("TEST_KEY", "[1,2,3]").is_err());
    }
}
