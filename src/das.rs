//! Proof Provider Client
//!
//! Talks to the off-chain indexer that serves compressed-asset state: the
//! leaf's current ownership and hashes, and the Merkle proof needed to
//! mutate it. Behind a trait so transfer/burn flows are testable without a
//! live indexer.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use thiserror::Error;

/// Proof provider errors
#[derive(Debug, Error)]
pub enum DasError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("malformed provider response: {0}")]
    Parse(String),
}

/// Current state of a compressed leaf as the indexer sees it
#[derive(Debug, Clone)]
pub struct AssetDetails {
    pub tree: Pubkey,
    pub owner: Pubkey,
    /// Delegate, when one is set; mutations fall back to the owner
    pub delegate: Option<Pubkey>,
    pub data_hash: [u8; 32],
    pub creator_hash: [u8; 32],
    pub leaf_index: u64,
}

impl AssetDetails {
    /// The delegate address to put on a mutation, defaulting to the owner
    pub fn effective_delegate(&self) -> Pubkey {
        self.delegate.unwrap_or(self.owner)
    }
}

/// Merkle proof for a leaf, ordered leaf-to-root, plus the root it proves
#[derive(Debug, Clone)]
pub struct AssetProof {
    pub proof: Vec<Pubkey>,
    pub root: [u8; 32],
}

/// Operations the engine needs from the proof provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofProvider: Send + Sync {
    async fn get_asset(&self, asset_id: &Pubkey) -> Result<AssetDetails, DasError>;
    async fn get_asset_proof(&self, asset_id: &Pubkey) -> Result<AssetProof, DasError>;
}

// ============================================================================
// JSON-RPC wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AssetResult {
    compression: CompressionInfo,
    ownership: OwnershipInfo,
}

#[derive(Debug, Deserialize)]
struct CompressionInfo {
    tree: String,
    leaf_id: u64,
    data_hash: String,
    creator_hash: String,
}

#[derive(Debug, Deserialize)]
struct OwnershipInfo {
    owner: String,
    delegate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProofResult {
    proof: Vec<String>,
    root: String,
}

// ============================================================================
// Client
// ============================================================================

/// JSON-RPC client for a DAS-compatible indexer endpoint
pub struct DasClient {
    client: Client,
    url: String,
}

impl DasClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        asset_id: &Pubkey,
    ) -> Result<T, DasError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "leafmint",
            "method": method,
            "params": { "id": asset_id.to_string() },
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        let envelope: RpcEnvelope<T> = response.json().await?;

        if let Some(error) = envelope.error {
            if error.code == -32_000 || error.message.to_lowercase().contains("not found") {
                return Err(DasError::NotFound(asset_id.to_string()));
            }
            return Err(DasError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| DasError::Parse("response carries neither result nor error".to_string()))
    }
}

#[async_trait]
impl ProofProvider for DasClient {
    async fn get_asset(&self, asset_id: &Pubkey) -> Result<AssetDetails, DasError> {
        let result: AssetResult = self.call("getAsset", asset_id).await?;
        Ok(AssetDetails {
            tree: parse_pubkey(&result.compression.tree)?,
            owner: parse_pubkey(&result.ownership.owner)?,
            delegate: result
                .ownership
                .delegate
                .as_deref()
                .map(parse_pubkey)
                .transpose()?,
            data_hash: parse_hash(&result.compression.data_hash)?,
            creator_hash: parse_hash(&result.compression.creator_hash)?,
            leaf_index: result.compression.leaf_id,
        })
    }

    async fn get_asset_proof(&self, asset_id: &Pubkey) -> Result<AssetProof, DasError> {
        let result: ProofResult = self.call("getAssetProof", asset_id).await?;
        Ok(AssetProof {
            proof: result
                .proof
                .iter()
                .map(|node| parse_pubkey(node))
                .collect::<Result<_, _>>()?,
            root: parse_hash(&result.root)?,
        })
    }
}

fn parse_pubkey(value: &str) -> Result<Pubkey, DasError> {
    Pubkey::from_str(value.trim()).map_err(|e| DasError::Parse(format!("'{value}': {e}")))
}

/// Hashes arrive base58-encoded like addresses; the engine passes them
/// through as raw bytes.
fn parse_hash(value: &str) -> Result<[u8; 32], DasError> {
    Ok(parse_pubkey(value)?.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_response_deserializes() {
        let payload = r#"{
            "jsonrpc": "2.0",
            "id": "leafmint",
            "result": {
                "compression": {
                    "eligible": false,
                    "compressed": true,
                    "tree": "BzmGuCAT2XduxZihakSpMfKCDFu31Sgrxtv23YJFD2EG",
                    "leaf_id": 17,
                    "data_hash": "8bbcVecB619HHsHn2TQMraJ8R8WjQjApdZY7h9JCJW7b",
                    "creator_hash": "HtfDXZ5mBQNBdZrDxJMbXCDkyUqFdTDj7zAqo3aqrqiA",
                    "seq": 20
                },
                "ownership": {
                    "owner": "2xNweLHLqrbx4zo1waDvgWJHgsUpPj8Y8icbAFeR4a8i",
                    "delegate": null,
                    "frozen": false
                }
            }
        }"#;

        let envelope: RpcEnvelope<AssetResult> = serde_json::from_str(payload).unwrap();
        let result = envelope.result.unwrap();
        assert_eq!(result.compression.leaf_id, 17);
        assert!(result.ownership.delegate.is_none());
    }

    #[test]
    fn test_proof_response_deserializes() {
        let payload = r#"{
            "result": {
                "root": "HiDyAcEBTS7SRiLA49BZ5B6XMBAksgwLEAHpvteR8vbV",
                "proof": [
                    "2xNweLHLqrbx4zo1waDvgWJHgsUpPj8Y8icbAFeR4a8i",
                    "BzmGuCAT2XduxZihakSpMfKCDFu31Sgrxtv23YJFD2EG"
                ],
                "node_index": 131,
                "tree_id": "BzmGuCAT2XduxZihakSpMfKCDFu31Sgrxtv23YJFD2EG"
            }
        }"#;

        let envelope: RpcEnvelope<ProofResult> = serde_json::from_str(payload).unwrap();
        let result = envelope.result.unwrap();
        assert_eq!(result.proof.len(), 2);
        assert!(parse_hash(&result.root).is_ok());
    }

    #[test]
    fn test_effective_delegate_falls_back_to_owner() {
        let owner = Pubkey::new_unique();
        let details = AssetDetails {
            tree: Pubkey::new_unique(),
            owner,
            delegate: None,
            data_hash: [0u8; 32],
            creator_hash: [0u8; 32],
            leaf_index: 0,
        };
        assert_eq!(details.effective_delegate(), owner);
    }

    #[test]
    fn test_malformed_pubkey_rejected() {
        assert!(parse_pubkey("not-an-address").is_err());
    }
}
