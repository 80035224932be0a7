//! Ledger RPC Client
//!
//! The engine's view of the ledger, behind a trait so the payment watcher
//! and mint service are testable against a mock. The production
//! implementation wraps the non-blocking RPC client at confirmed
//! commitment.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiInstruction, UiTransactionEncoding,
};
use thiserror::Error;

use crate::transaction::RecentAnchor;
use crate::tree::changelog::{ExecutionTrace, InnerInstructions, TraceInstruction};

/// Ledger RPC errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc request failed: {0}")]
    Request(String),

    #[error("malformed rpc response: {0}")]
    Decode(String),
}

impl From<solana_client::client_error::ClientError> for RpcError {
    fn from(error: solana_client::client_error::ClientError) -> Self {
        RpcError::Request(error.to_string())
    }
}

/// Operations the engine needs from the ledger
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch a fresh validity anchor for transaction assembly
    async fn get_recent_anchor(&self) -> Result<RecentAnchor, RpcError>;

    /// Current block height at confirmed commitment
    async fn get_block_height(&self) -> Result<u64, RpcError>;

    /// Raw account data
    async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, RpcError>;

    /// Rent-exempt minimum balance for an account of `size` bytes
    async fn minimum_balance_for_rent_exemption(&self, size: usize) -> Result<u64, RpcError>;

    /// Execution trace of a confirmed transaction
    async fn get_execution_trace(&self, signature: &Signature)
        -> Result<ExecutionTrace, RpcError>;

    /// Oldest confirmed transaction referencing the given marker, if any.
    /// "Not found yet" is a normal outcome, not an error.
    async fn find_reference(&self, reference: &Pubkey) -> Result<Option<Signature>, RpcError>;

    /// Submit a fully signed transaction and wait for confirmation
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcError>;
}

/// Production RPC client at confirmed commitment
pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: RpcClient::new_with_commitment(rpc_url.into(), commitment),
            commitment,
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn get_recent_anchor(&self) -> Result<RecentAnchor, RpcError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;
        Ok(RecentAnchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, RpcError> {
        Ok(self.client.get_block_height().await?)
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, RpcError> {
        Ok(self.client.get_account_data(address).await?)
    }

    async fn minimum_balance_for_rent_exemption(&self, size: usize) -> Result<u64, RpcError> {
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(size)
            .await?)
    }

    async fn get_execution_trace(
        &self,
        signature: &Signature,
    ) -> Result<ExecutionTrace, RpcError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let encoded = self
            .client
            .get_transaction_with_config(signature, config)
            .await?;
        convert_trace(encoded)
    }

    async fn find_reference(&self, reference: &Pubkey) -> Result<Option<Signature>, RpcError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(10),
            commitment: Some(self.commitment),
        };
        let statuses = self
            .client
            .get_signatures_for_address_with_config(reference, config)
            .await?;

        // Statuses arrive newest-first; a reference marker is single-use, so
        // the oldest successful entry is the one the watcher wants.
        let signature = statuses
            .iter()
            .rev()
            .find(|status| status.err.is_none())
            .map(|status| status.signature.parse::<Signature>())
            .transpose()
            .map_err(|e| RpcError::Decode(format!("unparseable signature: {e}")))?;
        Ok(signature)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, RpcError> {
        Ok(self
            .client
            .send_and_confirm_transaction(transaction)
            .await?)
    }
}

/// Convert a confirmed-transaction response into the engine's trace type,
/// base58-decoding inner instruction payloads.
fn convert_trace(
    encoded: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<ExecutionTrace, RpcError> {
    let decoded = encoded
        .transaction
        .transaction
        .decode()
        .ok_or_else(|| RpcError::Decode("unsupported transaction encoding".to_string()))?;

    let account_keys = decoded.message.static_account_keys().to_vec();
    let instructions = decoded
        .message
        .instructions()
        .iter()
        .map(|ix| TraceInstruction {
            program_id_index: ix.program_id_index,
            accounts: ix.accounts.clone(),
            data: ix.data.clone(),
        })
        .collect();

    let meta = encoded
        .transaction
        .meta
        .ok_or_else(|| RpcError::Decode("transaction meta missing".to_string()))?;

    let inner_groups: Option<Vec<_>> = meta.inner_instructions.into();
    let mut inner_instructions = Vec::new();
    for group in inner_groups.unwrap_or_default() {
        let mut converted = Vec::with_capacity(group.instructions.len());
        for instruction in group.instructions {
            let UiInstruction::Compiled(compiled) = instruction else {
                // parsed encodings never appear for base64-requested traces
                continue;
            };
            let data = bs58::decode(&compiled.data)
                .into_vec()
                .map_err(|e| RpcError::Decode(format!("inner instruction data: {e}")))?;
            converted.push(TraceInstruction {
                program_id_index: compiled.program_id_index,
                accounts: compiled.accounts,
                data,
            });
        }
        inner_instructions.push(InnerInstructions {
            index: group.index,
            instructions: converted,
        });
    }

    Ok(ExecutionTrace {
        account_keys,
        instructions,
        inner_instructions,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
    })
}
