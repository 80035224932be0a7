//! Changelog Event Decoding
//!
//! Every tree mutation makes the compression program emit a changelog event
//! through the no-op log wrapper as an inner instruction. Recovering the
//! index of a freshly minted leaf means walking a confirmed transaction's
//! execution trace, finding the asset-tree instruction, and decoding the
//! event out of its inner no-op instructions.
//!
//! Event payloads are version-tagged. Decoding goes through a registry of
//! per-version decoders; unknown versions are skipped, never fatal, and a
//! failed decode never falls back to a default index.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::tree::pda::NOOP_PROGRAM_ID;

// ============================================================================
// Execution Trace
// ============================================================================

/// A compiled instruction within a trace; `data` is the raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// Inner instructions emitted while executing one top-level instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerInstructions {
    /// Index of the top-level instruction these belong to
    pub index: u8,
    pub instructions: Vec<TraceInstruction>,
}

/// A confirmed transaction's execution trace: the account table, the
/// top-level instructions in order, their inner instructions, and the
/// lamport balance snapshots around execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<TraceInstruction>,
    pub inner_instructions: Vec<InnerInstructions>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

impl ExecutionTrace {
    /// Resolve the program an instruction invokes, if the index is in range
    pub fn program_id(&self, instruction: &TraceInstruction) -> Option<&Pubkey> {
        self.account_keys.get(instruction.program_id_index as usize)
    }

    /// Lamports received by `address` in this transaction, if it appears
    pub fn lamports_received(&self, address: &Pubkey) -> Option<i128> {
        let position = self.account_keys.iter().position(|key| key == address)?;
        let pre = *self.pre_balances.get(position)? as i128;
        let post = *self.post_balances.get(position)? as i128;
        Some(post - pre)
    }

    /// Whether any instruction references `address`
    pub fn references(&self, address: &Pubkey) -> bool {
        self.account_keys.iter().any(|key| key == address)
    }
}

// ============================================================================
// Changelog Events
// ============================================================================

/// Node of the Merkle path recorded by a changelog event
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    pub node: [u8; 32],
    pub index: u32,
}

/// Version 1 changelog payload
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEventV1 {
    /// Address of the mutated tree
    pub id: [u8; 32],
    /// Merkle path of the mutation, leaf first, new root last
    pub path: Vec<PathNode>,
    /// Tree sequence number after the mutation
    pub seq: u64,
    /// Index of the affected leaf
    pub index: u32,
}

/// A decoded changelog event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangelogEvent {
    V1(ChangelogEventV1),
}

impl ChangelogEvent {
    /// Index of the leaf the mutation touched
    pub fn leaf_index(&self) -> u64 {
        match self {
            ChangelogEvent::V1(event) => u64::from(event.index),
        }
    }

    /// The new root hash, recorded as the final path node
    pub fn new_root(&self) -> Option<[u8; 32]> {
        match self {
            ChangelogEvent::V1(event) => event.path.last().map(|node| node.node),
        }
    }
}

/// Event kind tag for changelog payloads
const EVENT_KIND_CHANGELOG: u8 = 0;
/// Version tag for V1 payloads
const EVENT_VERSION_V1: u8 = 0;

/// Changelog decoding errors
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// No changelog event could be recovered from the trace. The mutation
    /// may still have succeeded; the caller must report "submitted, index
    /// unresolved" rather than assume an index.
    #[error("no changelog event found in the transaction trace")]
    LeafIndexNotFound,
}

/// Reasons an individual event payload is not decodable. These only skip
/// the candidate; they never fail the overall scan.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("event payload truncated ({0} bytes)")]
    Truncated(usize),

    #[error("payload is not a changelog event (kind {0})")]
    NotAChangelog(u8),

    #[error("unrecognized changelog version {0}")]
    UnknownVersion(u8),

    #[error("malformed changelog body: {0}")]
    Malformed(String),
}

type DecodeFn = fn(&[u8]) -> Result<ChangelogEvent, EventDecodeError>;

/// Version registry. Decoders receive the payload past the kind and
/// version tags.
const DECODERS: &[(u8, DecodeFn)] = &[(EVENT_VERSION_V1, decode_v1)];

fn decode_v1(body: &[u8]) -> Result<ChangelogEvent, EventDecodeError> {
    ChangelogEventV1::try_from_slice(body)
        .map(ChangelogEvent::V1)
        .map_err(|e| EventDecodeError::Malformed(e.to_string()))
}

/// Decode a single raw event payload through the version registry.
pub fn decode_event(data: &[u8]) -> Result<ChangelogEvent, EventDecodeError> {
    if data.len() < 2 {
        return Err(EventDecodeError::Truncated(data.len()));
    }
    if data[0] != EVENT_KIND_CHANGELOG {
        return Err(EventDecodeError::NotAChangelog(data[0]));
    }
    let version = data[1];
    let decode = DECODERS
        .iter()
        .find(|(tag, _)| *tag == version)
        .map(|(_, decode)| decode)
        .ok_or(EventDecodeError::UnknownVersion(version))?;
    decode(&data[2..])
}

/// Recover the leaf index of the mutation a transaction performed.
///
/// Locates the first top-level instruction invoking `program_id`, then
/// scans its no-op inner instructions newest-first: retries and compound
/// instructions append events rather than replace them, so the most recent
/// decodable event is the authoritative one.
pub fn extract_leaf_index(
    trace: &ExecutionTrace,
    program_id: &Pubkey,
) -> Result<u64, ChangelogError> {
    Ok(extract_event(trace, program_id)?.leaf_index())
}

/// As `extract_leaf_index`, but returns the whole decoded event.
pub fn extract_event(
    trace: &ExecutionTrace,
    program_id: &Pubkey,
) -> Result<ChangelogEvent, ChangelogError> {
    let position = trace
        .instructions
        .iter()
        .position(|ix| trace.program_id(ix) == Some(program_id))
        .ok_or(ChangelogError::LeafIndexNotFound)?;

    let inner = trace
        .inner_instructions
        .iter()
        .find(|group| usize::from(group.index) == position)
        .ok_or(ChangelogError::LeafIndexNotFound)?;

    for candidate in inner.instructions.iter().rev() {
        if trace.program_id(candidate) != Some(&NOOP_PROGRAM_ID) {
            continue;
        }
        match decode_event(&candidate.data) {
            Ok(event) => return Ok(event),
            Err(reason) => {
                tracing::debug!(%reason, "skipping undecodable log candidate");
            }
        }
    }

    Err(ChangelogError::LeafIndexNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::pda::ASSET_TREE_PROGRAM_ID;

    fn encoded_v1(index: u32) -> Vec<u8> {
        let event = ChangelogEventV1 {
            id: [9u8; 32],
            path: vec![
                PathNode {
                    node: [1u8; 32],
                    index: 4,
                },
                PathNode {
                    node: [2u8; 32],
                    index: 1,
                },
            ],
            seq: 3,
            index,
        };
        let mut data = vec![EVENT_KIND_CHANGELOG, EVENT_VERSION_V1];
        event.serialize(&mut data).unwrap();
        data
    }

    /// Trace with one asset-tree instruction whose inner no-ops carry the
    /// given payloads.
    fn trace_with_inner(payloads: Vec<Vec<u8>>) -> ExecutionTrace {
        // keys: [program, noop]
        let account_keys = vec![ASSET_TREE_PROGRAM_ID, NOOP_PROGRAM_ID];
        let instructions = vec![TraceInstruction {
            program_id_index: 0,
            accounts: vec![],
            data: vec![],
        }];
        let inner = InnerInstructions {
            index: 0,
            instructions: payloads
                .into_iter()
                .map(|data| TraceInstruction {
                    program_id_index: 1,
                    accounts: vec![],
                    data,
                })
                .collect(),
        };
        ExecutionTrace {
            account_keys,
            instructions,
            inner_instructions: vec![inner],
            pre_balances: vec![],
            post_balances: vec![],
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let data = encoded_v1(42);
        let event = decode_event(&data).unwrap();
        assert_eq!(event.leaf_index(), 42);
        assert_eq!(event.new_root(), Some([2u8; 32]));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut data = encoded_v1(1);
        data[1] = 7;
        assert!(matches!(
            decode_event(&data),
            Err(EventDecodeError::UnknownVersion(7))
        ));
    }

    #[test]
    fn test_decode_rejects_other_event_kinds() {
        let mut data = encoded_v1(1);
        data[0] = 1;
        assert!(matches!(
            decode_event(&data),
            Err(EventDecodeError::NotAChangelog(1))
        ));
    }

    #[test]
    fn test_prefers_most_recent_decodable_event() {
        // One undecodable payload and one valid event carrying index 42:
        // the valid one wins regardless of garbage around it.
        let trace = trace_with_inner(vec![encoded_v1(42), b"garbage".to_vec()]);
        assert_eq!(extract_leaf_index(&trace, &ASSET_TREE_PROGRAM_ID).unwrap(), 42);
    }

    #[test]
    fn test_scans_in_reverse_order() {
        // Two valid events; the later one is the authoritative one.
        let trace = trace_with_inner(vec![encoded_v1(1), encoded_v1(2)]);
        assert_eq!(extract_leaf_index(&trace, &ASSET_TREE_PROGRAM_ID).unwrap(), 2);
    }

    #[test]
    fn test_unknown_version_skipped_not_fatal() {
        let mut unknown = encoded_v1(9);
        unknown[1] = 9;
        // newest candidate has an unknown version; the scan falls back to
        // the older valid event instead of failing
        let trace = trace_with_inner(vec![encoded_v1(5), unknown]);
        assert_eq!(extract_leaf_index(&trace, &ASSET_TREE_PROGRAM_ID).unwrap(), 5);
    }

    #[test]
    fn test_no_matching_program_is_not_found() {
        let mut trace = trace_with_inner(vec![encoded_v1(0)]);
        trace.account_keys[0] = Pubkey::new_unique();
        assert!(matches!(
            extract_leaf_index(&trace, &ASSET_TREE_PROGRAM_ID),
            Err(ChangelogError::LeafIndexNotFound)
        ));
    }

    #[test]
    fn test_no_decodable_event_is_not_found_never_zero() {
        let trace = trace_with_inner(vec![b"junk".to_vec(), b"more junk".to_vec()]);
        assert!(matches!(
            extract_leaf_index(&trace, &ASSET_TREE_PROGRAM_ID),
            Err(ChangelogError::LeafIndexNotFound)
        ));
    }

    #[test]
    fn test_lamports_received() {
        let recipient = Pubkey::new_unique();
        let trace = ExecutionTrace {
            account_keys: vec![Pubkey::new_unique(), recipient],
            instructions: vec![],
            inner_instructions: vec![],
            pre_balances: vec![10_000, 500],
            post_balances: vec![4_000, 6_500],
        };
        assert_eq!(trace.lamports_received(&recipient), Some(6_000));
    }
}
