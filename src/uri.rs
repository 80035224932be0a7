//! Leaf Metadata Supply
//!
//! Content assignment is policy, not engine logic: the mint flow asks a
//! supplier for the next leaf's metadata and bakes whatever comes back into
//! the instruction. The default supplier picks a URI uniformly from a fixed
//! pool, which is all the drop needs.

use rand::seq::SliceRandom;
use solana_sdk::pubkey::Pubkey;

use crate::tree::types::{Creator, LeafMetadata};

/// Supplies metadata for the next minted leaf
pub trait MetadataSupplier: Send + Sync {
    /// Metadata for a fresh leaf; `creator` becomes a 100%-share creator
    /// when given.
    fn leaf_metadata(&self, creator: Option<&Pubkey>) -> LeafMetadata;
}

/// Fixed pool of metadata URIs, one picked at random per mint
pub struct UriPool {
    name: String,
    symbol: String,
    uris: Vec<String>,
}

impl UriPool {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        uris: Vec<String>,
    ) -> Self {
        let uris = if uris.is_empty() {
            default_uris()
        } else {
            uris
        };
        Self {
            name: name.into(),
            symbol: symbol.into(),
            uris,
        }
    }

    fn pick(&self) -> &str {
        self.uris
            .choose(&mut rand::thread_rng())
            .expect("pool is never empty")
    }
}

impl Default for UriPool {
    fn default() -> Self {
        Self::new("RGB", "RGB", default_uris())
    }
}

fn default_uris() -> Vec<String> {
    vec![
        "https://arweave.net/vNH7y1F8SGE6p8P9qyVf4W6o1Yc8LrA4nW1cKJB6w9M".to_string(),
        "https://arweave.net/d3qGm0aPJyS0W2nHvk5NnE8YhLrX4T7cQeU2bZJ1xFA".to_string(),
        "https://arweave.net/Qf2LW8tB4Hn6RcyPjD1gV0uKaXmE9zS5oN3dT7rCwYk".to_string(),
    ]
}

impl MetadataSupplier for UriPool {
    fn leaf_metadata(&self, creator: Option<&Pubkey>) -> LeafMetadata {
        let metadata =
            LeafMetadata::non_fungible(self.name.as_str(), self.symbol.as_str(), self.pick());
        match creator {
            Some(address) => metadata.with_creators(vec![Creator {
                address: *address,
                verified: false,
                share: 100,
            }]),
            None => metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_picks_from_configured_uris() {
        let pool = UriPool::new(
            "RGB",
            "RGB",
            vec!["https://example.com/a.json".to_string()],
        );
        let metadata = pool.leaf_metadata(None);
        assert_eq!(metadata.uri, "https://example.com/a.json");
        assert!(metadata.creators.is_empty());
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_creator_gets_full_share() {
        let creator = Pubkey::new_unique();
        let metadata = UriPool::default().leaf_metadata(Some(&creator));
        assert_eq!(metadata.creators.len(), 1);
        assert_eq!(metadata.creators[0].share, 100);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn test_empty_pool_falls_back_to_defaults() {
        let pool = UriPool::new("RGB", "RGB", Vec::new());
        assert!(!pool.leaf_metadata(None).uri.is_empty());
    }
}
