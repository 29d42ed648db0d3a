//! Known destination chains
//!
//! A static registry used to label chains in history and analytics. Unknown
//! ids are valid destinations; they are labelled [`CUSTOM_CHAIN_NAME`].

use alloy::primitives::B256;
use serde::Serialize;

use crate::encoder::normalize_chain_id;

/// Label for destinations not in the registry
pub const CUSTOM_CHAIN_NAME: &str = "Custom Subnet";

/// A preset destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPreset {
    pub key: &'static str,
    pub name: &'static str,
    /// Chain id as users type it
    pub chain_id: &'static str,
    pub description: &'static str,
}

pub const PRESETS: &[ChainPreset] = &[
    ChainPreset {
        key: "fuji",
        name: "Avalanche Fuji C-Chain",
        chain_id: "43113",
        description: "Avalanche testnet C-Chain",
    },
    ChainPreset {
        key: "dexalot",
        name: "Dexalot",
        chain_id: "0x0000000000000000000000000000000000000000000000000000000000000001",
        description: "Decentralized exchange subnet",
    },
    ChainPreset {
        key: "dfk",
        name: "DeFi Kingdoms",
        chain_id: "0x0000000000000000000000000000000000000000000000000000000000000002",
        description: "Gaming and DeFi subnet",
    },
    ChainPreset {
        key: "amplify",
        name: "Amplify",
        chain_id: "0x0000000000000000000000000000000000000000000000000000000000000003",
        description: "High-performance subnet",
    },
];

/// Preset as served by `GET /api/icm/chains`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub chain_id: &'static str,
    #[serde(rename = "blockchainID")]
    pub blockchain_id: B256,
    pub description: &'static str,
}

/// What is known about a destination chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainInfo {
    pub name: String,
    /// True when the chain is in the preset registry
    pub is_known: bool,
}

/// Registry entries with their normalized ids
pub fn presets() -> Vec<ChainEntry> {
    PRESETS
        .iter()
        .filter_map(|p| {
            normalize_chain_id(p.chain_id).ok().map(|id| ChainEntry {
                id: p.key,
                name: p.name,
                chain_id: p.chain_id,
                blockchain_id: id,
                description: p.description,
            })
        })
        .collect()
}

/// Look up a normalized chain id
pub fn find(blockchain_id: B256) -> Option<&'static ChainPreset> {
    PRESETS
        .iter()
        .find(|p| normalize_chain_id(p.chain_id).ok() == Some(blockchain_id))
}

/// Display name for a normalized chain id
pub fn chain_name(blockchain_id: B256) -> &'static str {
    find(blockchain_id).map_or(CUSTOM_CHAIN_NAME, |p| p.name)
}

/// Name and registry membership for a user-supplied chain id.
///
/// Ids that fail to normalize are reported as unknown rather than erroring.
pub fn blockchain_info(chain_id: &str) -> BlockchainInfo {
    match normalize_chain_id(chain_id).ok().and_then(find) {
        Some(preset) => BlockchainInfo {
            name: preset.name.to_string(),
            is_known: true,
        },
        None => BlockchainInfo {
            name: "Unknown".to_string(),
            is_known: false,
        },
    }
}
