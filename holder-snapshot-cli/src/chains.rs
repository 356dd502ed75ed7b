//! Static network table.
//!
//! Each entry names a network the snapshotter knows how to reach without
//! extra configuration: its config key, chain ID and a default public RPC.

/// Operational metadata for a supported network.
#[derive(Debug, Clone, Copy)]
pub struct ChainConfig {
    /// Short key used in `config.toml`, on the command line and in output
    /// file names (`balances_<key>.json`).
    pub key: &'static str,
    /// Human-readable network name.
    pub name: &'static str,
    /// EIP-155 chain ID.
    pub chain_id: u64,
    /// Suggested public RPC endpoint.
    pub default_rpc: &'static str,
    /// Whether this is a testnet.
    pub is_testnet: bool,
}

/// All supported networks (single source of truth).
pub const ALL: &[ChainConfig] = &[
    // Mainnets
    ChainConfig {
        key: "ethereum",
        name: "Ethereum Mainnet",
        chain_id: 1,
        default_rpc: "https://ethereum-rpc.publicnode.com",
        is_testnet: false,
    },
    ChainConfig {
        key: "polygon",
        name: "Polygon Mainnet",
        chain_id: 137,
        default_rpc: "https://polygon-rpc.com",
        is_testnet: false,
    },
    // Testnets
    ChainConfig {
        key: "ethereum_sepolia",
        name: "Ethereum Sepolia Testnet",
        chain_id: 11_155_111,
        default_rpc: "https://ethereum-sepolia-rpc.publicnode.com",
        is_testnet: true,
    },
    ChainConfig {
        key: "polygon_amoy",
        name: "Polygon Amoy Testnet",
        chain_id: 80_002,
        default_rpc: "https://rpc-amoy.polygon.technology",
        is_testnet: true,
    },
];

/// Look up a [`ChainConfig`] by its key.
#[must_use]
pub fn by_key(key: &str) -> Option<&'static ChainConfig> {
    ALL.iter().find(|c| c.key == key)
}
