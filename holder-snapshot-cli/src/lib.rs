//! Operational side of the holder snapshotter.
//!
//! Wires the core reconstruction in `holder-snapshot` to real collaborators:
//! an alloy JSON-RPC provider with endpoint fallback, the CoinGecko price
//! API and a JSON/CSV file sink, configured from `config.toml`.

pub mod chains;
pub mod config;
pub mod output;
pub mod price;
pub mod rpc;
