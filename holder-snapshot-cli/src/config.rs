//! Runtime configuration loaded from `config.toml`.
//!
//! The file describes what to snapshot (network, token, origin block,
//! timestamp), which RPC endpoints to use per network with automatic
//! fallback, and how to reach the price API. Command-line flags override
//! individual values. Nothing here reads the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use holder_snapshot::{Error, FetchOptions, SnapshotConfig};
use serde::Deserialize;

use crate::chains::{self, ChainConfig};
use crate::price::DEFAULT_BASE_URL;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// What to snapshot.
    #[serde(default)]
    pub snapshot: SnapshotSection,
    /// Price API access.
    #[serde(default)]
    pub price: PriceSection,
    /// Per-network RPC overrides, keyed by network key.
    #[serde(default)]
    pub chains: HashMap<String, ChainRpcs>,
}

/// The `[snapshot]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSection {
    /// Network key from the built-in table (e.g. `polygon`).
    pub network: Option<String>,
    /// ERC-20 contract address.
    pub token: Option<Address>,
    /// First block to replay (deployment block or later).
    pub origin_block: Option<u64>,
    /// Snapshot time (RFC 3339).
    pub timestamp: Option<DateTime<Utc>>,
    /// Blocks per `eth_getLogs` request.
    pub batch_size: Option<u64>,
    /// Attempts per log window before giving up.
    pub max_attempts: Option<u32>,
    /// CoinGecko coin ID used for the historical price.
    pub coingecko_id: Option<String>,
    /// Directory the JSON and CSV files are written to.
    pub output_dir: Option<PathBuf>,
}

/// The `[price]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceSection {
    /// CoinGecko demo API key, sent as `x_cg_demo_api_key`.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: Option<String>,
}

/// RPC endpoint list for a single network.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainRpcs {
    /// Ordered list of RPC URLs (best first).
    pub rpcs: Vec<String>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// `--network`
    pub network: Option<String>,
    /// `--token`
    pub token: Option<Address>,
    /// `--origin-block`
    pub origin_block: Option<u64>,
    /// `--at`, unix seconds.
    pub timestamp: Option<u64>,
    /// `--batch-size`
    pub batch_size: Option<u64>,
    /// `--rpc`, replaces the endpoint list.
    pub rpc: Option<String>,
    /// `--coingecko-id`
    pub coingecko_id: Option<String>,
    /// `--price-api-key`
    pub price_api_key: Option<String>,
    /// `--no-price`
    pub no_price: bool,
    /// `--output-dir`
    pub output_dir: Option<PathBuf>,
}

/// Price API settings after merging file and flags.
#[derive(Debug, Clone)]
pub struct PriceSettings {
    /// API base URL.
    pub base_url: String,
    /// Optional API key.
    pub api_key: Option<String>,
}

/// A fully resolved run: everything needed to build the collaborators.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Target network.
    pub chain: &'static ChainConfig,
    /// RPC endpoints to try, in order.
    pub rpcs: Vec<String>,
    /// Core snapshot configuration.
    pub snapshot: SnapshotConfig,
    /// Price API settings.
    pub price: PriceSettings,
    /// Output directory.
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Returns [`Config::default`] if the file does not exist, so every
    /// value can come from flags instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Return the RPC URL list for a network, falling back to the built-in
    /// default if the config has no entry for it.
    #[must_use]
    pub fn rpcs_for(&self, key: &str, default_rpc: &str) -> Vec<String> {
        match self.chains.get(key) {
            Some(c) if !c.rpcs.is_empty() => c.rpcs.clone(),
            _ => vec![default_rpc.to_owned()],
        }
    }

    /// Merge file values with `overrides` into a [`RunPlan`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the network is unknown or the
    /// token, origin block or timestamp is missing.
    pub fn resolve(&self, overrides: Overrides) -> Result<RunPlan, Error> {
        let file = &self.snapshot;

        let key = overrides
            .network
            .or_else(|| file.network.clone())
            .ok_or_else(|| missing("network", "--network"))?;
        let chain = chains::by_key(&key)
            .ok_or_else(|| Error::Configuration(format!("unknown network `{key}`")))?;

        let token = overrides
            .token
            .or(file.token)
            .ok_or_else(|| missing("token", "--token"))?;
        let origin_block = overrides
            .origin_block
            .or(file.origin_block)
            .ok_or_else(|| missing("origin_block", "--origin-block"))?;
        let target_timestamp = match overrides.timestamp {
            Some(ts) => ts,
            None => file
                .timestamp
                .ok_or_else(|| missing("timestamp", "--at"))
                .and_then(|dt| {
                    u64::try_from(dt.timestamp()).map_err(|_| {
                        Error::Configuration(format!("timestamp {dt} predates the unix epoch"))
                    })
                })?,
        };

        let defaults = FetchOptions::default();
        let fetch = FetchOptions {
            batch_size: overrides
                .batch_size
                .or(file.batch_size)
                .unwrap_or(defaults.batch_size),
            max_attempts: file.max_attempts.unwrap_or(defaults.max_attempts),
            ..defaults
        };

        let price_id = if overrides.no_price {
            None
        } else {
            overrides.coingecko_id.or_else(|| file.coingecko_id.clone())
        };

        let rpcs = overrides
            .rpc
            .map_or_else(|| self.rpcs_for(chain.key, chain.default_rpc), |r| vec![r]);

        Ok(RunPlan {
            chain,
            rpcs,
            snapshot: SnapshotConfig {
                label: chain.key.to_owned(),
                token,
                origin_block,
                target_timestamp,
                price_id,
                fetch,
            },
            price: PriceSettings {
                base_url: self
                    .price
                    .base_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
                api_key: overrides.price_api_key.or_else(|| self.price.api_key.clone()),
            },
            output_dir: overrides
                .output_dir
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

fn missing(field: &str, flag: &str) -> Error {
    Error::Configuration(format!(
        "no {field} given: set `snapshot.{field}` in the config file or pass {flag}"
    ))
}

/// Parse a snapshot time given as RFC 3339 or as unix seconds.
///
/// # Errors
///
/// Returns a message suitable for a command-line error if neither form
/// parses.
pub fn parse_timestamp(raw: &str) -> Result<u64, String> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }
    let dt = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| format!("`{raw}` is neither unix seconds nor RFC 3339: {e}"))?;
    u64::try_from(dt.timestamp()).map_err(|_| format!("`{raw}` predates the unix epoch"))
}
