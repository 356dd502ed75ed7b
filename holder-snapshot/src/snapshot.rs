//! Snapshot orchestration: tip check, block search, log replay, price.

use alloy::primitives::Address;
use chrono::{DateTime, NaiveDate};

use crate::error::{Error, Phase, Result};
use crate::fetcher::{FetchOptions, fetch_transfers};
use crate::ledger::BalanceLedger;
use crate::locator::locate_block;
use crate::source::{ChainSource, PriceOracle, SnapshotSink};
use crate::types::{BlockRef, SnapshotResult};

/// Everything a run needs to know, passed in explicitly.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Label for the output artifacts, usually the network key.
    pub label: String,
    /// ERC-20 contract whose `Transfer` logs are replayed.
    pub token: Address,
    /// First block to replay from (deployment block or later).
    pub origin_block: u64,
    /// Snapshot time in unix seconds.
    pub target_timestamp: u64,
    /// Price oracle identifier for the token; `None` skips the lookup.
    pub price_id: Option<String>,
    /// Log fetching behaviour.
    pub fetch: FetchOptions,
}

impl SnapshotConfig {
    /// UTC calendar day of the snapshot, as used for the price lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the timestamp is out of range.
    pub fn snapshot_date(&self) -> Result<NaiveDate> {
        i64::try_from(self.target_timestamp)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.date_naive())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "timestamp {} is out of range",
                    self.target_timestamp
                ))
            })
    }

    fn validate(&self) -> Result<()> {
        if self.fetch.batch_size == 0 {
            return Err(Error::Configuration("batch size must be at least 1".into()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(Error::Configuration("max attempts must be at least 1".into()));
        }
        if self.token == Address::ZERO {
            return Err(Error::Configuration("token address is the zero address".into()));
        }
        self.snapshot_date().map(|_| ())
    }
}

/// Runs one snapshot against a chain source and price oracle.
#[derive(Debug)]
pub struct Snapshotter<S, O> {
    config: SnapshotConfig,
    source: S,
    oracle: O,
}

impl<S: ChainSource, O: PriceOracle> Snapshotter<S, O> {
    /// Bind a configuration to its collaborators.
    pub const fn new(config: SnapshotConfig, source: S, oracle: O) -> Self {
        Self {
            config,
            source,
            oracle,
        }
    }

    /// The configuration this snapshotter was built with.
    pub const fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Take the snapshot.
    ///
    /// Fails fast with [`Error::FutureTimestamp`] before any search or log
    /// query if the target lies past the chain tip. The price lookup runs
    /// alongside the balance reconstruction and never fails the run.
    ///
    /// # Errors
    ///
    /// Configuration problems, a future target, provider failures in any
    /// phase, malformed logs and balance overflow all abort the run.
    pub async fn run(&self) -> Result<SnapshotResult> {
        self.config.validate()?;

        let tip = self.tip().await?;
        let target = self.config.target_timestamp;
        if target > tip.timestamp {
            return Err(Error::FutureTimestamp {
                target,
                tip_height: tip.height,
                tip_timestamp: tip.timestamp,
            });
        }

        let (rebuilt, price_usd) = tokio::join!(self.reconstruct(tip.height), self.price());
        let (block, ledger) = rebuilt?;

        let event_count = ledger.event_count();
        let balances = ledger.into_balances();
        tracing::info!(
            block = block.height,
            events = event_count,
            holders = balances.len(),
            price_usd,
            "snapshot complete"
        );

        Ok(SnapshotResult {
            block_height: block.height,
            block_timestamp: block.timestamp,
            event_count,
            balances,
            price_usd,
        })
    }

    /// Hand a finished snapshot to `sink` under the configured label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`] if the sink fails.
    pub fn persist<K: SnapshotSink>(&self, result: &SnapshotResult, sink: &K) -> Result<()> {
        sink.write(&self.config.label, &result.balances)
            .map_err(Error::Sink)?;
        tracing::info!(label = %self.config.label, holders = result.balances.len(), "snapshot written");
        Ok(())
    }

    async fn tip(&self) -> Result<BlockRef> {
        let height = self
            .source
            .latest_block_height()
            .await
            .map_err(|e| Error::provider(Phase::Tip, e))?;
        let tip = self
            .source
            .block(height)
            .await
            .map_err(|e| Error::provider(Phase::Tip, e))?;
        tracing::info!(height, timestamp = tip.timestamp, "chain tip");
        Ok(tip)
    }

    async fn reconstruct(&self, tip_height: u64) -> Result<(BlockRef, BalanceLedger)> {
        let cfg = &self.config;

        let block = locate_block(&self.source, cfg.target_timestamp, tip_height).await?;
        let height = block.height;
        tracing::info!(height, timestamp = block.timestamp, "taking snapshot at block");

        if height < cfg.origin_block {
            tracing::warn!(
                height,
                origin = cfg.origin_block,
                "snapshot block precedes origin block, no transfers to replay"
            );
        }

        let events =
            fetch_transfers(&self.source, cfg.token, cfg.origin_block, height, &cfg.fetch).await?;
        let ledger = BalanceLedger::accumulate(&events)?;

        if !ledger.is_conserved() {
            tracing::warn!(
                minted = %ledger.minted(),
                burned = %ledger.burned(),
                "balances do not sum to net issuance"
            );
        }
        let negative = ledger.negative().count();
        if negative > 0 {
            tracing::warn!(
                addresses = negative,
                origin = cfg.origin_block,
                "negative balances, origin block is probably after the first mint"
            );
        }

        Ok((block, ledger))
    }

    async fn price(&self) -> Option<f64> {
        let id = self.config.price_id.as_deref()?;
        let date = self.config.snapshot_date().ok()?;

        match self.oracle.historical_price_usd(id, date).await {
            Ok(Some(price)) => {
                tracing::info!(token = id, %date, price_usd = price, "historical price");
                Some(price)
            }
            Ok(None) => {
                tracing::warn!(token = id, %date, "historical price unavailable");
                None
            }
            Err(e) => {
                tracing::warn!(token = id, %date, error = %e, "price lookup failed");
                None
            }
        }
    }
}
