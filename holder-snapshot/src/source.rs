//! Collaborator seams: where blocks, logs and prices come from and where
//! finished balances go.
//!
//! The core never cares how these are transported. The CLI crate backs
//! them with an alloy JSON-RPC provider, the CoinGecko HTTP API and a
//! JSON/CSV file writer; tests back them with in-memory doubles.

use std::collections::BTreeMap;
use std::future::Future;

use alloy::primitives::Address;
use chrono::NaiveDate;

use crate::error::BoxError;
use crate::types::{Balance, BlockRef, TransferEvent};

/// Read access to block headers and `Transfer` logs.
pub trait ChainSource {
    /// Height of the newest block the provider knows about.
    fn latest_block_height(&self) -> impl Future<Output = Result<u64, BoxError>> + Send;

    /// Header reference for the block at `height`.
    fn block(&self, height: u64) -> impl Future<Output = Result<BlockRef, BoxError>> + Send;

    /// All `Transfer` logs emitted by `contract` in `[from, to]` (inclusive),
    /// in chain order.
    fn transfer_logs(
        &self,
        contract: Address,
        from: u64,
        to: u64,
    ) -> impl Future<Output = Result<Vec<TransferEvent>, BoxError>> + Send;
}

/// Historical USD price lookup.
pub trait PriceOracle {
    /// Price of `token_id` on the UTC calendar day `date`.
    ///
    /// `Ok(None)` means the oracle answered but has no price for that day.
    fn historical_price_usd(
        &self,
        token_id: &str,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Option<f64>, BoxError>> + Send;
}

/// Oracle that never has a price, for runs that skip the lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrice;

impl PriceOracle for NoPrice {
    async fn historical_price_usd(
        &self,
        _token_id: &str,
        _date: NaiveDate,
    ) -> Result<Option<f64>, BoxError> {
        Ok(None)
    }
}

/// Destination for finished balances.
pub trait SnapshotSink {
    /// Persist `balances` under `label` (typically the network key).
    ///
    /// # Errors
    ///
    /// Returns an error if the artifacts cannot be written.
    fn write(&self, label: &str, balances: &BTreeMap<Address, Balance>) -> Result<(), BoxError>;
}
