//! JSON-RPC chain access and snapshot execution with endpoint fallback.
//!
//! [`RpcChain`] adapts any alloy [`Provider`] to the core
//! [`ChainSource`] seam: headers via `eth_getBlockByNumber`, transfers via
//! `eth_getLogs` filtered on the token address and the `Transfer` topic.
//! Every call is bounded by [`REQUEST_TIMEOUT`].
//!
//! [`take_snapshot`] runs a whole snapshot against each configured RPC in
//! turn until one succeeds.

use std::future::IntoFuture;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result, bail};
use holder_snapshot::{
    BlockRef, BoxError, ChainSource, Error, PriceOracle, SnapshotResult, SnapshotSink,
    Snapshotter, TRANSFER_TOPIC, TransferEvent,
};

use crate::config::RunPlan;

/// Per-request timeout for RPC calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`ChainSource`] backed by an alloy provider.
#[derive(Debug, Clone)]
pub struct RpcChain<P> {
    provider: P,
}

impl<P: Provider> RpcChain<P> {
    /// Wrap a connected provider.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The underlying provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Provider> ChainSource for RpcChain<P> {
    async fn latest_block_height(&self) -> Result<u64, BoxError> {
        timed(self.provider.get_block_number()).await
    }

    async fn block(&self, height: u64) -> Result<BlockRef, BoxError> {
        let block = timed(
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(height)),
        )
        .await?
        .ok_or_else(|| format!("block {height} not found"))?;

        Ok(BlockRef {
            height,
            timestamp: block.header.timestamp,
        })
    }

    async fn transfer_logs(
        &self,
        contract: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<TransferEvent>, BoxError> {
        let filter = Filter::new()
            .address(contract)
            .event_signature(TRANSFER_TOPIC)
            .from_block(from)
            .to_block(to);

        let logs = timed(self.provider.get_logs(&filter)).await?;
        logs.iter()
            .map(|log| decode_log(log).map_err(Into::into))
            .collect()
    }
}

/// Decode one RPC log into a [`TransferEvent`].
///
/// # Errors
///
/// Returns [`Error::MalformedEvent`] for pending or removed logs and for
/// anything that does not have the `Transfer` shape.
pub fn decode_log(log: &Log) -> Result<TransferEvent, Error> {
    let (Some(block), Some(log_index)) = (log.block_number, log.log_index) else {
        return Err(Error::MalformedEvent(format!(
            "log in tx {:?} has no block number or log index",
            log.transaction_hash
        )));
    };
    if log.removed {
        return Err(Error::MalformedEvent(format!(
            "block {block} log {log_index} was removed by a reorg"
        )));
    }
    TransferEvent::from_log_parts(log.topics(), &log.data().data, block, log_index)
}

/// Await an RPC call under [`REQUEST_TIMEOUT`].
async fn timed<F, T, E>(call: F) -> Result<T, BoxError>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    tokio::time::timeout(REQUEST_TIMEOUT, call)
        .await
        .map_err(|_| "request timed out")?
        .map_err(Into::into)
}

/// Take a snapshot with automatic RPC fallback and hand it to `sink`.
///
/// Tries each RPC in `plan.rpcs` in order. Provider failures (and endpoints
/// serving the wrong chain) move on to the next endpoint; configuration
/// errors, a future timestamp or malformed logs abort immediately since
/// another endpoint would not change them.
///
/// # Errors
///
/// Returns the first non-provider error, or the last provider error once
/// every RPC has failed.
pub async fn take_snapshot<O, K>(plan: &RunPlan, oracle: &O, sink: &K) -> Result<SnapshotResult>
where
    O: PriceOracle + Clone,
    K: SnapshotSink,
{
    let key = plan.chain.key;
    let mut last_err = None;

    for (i, rpc_url) in plan.rpcs.iter().enumerate() {
        match try_snapshot(plan, rpc_url, oracle.clone(), sink).await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if let Some(next) = plan.rpcs.get(i + 1) {
                    tracing::warn!(
                        network = key,
                        rpc = %rpc_url,
                        next = %next,
                        error = %e,
                        "RPC failed, falling back"
                    );
                } else {
                    tracing::error!(network = key, rpc = %rpc_url, error = %e, "last RPC failed");
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        Error::Configuration(format!("no RPC endpoint configured for {key}")).into()
    }))
}

/// Only provider failures, or errors from outside the core, are worth
/// another endpoint.
fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Error>().is_none_or(Error::is_provider)
}

/// Attempt a full snapshot using a single RPC endpoint.
async fn try_snapshot<O, K>(
    plan: &RunPlan,
    rpc_url: &str,
    oracle: O,
    sink: &K,
) -> Result<SnapshotResult>
where
    O: PriceOracle,
    K: SnapshotSink,
{
    let expected = plan.chain.chain_id;
    tracing::info!(network = plan.chain.key, rpc = rpc_url, "connecting");

    let provider = ProviderBuilder::new().connect_http(
        rpc_url
            .parse()
            .with_context(|| format!("invalid RPC URL: {rpc_url}"))?,
    );

    let chain_id = tokio::time::timeout(REQUEST_TIMEOUT, provider.get_chain_id())
        .await
        .context("get_chain_id timed out")?
        .context("get_chain_id failed")?;
    if chain_id != expected {
        bail!("{rpc_url} serves chain {chain_id}, expected {expected}");
    }

    let snap = Snapshotter::new(plan.snapshot.clone(), RpcChain::new(provider), oracle);
    let result = snap.run().await?;
    snap.persist(&result, sink)?;
    Ok(result)
}
