//! Point-in-time ERC-20 holder snapshots.
//!
//! Given a target timestamp the [`Snapshotter`] resolves the matching block
//! height by binary search over block timestamps ([`locate_block`]), pulls
//! every `Transfer` log from a configured origin block up to that height in
//! bounded windows ([`fetch_transfers`]), and folds them into per-address
//! balances ([`BalanceLedger`]).
//!
//! Chain access, price lookup and output are supplied by the caller through
//! the traits in [`source`].

pub mod error;
pub mod fetcher;
pub mod ledger;
pub mod locator;
pub mod snapshot;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{BoxError, Error, Phase, Result};
pub use fetcher::{FetchOptions, fetch_transfers, windows};
pub use ledger::BalanceLedger;
pub use locator::locate_block;
pub use snapshot::{SnapshotConfig, Snapshotter};
pub use source::{ChainSource, NoPrice, PriceOracle, SnapshotSink};
pub use types::{Balance, BlockRef, SnapshotResult, TRANSFER_TOPIC, TransferEvent};
