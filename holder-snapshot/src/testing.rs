//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use alloy::primitives::Address;
use chrono::NaiveDate;

use crate::error::{BoxError, Error};
use crate::source::{ChainSource, PriceOracle, SnapshotSink};
use crate::types::{Balance, BlockRef, TransferEvent};

/// A fake chain: one timestamp per height plus a flat list of transfers.
#[derive(Debug, Default)]
pub(crate) struct MockChain {
    timestamps: Vec<u64>,
    events: Vec<TransferEvent>,
    failing_block: Option<u64>,
    malformed_window: Option<u64>,
    /// Window start -> number of times the query should still fail.
    flaky_windows: Mutex<HashMap<u64, u32>>,
    probes: Mutex<Vec<u64>>,
    windows: Mutex<Vec<(u64, u64)>>,
}

impl MockChain {
    pub(crate) fn with_timestamps(timestamps: Vec<u64>) -> Self {
        Self {
            timestamps,
            ..Self::default()
        }
    }

    pub(crate) fn with_events(mut self, events: Vec<TransferEvent>) -> Self {
        self.events = events;
        self
    }

    pub(crate) fn failing_block(mut self, height: u64) -> Self {
        self.failing_block = Some(height);
        self
    }

    /// Make the window starting at `from` report an undecodable log.
    pub(crate) fn malformed_window(mut self, from: u64) -> Self {
        self.malformed_window = Some(from);
        self
    }

    /// Make the window starting at `from` fail `times` times before succeeding.
    pub(crate) fn flaky_window(self, from: u64, times: u32) -> Self {
        self.flaky_windows.lock().unwrap().insert(from, times);
        self
    }

    pub(crate) fn probed_heights(&self) -> Vec<u64> {
        self.probes.lock().unwrap().clone()
    }

    pub(crate) fn queried_windows(&self) -> Vec<(u64, u64)> {
        self.windows.lock().unwrap().clone()
    }
}

impl ChainSource for MockChain {
    async fn latest_block_height(&self) -> Result<u64, BoxError> {
        self.timestamps
            .len()
            .checked_sub(1)
            .map(|h| h as u64)
            .ok_or_else(|| "empty chain".into())
    }

    async fn block(&self, height: u64) -> Result<BlockRef, BoxError> {
        self.probes.lock().unwrap().push(height);
        if self.failing_block == Some(height) {
            return Err(format!("header {height} unavailable").into());
        }
        let timestamp = usize::try_from(height)
            .ok()
            .and_then(|i| self.timestamps.get(i))
            .copied()
            .ok_or_else(|| format!("no block {height}"))?;
        Ok(BlockRef { height, timestamp })
    }

    async fn transfer_logs(
        &self,
        _contract: Address,
        from: u64,
        to: u64,
    ) -> Result<Vec<TransferEvent>, BoxError> {
        self.windows.lock().unwrap().push((from, to));
        if self.malformed_window == Some(from) {
            return Err(Error::MalformedEvent(format!("log in blocks {from}-{to} has 2 topics")).into());
        }
        {
            let mut flaky = self.flaky_windows.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(&from) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(format!("range {from}-{to} rejected").into());
                }
            }
        }
        Ok(self
            .events
            .iter()
            .filter(|e| (from..=to).contains(&e.block))
            .copied()
            .collect())
    }
}

/// Oracle returning a fixed answer.
#[derive(Debug)]
pub(crate) enum MockOracle {
    Price(f64),
    Unavailable,
    Down,
}

impl PriceOracle for MockOracle {
    async fn historical_price_usd(
        &self,
        _token_id: &str,
        _date: NaiveDate,
    ) -> Result<Option<f64>, BoxError> {
        match self {
            Self::Price(p) => Ok(Some(*p)),
            Self::Unavailable => Ok(None),
            Self::Down => Err("oracle unreachable".into()),
        }
    }
}

/// Sink that keeps what it was given.
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    pub(crate) written: Mutex<Vec<(String, BTreeMap<Address, Balance>)>>,
}

impl SnapshotSink for MemorySink {
    fn write(&self, label: &str, balances: &BTreeMap<Address, Balance>) -> Result<(), BoxError> {
        self.written
            .lock()
            .unwrap()
            .push((label.to_owned(), balances.clone()));
        Ok(())
    }
}
