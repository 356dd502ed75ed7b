//! Windowed `Transfer` log retrieval.
//!
//! Providers reject unbounded `eth_getLogs` ranges, so `[from, to]` is split
//! into contiguous windows of at most `batch_size` blocks and queried one at
//! a time, in ascending order. Results are concatenated exactly as returned:
//! no window is queried twice, no block is skipped, nothing is deduplicated.

use std::time::Duration;

use alloy::primitives::Address;

use crate::error::{Error, Phase, Result};
use crate::source::ChainSource;
use crate::types::TransferEvent;

/// Knobs for [`fetch_transfers`].
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Maximum number of blocks per provider query.
    pub batch_size: u64,
    /// Attempts per window before the whole fetch is abandoned.
    pub max_attempts: u32,
    /// Pause between attempts on the same window.
    pub retry_delay: Duration,
    /// Pause between consecutive windows to stay under rate limits.
    pub window_delay: Duration,
}

impl FetchOptions {
    /// Block range most public RPCs accept for a single `eth_getLogs`.
    pub const DEFAULT_BATCH_SIZE: u64 = 5_000;

    /// Defaults with a custom batch size.
    #[must_use]
    pub fn with_batch_size(batch_size: u64) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            window_delay: Duration::from_millis(100),
        }
    }
}

/// Inclusive block ranges covering `[from, to]`, each at most `batch_size`
/// blocks long.
#[derive(Debug, Clone)]
pub struct Windows {
    next: Option<u64>,
    to: u64,
    batch_size: u64,
}

/// Partition `[from, to]` into ascending, non-overlapping windows.
///
/// Yields nothing when `from > to`. A `batch_size` of zero is treated as one
/// block per window; [`fetch_transfers`] rejects it before getting here.
#[must_use]
pub fn windows(from: u64, to: u64, batch_size: u64) -> Windows {
    Windows {
        next: (from <= to).then_some(from),
        to,
        batch_size: batch_size.max(1),
    }
}

impl Windows {
    /// Number of windows still to be yielded, saturating at `u64::MAX`.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.next.map_or(0, |start| {
            ((self.to - start) / self.batch_size).saturating_add(1)
        })
    }
}

impl Iterator for Windows {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let end = start.saturating_add(self.batch_size - 1).min(self.to);
        self.next = end.checked_add(1).filter(|n| *n <= self.to);
        Some((start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

/// Fetch every `Transfer` log of `contract` in `[from, to]`.
///
/// Each window is retried up to `options.max_attempts` times. Malformed logs
/// reported by the source are not retried.
///
/// # Errors
///
/// * [`Error::Configuration`] if `batch_size` or `max_attempts` is zero.
/// * [`Error::Provider`] in [`Phase::Fetch`] once a window exhausts its
///   attempts; events from earlier windows are discarded.
/// * Any crate [`Error`] the source surfaced, e.g. [`Error::MalformedEvent`].
pub async fn fetch_transfers<S: ChainSource>(
    source: &S,
    contract: Address,
    from: u64,
    to: u64,
    options: &FetchOptions,
) -> Result<Vec<TransferEvent>> {
    if options.batch_size == 0 {
        return Err(Error::Configuration("batch size must be at least 1".into()));
    }
    if options.max_attempts == 0 {
        return Err(Error::Configuration("max attempts must be at least 1".into()));
    }

    let windows = windows(from, to, options.batch_size);
    let total = windows.remaining();
    tracing::info!(%contract, from, to, windows = total, "fetching transfer logs");

    let mut events = Vec::new();
    for (index, (start, end)) in windows.enumerate() {
        if index > 0 && !options.window_delay.is_zero() {
            tokio::time::sleep(options.window_delay).await;
        }

        let batch = fetch_window(source, contract, start, end, options).await?;
        tracing::info!(
            window = index + 1,
            of = total,
            from = start,
            to = end,
            events = batch.len(),
            progress = %pct(end, from, to),
            "fetched window"
        );
        events.extend(batch);
    }

    tracing::info!(events = events.len(), "transfer logs fetched");
    Ok(events)
}

/// Query a single window, retrying transient failures.
async fn fetch_window<S: ChainSource>(
    source: &S,
    contract: Address,
    start: u64,
    end: u64,
    options: &FetchOptions,
) -> Result<Vec<TransferEvent>> {
    let mut attempt = 1;
    loop {
        let err = match source.transfer_logs(contract, start, end).await {
            Ok(batch) => return Ok(batch),
            Err(e) => match e.downcast::<Error>() {
                Ok(own) => return Err(*own),
                Err(e) => e,
            },
        };

        if attempt >= options.max_attempts {
            return Err(Error::provider(
                Phase::Fetch,
                format!("blocks {start}-{end} failed after {attempt} attempt(s): {err}"),
            ));
        }
        tracing::warn!(from = start, to = end, attempt, error = %err, "window failed, retrying");
        attempt += 1;
        tokio::time::sleep(options.retry_delay).await;
    }
}

/// Format progress as a percentage string.
fn pct(current: u64, from: u64, to: u64) -> String {
    if to <= from {
        return "100%".into();
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = (current - from) as f64 / (to - from) as f64 * 100.0;
    format!("{ratio:.0}%")
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{U256, address};
    use proptest::prelude::*;

    use super::*;
    use crate::testing::MockChain;

    const TOKEN: Address = address!("F689E85988d3a7921E852867CE49F53388985E6d");

    fn quick(batch_size: u64) -> FetchOptions {
        FetchOptions {
            batch_size,
            max_attempts: 3,
            retry_delay: Duration::ZERO,
            window_delay: Duration::ZERO,
        }
    }

    fn transfer(block: u64, log_index: u64) -> TransferEvent {
        TransferEvent::new(
            address!("00000000000000000000000000000000000000a1"),
            address!("00000000000000000000000000000000000000b2"),
            U256::from(block * 10 + log_index),
        )
        .at(block, log_index)
    }

    #[test]
    fn single_block_range_is_one_window() {
        let w: Vec<_> = windows(1000, 1000, 5000).collect();
        assert_eq!(w, vec![(1000, 1000)], "one window");
    }

    #[test]
    fn windows_split_at_batch_boundary() {
        let w: Vec<_> = windows(10, 24, 5).collect();
        assert_eq!(w, vec![(10, 14), (15, 19), (20, 24)], "exact multiple");

        let w: Vec<_> = windows(10, 25, 5).collect();
        assert_eq!(w, vec![(10, 14), (15, 19), (20, 24), (25, 25)], "trailing block");
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert_eq!(windows(11, 10, 5).count(), 0, "from > to");
        assert_eq!(windows(11, 10, 5).remaining(), 0, "remaining");
    }

    proptest! {
        #[test]
        fn windows_cover_every_block_exactly_once(
            from in 0..1_000_000u64,
            len in 0..20_000u64,
            batch in 1..6_000u64,
        ) {
            let to = from + len;
            let w: Vec<_> = windows(from, to, batch).collect();

            prop_assert_eq!(w.len() as u64, windows(from, to, batch).remaining(), "remaining()");
            prop_assert_eq!(w.first().map(|x| x.0), Some(from), "starts at from");
            prop_assert_eq!(w.last().map(|x| x.1), Some(to), "ends at to");
            for pair in w.windows(2) {
                prop_assert_eq!(pair[0].1 + 1, pair[1].0, "contiguous");
            }
            for &(start, end) in &w {
                prop_assert!(start <= end, "non-empty window");
                prop_assert!(end - start < batch, "window wider than {}", batch);
            }
        }
    }

    #[test]
    fn windows_stop_at_u64_max() {
        let w: Vec<_> = windows(u64::MAX - 3, u64::MAX, 3).collect();
        assert_eq!(w, vec![(u64::MAX - 3, u64::MAX - 1), (u64::MAX, u64::MAX)], "no overflow");
    }

    #[test]
    fn remaining_saturates_on_full_range() {
        let w = windows(0, u64::MAX, 1);
        assert_eq!(w.remaining(), u64::MAX, "2^64 windows saturate");
        assert_eq!(w.size_hint().0, usize::MAX, "size hint saturates");
        assert_eq!(windows(0, u64::MAX, u64::MAX).remaining(), 2, "two windows");
    }

    #[tokio::test]
    async fn concatenates_windows_in_order() {
        let events = vec![transfer(100, 0), transfer(100, 1), transfer(104, 0), transfer(109, 3), transfer(110, 0)];
        let chain = MockChain::with_timestamps(vec![]).with_events(events.clone());

        let fetched = fetch_transfers(&chain, TOKEN, 100, 110, &quick(4)).await.unwrap();

        assert_eq!(fetched, events, "events in emission order");
        assert_eq!(
            chain.queried_windows(),
            vec![(100, 103), (104, 107), (108, 110)],
            "queried windows"
        );
    }

    #[tokio::test]
    async fn excludes_blocks_outside_range() {
        let chain = MockChain::with_timestamps(vec![])
            .with_events(vec![transfer(5, 0), transfer(10, 0), transfer(20, 0), transfer(21, 0)]);
        let fetched = fetch_transfers(&chain, TOKEN, 10, 20, &quick(5000)).await.unwrap();
        assert_eq!(fetched, vec![transfer(10, 0), transfer(20, 0)], "only in-range logs");
    }

    #[tokio::test]
    async fn retries_a_flaky_window() {
        let chain = MockChain::with_timestamps(vec![])
            .with_events(vec![transfer(3, 0), transfer(7, 0)])
            .flaky_window(5, 2);

        let fetched = fetch_transfers(&chain, TOKEN, 0, 9, &quick(5)).await.unwrap();

        assert_eq!(fetched, vec![transfer(3, 0), transfer(7, 0)], "all events");
        assert_eq!(
            chain.queried_windows(),
            vec![(0, 4), (5, 9), (5, 9), (5, 9)],
            "window retried in place"
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let chain = MockChain::with_timestamps(vec![])
            .with_events(vec![transfer(3, 0)])
            .flaky_window(5, 3);

        let err = fetch_transfers(&chain, TOKEN, 0, 9, &quick(5)).await.unwrap_err();

        assert!(matches!(err, Error::Provider { phase: Phase::Fetch, .. }), "got {err:?}");
        assert!(err.to_string().contains("blocks 5-9"), "names the window: {err}");
    }

    #[tokio::test]
    async fn malformed_log_is_not_retried() {
        let chain = MockChain::with_timestamps(vec![])
            .with_events(vec![transfer(3, 0)])
            .malformed_window(5);

        let err = fetch_transfers(&chain, TOKEN, 0, 14, &quick(5)).await.unwrap_err();

        assert!(matches!(err, Error::MalformedEvent(_)), "got {err:?}");
        assert_eq!(chain.queried_windows(), vec![(0, 4), (5, 9)], "one query, no retry");
    }

    #[tokio::test]
    async fn rejects_zero_batch_size() {
        let chain = MockChain::with_timestamps(vec![]);
        let err = fetch_transfers(&chain, TOKEN, 0, 9, &quick(0)).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "got {err:?}");
        assert!(chain.queried_windows().is_empty(), "no query issued");
    }

    #[tokio::test]
    async fn empty_range_issues_no_queries() {
        let chain = MockChain::with_timestamps(vec![]);
        let fetched = fetch_transfers(&chain, TOKEN, 50, 49, &quick(10)).await.unwrap();
        assert!(fetched.is_empty(), "no events");
        assert!(chain.queried_windows().is_empty(), "no query issued");
    }

    #[test]
    fn progress_percentage() {
        assert_eq!(pct(50, 0, 100), "50%", "halfway");
        assert_eq!(pct(7, 7, 7), "100%", "single block");
    }
}
