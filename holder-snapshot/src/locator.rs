//! Block-by-timestamp resolution.

use crate::error::{Error, Phase, Result};
use crate::source::ChainSource;
use crate::types::BlockRef;

/// Find the last block whose timestamp is at or before `target`.
///
/// Binary search over `[0, chain_tip]`, one header fetch per probe. A probe
/// landing exactly on `target` returns immediately. Otherwise the search
/// runs until the bounds cross and returns the highest probed block that was
/// still older than `target`, so the result is a floor, never a block from
/// after the snapshot time. If even block 0 is newer than `target`, block 0
/// is returned.
///
/// The header of the chosen block is returned as fetched during the search,
/// so callers need no extra round trip for its timestamp.
///
/// The caller is expected to have checked that `target` does not exceed the
/// tip timestamp.
///
/// # Errors
///
/// Any failed header fetch aborts the search with
/// [`Error::Provider`] in [`Phase::Locate`]. No retries happen here.
pub async fn locate_block<S: ChainSource>(
    source: &S,
    target: u64,
    chain_tip: u64,
) -> Result<BlockRef> {
    let mut low = 0u64;
    let mut high = chain_tip;
    let mut floor = None;
    let mut probes = 0u32;

    while low <= high {
        let mid = low + (high - low) / 2;
        let block = fetch(source, mid).await?;
        probes += 1;
        tracing::debug!(height = mid, timestamp = block.timestamp, target, low, high, "probe");

        if block.timestamp == target {
            tracing::info!(height = mid, probes, "exact timestamp match");
            return Ok(block);
        }
        if block.timestamp < target {
            floor = Some(block);
            low = mid + 1;
        } else {
            let Some(next) = mid.checked_sub(1) else {
                // Genesis is already newer than the target.
                tracing::info!(height = 0, probes, target, "target precedes genesis");
                return Ok(block);
            };
            high = next;
        }
    }

    let block = match floor {
        Some(block) => block,
        None => fetch(source, 0).await?,
    };
    tracing::info!(height = block.height, probes, target, "resolved snapshot block");
    Ok(block)
}

async fn fetch<S: ChainSource>(source: &S, height: u64) -> Result<BlockRef> {
    source
        .block(height)
        .await
        .map_err(|e| Error::provider(Phase::Locate, e))
}
