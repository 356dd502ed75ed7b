//! Error types for snapshot reconstruction.

use std::fmt;

use alloy::primitives::Address;

/// Boxed error returned by collaborator implementations (RPC clients, price
/// APIs, file sinks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The stage of a snapshot run that talks to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reading the current chain tip.
    Tip,
    /// Binary search for the block at the target timestamp.
    Locate,
    /// Windowed `Transfer` log retrieval.
    Fetch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tip => "chain tip lookup",
            Self::Locate => "block search",
            Self::Fetch => "transfer log fetch",
        })
    }
}

/// Errors that abort a snapshot run.
///
/// A missing price is deliberately absent: the oracle reports it as
/// `Ok(None)` and the run continues without it.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or incomplete configuration, raised before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested snapshot time lies beyond the newest block.
    #[error(
        "snapshot timestamp {target} is in the future: chain tip is block {tip_height} at {tip_timestamp}"
    )]
    FutureTimestamp {
        /// Requested unix timestamp.
        target: u64,
        /// Height of the chain tip at the time of the check.
        tip_height: u64,
        /// Timestamp of the chain tip.
        tip_timestamp: u64,
    },

    /// A provider call failed.
    #[error("{phase} failed: {source}")]
    Provider {
        /// Stage that issued the failing call.
        phase: Phase,
        /// Underlying transport or RPC error.
        #[source]
        source: BoxError,
    },

    /// A log could not be decoded as an ERC-20 `Transfer`.
    #[error("malformed transfer event: {0}")]
    MalformedEvent(String),

    /// A running balance left the representable range.
    #[error("balance overflow for {0}")]
    BalanceOverflow(Address),

    /// The persistence sink rejected the snapshot.
    #[error("writing snapshot failed: {0}")]
    Sink(#[source] BoxError),
}

impl Error {
    /// Wrap a collaborator failure with the phase it happened in.
    pub fn provider(phase: Phase, source: impl Into<BoxError>) -> Self {
        Self::Provider {
            phase,
            source: source.into(),
        }
    }

    /// Whether retrying the run against another endpoint could help.
    #[must_use]
    pub const fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
