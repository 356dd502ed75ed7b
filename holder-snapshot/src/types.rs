//! Core domain types: block references, decoded transfers and the
//! snapshot result handed to a sink.

use std::collections::BTreeMap;

use alloy::primitives::{Address, B256, U256, aliases::I512, b256};

use crate::error::{Error, Result};

/// Signed running balance.
///
/// Transfer values are at most 256 bits wide; the extra headroom lets a fold
/// over any realistic event history stay exact without wrapping.
pub type Balance = I512;

/// `keccak256("Transfer(address,address,uint256)")`.
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// A block height paired with its header timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    /// Block number.
    pub height: u64,
    /// Header timestamp in unix seconds.
    pub timestamp: u64,
}

/// A decoded ERC-20 `Transfer(from, to, value)` log.
///
/// [`Address::ZERO`] on either side marks a mint (`from`) or burn (`to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferEvent {
    /// Sender, or zero for a mint.
    pub from: Address,
    /// Recipient, or zero for a burn.
    pub to: Address,
    /// Raw token amount (no decimal scaling).
    pub value: U256,
    /// Block the log was emitted in.
    pub block: u64,
    /// Position of the log within its block.
    pub log_index: u64,
}

impl TransferEvent {
    /// Build a transfer without positional metadata.
    #[must_use]
    pub const fn new(from: Address, to: Address, value: U256) -> Self {
        Self {
            from,
            to,
            value,
            block: 0,
            log_index: 0,
        }
    }

    /// Attach the block and log index the event was emitted at.
    #[must_use]
    pub const fn at(mut self, block: u64, log_index: u64) -> Self {
        self.block = block;
        self.log_index = log_index;
        self
    }

    /// Whether this transfer creates supply.
    #[must_use]
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }

    /// Whether this transfer destroys supply.
    #[must_use]
    pub fn is_burn(&self) -> bool {
        self.to == Address::ZERO
    }

    /// Decode a raw `Transfer` log from its topics and data payload.
    ///
    /// Expects exactly three topics (signature, indexed `from`, indexed `to`)
    /// and a single 32-byte word of data holding `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedEvent`] when the log does not have the
    /// `Transfer` shape. Nothing is defaulted: a truncated payload is an
    /// error, never a zero amount.
    pub fn from_log_parts(
        topics: &[B256],
        data: &[u8],
        block: u64,
        log_index: u64,
    ) -> Result<Self> {
        let [signature, from, to] = topics else {
            return Err(Error::MalformedEvent(format!(
                "block {block} log {log_index}: expected 3 topics, got {}",
                topics.len()
            )));
        };
        if *signature != TRANSFER_TOPIC {
            return Err(Error::MalformedEvent(format!(
                "block {block} log {log_index}: unexpected topic0 {signature}"
            )));
        }
        if data.len() != 32 {
            return Err(Error::MalformedEvent(format!(
                "block {block} log {log_index}: expected 32 data bytes, got {}",
                data.len()
            )));
        }

        Ok(Self {
            from: topic_address(from, block, log_index)?,
            to: topic_address(to, block, log_index)?,
            value: U256::from_be_slice(data),
            block,
            log_index,
        })
    }
}

/// Extract an indexed address from a left-padded topic word.
fn topic_address(topic: &B256, block: u64, log_index: u64) -> Result<Address> {
    let (padding, addr) = topic.as_slice().split_at(12);
    if padding.iter().any(|b| *b != 0) {
        return Err(Error::MalformedEvent(format!(
            "block {block} log {log_index}: topic {topic} is not a padded address"
        )));
    }
    Ok(Address::from_slice(addr))
}

/// Outcome of a single snapshot run.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotResult {
    /// Block the snapshot was taken at.
    pub block_height: u64,
    /// Timestamp of that block.
    pub block_timestamp: u64,
    /// Number of `Transfer` events replayed.
    pub event_count: usize,
    /// Non-zero balances, ordered by address.
    pub balances: BTreeMap<Address, Balance>,
    /// Historical USD price on the snapshot date, when the oracle had one.
    pub price_usd: Option<f64>,
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    fn word(addr: Address) -> B256 {
        addr.into_word()
    }

    #[test]
    fn decodes_transfer_log() {
        let from = address!("1111111111111111111111111111111111111111");
        let to = address!("2222222222222222222222222222222222222222");
        let value = U256::from(1_000_000_u64);

        let event = TransferEvent::from_log_parts(
            &[TRANSFER_TOPIC, word(from), word(to)],
            &value.to_be_bytes::<32>(),
            42,
            7,
        )
        .unwrap();

        assert_eq!(event, TransferEvent::new(from, to, value).at(42, 7), "decoded event");
        assert!(!event.is_mint() && !event.is_burn(), "plain transfer");
    }

    #[test]
    fn rejects_wrong_topic_count() {
        let err = TransferEvent::from_log_parts(&[TRANSFER_TOPIC], &[0; 32], 1, 0).unwrap_err();
        assert!(
            err.to_string().contains("expected 3 topics, got 1"),
            "unexpected message: {err}"
        );
    }

    #[test]
    fn rejects_foreign_event() {
        let err = TransferEvent::from_log_parts(
            &[B256::ZERO, B256::ZERO, B256::ZERO],
            &[0; 32],
            1,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedEvent(_)), "got {err:?}");
    }

    #[test]
    fn rejects_short_payload() {
        let err = TransferEvent::from_log_parts(
            &[TRANSFER_TOPIC, B256::ZERO, B256::ZERO],
            &[0; 31],
            9,
            3,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("expected 32 data bytes, got 31"),
            "unexpected message: {err}"
        );
    }

    #[test]
    fn rejects_dirty_address_padding() {
        let err = TransferEvent::from_log_parts(
            &[TRANSFER_TOPIC, B256::repeat_byte(0xff), B256::ZERO],
            &[0; 32],
            1,
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a padded address"), "got {err}");
    }

    #[test]
    fn zero_sentinel_marks_mint_and_burn() {
        let a = address!("00000000000000000000000000000000000000aa");
        assert!(TransferEvent::new(Address::ZERO, a, U256::from(1)).is_mint(), "mint");
        assert!(TransferEvent::new(a, Address::ZERO, U256::from(1)).is_burn(), "burn");
    }
}
