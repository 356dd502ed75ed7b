//! Balance reconstruction from an ordered stream of transfers.

use std::collections::{BTreeMap, HashMap};

use alloy::primitives::{Address, U256, aliases::U512};

use crate::error::{Error, Result};
use crate::types::{Balance, TransferEvent};

/// Per-address running balances folded from `Transfer` events.
///
/// The zero address is the mint/burn sentinel and never gets an entry.
/// Supply created and destroyed through it is tracked separately so that
/// the fold can be checked: the sum of all entries always equals
/// `minted - burned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceLedger {
    balances: HashMap<Address, Balance>,
    minted: Balance,
    burned: Balance,
    events: usize,
}

impl BalanceLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
            minted: Balance::ZERO,
            burned: Balance::ZERO,
            events: 0,
        }
    }

    /// Fold `events` into a fresh ledger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BalanceOverflow`] if a running balance leaves the
    /// representable range.
    pub fn accumulate<'a, I>(events: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a TransferEvent>,
    {
        let mut ledger = Self::new();
        for event in events {
            ledger.apply(event)?;
        }
        tracing::debug!(
            events = ledger.events,
            addresses = ledger.balances.len(),
            "ledger built"
        );
        Ok(ledger)
    }

    /// Apply a single transfer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BalanceOverflow`] if a running balance leaves the
    /// representable range.
    pub fn apply(&mut self, event: &TransferEvent) -> Result<()> {
        let value = widen(event.value);

        if event.is_mint() {
            self.minted = self
                .minted
                .checked_add(value)
                .ok_or(Error::BalanceOverflow(Address::ZERO))?;
        } else {
            let entry = self.balances.entry(event.from).or_insert(Balance::ZERO);
            *entry = entry
                .checked_sub(value)
                .ok_or(Error::BalanceOverflow(event.from))?;
        }

        if event.is_burn() {
            self.burned = self
                .burned
                .checked_add(value)
                .ok_or(Error::BalanceOverflow(Address::ZERO))?;
        } else {
            let entry = self.balances.entry(event.to).or_insert(Balance::ZERO);
            *entry = entry
                .checked_add(value)
                .ok_or(Error::BalanceOverflow(event.to))?;
        }

        self.events += 1;
        Ok(())
    }

    /// Running balance of `address`, including zero entries.
    #[must_use]
    pub fn get(&self, address: &Address) -> Option<Balance> {
        self.balances.get(address).copied()
    }

    /// Number of addresses touched, zero balances included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// Whether no address has been touched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Number of events applied.
    #[must_use]
    pub const fn event_count(&self) -> usize {
        self.events
    }

    /// Total supply created by transfers from the zero address.
    #[must_use]
    pub const fn minted(&self) -> Balance {
        self.minted
    }

    /// Total supply destroyed by transfers to the zero address.
    #[must_use]
    pub const fn burned(&self) -> Balance {
        self.burned
    }

    /// Sum of every entry, zero balances included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BalanceOverflow`] if the sum is not representable.
    pub fn total(&self) -> Result<Balance> {
        self.balances
            .iter()
            .try_fold(Balance::ZERO, |acc, (addr, bal)| {
                acc.checked_add(*bal).ok_or(Error::BalanceOverflow(*addr))
            })
    }

    /// Whether entries sum to net issuance (`minted - burned`).
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        let Some(net) = self.minted.checked_sub(self.burned) else {
            return false;
        };
        self.total().is_ok_and(|total| total == net)
    }

    /// Addresses whose balance ended below zero.
    ///
    /// Only possible when the replay started after some of the supply was
    /// already distributed.
    pub fn negative(&self) -> impl Iterator<Item = (&Address, &Balance)> {
        self.balances.iter().filter(|(_, b)| b.is_negative())
    }

    /// Consume the ledger, dropping exact-zero entries and ordering the rest
    /// by address.
    #[must_use]
    pub fn into_balances(self) -> BTreeMap<Address, Balance> {
        self.balances
            .into_iter()
            .filter(|(_, b)| !b.is_zero())
            .collect()
    }
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Lift a 256-bit transfer amount into the signed balance domain.
fn widen(value: U256) -> Balance {
    Balance::from_raw(U512::from(value))
}
