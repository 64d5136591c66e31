//! Ledger entry projector
//!
//! Maps state leaves onto ledger-entry rows. Dispatch is a match over
//! [`EntryKind`]: each kind either owns one row table or is not projected.
//! Add, change and delete all resolve the table through [`table_for`], so a
//! kind that is projected on add is always removed on delete.

use crate::database::{EntryTable, LedgerDatabase};
use crate::types::{AccountId, Amount, Currency, EntryKind, LedgerEntry, LedgerKey};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row table for a leaf kind; `None` when the kind has no relational projection
pub fn table_for(kind: EntryKind) -> Option<EntryTable> {
    match kind {
        EntryKind::AccountRoot => Some(EntryTable::Accounts),
        EntryKind::TrustLine => Some(EntryTable::TrustLines),
        EntryKind::Offer => Some(EntryTable::Offers),
        EntryKind::DirectoryNode | EntryKind::FeeSettings => None,
    }
}

/// Account row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRow {
    /// Account
    pub account: AccountId,
    /// Native balance in drops
    pub balance: i64,
    /// Next sequence
    pub sequence: u32,
    /// Owned object count
    pub owner_count: u32,
    /// Flags
    pub flags: u32,
    /// Inflation destination
    pub inflation_dest: Option<AccountId>,
}

/// Trust line row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLineRow {
    /// Lower-ordered account
    pub low_account: AccountId,
    /// Higher-ordered account
    pub high_account: AccountId,
    /// Currency
    pub currency: Currency,
    /// Balance, low account's view
    pub balance: Decimal,
    /// Low account's limit
    pub low_limit: Decimal,
    /// High account's limit
    pub high_limit: Decimal,
    /// Flags
    pub flags: u32,
}

/// Offer row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRow {
    /// Owner
    pub account: AccountId,
    /// Creating sequence
    pub sequence: u32,
    /// Taker pays
    pub taker_pays: Amount,
    /// Taker gets
    pub taker_gets: Amount,
    /// Expiration
    pub expiration: Option<u32>,
}

/// Row mutation kind, used for logs and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Leaf added
    Add,
    /// Leaf changed
    Change,
    /// Leaf deleted
    Delete,
}

impl Projection {
    /// Label
    pub fn as_str(&self) -> &'static str {
        match self {
            Projection::Add => "add",
            Projection::Change => "change",
            Projection::Delete => "delete",
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn encode_row(entry: &LedgerEntry) -> Result<Option<(EntryTable, Vec<u8>)>> {
    let row = match entry {
        LedgerEntry::AccountRoot(a) => bincode::serialize(&AccountRow {
            account: a.account.clone(),
            balance: a.balance,
            sequence: a.sequence,
            owner_count: a.owner_count,
            flags: a.flags,
            inflation_dest: a.inflation_dest.clone(),
        })?,
        LedgerEntry::TrustLine(t) => bincode::serialize(&TrustLineRow {
            low_account: t.low.clone(),
            high_account: t.high.clone(),
            currency: t.currency.clone(),
            balance: t.balance,
            low_limit: t.low_limit,
            high_limit: t.high_limit,
            flags: t.flags,
        })?,
        LedgerEntry::Offer(o) => bincode::serialize(&OfferRow {
            account: o.account.clone(),
            sequence: o.sequence,
            taker_pays: o.taker_pays.clone(),
            taker_gets: o.taker_gets.clone(),
            expiration: o.expiration,
        })?,
        LedgerEntry::DirectoryNode(_) | LedgerEntry::FeeSettings(_) => return Ok(None),
    };
    match table_for(entry.kind()) {
        Some(table) => Ok(Some((table, row))),
        None => Err(Error::InvariantViolation(format!(
            "{} encoded a row but has no table",
            entry.kind()
        ))),
    }
}

/// Stateless dispatcher from leaves to row mutations
#[derive(Debug, Clone, Copy)]
pub struct EntryProjector<'a> {
    db: &'a LedgerDatabase,
}

impl<'a> EntryProjector<'a> {
    /// Project into `db`
    pub fn new(db: &'a LedgerDatabase) -> Self {
        Self { db }
    }

    /// Insert the row for a new leaf. Returns whether a row was written.
    pub fn store_add(&self, key: &LedgerKey, entry: &LedgerEntry) -> Result<bool> {
        self.store(Projection::Add, key, entry)
    }

    /// Rewrite the row for a changed leaf. Returns whether a row was written.
    pub fn store_change(&self, key: &LedgerKey, entry: &LedgerEntry) -> Result<bool> {
        self.store(Projection::Change, key, entry)
    }

    /// Remove the row for a deleted leaf. Returns whether a row table was touched.
    pub fn store_delete(&self, key: &LedgerKey, entry: &LedgerEntry) -> Result<bool> {
        check_key(key, entry)?;
        match table_for(entry.kind()) {
            Some(table) => {
                self.db.delete_row(table, key)?;
                tracing::trace!(%key, kind = %entry.kind(), "Row deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every projected row
    pub fn drop_all(&self) -> Result<()> {
        for table in EntryTable::ALL {
            self.db.clear_rows(table)?;
        }
        Ok(())
    }

    fn store(&self, op: Projection, key: &LedgerKey, entry: &LedgerEntry) -> Result<bool> {
        check_key(key, entry)?;
        match encode_row(entry)? {
            Some((table, row)) => {
                self.db.put_row(table, key, row)?;
                tracing::trace!(%key, kind = %entry.kind(), %op, "Row stored");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn check_key(key: &LedgerKey, entry: &LedgerEntry) -> Result<()> {
    if entry.key() == *key {
        Ok(())
    } else {
        Err(Error::InvariantViolation(format!(
            "{} leaf stored under foreign key {}",
            entry.kind(),
            key
        )))
    }
}
