//! Closed ledgers
//!
//! A [`ClosedLedger`] is what consensus hands over: a header chained to its
//! parent by hash, plus the state map the header's account hash commits to.

use crate::crypto::hash_parts;
use crate::state::StateMap;
use crate::types::{Hash256, LedgerHash};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Domain prefix for ledger header hashes
const LEDGER_HASH_PREFIX: &[u8] = b"LWR\0";

/// Ledger header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerHeader {
    /// Ledger sequence (genesis is 1)
    pub sequence: u32,
    /// Hash of the preceding ledger; zero for genesis
    pub parent_hash: LedgerHash,
    /// Merkle root of the account state
    pub account_hash: Hash256,
    /// Native coins in existence, in drops
    pub total_coins: u64,
    /// Close time
    pub close_time: DateTime<Utc>,
}

impl LedgerHeader {
    /// Compute the ledger hash
    pub fn compute_hash(&self) -> LedgerHash {
        hash_parts(&[
            LEDGER_HASH_PREFIX,
            &self.sequence.to_be_bytes(),
            self.parent_hash.as_bytes(),
            self.account_hash.as_bytes(),
            &self.total_coins.to_be_bytes(),
            &self.close_time.timestamp().to_be_bytes(),
        ])
    }
}

/// A closed ledger: header plus state
#[derive(Debug, Clone)]
pub struct ClosedLedger {
    header: LedgerHeader,
    hash: LedgerHash,
    state: Arc<StateMap>,
}

impl ClosedLedger {
    /// First ledger of a chain
    pub fn genesis(state: StateMap, total_coins: u64, close_time: DateTime<Utc>) -> Result<Self> {
        let header = LedgerHeader {
            sequence: 1,
            parent_hash: Hash256::ZERO,
            account_hash: state.root_hash()?,
            total_coins,
            close_time,
        };
        Ok(Self::assemble(header, state))
    }

    /// Close `state` as the successor of `parent`
    pub fn close(parent: &ClosedLedger, state: StateMap, close_time: DateTime<Utc>) -> Result<Self> {
        let header = LedgerHeader {
            sequence: parent.sequence() + 1,
            parent_hash: parent.hash(),
            account_hash: state.root_hash()?,
            total_coins: parent.header.total_coins,
            close_time,
        };
        Ok(Self::assemble(header, state))
    }

    /// Pair a received header with its (possibly still incomplete) state.
    ///
    /// A complete state must hash to the header's account hash.
    pub fn from_parts(header: LedgerHeader, state: StateMap) -> Result<Self> {
        if state.is_complete() {
            let root = state.root_hash()?;
            if root != header.account_hash {
                return Err(Error::Corrupt(format!(
                    "ledger {} state root {} does not match header {}",
                    header.sequence, root, header.account_hash
                )));
            }
        }
        Ok(Self::assemble(header, state))
    }

    fn assemble(header: LedgerHeader, state: StateMap) -> Self {
        let hash = header.compute_hash();
        Self {
            header,
            hash,
            state: Arc::new(state),
        }
    }

    /// Ledger hash
    pub fn hash(&self) -> LedgerHash {
        self.hash
    }

    /// Parent ledger hash
    pub fn parent_hash(&self) -> LedgerHash {
        self.header.parent_hash
    }

    /// Ledger sequence
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Header
    pub fn header(&self) -> &LedgerHeader {
        &self.header
    }

    /// Account state
    pub fn state(&self) -> &StateMap {
        &self.state
    }

    /// Up to `max` state tree nodes this node still needs to reconstruct the ledger
    pub fn needed_state_hashes(&self, max: usize) -> Vec<Hash256> {
        self.state.missing_nodes(max)
    }
}
