//! Core types for ledger state
//!
//! All types are designed for:
//! - Deterministic serialization (bincode), so leaf hashes are stable
//! - Exact arithmetic (Decimal for issued amounts, integer drops for native balances)
//! - A closed set of leaf variants dispatched by pattern match

use crate::crypto::hash_parts;
use crate::error::Error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 256-bit content hash
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

/// Hash identifying a ledger (header plus state root)
pub type LedgerHash = Hash256;

/// Key addressing a single leaf in the state tree
pub type LedgerKey = Hash256;

impl Hash256 {
    /// The "no ledger" sentinel
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True for the sentinel value
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Hex text form; the sentinel encodes as the empty string
    pub fn to_state_string(&self) -> String {
        if self.is_zero() {
            String::new()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(&self.0[..8]))
    }
}

impl FromStr for Hash256 {
    type Err = Error;

    /// Parse 64 hex chars. The empty string parses to [`Hash256::ZERO`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Hash256::ZERO);
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHash(format!("{}: {}", s, e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidHash(format!("{}: expected 32 bytes", s)))?;
        Ok(Hash256(bytes))
    }
}

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Three letter currency code for issued assets
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Parse from string (three ASCII uppercase letters or digits)
    pub fn from_code(s: &str) -> Option<Self> {
        if s.len() == 3 && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount of a native or issued asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Amount {
    /// Native asset, in drops
    Native(i64),
    /// Issued asset
    Issued {
        /// Asset code
        currency: Currency,
        /// Issuing account
        issuer: AccountId,
        /// Exact value
        value: Decimal,
    },
}

/// Account root leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRoot {
    /// Account
    pub account: AccountId,
    /// Native balance in drops
    pub balance: i64,
    /// Next transaction sequence
    pub sequence: u32,
    /// Number of objects owned by the account
    pub owner_count: u32,
    /// Account flags
    pub flags: u32,
    /// Inflation destination, if set
    pub inflation_dest: Option<AccountId>,
}

/// Trust line between two accounts in one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLine {
    /// Lower-ordered account
    pub low: AccountId,
    /// Higher-ordered account
    pub high: AccountId,
    /// Currency of the line
    pub currency: Currency,
    /// Balance from the low account's point of view
    pub balance: Decimal,
    /// Limit set by the low account
    pub low_limit: Decimal,
    /// Limit set by the high account
    pub high_limit: Decimal,
    /// Line flags
    pub flags: u32,
}

impl TrustLine {
    /// Create a line with accounts placed in canonical order
    pub fn between(a: AccountId, b: AccountId, currency: Currency) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low,
            high,
            currency,
            balance: Decimal::ZERO,
            low_limit: Decimal::ZERO,
            high_limit: Decimal::ZERO,
            flags: 0,
        }
    }
}

/// Standing offer on the order book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Owner of the offer
    pub account: AccountId,
    /// Sequence of the creating transaction
    pub sequence: u32,
    /// What the taker pays
    pub taker_pays: Amount,
    /// What the taker gets
    pub taker_gets: Amount,
    /// Expiration (ledger close time, seconds), if any
    pub expiration: Option<u32>,
}

/// Owner or order book directory page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryNode {
    /// Key of the first page of this directory
    pub root_index: LedgerKey,
    /// Page number
    pub page: u64,
    /// Leaf keys listed on this page
    pub indexes: Vec<LedgerKey>,
}

/// Network fee schedule (singleton)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSettings {
    /// Base transaction fee in drops
    pub base_fee: u64,
    /// Base account reserve in drops
    pub reserve_base: u64,
    /// Reserve per owned object in drops
    pub reserve_increment: u64,
}

/// Leaf type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum EntryKind {
    /// Account root
    AccountRoot = b'a',
    /// Trust line
    TrustLine = b'r',
    /// Offer
    Offer = b'o',
    /// Directory page
    DirectoryNode = b'd',
    /// Fee schedule
    FeeSettings = b'e',
}

impl EntryKind {
    /// Short name for logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::AccountRoot => "account_root",
            EntryKind::TrustLine => "trust_line",
            EntryKind::Offer => "offer",
            EntryKind::DirectoryNode => "directory_node",
            EntryKind::FeeSettings => "fee_settings",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single leaf of the ledger state tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntry {
    /// Account root
    AccountRoot(AccountRoot),
    /// Trust line
    TrustLine(TrustLine),
    /// Offer
    Offer(Offer),
    /// Directory page
    DirectoryNode(DirectoryNode),
    /// Fee schedule
    FeeSettings(FeeSettings),
}

impl LedgerEntry {
    /// Leaf type tag
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::AccountRoot(_) => EntryKind::AccountRoot,
            LedgerEntry::TrustLine(_) => EntryKind::TrustLine,
            LedgerEntry::Offer(_) => EntryKind::Offer,
            LedgerEntry::DirectoryNode(_) => EntryKind::DirectoryNode,
            LedgerEntry::FeeSettings(_) => EntryKind::FeeSettings,
        }
    }

    /// Leaf key, derived from the identity fields of the entry
    pub fn key(&self) -> LedgerKey {
        let tag = [self.kind() as u8];
        match self {
            LedgerEntry::AccountRoot(a) => hash_parts(&[&tag, a.account.as_str().as_bytes()]),
            LedgerEntry::TrustLine(t) => hash_parts(&[
                &tag,
                t.low.as_str().as_bytes(),
                &[0],
                t.high.as_str().as_bytes(),
                &[0],
                t.currency.code().as_bytes(),
            ]),
            LedgerEntry::Offer(o) => hash_parts(&[
                &tag,
                o.account.as_str().as_bytes(),
                &o.sequence.to_be_bytes(),
            ]),
            LedgerEntry::DirectoryNode(d) => {
                hash_parts(&[&tag, d.root_index.as_bytes(), &d.page.to_be_bytes()])
            }
            LedgerEntry::FeeSettings(_) => hash_parts(&[&tag]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str, balance: i64) -> LedgerEntry {
        LedgerEntry::AccountRoot(AccountRoot {
            account: AccountId::new(name),
            balance,
            sequence: 1,
            owner_count: 0,
            flags: 0,
            inflation_dest: None,
        })
    }

    #[test]
    fn test_hash_text_round_trip() {
        let h = hash_parts(&[b"ledger"]);
        let parsed: Hash256 = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn test_empty_string_is_sentinel() {
        let parsed: Hash256 = "".parse().unwrap();
        assert!(parsed.is_zero());
        assert_eq!(Hash256::ZERO.to_state_string(), "");
    }

    #[test]
    fn test_invalid_hash_rejected() {
        assert!("abcd".parse::<Hash256>().is_err());
        assert!("zz".repeat(32).parse::<Hash256>().is_err());
    }

    #[test]
    fn test_key_ignores_mutable_fields() {
        assert_eq!(account("alice", 10).key(), account("alice", 99).key());
        assert_ne!(account("alice", 10).key(), account("bob", 10).key());
    }

    #[test]
    fn test_trust_line_canonical_order() {
        let usd = Currency::from_code("USD").unwrap();
        let a = TrustLine::between(AccountId::new("zed"), AccountId::new("amy"), usd.clone());
        let b = TrustLine::between(AccountId::new("amy"), AccountId::new("zed"), usd);
        assert_eq!(a.low.as_str(), "amy");
        assert_eq!(
            LedgerEntry::TrustLine(a).key(),
            LedgerEntry::TrustLine(b).key()
        );
    }

    #[test]
    fn test_currency_from_code() {
        assert!(Currency::from_code("USD").is_some());
        assert!(Currency::from_code("usd").is_none());
        assert!(Currency::from_code("DOLLAR").is_none());
    }
}
