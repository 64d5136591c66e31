//! Property-based tests for synchronization invariants
//!
//! - Replaying deltas yields exactly the rows of a from-scratch import
//! - Skipping intermediate ledgers yields the same rows as visiting them all
//! - The delta bound never changes the outcome, only the path taken

mod common;

use common::*;
use ledger_sync::{CanonicalLedger, ClosedLedger, Config, LedgerDatabase, LedgerEntry};
use proptest::prelude::*;
use std::sync::Arc;

/// One leaf slot: which account or line, and its balance (`None` = absent)
type Slot = Option<i64>;

/// Strategy for one ledger state over a small universe of keys
fn state_strategy() -> impl Strategy<Value = Vec<Slot>> {
    prop::collection::vec(
        prop_oneof![
            1 => Just(None),
            3 => (0i64..1_000).prop_map(Some),
        ],
        12,
    )
}

/// Slots 0..8 are accounts, 8..10 trust lines, 10..12 offers
fn entries(slots: &[Slot]) -> Vec<LedgerEntry> {
    let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
    slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            slot.map(|value| match i {
                0..=7 => account(names[i], value),
                8 | 9 => trust_line(names[i - 8], "gateway", value),
                _ => offer(names[i - 10], 1, value + 1),
            })
        })
        .collect()
}

fn chain(states: &[Vec<Slot>]) -> Vec<Arc<ClosedLedger>> {
    let mut ledgers: Vec<Arc<ClosedLedger>> = Vec::with_capacity(states.len());
    for slots in states {
        let ledger = match ledgers.last() {
            Some(parent) => next(parent, entries(slots)),
            None => genesis(entries(slots)),
        };
        ledgers.push(ledger);
    }
    ledgers
}

fn config(max_delta_entries: usize) -> Config {
    let mut config = Config::default();
    config.sync.max_delta_entries = max_delta_entries;
    config.import.batch_size = 3;
    config
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every step of a ledger chain leaves rows equal to a full reimport
    #[test]
    fn prop_incremental_matches_full_import(
        states in prop::collection::vec(state_strategy(), 2..6),
    ) {
        let ledgers = chain(&states);
        let db = Arc::new(LedgerDatabase::in_memory());
        let (mut m, _) = master_with(db.clone(), &config(1_000));

        for ledger in &ledgers {
            prop_assert!(m.ensure_sync(ledger.clone(), true));
            prop_assert_eq!(all_rows(&db), expected_rows(ledger));
        }
    }

    /// Jumping straight to the tip gives the same rows as walking the chain
    #[test]
    fn prop_skip_equals_walk(
        states in prop::collection::vec(state_strategy(), 2..6),
    ) {
        let ledgers = chain(&states);
        let tip = ledgers[ledgers.len() - 1].clone();

        let walked = Arc::new(LedgerDatabase::in_memory());
        let (mut walker, _) = master_with(walked.clone(), &config(1_000));
        for ledger in &ledgers {
            prop_assert!(walker.ensure_sync(ledger.clone(), true));
        }

        let jumped = Arc::new(LedgerDatabase::in_memory());
        let (mut jumper, _) = master_with(jumped.clone(), &config(1_000));
        prop_assert!(jumper.ensure_sync(ledgers[0].clone(), true));
        prop_assert!(jumper.catch_up(CanonicalLedger::from_ledger(tip.clone())).is_ok());

        prop_assert_eq!(all_rows(&walked), all_rows(&jumped));
        prop_assert_eq!(walker.last_ledger_hash(), jumper.last_ledger_hash());
    }

    /// A tiny delta bound forces full imports but never changes the rows
    #[test]
    fn prop_delta_bound_only_changes_path(
        states in prop::collection::vec(state_strategy(), 2..5),
        bound in 1usize..4,
    ) {
        let ledgers = chain(&states);
        let db = Arc::new(LedgerDatabase::in_memory());
        let (mut m, _) = master_with(db.clone(), &config(bound));

        for ledger in &ledgers {
            prop_assert!(m.ensure_sync(ledger.clone(), true));
            prop_assert_eq!(all_rows(&db), expected_rows(ledger));
        }
    }
}
