// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — civitas-mempool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{Transaction, TransactionType};
use civitas_mempool::Mempool;
use proptest::prelude::*;

fn arb_tx_id() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}"
}

fn tx(id: &str) -> Transaction {
    Transaction::new_unsigned(
        id.to_string(),
        "0xalice".into(),
        "0xbob".into(),
        10,
        None,
        1_700_000_000,
        TransactionType::Regular,
    )
}

proptest! {
    /// Invariant 11: admitting the same id twice never grows the pool past one entry.
    #[test]
    fn prop_duplicate_add_is_idempotent(id in arb_tx_id()) {
        let mempool = Mempool::new();
        mempool.add(tx(&id)).unwrap();
        let second = mempool.add(tx(&id));
        prop_assert!(second.is_err());
        prop_assert_eq!(mempool.len(), 1);
    }

    #[test]
    fn prop_list_length_matches_distinct_ids(ids in proptest::collection::vec(arb_tx_id(), 0..20)) {
        let mempool = Mempool::new();
        let mut distinct = std::collections::BTreeSet::new();
        for id in &ids {
            if mempool.add(tx(id)).is_ok() {
                distinct.insert(id.clone());
            }
        }
        prop_assert_eq!(mempool.len(), distinct.len());
        prop_assert_eq!(mempool.list().len(), distinct.len());
    }

    #[test]
    fn prop_remove_then_readd_succeeds(id in arb_tx_id()) {
        let mempool = Mempool::new();
        mempool.add(tx(&id)).unwrap();
        mempool.remove(&id).unwrap();
        prop_assert!(mempool.is_empty());
        prop_assert!(mempool.add(tx(&id)).is_ok());
    }

    #[test]
    fn prop_list_preserves_insertion_order(ids in proptest::collection::vec(arb_tx_id(), 1..10)) {
        let mempool = Mempool::new();
        let mut expected = Vec::new();
        for id in &ids {
            if mempool.add(tx(id)).is_ok() {
                expected.push(id.clone());
            }
        }
        let actual: Vec<String> = mempool.list().into_iter().map(|t| t.id).collect();
        prop_assert_eq!(actual, expected);
    }
}
