// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - TRANSACTION MEMPOOL
//
// Holds transactions admitted but not yet included in a block. Ordering is
// insertion order (no fee/priority market — PoA block production pulls the
// whole pending set each round); entries are unique by transaction id.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{CoreError, Transaction};
use std::collections::BTreeMap;
use std::sync::RwLock;

struct MempoolState {
    /// Insertion order of transaction ids; `entries` is the id-indexed store.
    order: Vec<String>,
    entries: BTreeMap<String, Transaction>,
}

pub struct Mempool {
    state: RwLock<MempoolState>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool { state: RwLock::new(MempoolState { order: Vec::new(), entries: BTreeMap::new() }) }
    }

    /// Admit a transaction. Invariant 11: ids are unique — a duplicate id is
    /// rejected rather than silently replacing the existing entry.
    pub fn add(&self, tx: Transaction) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("mempool lock poisoned");
        if state.entries.contains_key(&tx.id) {
            return Err(CoreError::state(format!("transaction {} already in mempool", tx.id)));
        }
        state.order.push(tx.id.clone());
        state.entries.insert(tx.id.clone(), tx);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Transaction> {
        let mut state = self.state.write().expect("mempool lock poisoned");
        let removed = state.entries.remove(id);
        if removed.is_some() {
            state.order.retain(|existing| existing != id);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Transaction> {
        let state = self.state.read().expect("mempool lock poisoned");
        state.entries.get(id).cloned()
    }

    /// Copy-on-read snapshot of pending transactions in admission order.
    pub fn list(&self) -> Vec<Transaction> {
        let state = self.state.read().expect("mempool lock poisoned");
        state.order.iter().filter_map(|id| state.entries.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        let state = self.state.read().expect("mempool lock poisoned");
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitas_core::TransactionType;

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

    #[test]
    fn add_then_list_preserves_insertion_order() {
        let mempool = Mempool::new();
        mempool.add(tx("tx1")).unwrap();
        mempool.add(tx("tx2")).unwrap();
        let ids: Vec<String> = mempool.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["tx1".to_string(), "tx2".to_string()]);
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mempool = Mempool::new();
        mempool.add(tx("tx1")).unwrap();
        assert!(mempool.add(tx("tx1")).is_err());
    }

    #[test]
    fn remove_makes_room_for_reuse_of_id() {
        let mempool = Mempool::new();
        mempool.add(tx("tx1")).unwrap();
        assert!(mempool.remove("tx1").is_some());
        assert_eq!(mempool.len(), 0);
        assert!(mempool.add(tx("tx1")).is_ok());
    }

    #[test]
    fn len_and_is_empty_track_size() {
        let mempool = Mempool::new();
        assert!(mempool.is_empty());
        mempool.add(tx("tx1")).unwrap();
        assert_eq!(mempool.len(), 1);
        assert!(!mempool.is_empty());
    }
}
