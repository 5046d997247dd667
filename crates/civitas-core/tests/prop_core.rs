// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — civitas-core
//
// These tests verify invariants that must hold for every input proptest
// generates, not just the handful of cases a unit test picks by hand.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{
    format_amount_decimal, parse_amount_decimal, reward_for_height, Amount, Ledger, PrecisionMode,
    Transaction, TransactionType, BASE_REWARD_BASE_UNITS, HALVING_INTERVAL_BLOCKS,
};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────
// TRANSACTION HASHING
// ─────────────────────────────────────────────────────────────────

fn arb_tx_type() -> impl Strategy<Value = TransactionType> {
    prop_oneof![
        Just(TransactionType::Regular),
        Just(TransactionType::ContractDeploy),
        Just(TransactionType::ContractCall),
        Just(TransactionType::Reward),
    ]
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        "[a-z0-9_]{1,16}",
        "0x[a-f0-9]{8,40}",
        "0x[a-f0-9]{8,40}",
        0u128..=BASE_REWARD_BASE_UNITS * 1000,
        arb_tx_type(),
        1_700_000_000i64..=2_000_000_000i64,
    )
        .prop_map(|(id, from, to, value, tx_type, timestamp)| {
            Transaction::new_unsigned(id, from, to, value, None, timestamp, tx_type)
        })
}

proptest! {
    #[test]
    fn prop_signing_hash_deterministic(tx in arb_transaction()) {
        prop_assert_eq!(tx.signing_hash(), tx.signing_hash());
    }

    #[test]
    fn prop_signing_hash_length_is_64_hex_chars(tx in arb_transaction()) {
        let hash = tx.signing_hash();
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn prop_different_ids_usually_differ_in_hash(
        a in arb_transaction(),
        suffix in "[a-z0-9]{4,8}",
    ) {
        let mut b = a.clone();
        b.id = format!("{}{suffix}", a.id);
        prop_assert_ne!(a.signing_hash(), b.signing_hash());
    }
}

// ─────────────────────────────────────────────────────────────────
// REWARD HALVING
// ─────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_reward_never_exceeds_base(height in 0u64..=HALVING_INTERVAL_BLOCKS * 300) {
        let reward = reward_for_height(height, PrecisionMode::Wide);
        prop_assert!(reward <= BASE_REWARD_BASE_UNITS);
    }

    #[test]
    fn prop_reward_constant_within_epoch(
        height in 0u64..=HALVING_INTERVAL_BLOCKS * 10,
        offset in 0u64..HALVING_INTERVAL_BLOCKS,
    ) {
        let epoch_start = (height / HALVING_INTERVAL_BLOCKS) * HALVING_INTERVAL_BLOCKS;
        let other = epoch_start + offset;
        prop_assert_eq!(
            reward_for_height(epoch_start, PrecisionMode::Wide),
            reward_for_height(other, PrecisionMode::Wide),
        );
    }

    #[test]
    fn prop_reward_halves_each_epoch(epoch in 0u64..127) {
        let this_epoch = reward_for_height(epoch * HALVING_INTERVAL_BLOCKS, PrecisionMode::Wide);
        let next_epoch = reward_for_height((epoch + 1) * HALVING_INTERVAL_BLOCKS, PrecisionMode::Wide);
        prop_assert_eq!(this_epoch / 2, next_epoch);
    }
}

// ─────────────────────────────────────────────────────────────────
// DECIMAL FORMATTING ROUND TRIP
// ─────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_format_parse_round_trip(amount in any::<u64>()) {
        let amount = amount as Amount;
        let formatted = format_amount_decimal(amount);
        let parsed = parse_amount_decimal(&formatted).unwrap();
        prop_assert_eq!(parsed, amount);
    }
}

// ─────────────────────────────────────────────────────────────────
// LEDGER LOCK / UNLOCK MONOTONICITY
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// Invariant 8: locking then unlocking the same amount restores the
    /// pre-lock free and locked balances exactly.
    #[test]
    fn prop_lock_then_unlock_restores_balance(
        starting in 0u128..=1_000_000_000u128,
        lock_amount in 0u128..=1_000_000_000u128,
    ) {
        prop_assume!(lock_amount <= starting);
        let ledger = Ledger::new(PrecisionMode::Wide);
        ledger.set_balance("0xholder", starting);
        ledger.lock("0xholder", lock_amount).unwrap();
        ledger.unlock("0xholder", lock_amount).unwrap();
        prop_assert_eq!(ledger.get_balance("0xholder"), starting);
        prop_assert_eq!(ledger.locked_of("0xholder"), 0);
    }

    #[test]
    fn prop_lock_beyond_free_balance_fails(
        starting in 0u128..=1_000u128,
        excess in 1u128..=1_000u128,
    ) {
        let ledger = Ledger::new(PrecisionMode::Wide);
        ledger.set_balance("0xholder", starting);
        let result = ledger.lock("0xholder", starting + excess);
        prop_assert!(result.is_err());
        prop_assert_eq!(ledger.get_balance("0xholder"), starting);
    }
}
