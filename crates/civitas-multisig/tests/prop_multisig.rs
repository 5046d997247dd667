// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — civitas-multisig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{Ledger, PrecisionMode, TransactionStatus, TransactionType};
use civitas_crypto::{new_keypair, sign, KeyPair};
use civitas_multisig::MultiSigEngine;
use proptest::prelude::*;
use std::sync::Arc;

fn wallet_of_size(owner_count: usize) -> Vec<KeyPair> {
    (0..owner_count).map(|_| new_keypair()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Invariant 9: execution fails below threshold and succeeds once at least
    /// `threshold` distinct owners have signed, for any owner count and threshold.
    #[test]
    fn prop_execute_gated_by_signature_count(
        owner_count in 2usize..6,
        threshold in 1usize..=5,
        signer_count in 0usize..5,
    ) {
        prop_assume!(threshold <= owner_count);
        prop_assume!(signer_count <= owner_count);

        let ledger = Arc::new(Ledger::new(PrecisionMode::Wide));
        let engine = MultiSigEngine::new(ledger.clone());
        let owners = wallet_of_size(owner_count);
        let owner_addrs: Vec<String> = owners.iter().map(|kp| kp.address()).collect();
        ledger.set_balance("0xwallet", 1_000);
        engine.create_wallet("0xwallet", owner_addrs.clone(), threshold).unwrap();

        let tx = engine
            .create_tx("0xwallet", "tx1", "0xbob", 100, None, TransactionType::Regular, &owner_addrs[0])
            .unwrap();
        let message = tx.signing_hash();

        for owner in owners.iter().take(signer_count) {
            let sig = sign(owner, message.as_bytes()).unwrap();
            let pubkey = hex::decode(&owner.public_key_hex).unwrap();
            engine.sign_tx("0xwallet", "tx1", &owner.address(), sig, &pubkey).unwrap();
        }

        let result = engine.execute_tx("0xwallet", "tx1");
        if signer_count >= threshold {
            let record = result.unwrap();
            prop_assert_eq!(record.status, TransactionStatus::Confirmed);
        } else {
            prop_assert!(result.is_err());
        }
    }

    /// Rejecting a pending transaction always returns the full escrow to the wallet.
    #[test]
    fn prop_reject_always_restores_full_escrow(
        starting in 1u128..=1_000_000u128,
        value in 1u128..=1_000_000u128,
    ) {
        prop_assume!(value <= starting);
        let ledger = Arc::new(Ledger::new(PrecisionMode::Wide));
        let engine = MultiSigEngine::new(ledger.clone());
        let owner = new_keypair();
        ledger.set_balance("0xwallet", starting);
        engine.create_wallet("0xwallet", vec![owner.address()], 1).unwrap();
        engine.create_tx("0xwallet", "tx1", "0xbob", value, None, TransactionType::Regular, &owner.address()).unwrap();
        engine.reject_tx("0xwallet", "tx1", &owner.address()).unwrap();
        prop_assert_eq!(ledger.get_balance("0xwallet"), starting);
        prop_assert_eq!(ledger.locked_of("0xwallet"), 0);
    }
}
