// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — civitas-poh
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_poh::PohRegistry;
use proptest::prelude::*;

fn arb_address() -> impl Strategy<Value = String> {
    "0x[a-f0-9]{8,40}"
}

proptest! {
    /// Invariant 10: a record is only ever verified-effective inside a
    /// positive expiration window, never inside one that has already lapsed.
    #[test]
    fn prop_negative_window_never_verified(address in arb_address()) {
        let registry = PohRegistry::new(-1);
        let record = registry.register(&address);
        registry.complete(&address, &record.proof_token).unwrap();
        prop_assert!(!registry.is_verified(&address));
        prop_assert!(registry.proof_of(&address).is_none());
    }

    #[test]
    fn prop_positive_window_stays_verified(
        address in arb_address(),
        window in 60i64..=86_400i64,
    ) {
        let registry = PohRegistry::new(window);
        let record = registry.register(&address);
        registry.complete(&address, &record.proof_token).unwrap();
        prop_assert!(registry.is_verified(&address));
        prop_assert_eq!(registry.proof_of(&address), Some(record.proof_token));
    }

    #[test]
    fn prop_unverified_record_never_passes_proof_of(address in arb_address()) {
        let registry = PohRegistry::new(3600);
        registry.register(&address);
        prop_assert!(!registry.is_verified(&address));
        prop_assert!(registry.proof_of(&address).is_none());
    }

    #[test]
    fn prop_complete_rejects_any_token_but_the_issued_one(
        address in arb_address(),
        wrong_token in "[a-z0-9]{1,32}",
    ) {
        let registry = PohRegistry::new(3600);
        let record = registry.register(&address);
        prop_assume!(wrong_token != record.proof_token);
        prop_assert!(registry.complete(&address, &wrong_token).is_err());
        prop_assert!(!registry.is_verified(&address));
    }

    /// Re-registering a still-effective verified record is a no-op; its token
    /// never changes until the window lapses.
    #[test]
    fn prop_reregister_effective_record_keeps_same_token(address in arb_address()) {
        let registry = PohRegistry::new(3600);
        let first = registry.register(&address);
        registry.complete(&address, &first.proof_token).unwrap();
        let second = registry.register(&address);
        prop_assert_eq!(second.proof_token, first.proof_token);
    }
}
