// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — civitas-governance
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{Ledger, PrecisionMode, TOTAL_SUPPLY_BASE_UNITS};
use civitas_governance::{Governance, GovernanceConfig, ProposalStatus};
use civitas_validator::{ValidatorManager, ValidatorMode};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn setup_with_voter_share(pct_of_supply: u128) -> (Governance, Arc<Ledger>, u128) {
    let ledger = Arc::new(Ledger::new(PrecisionMode::Wide));
    let validators = Arc::new(ValidatorManager::new(ValidatorMode::Hybrid));
    let deposit = GovernanceConfig::default().min_deposit;
    let voter_balance = TOTAL_SUPPLY_BASE_UNITS / 100 * pct_of_supply;
    ledger.set_balance("0xcreator", deposit);
    ledger.set_balance("0xvoter", voter_balance);
    let gov = Governance::new(ledger.clone(), validators, GovernanceConfig::default());
    (gov, ledger, deposit)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Finalizing a proposal always returns the creator's deposit to free
    /// balance, regardless of whether it ends up approved or rejected.
    #[test]
    fn prop_finalize_always_returns_deposit(voter_pct in 0u128..=100u128, in_favor in any::<bool>()) {
        let (gov, ledger, deposit) = setup_with_voter_share(voter_pct);
        let proposal = gov
            .create_proposal("0xcreator", "approve_validator", "t", "d", BTreeMap::new(), deposit, 0)
            .unwrap();
        gov.cast_vote(&proposal.id, "0xvoter", in_favor, 10).unwrap();
        gov.finalize(&proposal.id, proposal.expires_at).unwrap();
        prop_assert_eq!(ledger.locked_of("0xcreator"), 0);
    }

    /// A proposal only reaches `Approved` when both the quorum and
    /// approval-threshold percentages configured are actually met.
    #[test]
    fn prop_approval_requires_quorum_and_threshold(voter_pct in 0u128..=100u128, in_favor in any::<bool>()) {
        let (gov, _ledger, deposit) = setup_with_voter_share(voter_pct);
        let proposal = gov
            .create_proposal("0xcreator", "approve_validator", "t", "d", BTreeMap::new(), deposit, 0)
            .unwrap();
        gov.cast_vote(&proposal.id, "0xvoter", in_favor, 10).unwrap();
        let status = gov.finalize(&proposal.id, proposal.expires_at).unwrap();

        let config = gov.config();
        let quorum_met = voter_pct >= config.quorum_pct as u128;
        let should_approve = quorum_met && in_favor;
        if should_approve {
            prop_assert_eq!(status, ProposalStatus::Approved);
        } else {
            prop_assert_eq!(status, ProposalStatus::Rejected);
        }
    }
}

proptest! {
    /// `change_parameter` only ever accepts the five known parameter names;
    /// anything else fails execution without mutating the config.
    #[test]
    fn prop_change_parameter_rejects_unknown_names(name in "[a-z_]{3,20}") {
        let known = [
            "voting_period_secs",
            "execution_delay_secs",
            "quorum_pct",
            "approval_threshold_pct",
            "min_deposit",
        ];
        prop_assume!(!known.contains(&name.as_str()));

        let ledger = Arc::new(Ledger::new(PrecisionMode::Wide));
        let validators = Arc::new(ValidatorManager::new(ValidatorMode::Hybrid));
        let deposit = GovernanceConfig::default().min_deposit;
        ledger.set_balance("0xcreator", TOTAL_SUPPLY_BASE_UNITS);
        let gov = Governance::new(ledger, validators, GovernanceConfig::default());

        let mut data = BTreeMap::new();
        data.insert("parameter".to_string(), name);
        data.insert("value".to_string(), "1".to_string());
        let proposal = gov
            .create_proposal("0xcreator", "change_parameter", "t", "d", data, deposit, 0)
            .unwrap();
        gov.cast_vote(&proposal.id, "0xcreator", true, 10).unwrap();
        gov.finalize(&proposal.id, proposal.expires_at).unwrap();
        let before = gov.config();
        let exec_time = proposal.expires_at + before.execution_delay_secs;
        let result = gov.execute(&proposal.id, exec_time);
        prop_assert!(result.is_err());
        let after = gov.config();
        prop_assert_eq!(before.quorum_pct, after.quorum_pct);
        prop_assert_eq!(before.min_deposit, after.min_deposit);
    }
}
