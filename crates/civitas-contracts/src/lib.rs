// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - CONTRACT REGISTRY
//
// A minimal illustrative contract registry, not a VM: deployed "contracts"
// are opaque code blobs with a per-contract key/value state map, and the
// only callable behavior is three built-ins (transfer, balanceOf, mint)
// operating on that state — never on the ledger itself.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{format_amount_decimal, parse_amount_decimal, Address, Amount, CoreError};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct ContractRecord {
    pub address: Address,
    pub code: Vec<u8>,
    pub creator: Address,
    pub state: BTreeMap<String, String>,
    pub deployed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult {
    Unit,
    Value(String),
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
        as i64
}

fn balance_key(address: &str) -> String {
    format!("balance:{address}")
}

pub struct ContractRegistry {
    contracts: RwLock<BTreeMap<Address, ContractRecord>>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        ContractRegistry { contracts: RwLock::new(BTreeMap::new()) }
    }

    pub fn deploy(&self, address: &str, code: Vec<u8>, creator: &str) -> Result<ContractRecord, CoreError> {
        let mut contracts = self.contracts.write().expect("contracts lock poisoned");
        if contracts.contains_key(address) {
            return Err(CoreError::state(format!("contract {address} already deployed")));
        }
        let record = ContractRecord {
            address: address.to_string(),
            code,
            creator: creator.to_string(),
            state: BTreeMap::new(),
            deployed: now_secs(),
        };
        contracts.insert(address.to_string(), record.clone());
        tracing::info!(address, creator, "contract deployed");
        Ok(record)
    }

    /// Invoke a built-in against `address`'s own state map. `transfer` and
    /// `mint` both operate on `balance:<address>` entries inside this
    /// contract's state, entirely independent of the ledger's account
    /// balances.
    pub fn call(
        &self,
        address: &str,
        function: &str,
        params: &[String],
        caller: &str,
    ) -> Result<CallResult, CoreError> {
        let mut contracts = self.contracts.write().expect("contracts lock poisoned");
        let record = contracts
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such contract {address}")))?;
        match function {
            "transfer" => {
                let [to, amount_str] = params else {
                    return Err(CoreError::validation("transfer requires [to, amount]"));
                };
                let amount = parse_amount_decimal(amount_str)?;
                let caller_key = balance_key(caller);
                let caller_balance = record
                    .state
                    .get(&caller_key)
                    .map(|s| parse_amount_decimal(s))
                    .transpose()?
                    .unwrap_or(0);
                if caller_balance < amount {
                    return Err(CoreError::state(format!(
                        "insufficient contract balance: {caller} has {caller_balance}, needs {amount}"
                    )));
                }
                record.state.insert(caller_key, format_amount_decimal(caller_balance - amount));
                let to_key = balance_key(to);
                let to_balance = record
                    .state
                    .get(&to_key)
                    .map(|s| parse_amount_decimal(s))
                    .transpose()?
                    .unwrap_or(0);
                record.state.insert(to_key, format_amount_decimal(to_balance + amount));
                Ok(CallResult::Unit)
            }
            "balanceOf" => {
                let [who] = params else {
                    return Err(CoreError::validation("balanceOf requires [address]"));
                };
                let balance: Amount = record
                    .state
                    .get(&balance_key(who))
                    .map(|s| parse_amount_decimal(s))
                    .transpose()?
                    .unwrap_or(0);
                Ok(CallResult::Value(format_amount_decimal(balance)))
            }
            "mint" => {
                if caller != record.creator {
                    return Err(CoreError::auth("only the contract creator may mint"));
                }
                let [to, amount_str] = params else {
                    return Err(CoreError::validation("mint requires [to, amount]"));
                };
                let amount = parse_amount_decimal(amount_str)?;
                let to_key = balance_key(to);
                let to_balance = record
                    .state
                    .get(&to_key)
                    .map(|s| parse_amount_decimal(s))
                    .transpose()?
                    .unwrap_or(0);
                record.state.insert(to_key, format_amount_decimal(to_balance + amount));
                Ok(CallResult::Unit)
            }
            other => Err(CoreError::validation(format!("unknown contract function {other}"))),
        }
    }

    pub fn get(&self, address: &str) -> Option<ContractRecord> {
        let contracts = self.contracts.read().expect("contracts lock poisoned");
        contracts.get(address).cloned()
    }
}

impl Default for ContractRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_then_transfer_then_balance_of() {
        let registry = ContractRegistry::new();
        registry.deploy("0xtoken", b"code".to_vec(), "0xcreator").unwrap();
        registry
            .call("0xtoken", "mint", &["0xalice".into(), "100.0".into()], "0xcreator")
            .unwrap();
        registry
            .call("0xtoken", "transfer", &["0xbob".into(), "40.0".into()], "0xalice")
            .unwrap();
        let CallResult::Value(alice_balance) =
            registry.call("0xtoken", "balanceOf", &["0xalice".into()], "0xalice").unwrap()
        else {
            panic!("expected Value");
        };
        assert_eq!(parse_amount_decimal(&alice_balance).unwrap(), parse_amount_decimal("60.0").unwrap());
    }

    #[test]
    fn mint_rejects_non_creator() {
        let registry = ContractRegistry::new();
        registry.deploy("0xtoken", b"code".to_vec(), "0xcreator").unwrap();
        let err = registry
            .call("0xtoken", "mint", &["0xalice".into(), "100.0".into()], "0xnotcreator")
            .unwrap_err();
        assert_eq!(err.kind, civitas_core::ErrorKind::Auth);
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let registry = ContractRegistry::new();
        registry.deploy("0xtoken", b"code".to_vec(), "0xcreator").unwrap();
        let err = registry
            .call("0xtoken", "transfer", &["0xbob".into(), "5.0".into()], "0xalice")
            .unwrap_err();
        assert_eq!(err.kind, civitas_core::ErrorKind::State);
    }

    #[test]
    fn unknown_function_is_rejected() {
        let registry = ContractRegistry::new();
        registry.deploy("0xtoken", b"code".to_vec(), "0xcreator").unwrap();
        assert!(registry.call("0xtoken", "selfdestruct", &[], "0xcreator").is_err());
    }
}
