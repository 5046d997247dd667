// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - VALIDATOR MANAGER
//
// Validator lifecycle (registration through approval/suspension/rejection),
// the admin address set, and verification of signed administrative request
// envelopes used to gate admin-mode mutations.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{Address, CoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorRecord {
    pub address: Address,
    pub human_proof: String,
    pub status: ValidatorStatus,
    pub joined_at: i64,
    pub approved_by: Option<Address>,
    pub performance_score: u8,
    pub last_active: i64,
}

/// Governs how validator approval and admin-set mutation are gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorMode {
    /// Only the admin multisig's signed requests approve validators.
    AdminOnly,
    /// Admins can approve directly; governance proposals can also approve.
    Hybrid,
    /// Only governance proposal execution approves validators.
    Governance,
    /// Every registrant with an effective PoH proof is auto-approved.
    Automatic,
}

/// A signed administrative request envelope (§4.1.1):
/// `{ action, data, adminAddress, signature, timestamp }`.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub action: String,
    pub data: String,
    pub admin_address: Address,
    pub signature: Vec<u8>,
    pub timestamp: i64,
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
        as i64
}

struct ManagerState {
    validators: BTreeMap<Address, ValidatorRecord>,
    admins: BTreeSet<Address>,
    admin_pubkeys: BTreeMap<Address, Vec<u8>>,
}

/// Validator registry and admin set, guarded by a single `RwLock`.
pub struct ValidatorManager {
    state: RwLock<ManagerState>,
    mode: ValidatorMode,
}

impl ValidatorManager {
    pub fn new(mode: ValidatorMode) -> Self {
        ValidatorManager {
            state: RwLock::new(ManagerState {
                validators: BTreeMap::new(),
                admins: BTreeSet::new(),
                admin_pubkeys: BTreeMap::new(),
            }),
            mode,
        }
    }

    pub fn mode(&self) -> ValidatorMode {
        self.mode
    }

    /// Bootstrap the very first admin. Only succeeds once, before any admin
    /// exists — after that, admin-set changes must go through `add_admin`
    /// with a signed request from an existing admin.
    pub fn initialize_first_admin(
        &self,
        address: &str,
        public_key_bytes: Vec<u8>,
    ) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("validator lock poisoned");
        if !state.admins.is_empty() {
            return Err(CoreError::state("admin set already initialized"));
        }
        state.admins.insert(address.to_string());
        state.admin_pubkeys.insert(address.to_string(), public_key_bytes);
        tracing::info!(address, "first admin initialized");
        Ok(())
    }

    /// Register an address's public key so future signed requests from it
    /// (once it becomes an admin) can be verified without the private key.
    pub fn register_public_key(&self, address: &str, public_key_bytes: Vec<u8>) {
        let mut state = self.state.write().expect("validator lock poisoned");
        state.admin_pubkeys.insert(address.to_string(), public_key_bytes);
    }

    fn verify_request(&self, req: &SignedRequest, expected_action: &str) -> Result<(), CoreError> {
        if req.action != expected_action {
            return Err(CoreError::validation(format!(
                "expected action {expected_action}, got {}",
                req.action
            )));
        }
        let state = self.state.read().expect("validator lock poisoned");
        if !state.admins.contains(&req.admin_address) {
            return Err(CoreError::auth(format!("{} is not an admin", req.admin_address)));
        }
        let pubkey = state
            .admin_pubkeys
            .get(&req.admin_address)
            .ok_or_else(|| CoreError::auth("no public key on file for admin"))?;
        civitas_crypto::verify_signed_request(
            &req.action,
            &req.admin_address,
            req.timestamp,
            &req.signature,
            pubkey,
            now_secs(),
        )
        .map_err(CoreError::from)
    }

    pub fn add_admin(
        &self,
        req: &SignedRequest,
        new_admin_address: &str,
        new_admin_pubkey: Vec<u8>,
    ) -> Result<(), CoreError> {
        self.verify_request(req, "add_admin")?;
        let mut state = self.state.write().expect("validator lock poisoned");
        state.admins.insert(new_admin_address.to_string());
        state.admin_pubkeys.insert(new_admin_address.to_string(), new_admin_pubkey);
        tracing::info!(new_admin_address, "admin added");
        Ok(())
    }

    pub fn remove_admin(&self, req: &SignedRequest, target_address: &str) -> Result<(), CoreError> {
        self.verify_request(req, "remove_admin")?;
        let mut state = self.state.write().expect("validator lock poisoned");
        if state.admins.len() <= 1 {
            return Err(CoreError::state("cannot remove the last remaining admin"));
        }
        state.admins.remove(target_address);
        state.admin_pubkeys.remove(target_address);
        tracing::info!(target_address, "admin removed");
        Ok(())
    }

    pub fn is_admin(&self, address: &str) -> bool {
        let state = self.state.read().expect("validator lock poisoned");
        state.admins.contains(address)
    }

    /// Register a prospective validator. Under `ValidatorMode::Automatic` the
    /// record is immediately approved; otherwise it starts `Pending` and
    /// needs `approve_validator`.
    pub fn register_validator(
        &self,
        address: &str,
        human_proof: &str,
    ) -> Result<ValidatorRecord, CoreError> {
        let mut state = self.state.write().expect("validator lock poisoned");
        if state.validators.contains_key(address) {
            return Err(CoreError::state(format!("validator {address} already registered")));
        }
        let now = now_secs();
        let status =
            if self.mode == ValidatorMode::Automatic { ValidatorStatus::Approved } else { ValidatorStatus::Pending };
        let approved_by = if status == ValidatorStatus::Approved {
            Some("automatic".to_string())
        } else {
            None
        };
        let record = ValidatorRecord {
            address: address.to_string(),
            human_proof: human_proof.to_string(),
            status,
            joined_at: now,
            approved_by,
            performance_score: 50,
            last_active: now,
        };
        state.validators.insert(address.to_string(), record.clone());
        tracing::info!(address, ?status, "validator registered");
        Ok(record)
    }

    pub fn approve_validator(&self, req: &SignedRequest, address: &str) -> Result<(), CoreError> {
        if self.mode == ValidatorMode::Governance {
            return Err(CoreError::auth("validator mode requires governance approval"));
        }
        self.verify_request(req, "approve_validator")?;
        let mut state = self.state.write().expect("validator lock poisoned");
        let record = state
            .validators
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such validator {address}")))?;
        record.status = ValidatorStatus::Approved;
        record.approved_by = Some(req.admin_address.clone());
        tracing::info!(address, "validator approved");
        Ok(())
    }

    /// Approval path for governance proposal execution, bypassing the signed
    /// admin envelope (the proposal's own vote tally is the authorization).
    pub fn approve_validator_via_governance(&self, address: &str) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("validator lock poisoned");
        let record = state
            .validators
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such validator {address}")))?;
        record.status = ValidatorStatus::Approved;
        record.approved_by = Some("governance".to_string());
        tracing::info!(address, "validator approved via governance");
        Ok(())
    }

    /// Removal path for governance proposal execution, bypassing the signed
    /// admin envelope. Suspends the validator, the same effect `suspend_validator`
    /// has on the active set, since governance has no separate "removed" status.
    pub fn remove_validator_via_governance(&self, address: &str) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("validator lock poisoned");
        let record = state
            .validators
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such validator {address}")))?;
        record.status = ValidatorStatus::Suspended;
        tracing::info!(address, "validator removed via governance");
        Ok(())
    }

    pub fn reject_validator(&self, req: &SignedRequest, address: &str) -> Result<(), CoreError> {
        self.verify_request(req, "reject_validator")?;
        let mut state = self.state.write().expect("validator lock poisoned");
        let record = state
            .validators
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such validator {address}")))?;
        record.status = ValidatorStatus::Rejected;
        tracing::info!(address, "validator rejected");
        Ok(())
    }

    pub fn suspend_validator(&self, req: &SignedRequest, address: &str) -> Result<(), CoreError> {
        self.verify_request(req, "suspend_validator")?;
        let mut state = self.state.write().expect("validator lock poisoned");
        let record = state
            .validators
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such validator {address}")))?;
        record.status = ValidatorStatus::Suspended;
        tracing::info!(address, "validator suspended");
        Ok(())
    }

    /// Update a validator's performance score. A score dropping below 10
    /// auto-suspends an otherwise-approved validator, removing it from the
    /// active set (`is_approved`/`list_approved`) without an admin request.
    pub fn update_performance(&self, address: &str, score: u8) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("validator lock poisoned");
        let record = state
            .validators
            .get_mut(address)
            .ok_or_else(|| CoreError::state(format!("no such validator {address}")))?;
        record.performance_score = score.min(100);
        record.last_active = now_secs();
        if record.performance_score < 10 && record.status == ValidatorStatus::Approved {
            record.status = ValidatorStatus::Suspended;
            tracing::warn!(address, score = record.performance_score, "validator auto-suspended for low performance");
        }
        Ok(())
    }

    pub fn is_approved(&self, address: &str) -> bool {
        let state = self.state.read().expect("validator lock poisoned");
        state
            .validators
            .get(address)
            .map(|r| r.status == ValidatorStatus::Approved)
            .unwrap_or(false)
    }

    pub fn get(&self, address: &str) -> Option<ValidatorRecord> {
        let state = self.state.read().expect("validator lock poisoned");
        state.validators.get(address).cloned()
    }

    pub fn list_approved(&self) -> Vec<ValidatorRecord> {
        let state = self.state.read().expect("validator lock poisoned");
        state
            .validators
            .values()
            .filter(|r| r.status == ValidatorStatus::Approved)
            .cloned()
            .collect()
    }

    pub fn list_all(&self) -> Vec<ValidatorRecord> {
        let state = self.state.read().expect("validator lock poisoned");
        state.validators.values().cloned().collect()
    }
}
