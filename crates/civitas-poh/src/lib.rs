// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - PROOF-OF-HUMANITY REGISTRY
//
// Tracks per-address human-verification tokens with an expiration window.
// A validator is only eligible to produce a block while its PoH record is
// "verified-effective" (verified == true and not yet expired).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{Address, CoreError};
use civitas_crypto::sha256_hex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PohRecord {
    pub address: Address,
    pub proof_token: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub verified: bool,
}

/// Abstraction over an external human-verification oracle. The default
/// registry operation (`complete`) just checks the caller-supplied token
/// matches what was issued; a real deployment would plug an implementation
/// of this trait in ahead of `complete` to call out to a KYC/biometric
/// provider instead of trusting the token alone.
pub trait HumanVerifier: Send + Sync {
    fn verify_human(&self, address: &str, proof_token: &str) -> bool;
}

/// Trivial verifier that accepts any non-empty token. Used as the default
/// when no external oracle is configured.
pub struct AcceptAnyVerifier;

impl HumanVerifier for AcceptAnyVerifier {
    fn verify_human(&self, _address: &str, proof_token: &str) -> bool {
        !proof_token.is_empty()
    }
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
        as i64
}

/// Registry of PoH records, keyed by address. Guarded by a single `RwLock`
/// per the workspace's per-aggregate concurrency model.
pub struct PohRegistry {
    records: RwLock<BTreeMap<Address, PohRecord>>,
    expiration_window_secs: i64,
    issue_counter: AtomicU64,
    verifier: Box<dyn HumanVerifier>,
}

impl PohRegistry {
    pub fn new(expiration_window_secs: i64) -> Self {
        PohRegistry {
            records: RwLock::new(BTreeMap::new()),
            expiration_window_secs,
            issue_counter: AtomicU64::new(0),
            verifier: Box::new(AcceptAnyVerifier),
        }
    }

    pub fn with_verifier(expiration_window_secs: i64, verifier: Box<dyn HumanVerifier>) -> Self {
        PohRegistry {
            records: RwLock::new(BTreeMap::new()),
            expiration_window_secs,
            issue_counter: AtomicU64::new(0),
            verifier,
        }
    }

    /// Issue a new PoH record for `address`, or hand back the existing one
    /// if it is still verified-effective. The proof token is opaque by
    /// construction (derived deterministically from address, issuance time,
    /// and a monotonic counter) — it is not itself a security boundary, only
    /// a handle the completion step and callers check equality against.
    pub fn register(&self, address: &str) -> PohRecord {
        let now = now_secs();
        let mut records = self.records.write().expect("poh lock poisoned");
        if let Some(existing) = records.get(address) {
            if existing.verified && now < existing.expires_at {
                return existing.clone();
            }
        }
        let seq = self.issue_counter.fetch_add(1, Ordering::Relaxed);
        let proof_token = sha256_hex(format!("{address}:{now}:{seq}").as_bytes());
        let record = PohRecord {
            address: address.to_string(),
            proof_token,
            issued_at: now,
            expires_at: now + self.expiration_window_secs,
            verified: false,
        };
        records.insert(address.to_string(), record.clone());
        tracing::info!(address, "poh record registered");
        record
    }

    /// Complete verification for `address` by presenting the issued token.
    /// Delegates the accept/reject decision to the configured `HumanVerifier`.
    pub fn complete(&self, address: &str, proof_token: &str) -> Result<(), CoreError> {
        let mut records = self.records.write().expect("poh lock poisoned");
        let record = records
            .get_mut(address)
            .ok_or_else(|| CoreError::poh(format!("no poh record for {address}")))?;
        if record.proof_token != proof_token {
            return Err(CoreError::poh("proof token does not match issued record"));
        }
        if !self.verifier.verify_human(address, proof_token) {
            return Err(CoreError::poh("human verification rejected"));
        }
        record.verified = true;
        tracing::info!(address, "poh record verified");
        Ok(())
    }

    /// Invariant 10: verified-effective iff `verified && now < expires_at`.
    pub fn is_verified(&self, address: &str) -> bool {
        let records = self.records.read().expect("poh lock poisoned");
        match records.get(address) {
            Some(record) => record.verified && now_secs() < record.expires_at,
            None => false,
        }
    }

    /// Only returns a token for a verified-effective record (matches the
    /// same condition as `is_verified`); an expired-but-unswept record
    /// yields `None` so it cannot pass a mining-eligibility gate.
    pub fn proof_of(&self, address: &str) -> Option<String> {
        let records = self.records.read().expect("poh lock poisoned");
        records
            .get(address)
            .filter(|r| r.verified && now_secs() < r.expires_at)
            .map(|r| r.proof_token.clone())
    }

    pub fn record_of(&self, address: &str) -> Option<PohRecord> {
        let records = self.records.read().expect("poh lock poisoned");
        records.get(address).cloned()
    }

    /// Sweep every record whose window has elapsed, demoting it back to
    /// unverified (it must re-register, not just re-complete). Returns the
    /// number of records demoted.
    pub fn sweep_expired(&self) -> usize {
        let now = now_secs();
        let mut records = self.records.write().expect("poh lock poisoned");
        let mut demoted = 0;
        for record in records.values_mut() {
            if record.verified && now >= record.expires_at {
                record.verified = false;
                demoted += 1;
            }
        }
        if demoted > 0 {
            tracing::info!(demoted, "poh expiry sweep demoted records");
        }
        demoted
    }
}

/// Spawn a background task that periodically sweeps expired PoH records.
/// Mirrors the teacher's `tokio`-based background-worker pattern used
/// elsewhere in the workspace for persistence.
pub fn spawn_expiry_sweep(registry: Arc<PohRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.sweep_expired();
        }
    })
}
