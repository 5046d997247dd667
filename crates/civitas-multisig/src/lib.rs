// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - MULTI-SIGNATURE ENGINE
//
// Wallets with (owners, threshold). A pending transaction collects owner
// signatures until it reaches threshold, at which point it settles directly
// against the ledger's locked-balance escrow and emits a regular transaction
// record for the caller to log/persist.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{Address, Amount, CoreError, Ledger, Transaction, TransactionStatus, TransactionType};
use civitas_crypto::sha256_hex;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiSigTxStatus {
    Pending,
    Executed,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct MultiSigTx {
    pub id: String,
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    pub data: Option<Vec<u8>>,
    pub tx_type: TransactionType,
    pub signatures: BTreeMap<Address, Vec<u8>>,
    pub status: MultiSigTxStatus,
    pub created_at: i64,
}

impl MultiSigTx {
    /// Deterministic message signers sign over: `id || from || to || value || data? || type-tag`.
    pub fn signing_hash(&self) -> String {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.from.as_bytes());
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(&self.value.to_be_bytes());
        if let Some(data) = &self.data {
            buf.extend_from_slice(data);
        }
        let type_tag: u8 = match self.tx_type {
            TransactionType::Regular => 0,
            TransactionType::ContractDeploy => 1,
            TransactionType::ContractCall => 2,
            TransactionType::Reward => 3,
        };
        buf.push(type_tag);
        sha256_hex(&buf)
    }
}

struct WalletState {
    owners: Vec<Address>,
    threshold: usize,
    pending_txs: BTreeMap<String, MultiSigTx>,
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
        as i64
}

/// Registry of multi-sig wallets, each backed by the shared `Ledger` for
/// its escrow (locked-balance) accounting.
pub struct MultiSigEngine {
    ledger: Arc<Ledger>,
    wallets: RwLock<BTreeMap<Address, WalletState>>,
}

impl MultiSigEngine {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        MultiSigEngine { ledger, wallets: RwLock::new(BTreeMap::new()) }
    }

    pub fn create_wallet(
        &self,
        address: &str,
        owners: Vec<Address>,
        threshold: usize,
    ) -> Result<(), CoreError> {
        if owners.is_empty() {
            return Err(CoreError::validation("wallet must have at least one owner"));
        }
        if threshold == 0 || threshold > owners.len() {
            return Err(CoreError::validation(format!(
                "threshold {threshold} out of range for {} owners",
                owners.len()
            )));
        }
        let mut unique = owners.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != owners.len() {
            return Err(CoreError::validation("wallet owners must be distinct"));
        }
        let mut wallets = self.wallets.write().expect("multisig lock poisoned");
        if wallets.contains_key(address) {
            return Err(CoreError::state(format!("wallet {address} already exists")));
        }
        wallets.insert(
            address.to_string(),
            WalletState { owners, threshold, pending_txs: BTreeMap::new() },
        );
        tracing::info!(address, "multisig wallet created");
        Ok(())
    }

    /// Lock `value` out of the wallet's free balance as escrow and record a
    /// pending transaction awaiting owner signatures.
    pub fn create_tx(
        &self,
        wallet_address: &str,
        id: &str,
        to: &str,
        value: Amount,
        data: Option<Vec<u8>>,
        tx_type: TransactionType,
        creator: &str,
    ) -> Result<MultiSigTx, CoreError> {
        let mut wallets = self.wallets.write().expect("multisig lock poisoned");
        let wallet = wallets
            .get_mut(wallet_address)
            .ok_or_else(|| CoreError::state(format!("no such wallet {wallet_address}")))?;
        if !wallet.owners.contains(&creator.to_string()) {
            return Err(CoreError::auth(format!("{creator} is not an owner of {wallet_address}")));
        }
        if wallet.pending_txs.contains_key(id) {
            return Err(CoreError::state(format!("multisig tx {id} already exists")));
        }
        self.ledger.lock(wallet_address, value)?;
        let tx = MultiSigTx {
            id: id.to_string(),
            from: wallet_address.to_string(),
            to: to.to_string(),
            value,
            data,
            tx_type,
            signatures: BTreeMap::new(),
            status: MultiSigTxStatus::Pending,
            created_at: now_secs(),
        };
        wallet.pending_txs.insert(id.to_string(), tx.clone());
        tracing::info!(wallet_address, id, "multisig tx created");
        Ok(tx)
    }

    /// Add `signer`'s signature over the transaction's canonical signing
    /// hash. `signer_public_key_bytes` is supplied by the caller (the node
    /// layer holds the owner key registry) rather than stored here, keeping
    /// this engine's only source of truth the ledger's escrow balances.
    pub fn sign_tx(
        &self,
        wallet_address: &str,
        tx_id: &str,
        signer: &str,
        signature_bytes: Vec<u8>,
        signer_public_key_bytes: &[u8],
    ) -> Result<(), CoreError> {
        let mut wallets = self.wallets.write().expect("multisig lock poisoned");
        let wallet = wallets
            .get_mut(wallet_address)
            .ok_or_else(|| CoreError::state(format!("no such wallet {wallet_address}")))?;
        if !wallet.owners.contains(&signer.to_string()) {
            return Err(CoreError::auth(format!("{signer} is not an owner of {wallet_address}")));
        }
        let tx = wallet
            .pending_txs
            .get_mut(tx_id)
            .ok_or_else(|| CoreError::state(format!("no such pending tx {tx_id}")))?;
        if tx.status != MultiSigTxStatus::Pending {
            return Err(CoreError::state("transaction is no longer pending"));
        }
        if tx.signatures.contains_key(signer) {
            return Err(CoreError::state(format!("{signer} already signed {tx_id}")));
        }
        let message = tx.signing_hash();
        if !civitas_crypto::verify(signer_public_key_bytes, message.as_bytes(), &signature_bytes) {
            return Err(CoreError::crypto("signature does not verify"));
        }
        tx.signatures.insert(signer.to_string(), signature_bytes);
        tracing::info!(wallet_address, tx_id, signer, "multisig signature collected");
        Ok(())
    }

    /// Invariant 9: executes iff `|signatures| >= threshold`, signatures are
    /// from distinct owners (guaranteed by the map key), and the tx is still
    /// pending. Settles immediately against the ledger's escrow and returns
    /// a confirmed `Transaction` record for the caller to persist/log.
    pub fn execute_tx(&self, wallet_address: &str, tx_id: &str) -> Result<Transaction, CoreError> {
        let mut wallets = self.wallets.write().expect("multisig lock poisoned");
        let wallet = wallets
            .get_mut(wallet_address)
            .ok_or_else(|| CoreError::state(format!("no such wallet {wallet_address}")))?;
        let tx = wallet
            .pending_txs
            .get_mut(tx_id)
            .ok_or_else(|| CoreError::state(format!("no such pending tx {tx_id}")))?;
        if tx.status != MultiSigTxStatus::Pending {
            return Err(CoreError::state("transaction is no longer pending"));
        }
        if tx.signatures.len() < wallet.threshold {
            return Err(CoreError::validation(format!(
                "{} of {} required signatures collected",
                tx.signatures.len(),
                wallet.threshold
            )));
        }
        self.ledger.transfer_from(wallet_address, &tx.to, tx.value)?;
        tx.status = MultiSigTxStatus::Executed;
        let mut record = Transaction::new_unsigned(
            tx.id.clone(),
            tx.from.clone(),
            tx.to.clone(),
            tx.value,
            tx.data.clone(),
            now_secs(),
            tx.tx_type,
        );
        record.status = TransactionStatus::Confirmed;
        tracing::info!(wallet_address, tx_id, "multisig tx executed");
        Ok(record)
    }

    /// Reject a pending transaction, releasing its escrow back to the wallet.
    pub fn reject_tx(&self, wallet_address: &str, tx_id: &str, rejecter: &str) -> Result<(), CoreError> {
        let mut wallets = self.wallets.write().expect("multisig lock poisoned");
        let wallet = wallets
            .get_mut(wallet_address)
            .ok_or_else(|| CoreError::state(format!("no such wallet {wallet_address}")))?;
        if !wallet.owners.contains(&rejecter.to_string()) {
            return Err(CoreError::auth(format!("{rejecter} is not an owner of {wallet_address}")));
        }
        let tx = wallet
            .pending_txs
            .get_mut(tx_id)
            .ok_or_else(|| CoreError::state(format!("no such pending tx {tx_id}")))?;
        if tx.status != MultiSigTxStatus::Pending {
            return Err(CoreError::state("transaction is no longer pending"));
        }
        self.ledger.unlock(wallet_address, tx.value)?;
        tx.status = MultiSigTxStatus::Rejected;
        tracing::info!(wallet_address, tx_id, rejecter, "multisig tx rejected");
        Ok(())
    }

    pub fn status(&self, wallet_address: &str, tx_id: &str) -> Option<MultiSigTxStatus> {
        let wallets = self.wallets.read().expect("multisig lock poisoned");
        wallets.get(wallet_address)?.pending_txs.get(tx_id).map(|t| t.status)
    }

    pub fn pending(&self, wallet_address: &str) -> Vec<MultiSigTx> {
        let wallets = self.wallets.read().expect("multisig lock poisoned");
        match wallets.get(wallet_address) {
            Some(w) => {
                w.pending_txs.values().filter(|t| t.status == MultiSigTxStatus::Pending).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn owners(&self, wallet_address: &str) -> Option<Vec<Address>> {
        let wallets = self.wallets.read().expect("multisig lock poisoned");
        wallets.get(wallet_address).map(|w| w.owners.clone())
    }

    pub fn threshold(&self, wallet_address: &str) -> Option<usize> {
        let wallets = self.wallets.read().expect("multisig lock poisoned");
        wallets.get(wallet_address).map(|w| w.threshold)
    }

    /// All known wallet addresses, for the persistence adapter's `multisig.json`.
    pub fn wallet_addresses(&self) -> Vec<Address> {
        let wallets = self.wallets.read().expect("multisig lock poisoned");
        wallets.keys().cloned().collect()
    }

    pub fn all_pending(&self, wallet_address: &str) -> Vec<MultiSigTx> {
        let wallets = self.wallets.read().expect("multisig lock poisoned");
        match wallets.get(wallet_address) {
            Some(w) => w.pending_txs.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Restore a wallet from a persisted snapshot, including any pending
    /// transactions (used only by the persistence loader at startup).
    pub fn restore_wallet(
        &self,
        address: &str,
        owners: Vec<Address>,
        threshold: usize,
        pending_txs: Vec<MultiSigTx>,
    ) {
        let mut wallets = self.wallets.write().expect("multisig lock poisoned");
        let pending = pending_txs.into_iter().map(|tx| (tx.id.clone(), tx)).collect();
        wallets.insert(address.to_string(), WalletState { owners, threshold, pending_txs: pending });
    }
}
