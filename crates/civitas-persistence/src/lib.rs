// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - PERSISTENCE ADAPTER
//
// Canonical JSON snapshots of chain state under a data directory. Writes are
// dispatched to a background worker draining a bounded channel; `flush_sync`
// lets callers (tests, the bootstrap path) wait for the queue to drain.
// Loading is best-effort: a missing `blocks.json` means "no existing state",
// and unparsable balances are coerced to zero with a logged warning.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{format_amount_decimal, parse_amount_decimal, Address, Amount, Block, CoreError, Ledger};
use civitas_crypto::KeyPair;
use civitas_mempool::Mempool;
use civitas_multisig::{MultiSigEngine, MultiSigTx, MultiSigTxStatus};
use civitas_validator::ValidatorManager;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MultiSigTxSnapshot {
    id: String,
    from: Address,
    to: Address,
    value: Amount,
    data: Option<String>,
    tx_type: String,
    signatures: BTreeMap<Address, String>,
    status: String,
    created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalletSnapshot {
    address: Address,
    owners: Vec<Address>,
    threshold: usize,
    pending_txs: Vec<MultiSigTxSnapshot>,
}

fn tx_type_tag(t: civitas_core::TransactionType) -> &'static str {
    match t {
        civitas_core::TransactionType::Regular => "regular",
        civitas_core::TransactionType::ContractDeploy => "contract_deploy",
        civitas_core::TransactionType::ContractCall => "contract_call",
        civitas_core::TransactionType::Reward => "reward",
    }
}

fn tx_type_from_tag(tag: &str) -> civitas_core::TransactionType {
    match tag {
        "contract_deploy" => civitas_core::TransactionType::ContractDeploy,
        "contract_call" => civitas_core::TransactionType::ContractCall,
        "reward" => civitas_core::TransactionType::Reward,
        _ => civitas_core::TransactionType::Regular,
    }
}

fn status_tag(s: MultiSigTxStatus) -> &'static str {
    match s {
        MultiSigTxStatus::Pending => "pending",
        MultiSigTxStatus::Executed => "executed",
        MultiSigTxStatus::Rejected => "rejected",
    }
}

enum Job {
    Blocks(Vec<Block>),
    Accounts(BTreeMap<Address, Amount>),
    Validators(BTreeMap<Address, String>),
    Multisig(Vec<WalletSnapshot>),
    Flush(oneshot::Sender<()>),
}

async fn write_json_retrying(path: &Path, value: &Value) {
    let bytes = serde_json::to_vec_pretty(value).expect("snapshot value always serializes");
    for attempt in 0..2 {
        match tokio::fs::write(path, &bytes).await {
            Ok(()) => return,
            Err(e) if attempt == 0 => {
                tracing::warn!(path = %path.display(), error = %e, "persistence write failed, retrying once");
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "persistence write failed permanently");
            }
        }
    }
}

async fn run_worker(data_dir: PathBuf, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Blocks(blocks) => {
                let value = serde_json::to_value(&blocks).expect("blocks always serialize");
                write_json_retrying(&data_dir.join("blocks.json"), &value).await;
            }
            Job::Accounts(accounts) => {
                let map: BTreeMap<Address, String> =
                    accounts.into_iter().map(|(a, v)| (a, format_amount_decimal(v))).collect();
                let value = serde_json::to_value(&map).expect("accounts always serialize");
                write_json_retrying(&data_dir.join("accounts.json"), &value).await;
            }
            Job::Validators(validators) => {
                let value = serde_json::to_value(&validators).expect("validators always serialize");
                write_json_retrying(&data_dir.join("validators.json"), &value).await;
            }
            Job::Multisig(wallets) => {
                let map: BTreeMap<Address, WalletSnapshot> =
                    wallets.into_iter().map(|w| (w.address.clone(), w)).collect();
                let value = serde_json::to_value(&map).expect("wallets always serialize");
                write_json_retrying(&data_dir.join("multisig.json"), &value).await;
            }
            Job::Flush(respond) => {
                let _ = respond.send(());
            }
        }
    }
}

/// Loaded snapshot state, handed back to the node bootstrap path.
#[derive(Debug, Default)]
pub struct LoadedState {
    pub blocks: Vec<Block>,
    pub balances: BTreeMap<Address, Amount>,
    pub validator_proofs: BTreeMap<Address, String>,
    pub wallets: Vec<(Address, Vec<Address>, usize, Vec<MultiSigTx>)>,
}

pub struct PersistenceAdapter {
    data_dir: PathBuf,
    tx: mpsc::Sender<Job>,
}

impl PersistenceAdapter {
    /// Create the adapter and spawn its background writer task. The data
    /// directory is created eagerly so the worker never has to.
    pub fn spawn(data_dir: impl Into<PathBuf>) -> Result<(Self, tokio::task::JoinHandle<()>), CoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| CoreError::with_source(civitas_core::ErrorKind::Io, "failed to create data directory", e))?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker_dir = data_dir.clone();
        let handle = tokio::spawn(run_worker(worker_dir, rx));
        Ok((PersistenceAdapter { data_dir, tx }, handle))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn queue_ledger_snapshot(&self, ledger: &Ledger) -> Result<(), CoreError> {
        self.tx
            .try_send(Job::Blocks(ledger.all_blocks()))
            .map_err(|e| CoreError::io(format!("persistence queue full: {e}")))?;
        self.tx
            .try_send(Job::Accounts(ledger.account_balances()))
            .map_err(|e| CoreError::io(format!("persistence queue full: {e}")))
    }

    pub fn queue_validators_snapshot(&self, validators: &ValidatorManager) -> Result<(), CoreError> {
        let map: BTreeMap<Address, String> = validators
            .list_approved()
            .into_iter()
            .map(|r| (r.address, r.human_proof))
            .collect();
        self.tx
            .try_send(Job::Validators(map))
            .map_err(|e| CoreError::io(format!("persistence queue full: {e}")))
    }

    pub fn queue_multisig_snapshot(&self, engine: &MultiSigEngine) -> Result<(), CoreError> {
        let mut snapshots = Vec::new();
        for address in engine.wallet_addresses() {
            let owners = engine.owners(&address).unwrap_or_default();
            let threshold = engine.threshold(&address).unwrap_or(0);
            let pending_txs = engine
                .all_pending(&address)
                .into_iter()
                .map(|tx| MultiSigTxSnapshot {
                    id: tx.id,
                    from: tx.from,
                    to: tx.to,
                    value: tx.value,
                    data: tx.data.map(|d| hex::encode(d)),
                    tx_type: tx_type_tag(tx.tx_type).to_string(),
                    signatures: tx.signatures.into_iter().map(|(k, v)| (k, hex::encode(v))).collect(),
                    status: status_tag(tx.status).to_string(),
                    created_at: tx.created_at,
                })
                .collect();
            snapshots.push(WalletSnapshot { address, owners, threshold, pending_txs });
        }
        self.tx
            .try_send(Job::Multisig(snapshots))
            .map_err(|e| CoreError::io(format!("persistence queue full: {e}")))
    }

    /// Wait until every snapshot job queued before this call has been
    /// written. Used by tests and the bootstrap path.
    pub async fn flush_sync(&self) -> Result<(), CoreError> {
        let (respond, done) = oneshot::channel();
        self.tx
            .send(Job::Flush(respond))
            .await
            .map_err(|e| CoreError::io(format!("persistence worker gone: {e}")))?;
        done.await.map_err(|e| CoreError::io(format!("persistence worker dropped flush ack: {e}")))
    }

    /// Write a key pair to `key_<address>.json` with owner-only (`0600`)
    /// permissions on Unix. Done synchronously and outside the background
    /// queue — key material is not something we want to silently drop.
    pub async fn persist_keypair(&self, address: &str, keypair: &KeyPair) -> Result<(), CoreError> {
        let path = self.data_dir.join(format!("key_{address}.json"));
        let value = serde_json::json!({
            "address": address,
            "privateKey": keypair.private_key_hex,
            "publicKey": keypair.public_key_hex,
        });
        let bytes = serde_json::to_vec_pretty(&value).expect("keypair snapshot always serializes");
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| CoreError::with_source(civitas_core::ErrorKind::Io, "failed to write key file", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&path, perms)
                .await
                .map_err(|e| CoreError::with_source(civitas_core::ErrorKind::Io, "failed to set key file permissions", e))?;
        }
        Ok(())
    }

    /// Load prior state from disk. A missing `blocks.json` means "no
    /// existing state" and returns an empty `LoadedState` rather than an
    /// error — that is the bootstrap path's genesis signal.
    pub async fn load(&self) -> Result<LoadedState, CoreError> {
        let blocks_path = self.data_dir.join("blocks.json");
        if tokio::fs::metadata(&blocks_path).await.is_err() {
            return Ok(LoadedState::default());
        }

        let blocks: Vec<Block> = read_json_best_effort(&blocks_path).await.unwrap_or_default();

        let accounts_raw: BTreeMap<Address, String> =
            read_json_best_effort(&self.data_dir.join("accounts.json")).await.unwrap_or_default();
        let mut balances = BTreeMap::new();
        for (address, decimal) in accounts_raw {
            let amount = parse_amount_decimal(&decimal).unwrap_or_else(|_| {
                tracing::warn!(address, decimal, "unparsable balance coerced to zero");
                0
            });
            balances.insert(address, amount);
        }

        let validator_proofs: BTreeMap<Address, String> =
            read_json_best_effort(&self.data_dir.join("validators.json")).await.unwrap_or_default();

        let wallet_snapshots: BTreeMap<Address, WalletSnapshot> =
            read_json_best_effort(&self.data_dir.join("multisig.json")).await.unwrap_or_default();
        let wallets = wallet_snapshots
            .into_values()
            .map(|w| {
                let pending_txs = w
                    .pending_txs
                    .into_iter()
                    .map(|tx| MultiSigTx {
                        id: tx.id,
                        from: tx.from,
                        to: tx.to,
                        value: tx.value,
                        data: tx.data.and_then(|d| hex::decode(d).ok()),
                        tx_type: tx_type_from_tag(&tx.tx_type),
                        signatures: tx
                            .signatures
                            .into_iter()
                            .filter_map(|(k, v)| hex::decode(v).ok().map(|b| (k, b)))
                            .collect(),
                        status: match tx.status.as_str() {
                            "executed" => MultiSigTxStatus::Executed,
                            "rejected" => MultiSigTxStatus::Rejected,
                            _ => MultiSigTxStatus::Pending,
                        },
                        created_at: tx.created_at,
                    })
                    .collect();
                (w.address, w.owners, w.threshold, pending_txs)
            })
            .collect();

        Ok(LoadedState { blocks, balances, validator_proofs, wallets })
    }
}

async fn read_json_best_effort<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse persisted file, ignoring");
            None
        }
    }
}

impl civitas_mining::PersistenceSink for PersistenceAdapter {
    fn persist_snapshot(&self, ledger: &Ledger, _mempool: &Mempool) -> Result<(), CoreError> {
        self.queue_ledger_snapshot(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitas_core::PrecisionMode;

    #[tokio::test]
    async fn missing_blocks_file_means_no_existing_state() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _handle) = PersistenceAdapter::spawn(dir.path()).unwrap();
        let loaded = adapter.load().await.unwrap();
        assert!(loaded.blocks.is_empty());
    }

    #[tokio::test]
    async fn ledger_snapshot_roundtrips_balances() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _handle) = PersistenceAdapter::spawn(dir.path()).unwrap();
        let ledger = Ledger::new(PrecisionMode::Wide);
        ledger.set_balance("0xalice", 12_345_000_000_000_000_000);
        adapter.queue_ledger_snapshot(&ledger).unwrap();
        adapter.flush_sync().await.unwrap();

        let loaded = adapter.load().await.unwrap();
        assert_eq!(loaded.balances.get("0xalice"), Some(&12_345_000_000_000_000_000));
    }

    #[tokio::test]
    async fn keypair_file_has_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let (adapter, _handle) = PersistenceAdapter::spawn(dir.path()).unwrap();
        let kp = civitas_crypto::new_keypair();
        let addr = kp.address();
        adapter.persist_keypair(&addr, &kp).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(dir.path().join(format!("key_{addr}.json"))).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }
}
