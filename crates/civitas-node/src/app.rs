// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS NODE - APPLICATION WIRING
//
// `CivitasNode` owns one instance of every ledger subsystem and is the
// single place that knows how they connect: the mining pipeline borrows
// the ledger/mempool/validators/PoH registry, the persistence adapter
// backs both the mining pipeline's snapshot sink and the node's own
// key-file storage, and governance is wired in only when enabled.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::config::NodeConfig;
use civitas_contracts::ContractRegistry;
use civitas_core::{CoreError, Ledger, PrecisionMode};
use civitas_crypto::KeyPair;
use civitas_governance::Governance;
use civitas_mempool::Mempool;
use civitas_mining::MiningPipeline;
use civitas_multisig::MultiSigEngine;
use civitas_persistence::PersistenceAdapter;
use civitas_poh::PohRegistry;
use civitas_validator::ValidatorManager;
use std::sync::Arc;
use std::time::Duration;

pub struct CivitasNode {
    pub config: NodeConfig,
    pub ledger: Arc<Ledger>,
    pub mempool: Arc<Mempool>,
    pub validators: Arc<ValidatorManager>,
    pub poh: Arc<PohRegistry>,
    pub multisig: Arc<MultiSigEngine>,
    pub contracts: Arc<ContractRegistry>,
    pub governance: Option<Arc<Governance>>,
    pub persistence: Arc<PersistenceAdapter>,
    pub mining: MiningPipeline,
    _persistence_worker: tokio::task::JoinHandle<()>,
    _poh_sweeper: tokio::task::JoinHandle<()>,
}

impl CivitasNode {
    /// Assemble every subsystem and restore prior state from `config.data_dir`
    /// if a prior snapshot exists. Does NOT run genesis bootstrap — callers
    /// check `needs_genesis()` and invoke `genesis::bootstrap` themselves
    /// when this is a brand-new data directory.
    pub async fn build(config: NodeConfig) -> Result<Self, CoreError> {
        let (persistence, persistence_worker) = PersistenceAdapter::spawn(&config.data_dir)?;
        let persistence = Arc::new(persistence);

        let loaded = persistence.load().await?;

        let ledger = Arc::new(Ledger::new(PrecisionMode::Wide));
        ledger.restore_blocks(loaded.blocks);
        ledger.restore_balances(&loaded.balances);

        let validators = Arc::new(ValidatorManager::new(config.validator_mode()));
        // Validator approval status is not persisted; only `humanProof` is.
        // Every validator found on disk is re-registered and re-approved via
        // the governance-bypass path, matching the "recomputed as approved
        // at load" semantics of a validator set that already exists.
        for (address, human_proof) in &loaded.validator_proofs {
            let _ = validators.register_validator(address, human_proof);
            validators.approve_validator_via_governance(address)?;
        }

        let poh = Arc::new(PohRegistry::new(config.network.poh_expiration_secs));
        let poh_sweeper = civitas_poh::spawn_expiry_sweep(poh.clone(), Duration::from_secs(60));

        let multisig = Arc::new(MultiSigEngine::new(ledger.clone()));
        for (address, owners, threshold, pending_txs) in loaded.wallets {
            multisig.restore_wallet(&address, owners, threshold, pending_txs);
        }

        let contracts = Arc::new(ContractRegistry::new());

        let governance = if config.network.governance.enabled {
            Some(Arc::new(Governance::new(
                ledger.clone(),
                validators.clone(),
                config.governance_config(),
            )))
        } else {
            None
        };

        let mempool = Arc::new(Mempool::new());

        let mining = MiningPipeline::new(ledger.clone(), mempool.clone(), validators.clone(), poh.clone())
            .with_persistence(persistence.clone() as Arc<dyn civitas_mining::PersistenceSink>);

        Ok(CivitasNode {
            config,
            ledger,
            mempool,
            validators,
            poh,
            multisig,
            contracts,
            governance,
            persistence,
            mining,
            _persistence_worker: persistence_worker,
            _poh_sweeper: poh_sweeper,
        })
    }

    /// Whether this data directory has never seen a genesis block.
    pub fn needs_genesis(&self) -> bool {
        self.ledger.is_empty()
    }
}

/// Find or create a single-keypair validator the demo mining loop can sign
/// blocks with. The genesis validator is the multisig admin wallet, which
/// has no individual signing key by design, so `run`/`mine-once` need a
/// concrete validator identity to drive the pipeline.
pub async fn ensure_demo_validator(node: &CivitasNode) -> Result<(String, KeyPair), CoreError> {
    for record in node.validators.list_approved() {
        let key_path = node.persistence.data_dir().join(format!("key_{}.json", record.address));
        if let Ok(bytes) = tokio::fs::read(&key_path).await {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                if let (Some(private_key_hex), Some(public_key_hex)) =
                    (value.get("privateKey").and_then(|v| v.as_str()), value.get("publicKey").and_then(|v| v.as_str()))
                {
                    let keypair = KeyPair {
                        private_key_hex: private_key_hex.to_string(),
                        public_key_hex: public_key_hex.to_string(),
                    };
                    return Ok((record.address, keypair));
                }
            }
        }
    }

    let keypair = civitas_crypto::new_keypair();
    let address = keypair.address();
    let record = node.poh.register(&address);
    node.poh.complete(&address, &record.proof_token)?;
    let proof = node.poh.proof_of(&address).expect("just completed").to_string();
    node.validators.register_validator(&address, &proof)?;
    node.validators.approve_validator_via_governance(&address)?;
    node.persistence.persist_keypair(&address, &keypair).await?;
    node.persistence.queue_validators_snapshot(&node.validators)?;
    node.persistence.flush_sync().await?;
    tracing::info!(address = %address, "bootstrapped demo validator identity");
    Ok((address, keypair))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_on_empty_dir_needs_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let node = CivitasNode::build(config).await.unwrap();
        assert!(node.needs_genesis());
    }

    #[tokio::test]
    async fn build_restores_prior_ledger_height() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_path_buf();

        {
            let node = CivitasNode::build(config.clone()).await.unwrap();
            crate::genesis::bootstrap(&node).await.unwrap();
        }

        let reopened = CivitasNode::build(config).await.unwrap();
        assert_eq!(reopened.ledger.height(), 0);
        assert!(!reopened.needs_genesis());
    }

    #[tokio::test]
    async fn ensure_demo_validator_is_idempotent_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_path_buf();

        let first_address = {
            let node = CivitasNode::build(config.clone()).await.unwrap();
            genesis::bootstrap(&node).await.unwrap();
            let (address, _keypair) = ensure_demo_validator(&node).await.unwrap();
            address
        };

        let node = CivitasNode::build(config).await.unwrap();
        let (second_address, _keypair) = ensure_demo_validator(&node).await.unwrap();
        assert_eq!(first_address, second_address);
    }
}
