// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - MINING PIPELINE
//
// The ten-step block-production round: eligibility gate, mempool snapshot,
// pre-validation with running per-sender spend accounting, halving reward
// computation, block assembly, hash+sign, append-or-fail, post-commit
// balance application (reward first), mempool pruning, persistence hook.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::{
    reward_for_height, Amount, Block, CoreError, GENESIS_ADMIN_ADDRESS, Ledger, Transaction,
    TransactionStatus, TransactionType,
};
use civitas_crypto::KeyPair;
use civitas_mempool::Mempool;
use civitas_poh::PohRegistry;
use civitas_validator::ValidatorManager;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Invoked after a block has been appended and its transactions applied, so
/// a persistence layer can snapshot the new state. Kept as a trait here
/// (rather than a dependency on `civitas-persistence`) so this crate never
/// needs to know about file formats or background workers.
pub trait PersistenceSink: Send + Sync {
    fn persist_snapshot(&self, ledger: &Ledger, mempool: &Mempool) -> Result<(), CoreError>;
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
        as i64
}

pub struct MiningPipeline {
    ledger: Arc<Ledger>,
    mempool: Arc<Mempool>,
    validators: Arc<ValidatorManager>,
    poh: Arc<PohRegistry>,
    persistence: Option<Arc<dyn PersistenceSink>>,
}

impl MiningPipeline {
    pub fn new(
        ledger: Arc<Ledger>,
        mempool: Arc<Mempool>,
        validators: Arc<ValidatorManager>,
        poh: Arc<PohRegistry>,
    ) -> Self {
        MiningPipeline { ledger, mempool, validators, poh, persistence: None }
    }

    pub fn with_persistence(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.persistence = Some(sink);
        self
    }

    /// Run one mining round as `validator_address`, signing with
    /// `validator_keypair`. Returns the newly appended block.
    pub fn mine_block(
        &self,
        validator_address: &str,
        validator_keypair: &KeyPair,
    ) -> Result<Block, CoreError> {
        // 1. eligibility gate: approved validator + effective PoH proof.
        if !self.validators.is_approved(validator_address) {
            return Err(CoreError::auth(format!("{validator_address} is not an approved validator")));
        }
        let human_proof = self
            .poh
            .proof_of(validator_address)
            .ok_or_else(|| CoreError::poh(format!("{validator_address} has no effective poh proof")))?;

        // 2. snapshot the mempool.
        let candidates = self.mempool.list();

        // 3. pre-validate with running per-sender spend accounting so a
        // block never includes transactions that collectively overdraw a
        // sender even though each one individually looks affordable.
        let mut spent: BTreeMap<String, Amount> = BTreeMap::new();
        let mut included = Vec::new();
        let mut rejected_ids = Vec::new();
        for tx in candidates {
            if tx.tx_type == TransactionType::Reward {
                rejected_ids.push(tx.id.clone());
                continue;
            }
            if tx.from == tx.to {
                rejected_ids.push(tx.id.clone());
                continue;
            }
            let already_spent = spent.get(&tx.from).copied().unwrap_or(0);
            let available = self.ledger.get_balance(&tx.from);
            if available < already_spent + tx.value {
                rejected_ids.push(tx.id.clone());
                continue;
            }
            *spent.entry(tx.from.clone()).or_insert(0) += tx.value;
            included.push(tx);
        }
        if !rejected_ids.is_empty() {
            tracing::warn!(count = rejected_ids.len(), "mining round dropped invalid transactions");
        }

        // 4. halving reward for the block about to be produced. `height()` is
        // the index of the chain's current tip (genesis == 0), so the new
        // block's own index — and the quantity the halving schedule is
        // measured against — is one past it.
        let index = self.ledger.height() + 1;
        let reward = reward_for_height(index, self.ledger.precision_mode());

        // 5. synthesize the reward transaction and prepend it to the block's
        // transaction list before finalizing the hash, so it is both the
        // first element of `transactions` and part of the hash preimage.
        let prev_hash = self.ledger.latest_block().map(|b| b.hash).unwrap_or_default();
        let timestamp = now_secs();
        let nonce = 0u64;

        for tx in included.iter_mut() {
            tx.status = TransactionStatus::Confirmed;
            tx.block_index = Some(index);
        }
        if reward > 0 {
            let mut reward_tx = Transaction::new_unsigned(
                format!("reward_{index}_{validator_address}"),
                GENESIS_ADMIN_ADDRESS.to_string(),
                validator_address.to_string(),
                reward,
                None,
                timestamp,
                TransactionType::Reward,
            );
            reward_tx.status = TransactionStatus::Confirmed;
            reward_tx.block_index = Some(index);
            included.insert(0, reward_tx);
        }

        // 6. hash and sign over the full transaction list, reward included.
        let hash = Block::compute_hash(
            &prev_hash,
            validator_address,
            &included,
            timestamp,
            nonce,
            &human_proof,
        );
        for tx in included.iter_mut() {
            tx.block_hash = Some(hash.clone());
        }
        let signature = civitas_crypto::sign(validator_keypair, hash.as_bytes())?;

        let block = Block {
            index,
            timestamp,
            transactions: included.clone(),
            prev_hash,
            hash: hash.clone(),
            validator: validator_address.to_string(),
            signature,
            nonce,
            human_proof,
            reward,
        };

        // 7. append, or fail without mutating anything else.
        self.ledger.add_block(block.clone())?;

        // 8. apply transactions, reward first (it is already first in `included`).
        for tx in &included {
            self.ledger.apply_transaction(tx)?;
        }

        // 9. prune the mempool of everything just included (the synthesized
        // reward tx never touched the mempool, so it has nothing to remove).
        for tx in &included {
            if tx.tx_type != TransactionType::Reward {
                self.mempool.remove(&tx.id);
            }
        }

        // 10. persist the new snapshot, if a sink is configured.
        if let Some(sink) = &self.persistence {
            if let Err(e) = sink.persist_snapshot(&self.ledger, &self.mempool) {
                tracing::error!(error = %e, "persistence snapshot failed after mining round");
            }
        }

        tracing::info!(index, validator_address, tx_count = included.len(), reward, "block mined");

        Ok(block)
    }
}
