// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS NODE - GENESIS BOOTSTRAP
//
// One-time sequence that turns an empty data directory into a chain with a
// single genesis block: three keypairs, a 2-of-3 admin multi-sig wallet at
// the symbolic admin address, the genesis block itself, the wallet
// registered as the sole initial validator, the full token supply credited
// to the wallet, and everything flushed to disk before returning.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::app::CivitasNode;
use civitas_core::{Block, CoreError, GENESIS_ADMIN_ADDRESS, TOTAL_SUPPLY_BASE_UNITS};

/// Number of founding keypairs generated for the genesis admin wallet.
const FOUNDING_OWNER_COUNT: usize = 3;
const FOUNDING_THRESHOLD: usize = 2;

pub async fn bootstrap(node: &CivitasNode) -> Result<(), CoreError> {
    if !node.needs_genesis() {
        return Err(CoreError::state("genesis bootstrap attempted on a non-empty ledger"));
    }

    // 1. three founding keypairs.
    let mut owners = Vec::with_capacity(FOUNDING_OWNER_COUNT);
    for _ in 0..FOUNDING_OWNER_COUNT {
        let keypair = civitas_crypto::new_keypair();
        let address = keypair.address();
        node.persistence.persist_keypair(&address, &keypair).await?;
        owners.push(address);
    }

    // 2. genesis multi-sig wallet at the symbolic admin address. This
    // address represents the wallet as a group, not any one founder's key,
    // so it is never itself a signer and cannot produce a signed admin
    // request envelope.
    let wallet_address = GENESIS_ADMIN_ADDRESS.to_string();
    node.multisig.create_wallet(&wallet_address, owners, FOUNDING_THRESHOLD)?;

    // 3. persist the wallet immediately so a crash before the rest of
    // bootstrap completes still leaves a recoverable multisig.json.
    node.persistence.queue_multisig_snapshot(&node.multisig)?;

    // 4. genesis block. `prev_hash` is the empty string, the ledger's own
    // sentinel for "no parent" (see `Ledger::add_block`), rather than the
    // literal "0" sometimes used to describe this informally.
    let timestamp = now_secs();
    let human_proof = "genesis";
    let nonce = 0u64;
    let hash = Block::compute_hash("", &wallet_address, &[], timestamp, nonce, human_proof);
    let genesis_block = Block {
        index: 0,
        timestamp,
        transactions: Vec::new(),
        prev_hash: String::new(),
        hash,
        validator: wallet_address.clone(),
        signature: Vec::new(),
        nonce,
        human_proof: human_proof.to_string(),
        reward: 0,
    };
    node.ledger.add_block(genesis_block)?;

    // 5. register the wallet as the sole initial validator, approved
    // directly (no admin-signed envelope exists yet, and none ever will for
    // this group address).
    node.validators.register_validator(&wallet_address, human_proof)?;
    node.validators.approve_validator_via_governance(&wallet_address)?;

    // 6. credit the full token supply to the wallet.
    node.ledger.set_balance(&wallet_address, TOTAL_SUPPLY_BASE_UNITS);

    // 7. register the wallet as the first (and, at genesis, only) admin.
    // Its public key bytes are empty by construction: this address cannot
    // sign, so no signed request will ever verify against it, but it still
    // needs to appear in the admin set for `is_admin`/`list` bookkeeping.
    node.validators.initialize_first_admin(&wallet_address, Vec::new())?;

    // 8. persist everything and wait for the queue to drain before
    // returning, so a node that crashes immediately after bootstrap still
    // sees a fully-written genesis state on restart.
    node.persistence.queue_ledger_snapshot(&node.ledger)?;
    node.persistence.queue_validators_snapshot(&node.validators)?;
    node.persistence.queue_multisig_snapshot(&node.multisig)?;
    node.persistence.flush_sync().await?;

    tracing::info!(wallet = %wallet_address, "genesis bootstrap complete");
    Ok(())
}

fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;

    #[tokio::test]
    async fn bootstrap_credits_total_supply_to_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let node = CivitasNode::build(config).await.unwrap();
        assert!(node.needs_genesis());

        bootstrap(&node).await.unwrap();

        assert_eq!(node.ledger.height(), 0);
        assert_eq!(node.ledger.get_balance(GENESIS_ADMIN_ADDRESS), TOTAL_SUPPLY_BASE_UNITS);
        assert!(node.validators.is_approved(GENESIS_ADMIN_ADDRESS));
        assert!(node.validators.is_admin(GENESIS_ADMIN_ADDRESS));
    }

    #[tokio::test]
    async fn bootstrap_refuses_to_run_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let node = CivitasNode::build(config).await.unwrap();
        bootstrap(&node).await.unwrap();
        assert!(bootstrap(&node).await.is_err());
    }
}
