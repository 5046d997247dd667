// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS - CORE MODULE
//
// Chain data model (transactions, blocks, accounts) and the ledger state
// machine: balance/locked-balance bookkeeping, block append with chain-
// linkage and hash verification, deterministic canonical encoding for
// hashing and signing.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_crypto::sha256_hex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Hex-encoded SHA-256 digest.
pub type Hash = String;
/// `0x` + 40 hex chars (20-byte truncated hash of a public key).
pub type Address = String;
/// Base-unit token amount (18 decimals).
pub type Amount = u128;

/// Reserved symbolic admin address used at genesis; never signs anything.
pub const GENESIS_ADMIN_ADDRESS: &str = "0x0000000000000000000000000000000000admin";

/// Token decimal places.
pub const DECIMALS: u32 = 18;
/// Fixed total supply: 100,000,000 tokens * 10^18 base units, minted to the
/// genesis multi-sig wallet at height 0.
pub const TOTAL_SUPPLY_BASE_UNITS: Amount = 100_000_000u128 * 1_000_000_000_000_000_000u128;

/// Base halving reward (50 tokens, in base units).
pub const BASE_REWARD_BASE_UNITS: Amount = 50u128 * 1_000_000_000_000_000_000u128;
/// Blocks per halving epoch.
pub const HALVING_INTERVAL_BLOCKS: u64 = 210_000;

// ───────────────────────────── error handling ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Validation,
    State,
    Crypto,
    Poh,
    Governance,
    Io,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Validation => "validation",
            ErrorKind::State => "state",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Poh => "poh",
            ErrorKind::Governance => "governance",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Workspace-wide error type. Every crate's fallible operation returns
/// `Result<T, CoreError>` (or wraps a local error into one via `From`).
#[derive(Debug)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CoreError { kind, message: message.into(), source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CoreError { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }
    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Crypto, message)
    }
    pub fn poh(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Poh, message)
    }
    pub fn governance(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Governance, message)
    }
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<civitas_crypto::CryptoError> for CoreError {
    fn from(e: civitas_crypto::CryptoError) -> Self {
        CoreError::with_source(ErrorKind::Crypto, e.to_string(), e)
    }
}

// ───────────────────────────── data model ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Regular,
    ContractDeploy,
    ContractCall,
    Reward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    #[serde(default, with = "opt_hex")]
    pub data: Option<Vec<u8>>,
    pub timestamp: i64,
    #[serde(default, with = "opt_hex")]
    pub signature: Option<Vec<u8>>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub block_index: Option<u64>,
    pub block_hash: Option<Hash>,
}

impl Transaction {
    pub fn new_unsigned(
        id: String,
        from: Address,
        to: Address,
        value: Amount,
        data: Option<Vec<u8>>,
        timestamp: i64,
        tx_type: TransactionType,
    ) -> Self {
        Transaction {
            id,
            from,
            to,
            value,
            data,
            timestamp,
            signature: None,
            tx_type,
            status: TransactionStatus::Pending,
            block_index: None,
            block_hash: None,
        }
    }

    /// Legacy-compatible signing preimage: `id || from || to ||
    /// hex(low64(value*1_000_000)) || data? || hex(timestamp)`, then SHA-256'd.
    /// The low 64 bits of the scaled `u128` value are used deliberately — see
    /// the precision-mode notes on `Ledger` for why base-unit `u128` values
    /// still produce a fixed-width legacy preimage here.
    pub fn signing_hash(&self) -> Hash {
        let scaled = self.value.wrapping_mul(1_000_000);
        let low64 = scaled as u64;
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.from.as_bytes());
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(u64_hex(low64).as_bytes());
        if let Some(data) = &self.data {
            buf.extend_from_slice(data);
        }
        buf.extend_from_slice(u64_hex(self.timestamp as u64).as_bytes());
        sha256_hex(&buf)
    }

    /// Canonical length-prefixed encoding of `(id, from, to, value, data, type)`,
    /// used when assembling a block's `serialized-transactions` hash input.
    pub fn canonical_encoding(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_len_prefixed(&mut buf, self.id.as_bytes());
        write_len_prefixed(&mut buf, self.from.as_bytes());
        write_len_prefixed(&mut buf, self.to.as_bytes());
        write_len_prefixed(&mut buf, &self.value.to_be_bytes());
        write_len_prefixed(&mut buf, self.data.as_deref().unwrap_or(&[]));
        let type_tag: u8 = match self.tx_type {
            TransactionType::Regular => 0,
            TransactionType::ContractDeploy => 1,
            TransactionType::ContractCall => 2,
            TransactionType::Reward => 3,
        };
        buf.push(type_tag);
        buf
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub prev_hash: Hash,
    pub hash: Hash,
    pub validator: Address,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Always 0 — PoA has no proof-of-work nonce search.
    pub nonce: u64,
    pub human_proof: String,
    pub reward: Amount,
}

impl Block {
    /// Deterministic hash over `(prevHash, validator, serialized-txs, timestamp, nonce, humanProof)`.
    pub fn compute_hash(
        prev_hash: &str,
        validator: &str,
        transactions: &[Transaction],
        timestamp: i64,
        nonce: u64,
        human_proof: &str,
    ) -> Hash {
        let mut buf = Vec::new();
        buf.extend_from_slice(prev_hash.as_bytes());
        buf.extend_from_slice(validator.as_bytes());
        for tx in transactions {
            buf.extend_from_slice(&tx.canonical_encoding());
        }
        buf.extend_from_slice(u64_hex(timestamp as u64).as_bytes());
        buf.extend_from_slice(u64_hex(nonce).as_bytes());
        buf.extend_from_slice(human_proof.as_bytes());
        sha256_hex(&buf)
    }

    /// Recomputes this block's hash from its own fields and compares (invariant 3).
    pub fn hash_matches(&self) -> bool {
        let recomputed = Self::compute_hash(
            &self.prev_hash,
            &self.validator,
            &self.transactions,
            self.timestamp,
            self.nonce,
            &self.human_proof,
        );
        recomputed == self.hash
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Account {
    pub balance: Amount,
    pub locked: Amount,
}

/// Resolves the numeric-precision open question: `Wide` keeps full `u128`
/// base units end to end; `Narrow` additionally narrows `Transaction::value`
/// to a caller-chosen display unit at the wire boundary. Ledger internals are
/// always `u128` regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionMode {
    Wide,
    Narrow { unit_scale: u128 },
}

impl Default for PrecisionMode {
    fn default() -> Self {
        PrecisionMode::Wide
    }
}

fn u64_hex(v: u64) -> String {
    format!("{v:016x}")
}

fn write_len_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&hex::encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        match opt {
            Some(s) if !s.is_empty() => {
                hex::decode(s).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

/// Format a base-unit amount as a decimal-string token amount (18 decimals),
/// matching the persisted `accounts.json` representation.
pub fn format_amount_decimal(amount: Amount) -> String {
    let whole = amount / 10u128.pow(DECIMALS);
    let frac = amount % 10u128.pow(DECIMALS);
    format!("{whole}.{frac:018}")
}

/// Parse a decimal-string token amount back to base units. Unparsable input
/// is the persistence layer's caller's concern (it coerces to 0 with a logged
/// warning); this returns `Err` so that caller can make that decision.
pub fn parse_amount_decimal(s: &str) -> Result<Amount, CoreError> {
    let s = s.trim();
    let (whole_str, frac_str) = s.split_once('.').unwrap_or((s, "0"));
    let whole: u128 = whole_str
        .parse()
        .map_err(|_| CoreError::validation(format!("invalid amount: {s}")))?;
    let mut frac_str = frac_str.to_string();
    while frac_str.len() < DECIMALS as usize {
        frac_str.push('0');
    }
    frac_str.truncate(DECIMALS as usize);
    let frac: u128 = if frac_str.is_empty() {
        0
    } else {
        frac_str.parse().map_err(|_| CoreError::validation(format!("invalid amount: {s}")))?
    };
    Ok(whole * 10u128.pow(DECIMALS) + frac)
}

/// Reward for the halving epoch containing `height`: `base >> epoch`,
/// `epoch = height / HALVING_INTERVAL_BLOCKS`, clamped so it never overflows
/// the configured precision mode's representable range.
pub fn reward_for_height(height: u64, mode: PrecisionMode) -> Amount {
    let epoch = height / HALVING_INTERVAL_BLOCKS;
    let reward = if epoch >= 128 { 0 } else { BASE_REWARD_BASE_UNITS >> epoch };
    match mode {
        PrecisionMode::Wide => reward,
        PrecisionMode::Narrow { .. } => reward.min(u64::MAX as u128),
    }
}

// ───────────────────────────── ledger state ─────────────────────────────

struct LedgerState {
    blocks: Vec<Block>,
    accounts: BTreeMap<Address, Account>,
}

/// The chain + balance state machine. A single `RwLock` guards both the block
/// vector and the account map so mining (which touches both) never observes
/// a torn intermediate state.
pub struct Ledger {
    state: RwLock<LedgerState>,
    precision_mode: PrecisionMode,
}

impl Ledger {
    pub fn new(precision_mode: PrecisionMode) -> Self {
        Ledger {
            state: RwLock::new(LedgerState { blocks: Vec::new(), accounts: BTreeMap::new() }),
            precision_mode,
        }
    }

    pub fn precision_mode(&self) -> PrecisionMode {
        self.precision_mode
    }

    pub fn create_account(&self, address: &str) {
        let mut state = self.state.write().expect("ledger lock poisoned");
        state.accounts.entry(address.to_string()).or_insert_with(Account::default);
    }

    pub fn get_balance(&self, address: &str) -> Amount {
        let state = self.state.read().expect("ledger lock poisoned");
        state.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    pub fn locked_of(&self, address: &str) -> Amount {
        let state = self.state.read().expect("ledger lock poisoned");
        state.accounts.get(address).map(|a| a.locked).unwrap_or(0)
    }

    /// Set an account's free balance directly. Used only by genesis bootstrap.
    pub fn set_balance(&self, address: &str, balance: Amount) {
        let mut state = self.state.write().expect("ledger lock poisoned");
        state.accounts.entry(address.to_string()).or_insert_with(Account::default).balance =
            balance;
    }

    /// Move `amount` from an address's free balance into its locked balance.
    /// Invariant 8: a locked amount never exceeds the owner's prior free
    /// balance at the moment of locking.
    pub fn lock(&self, address: &str, amount: Amount) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let account = state.accounts.entry(address.to_string()).or_insert_with(Account::default);
        if account.balance < amount {
            return Err(CoreError::state(format!(
                "cannot lock {amount} for {address}: free balance is {}",
                account.balance
            )));
        }
        account.balance -= amount;
        account.locked += amount;
        Ok(())
    }

    /// Move `amount` back from locked into free balance (e.g. a rejected
    /// multi-sig transaction releasing its escrow).
    pub fn unlock(&self, address: &str, amount: Amount) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let account = state.accounts.entry(address.to_string()).or_insert_with(Account::default);
        if account.locked < amount {
            return Err(CoreError::state(format!(
                "cannot unlock {amount} for {address}: locked balance is {}",
                account.locked
            )));
        }
        account.locked -= amount;
        account.balance += amount;
        Ok(())
    }

    /// Execute a previously locked transfer: debit `from`'s locked balance,
    /// credit `to`'s free balance. Used by the multi-sig engine on threshold
    /// execution.
    pub fn transfer_from(&self, from: &str, to: &str, amount: Amount) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        {
            let from_account =
                state.accounts.entry(from.to_string()).or_insert_with(Account::default);
            if from_account.locked < amount {
                return Err(CoreError::state(format!(
                    "cannot transfer {amount} from {from}: locked balance is {}",
                    from_account.locked
                )));
            }
            from_account.locked -= amount;
        }
        let to_account = state.accounts.entry(to.to_string()).or_insert_with(Account::default);
        to_account.balance += amount;
        Ok(())
    }

    /// Apply a transaction's balance effects. Reward transactions credit
    /// `to` unconditionally (issuance, not a transfer); all other types
    /// enforce invariants 6 and 7.
    pub fn apply_transaction(&self, tx: &Transaction) -> Result<(), CoreError> {
        if tx.tx_type == TransactionType::Reward {
            let mut state = self.state.write().expect("ledger lock poisoned");
            let to = state.accounts.entry(tx.to.clone()).or_insert_with(Account::default);
            to.balance += tx.value;
            return Ok(());
        }
        if tx.from == tx.to {
            return Err(CoreError::validation("transaction from and to must differ"));
        }
        let mut state = self.state.write().expect("ledger lock poisoned");
        {
            let from = state.accounts.entry(tx.from.clone()).or_insert_with(Account::default);
            if from.balance < tx.value {
                return Err(CoreError::state(format!(
                    "insufficient balance: {} has {}, needs {}",
                    tx.from, from.balance, tx.value
                )));
            }
            from.balance -= tx.value;
        }
        let to = state.accounts.entry(tx.to.clone()).or_insert_with(Account::default);
        to.balance += tx.value;
        Ok(())
    }

    /// Inverse credit of a previously applied transaction. This is a
    /// documented weakness, not a reorg: it does not re-derive state from
    /// history, it just applies the opposite balance movement.
    pub fn revert_transaction(&self, tx: &Transaction) -> Result<(), CoreError> {
        if tx.tx_type == TransactionType::Reward {
            let mut state = self.state.write().expect("ledger lock poisoned");
            let to = state.accounts.entry(tx.to.clone()).or_insert_with(Account::default);
            to.balance = to.balance.saturating_sub(tx.value);
            return Ok(());
        }
        let mut state = self.state.write().expect("ledger lock poisoned");
        {
            let to = state.accounts.entry(tx.to.clone()).or_insert_with(Account::default);
            to.balance = to.balance.saturating_sub(tx.value);
        }
        let from = state.accounts.entry(tx.from.clone()).or_insert_with(Account::default);
        from.balance += tx.value;
        Ok(())
    }

    /// Index of the latest block (`len(blocks) - 1`), i.e. genesis is height 0.
    /// Meaningless on an empty chain; callers checking for "no chain yet"
    /// should use `is_empty` instead.
    pub fn height(&self) -> u64 {
        let state = self.state.read().expect("ledger lock poisoned");
        state.blocks.len().saturating_sub(1) as u64
    }

    /// Whether no block (not even genesis) has been appended yet.
    pub fn is_empty(&self) -> bool {
        let state = self.state.read().expect("ledger lock poisoned");
        state.blocks.is_empty()
    }

    pub fn get_block(&self, hash: &str) -> Option<Block> {
        let state = self.state.read().expect("ledger lock poisoned");
        state.blocks.iter().find(|b| b.hash == hash).cloned()
    }

    pub fn get_block_by_index(&self, index: u64) -> Option<Block> {
        let state = self.state.read().expect("ledger lock poisoned");
        state.blocks.get(index as usize).cloned()
    }

    pub fn latest_block(&self) -> Option<Block> {
        let state = self.state.read().expect("ledger lock poisoned");
        state.blocks.last().cloned()
    }

    pub fn all_blocks(&self) -> Vec<Block> {
        let state = self.state.read().expect("ledger lock poisoned");
        state.blocks.clone()
    }

    /// Snapshot every known account's free balance, for the persistence
    /// adapter's `accounts.json` (locked balances are not persisted — see
    /// the loading-semantics note on recomputing them from lock bookkeeping).
    pub fn account_balances(&self) -> BTreeMap<Address, Amount> {
        let state = self.state.read().expect("ledger lock poisoned");
        state.accounts.iter().map(|(addr, acct)| (addr.clone(), acct.balance)).collect()
    }

    /// Restore account balances from a persisted snapshot (used on node
    /// bootstrap when loading existing state).
    pub fn restore_balances(&self, balances: &BTreeMap<Address, Amount>) {
        let mut state = self.state.write().expect("ledger lock poisoned");
        for (addr, balance) in balances {
            state.accounts.entry(addr.clone()).or_insert_with(Account::default).balance = *balance;
        }
    }

    /// Restore a previously persisted, already-validated block sequence
    /// directly (bypassing `add_block`'s single-append validation loop).
    /// Used only by the persistence loader at startup.
    pub fn restore_blocks(&self, blocks: Vec<Block>) {
        let mut state = self.state.write().expect("ledger lock poisoned");
        state.blocks = blocks;
    }

    /// Append a block after checking invariants 1 and 3 (chain linkage and
    /// hash correctness). Does not itself apply transaction balance effects
    /// or validator/PoH checks (invariant 2) — those are the mining
    /// pipeline's responsibility, since they need the validator manager and
    /// PoH registry this crate does not depend on.
    pub fn add_block(&self, block: Block) -> Result<(), CoreError> {
        let mut state = self.state.write().expect("ledger lock poisoned");
        let expected_index = state.blocks.len() as u64;
        if block.index != expected_index {
            return Err(CoreError::validation(format!(
                "block index {} does not match expected {expected_index}",
                block.index
            )));
        }
        let expected_prev_hash = state.blocks.last().map(|b| b.hash.as_str()).unwrap_or("");
        if block.prev_hash != expected_prev_hash {
            return Err(CoreError::validation("block prevHash does not match chain tip"));
        }
        if !block.hash_matches() {
            return Err(CoreError::validation("block hash does not match its own content"));
        }
        state.blocks.push(block);
        Ok(())
    }
}
