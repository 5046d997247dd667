// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CIVITAS NODE - CONFIGURATION
//
// TOML file + environment override, following the dual load_from_file /
// apply_env_overrides path used elsewhere in this codebase for per-node
// settings. Validated at load so malformed governance or PoH parameters
// fail fast rather than surfacing as confusing runtime errors later.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use civitas_core::CoreError;
use civitas_governance::GovernanceConfig;
use civitas_validator::ValidatorMode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// TOML has no native u128; round-trip through strings like the teacher's
/// own `validator_config.rs` does for its stake amounts.
mod u128_toml {
    use super::*;
    use serde::de::{self, Visitor};

    pub fn serialize<S: Serializer>(val: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&val.to_string())
    }

    struct U128Visitor;
    impl<'de> Visitor<'de> for U128Visitor {
        type Value = u128;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a u128 as a string or integer")
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.parse().map_err(E::custom)
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        d.deserialize_any(U128Visitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceSection {
    pub enabled: bool,
    pub voting_period_secs: i64,
    pub execution_delay_secs: i64,
    pub quorum_pct: u8,
    pub approval_threshold_pct: u8,
    #[serde(with = "u128_toml")]
    pub min_deposit: u128,
}

impl Default for GovernanceSection {
    fn default() -> Self {
        let defaults = GovernanceConfig::default();
        GovernanceSection {
            enabled: false,
            voting_period_secs: defaults.voting_period_secs,
            execution_delay_secs: defaults.execution_delay_secs,
            quorum_pct: defaults.quorum_pct,
            approval_threshold_pct: defaults.approval_threshold_pct,
            min_deposit: defaults.min_deposit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub poh_expiration_secs: i64,
    pub validator_mode: String,
    pub mining_interval_secs: u64,
    pub governance: GovernanceSection,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            poh_expiration_secs: 3600,
            validator_mode: "admin_only".to_string(),
            mining_interval_secs: 10,
            governance: GovernanceSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub network: NetworkConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig { data_dir: PathBuf::from("./civitas-data"), network: NetworkConfig::default() }
    }
}

impl NodeConfig {
    /// Load from `path`, falling back to defaults if the file does not
    /// exist (a fresh node with no config committed yet). A present but
    /// malformed file is still a hard failure.
    pub fn load_from_file(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::with_source(civitas_core::ErrorKind::Io, "failed to read config file", e))?;
        let config: NodeConfig =
            toml::from_str(&content).map_err(|e| CoreError::validation(format!("invalid config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// `CIVITAS_*`-prefixed environment overrides, for containerized
    /// deployments that don't want to mount a config file at all.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CIVITAS_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CIVITAS_VALIDATOR_MODE") {
            self.network.validator_mode = v;
        }
        if let Ok(v) = std::env::var("CIVITAS_POH_EXPIRATION_SECS") {
            if let Ok(n) = v.parse() {
                self.network.poh_expiration_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CIVITAS_MINING_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.network.mining_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CIVITAS_GOVERNANCE_ENABLED") {
            self.network.governance.enabled = v == "true" || v == "1";
        }
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.network.poh_expiration_secs <= 0 {
            return Err(CoreError::validation("poh_expiration_secs must be positive"));
        }
        if self.network.mining_interval_secs == 0 {
            return Err(CoreError::validation("mining_interval_secs must be positive"));
        }
        const VALID_MODES: &[&str] = &["admin_only", "hybrid", "governance", "automatic"];
        if !VALID_MODES.contains(&self.network.validator_mode.as_str()) {
            return Err(CoreError::validation(format!(
                "unknown validator_mode '{}', expected one of {VALID_MODES:?}",
                self.network.validator_mode
            )));
        }
        if self.network.governance.quorum_pct > 100 || self.network.governance.approval_threshold_pct > 100 {
            return Err(CoreError::validation("governance quorum/threshold percentages must be <= 100"));
        }
        Ok(())
    }

    pub fn validator_mode(&self) -> ValidatorMode {
        match self.network.validator_mode.as_str() {
            "hybrid" => ValidatorMode::Hybrid,
            "governance" => ValidatorMode::Governance,
            "automatic" => ValidatorMode::Automatic,
            _ => ValidatorMode::AdminOnly,
        }
    }

    pub fn governance_config(&self) -> GovernanceConfig {
        let g = &self.network.governance;
        GovernanceConfig {
            voting_period_secs: g.voting_period_secs,
            execution_delay_secs: g.execution_delay_secs,
            quorum_pct: g.quorum_pct,
            approval_threshold_pct: g.approval_threshold_pct,
            min_deposit: g.min_deposit,
        }
    }
}
