use crate::error::{Error, Result};
use crate::types::AddressCodec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CHAIN_ID: &str = "dyson-local";
const DEFAULT_ADDRESS_PREFIX: &str = "dys";
const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_MIN_RETAIN_BLOCKS: u64 = 0;

/// Name of the module account that governs params by default.
pub const GOVERNANCE_MODULE: &str = "gov";

/// How the interpreter process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub program: String,
    /// Arguments placed before the invocation mode.
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Wall-clock bound on one interpreter run. Unset means no bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl InterpreterConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            program: DEFAULT_INTERPRETER.to_string(),
            args: vec!["-m".to_string(), "dyslang".to_string()],
            working_dir: None,
            timeout_secs: None,
        }
    }
}

/// Host configuration, loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub chain_id: String,
    pub address_prefix: String,
    /// Account allowed to update params. Defaults to the governance module account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    /// Committed heights kept for historical queries; 0 keeps everything.
    pub min_retain_blocks: u64,
    pub interpreter: InterpreterConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            authority: None,
            min_retain_blocks: DEFAULT_MIN_RETAIN_BLOCKS,
            interpreter: InterpreterConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let encoded = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&encoded)
    }

    pub fn from_toml(encoded: &str) -> Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(encoded).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(Error::Config("chain_id cannot be empty".into()));
        }
        if self.address_prefix.is_empty() {
            return Err(Error::Config("address_prefix cannot be empty".into()));
        }
        if self.interpreter.program.is_empty() {
            return Err(Error::Config("interpreter.program cannot be empty".into()));
        }
        if let Some(authority) = &self.authority {
            self.address_codec()
                .validate(authority)
                .map_err(|e| Error::Config(format!("authority: {}", e)))?;
        }
        Ok(())
    }

    pub fn address_codec(&self) -> AddressCodec {
        AddressCodec::new(self.address_prefix.clone())
    }

    /// Configured authority, or the governance module account.
    pub fn authority(&self) -> String {
        match &self.authority {
            Some(authority) => authority.clone(),
            None => module_address(&self.address_codec(), GOVERNANCE_MODULE),
        }
    }
}

/// Deterministic account address of a named module.
pub fn module_address(codec: &AddressCodec, name: &str) -> String {
    let hash = blake3::hash(name.as_bytes());
    codec.encode(&hash.as_bytes()[..crate::types::ADDRESS_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = RuntimeConfig::default();
        let encoded = config.to_toml().unwrap();
        let decoded = RuntimeConfig::from_toml(&encoded).unwrap();
        assert_eq!(config, decoded);
        assert!(decoded.authority().starts_with("dys1"));
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(
            &path,
            r#"
chain_id = "dyson-test"
min_retain_blocks = 2000

[interpreter]
program = "/usr/bin/python3"
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(config.chain_id, "dyson-test");
        assert_eq!(config.address_prefix, "dys");
        assert_eq!(config.interpreter.args, vec!["-m", "dyslang"]);
        assert_eq!(config.interpreter.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_config() {
        assert!(RuntimeConfig::from_toml("chain_id = \"\"").is_err());
        assert!(RuntimeConfig::from_toml("authority = \"cosmos1xyz\"").is_err());
        assert!(RuntimeConfig::from_file("/nonexistent/runtime.toml").is_err());
    }
}
