//! Compiled contract artifacts.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::DEFAULT_DEPLOY_BYTECODE;

/// Errors raised while loading an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The artifact file could not be read.
    #[error("failed to read artifact {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The artifact is not valid JSON or misses required fields.
    #[error("failed to parse artifact {path}: {source}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The artifact carries no creation code.
    #[error("artifact {0} has empty bytecode")]
    EmptyBytecode(String),
}

/// Hardhat-style compiled contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    /// Contract name, when present in the artifact.
    #[serde(default)]
    pub contract_name: Option<String>,
    /// Contract ABI.
    #[serde(default)]
    pub abi: serde_json::Value,
    /// Creation bytecode.
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Loads an artifact JSON file.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let display = path.display().to_string();
        let json = fs::read_to_string(path)
            .map_err(|source| ArtifactError::Io { path: display.clone(), source })?;
        let artifact: Self = serde_json::from_str(&json)
            .map_err(|source| ArtifactError::Parse { path: display.clone(), source })?;
        if artifact.bytecode.is_empty() {
            return Err(ArtifactError::EmptyBytecode(display));
        }
        Ok(artifact)
    }

    /// Path of `name` inside a Hardhat artifacts directory.
    pub fn hardhat_path(artifacts_dir: &Path, name: &str) -> PathBuf {
        artifacts_dir.join("contracts").join(format!("{name}.sol")).join(format!("{name}.json"))
    }

    /// Solidity types of the constructor parameters, in declaration order.
    ///
    /// Empty when the ABI declares no constructor.
    pub fn constructor_inputs(&self) -> Vec<&str> {
        self.abi
            .as_array()
            .into_iter()
            .flatten()
            .find(|item| item["type"] == "constructor")
            .and_then(|ctor| ctor["inputs"].as_array())
            .map(|inputs| inputs.iter().filter_map(|i| i["type"].as_str()).collect())
            .unwrap_or_default()
    }

    /// Built-in minimal contract deployed when no artifact is configured.
    pub fn builtin() -> Self {
        let bytecode = DEFAULT_DEPLOY_BYTECODE.parse().unwrap_or_default();
        Self {
            contract_name: Some("Minimal".to_string()),
            abi: serde_json::Value::Array(Vec::new()),
            bytecode,
        }
    }
}
