//! Command and configuration schema
//!
//! Plain serde types; the transport that carries them is not our concern.
//! Init arguments can also be read from JSON files.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sase_common::{GateId, SaseError, SaseResult};

use crate::field::{FieldData, FieldSpec};

/// Rule map pre-size used when `entries` is zero
pub const DEFAULT_ENTRIES: usize = 1024;

/// JSON load/store helpers for config types
pub trait JsonConfig: Serialize + DeserializeOwned {
    /// Load from file
    fn load(path: impl AsRef<Path>) -> SaseResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse from a JSON string
    fn from_json(json: &str) -> SaseResult<Self> {
        serde_json::from_str(json).map_err(|e| SaseError::Config(e.to_string()))
    }

    /// Pretty JSON
    fn to_json(&self) -> SaseResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SaseError::Config(e.to_string()))
    }
}

pub(crate) fn entries_or_default(entries: u32) -> usize {
    if entries == 0 {
        DEFAULT_ENTRIES
    } else {
        entries as usize
    }
}

/// Exact-match init argument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatchArg {
    /// Match fields
    pub fields: Vec<FieldSpec>,
    /// One mask per field, or none for all-ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masks: Vec<FieldData>,
    /// Action value fields
    #[serde(default)]
    pub values: Vec<FieldSpec>,
    /// One mask per value, or none for all-ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masksv: Vec<FieldData>,
    /// Expected rule count (sizing hint)
    #[serde(default)]
    pub entries: u32,
}

/// Wildcard init argument; masks come with each rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardMatchArg {
    /// Match fields
    pub fields: Vec<FieldSpec>,
    /// Action value fields
    #[serde(default)]
    pub values: Vec<FieldSpec>,
    /// One mask per value, or none for all-ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masksv: Vec<FieldData>,
    /// Expected rules per tuple (sizing hint)
    #[serde(default)]
    pub entries: u32,
}

/// Add one exact rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatchCommandAddArg {
    /// Output gate
    pub gate: GateId,
    /// One value per match field
    pub fields: Vec<FieldData>,
    /// One value per action field
    #[serde(default)]
    pub values: Vec<FieldData>,
}

/// Delete one exact rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatchCommandDeleteArg {
    /// One value per match field
    pub fields: Vec<FieldData>,
}

/// Exact-match runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactMatchConfig {
    /// Route for unmatched packets
    pub default_gate: GateId,
    /// Installed rules
    #[serde(default)]
    pub rules: Vec<ExactMatchCommandAddArg>,
}

/// Add one wildcard rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardMatchCommandAddArg {
    /// Output gate
    pub gate: GateId,
    /// Larger wins
    #[serde(default)]
    pub priority: i32,
    /// One value per match field
    pub fields: Vec<FieldData>,
    /// One mask per match field
    pub masks: Vec<FieldData>,
    /// One value per action field
    #[serde(default)]
    pub values: Vec<FieldData>,
}

/// Delete one wildcard rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardMatchCommandDeleteArg {
    /// One value per match field
    pub fields: Vec<FieldData>,
    /// One mask per match field
    pub masks: Vec<FieldData>,
}

/// Wildcard runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardMatchConfig {
    /// Route for unmatched packets
    pub default_gate: GateId,
    /// Installed rules
    #[serde(default)]
    pub rules: Vec<WildcardMatchCommandAddArg>,
}

/// Change the default gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDefaultGateArg {
    /// New default gate
    pub gate: GateId,
}

impl JsonConfig for ExactMatchArg {}
impl JsonConfig for WildcardMatchArg {}
impl JsonConfig for ExactMatchConfig {}
impl JsonConfig for WildcardMatchConfig {}
