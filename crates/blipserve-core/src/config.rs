use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};

use crate::DType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IOName(pub String);

impl IOName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One declared input or output of a model.
#[derive(Clone, Debug, Deserialize)]
pub struct TensorConfig {
    pub name: String,
    #[serde(deserialize_with = "deserialize_dtype")]
    pub data_type: DType,
    /// -1 = dynamic
    #[serde(default)]
    pub dims: Vec<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ParameterValue {
    #[serde(default)]
    pub string_value: String,
}

/// The model configuration handed to an adapter at load time.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub max_batch_size: usize,
    #[serde(default)]
    pub input: Vec<TensorConfig>,
    #[serde(default)]
    pub output: Vec<TensorConfig>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterValue>,
}

impl ModelConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse model_config JSON")
    }

    pub fn output_by_name(&self, name: &str) -> Result<&TensorConfig> {
        self.output
            .iter()
            .find(|o| o.name == name)
            .with_context(|| format!("model config declares no output named {name}"))
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(|p| p.string_value.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn bool_parameter(&self, key: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.parameter(key) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => bail!("parameter {key} must be a boolean, got {raw:?}"),
        }
    }
}

fn deserialize_dtype<'de, D>(deserializer: D) -> std::result::Result<DType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DType::from_config_name(&raw).map_err(serde::de::Error::custom)
}
