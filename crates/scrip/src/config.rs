//! Serialized form of a compiler configuration.
//!
//! The document only describes entries; [`Session::from_document`] walks it
//! and registers each entry, which is where validation happens.
//!
//! [`Session::from_document`]: crate::session::Session::from_document

use std::{collections::BTreeMap, fs, io, path::Path, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::{
    constant::Constant,
    operators::OperatorSign,
    translation::{DataAttribute, DataSource, DataType},
    types::{ValueKind, VarScope},
    ConfigError,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read configuration `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

/// Settings for one build.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub name: String,
    // operator used to initialize temporaries and declarations
    pub default_assign: String,
    pub output_extension: String,
    pub include_paths: Vec<PathBuf>,
    pub defines: BTreeMap<String, String>,
    // values read by `env` translation fields
    pub env: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            name: "script".to_string(),
            default_assign: "=".to_string(),
            output_extension: "scc".to_string(),
            include_paths: Vec::new(),
            defines: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub build: BuildConfig,
    pub translations: Vec<TranslationConfig>,
    pub types: TypesConfig,
    pub commands: Vec<CommandConfig>,
    pub operators: Vec<OperatorConfig>,
    pub constants: BTreeMap<String, ConstantConfig>,
    pub enums: Vec<EnumConfig>,
}

impl ConfigDocument {
    pub fn from_json(text: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    pub name: String,
    // one inner list per data block
    pub data: Vec<Vec<FieldConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub size: Option<u32>,
    pub source: DataSource,
    #[serde(default)]
    pub attribute: DataAttribute,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TypesConfig {
    pub basic: Vec<BasicTypeConfig>,
    pub extended: Vec<ExtendedTypeConfig>,
    pub variable: Vec<VariableTypeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicTypeConfig {
    pub name: String,
    #[serde(default)]
    pub values: Vec<ValueConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedTypeConfig {
    pub name: String,
    pub basic: String,
    #[serde(default)]
    pub values: Vec<ValueConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableTypeConfig {
    pub name: String,
    pub scope: VarScope,
    pub stores: String,
    #[serde(default)]
    pub values: Vec<ValueConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKindConfig {
    Int,
    Float,
    Text,
    Label,
    Variable,
    Array,
    Command,
}

impl From<ValueKindConfig> for ValueKind {
    fn from(kind: ValueKindConfig) -> Self {
        match kind {
            ValueKindConfig::Int => ValueKind::Number { float: false },
            ValueKindConfig::Float => ValueKind::Number { float: true },
            ValueKindConfig::Text => ValueKind::Text,
            ValueKindConfig::Label => ValueKind::Label,
            ValueKindConfig::Variable => ValueKind::Variable,
            ValueKindConfig::Array => ValueKind::Array,
            ValueKindConfig::Command => ValueKind::Command,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValueConfig {
    pub kind: ValueKindConfig,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub id: u16,
    #[serde(default)]
    pub args: Vec<ArgConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgConfig {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub out: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    pub symbol: String,
    pub sign: OperatorSign,
    #[serde(default)]
    pub assignment: bool,
    #[serde(default)]
    pub conditional: bool,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
    #[serde(default)]
    pub autos: Vec<OperationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    #[serde(default)]
    pub lhs: Option<String>,
    #[serde(default)]
    pub rhs: Option<String>,
    #[serde(default)]
    pub lhs_value: Option<ConstantConfig>,
    #[serde(default)]
    pub rhs_value: Option<ConstantConfig>,
    #[serde(default)]
    pub id: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ConstantConfig {
    Int(i64),
    Float(f32),
}

impl From<ConstantConfig> for Constant {
    fn from(value: ConstantConfig) -> Self {
        match value {
            ConstantConfig::Int(v) => Constant::Int(v),
            ConstantConfig::Float(v) => Constant::Float(v),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumConfig {
    pub name: String,
    pub values: Vec<EnumValueConfig>,
}

// a bare name continues counting from the previous entry
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnumValueConfig {
    Name(String),
    Valued { name: String, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let document = ConfigDocument::from_json(
            r#"{
                "build": { "name": "main", "defines": { "DEBUG": "1" } },
                "translations": [
                    { "name": "INT8", "data": [[
                        { "type": "int", "size": 8, "source": "literal", "value": "4" },
                        { "type": "int", "size": 8, "source": "number" }
                    ]] }
                ],
                "types": {
                    "basic": [ { "name": "INT", "values": [ { "kind": "int", "size": 8, "translation": "INT8" } ] } ]
                },
                "constants": { "TRUE": 1, "HALF": 0.5 },
                "enums": [ { "name": "PED", "values": [ "PLAYER", { "name": "COP", "value": 4 }, "GANG" ] } ]
            }"#,
        )
        .unwrap();

        assert_eq!(document.build.name, "main");
        assert_eq!(document.build.default_assign, "=");
        assert_eq!(document.translations[0].data[0].len(), 2);
        assert_eq!(
            document.translations[0].data[0][1].attribute,
            DataAttribute::Value
        );
        assert_eq!(document.constants["TRUE"], ConstantConfig::Int(1));
        assert_eq!(document.constants["HALF"], ConstantConfig::Float(0.5));
        assert!(matches!(
            document.enums[0].values[1],
            EnumValueConfig::Valued { value: 4, .. }
        ));
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            ConfigDocument::from_json(r#"{ "translations": 3 }"#),
            Err(LoadError::Json(_))
        ));
    }
}
