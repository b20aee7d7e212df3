//! Code generation options (`[codegen]` table)
//!
//! ```toml
//! [codegen]
//! indent = 2
//! verify = true
//! source_file = "Flow.java"
//! emit_debug_names = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading options
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Options shared by both emitters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodegenOptions {
    /// Indentation width of rendered source
    pub indent: usize,

    /// Run the bytecode verifier over binary output
    pub verify: bool,

    /// Originating source file recorded in artifact metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,

    /// Keep local variable names in binary artifacts
    pub emit_debug_names: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            indent: 4,
            verify: true,
            source_file: None,
            emit_debug_names: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    codegen: CodegenOptions,
}

impl CodegenOptions {
    /// Load the `[codegen]` table of a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse the `[codegen]` table of a TOML document; a missing table yields defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.codegen.validate()?;
        Ok(file.codegen)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indent > 16 {
            return Err(ConfigError::Invalid(format!(
                "indent must be at most 16, got {}",
                self.indent
            )));
        }
        if let Some(file) = &self.source_file {
            if file.is_empty() {
                return Err(ConfigError::Invalid("source_file cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}
