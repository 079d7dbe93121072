//! Engine configuration for fieldgrid.
//!
//! Configuration is a single TOML document. Every section is optional and
//! falls back to compiled defaults, so an empty document is a valid config.
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;


///
/// CONSTANTS
///

pub const DEFAULT_CUSTOM_FIELD_PREFIX: &str = "*cf_";
pub const DEFAULT_LIST_SEPARATOR: &str = "\n";
pub const DEFAULT_MATERIALIZE_LIMIT: u32 = 10_000;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

///
/// EngineConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub catalog: CatalogConfig,
    pub search: SearchConfig,
    pub cursor: CursorConfig,
    pub export: ExportConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.custom_field_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "catalog.custom_field_prefix must not be empty".to_string(),
            ));
        }
        if self.search.list_separator.is_empty() {
            return Err(ConfigError::Invalid(
                "search.list_separator must not be empty".to_string(),
            ));
        }
        if self.cursor.page_size == 0 {
            return Err(ConfigError::Invalid(
                "cursor.page_size must be greater than zero".to_string(),
            ));
        }
        if self.cursor.page_size > self.cursor.materialize_limit {
            return Err(ConfigError::Invalid(format!(
                "cursor.page_size ({}) must not exceed cursor.materialize_limit ({})",
                self.cursor.page_size, self.cursor.materialize_limit
            )));
        }
        self.export.delimiter_byte()?;

        Ok(())
    }
}

///
/// CatalogConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// Prefix joined with a custom definition id to form the field uid.
    pub custom_field_prefix: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            custom_field_prefix: DEFAULT_CUSTOM_FIELD_PREFIX.to_string(),
        }
    }
}

///
/// SearchConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Separator between entries of an `in` / `notin` literal.
    pub list_separator: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            list_separator: DEFAULT_LIST_SEPARATOR.to_string(),
        }
    }
}

///
/// CursorConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CursorConfig {
    /// Result sets larger than this are paged instead of cached in full.
    pub materialize_limit: u32,
    pub page_size: u32,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            materialize_limit: DEFAULT_MATERIALIZE_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

///
/// ExportConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub delimiter: String,
    pub date_format: String,
    pub datetime_format: String,
}

impl ExportConfig {
    /// The CSV delimiter as a single byte.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() && *byte != b'"' && *byte != b'\n' => Ok(*byte),
            _ => Err(ConfigError::Invalid(format!(
                "export.delimiter must be a single ASCII character other than a quote or newline, got {:?}",
                self.delimiter
            ))),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}
