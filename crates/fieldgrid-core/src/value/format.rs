//! Module: value::format
//! Responsibility: rendering values as export cells.
//! Does not own: storage encoding (see `value::sql`).

use super::Value;
use chrono::format::{Item, StrftimeItems};
use fieldgrid_config::{ConfigError, ExportConfig};

///
/// CellFormat
///
/// Rendering options for tabular output cells.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CellFormat {
    pub date_format: String,
    pub datetime_format: String,
}

impl CellFormat {
    /// Build from export config, rejecting strftime patterns chrono cannot
    /// render (those would fail at format time).
    pub fn from_config(config: &ExportConfig) -> Result<Self, ConfigError> {
        check_pattern("export.date_format", &config.date_format)?;
        check_pattern("export.datetime_format", &config.datetime_format)?;

        Ok(Self {
            date_format: config.date_format.clone(),
            datetime_format: config.datetime_format.clone(),
        })
    }
}

impl Default for CellFormat {
    fn default() -> Self {
        let defaults = ExportConfig::default();

        Self {
            date_format: defaults.date_format,
            datetime_format: defaults.datetime_format,
        }
    }
}

fn check_pattern(key: &str, pattern: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Invalid(format!(
            "{key} is not a valid strftime pattern: {pattern:?}"
        )));
    }

    Ok(())
}

impl Value {
    /// Render for a grid or file cell. Null renders as the empty string.
    #[must_use]
    pub fn format_cell(&self, format: &CellFormat) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let rendered = match self {
            Self::Date(d) => write!(out, "{}", d.format(&format.date_format)),
            Self::DateTime(dt) => write!(out, "{}", dt.format(&format.datetime_format)),
            _ => return self.to_string(),
        };

        // a pattern asking for fields the value lacks (%H on a date) falls
        // back to the storage rendering
        if rendered.is_err() {
            return self.to_string();
        }

        out
    }
}
