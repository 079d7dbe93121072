//! Module: validate
//! Responsibility: user-authored validation rules evaluated across a nested
//! entity graph.
//! Does not own: traversal (see `walk`) or field resolution (see `catalog`).
//!
//! Violations are collected, never raised: one call reports every broken
//! rule. A rule whose constraint is empty is disabled rather than treated as
//! matching nothing.

mod rule;


pub use rule::{RuleKind, ValidationRule};

use crate::{
    catalog::FieldCatalog,
    model::{
        FieldError,
        chain::ModuleChain,
        field::FieldDescriptor,
        module::ModuleDescriptor,
        record::{Record, RecordRef},
    },
    obs::sink::{self, MetricsEvent},
    store::{Database, StoreError, record::RecordStore},
    value::Value,
    walk::{CancelToken, ChainVisitor, ChainWalk, Lineage, WalkError},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, sync::Arc};
use thiserror::Error as ThisError;

///
/// ValidateError
///
/// Failures of the rule set itself, not of the data.
///

#[derive(Debug, ThisError)]
pub enum ValidateError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("invalid rule on '{field}': {message}")]
    InvalidRule { field: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Walk(#[from] WalkError),
}

///
/// Violation
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Violation {
    pub module: String,
    pub record_id: Option<i64>,
    pub field: String,
    /// Human-readable, prefixed with the module label below the root.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

///
/// RuleValidator
///

pub struct RuleValidator<'a> {
    catalog: &'a FieldCatalog,
    db: &'a Database,
    cancel: Option<&'a CancelToken>,
}

impl<'a> RuleValidator<'a> {
    #[must_use]
    pub const fn new(catalog: &'a FieldCatalog, db: &'a Database) -> Self {
        Self {
            catalog,
            db,
            cancel: None,
        }
    }

    #[must_use]
    pub const fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate a stored root record and everything nested below it.
    pub fn validate(
        &self,
        module: &str,
        root_id: i64,
        rules: &[ValidationRule],
    ) -> Result<Vec<Violation>, ValidateError> {
        let root = self.catalog.modules().require(module)?;
        let record = RecordStore::new(self.db).require(root, root_id)?;

        self.validate_record(record, rules)
    }

    /// Validate a record as it stands in memory, staged writes included.
    /// Nested records are loaded from the store when the root is saved.
    pub fn validate_record(
        &self,
        record: Record,
        rules: &[ValidationRule],
    ) -> Result<Vec<Violation>, ValidateError> {
        let root = record.module();
        let (chain, compiled) = self.compile(root, rules)?;

        let mut visitor = RuleVisitor {
            root,
            labels: compiled
                .iter()
                .map(|rule| self.catalog.label(&rule.field))
                .collect(),
            rules: compiled,
            violations: Vec::new(),
        };

        let mut walk = ChainWalk::new(self.db, &chain);
        if let Some(cancel) = self.cancel {
            walk = walk.with_cancel(cancel);
        }
        walk.walk_records([record], &mut visitor)?;

        let count = visitor.violations.len() as u64;
        sink::record(MetricsEvent::ViolationsReported { count });
        tracing::debug!(module = root.name, count, "validation finished");

        Ok(visitor.violations)
    }

    fn compile(
        &self,
        root: &'static ModuleDescriptor,
        rules: &[ValidationRule],
    ) -> Result<(ModuleChain, Vec<CompiledRule>), ValidateError> {
        let modules = self.catalog.modules();
        let snapshot = self.catalog.snapshot();
        let mut chain = ModuleChain::starting_at(root);
        let mut compiled = Vec::new();

        for rule in rules.iter().filter(|rule| rule.is_active()) {
            let field = snapshot
                .find_any(&rule.field)
                .ok_or_else(|| FieldError::UnknownFieldId {
                    module: root.name.to_string(),
                    field: rule.field.clone(),
                })?;

            if !modules.is_at_or_below(field.module, root) {
                return Err(FieldError::FieldNotInChain {
                    field: rule.field.clone(),
                    module: field.module.name.to_string(),
                }
                .into());
            }
            chain.add(modules, field.module)?;

            let check = Check::build(&field, &rule.kind)?;
            compiled.push(CompiledRule {
                field,
                check,
                message: rule.message.clone(),
            });
        }

        Ok((chain, compiled))
    }
}

///
/// CompiledRule
///

struct CompiledRule {
    field: Arc<FieldDescriptor>,
    check: Check,
    message: Option<String>,
}

enum Check {
    Required,
    Pattern(Regex),
    Range { min: Option<Value>, max: Option<Value> },
    OneOf(Vec<Value>),
}

impl Check {
    fn build(field: &FieldDescriptor, kind: &RuleKind) -> Result<Self, ValidateError> {
        let invalid = |message: String| ValidateError::InvalidRule {
            field: field.uid.clone(),
            message,
        };

        Ok(match kind {
            RuleKind::Required => Self::Required,
            RuleKind::Pattern { pattern } => Self::Pattern(
                Regex::new(pattern.trim()).map_err(|err| invalid(err.to_string()))?,
            ),
            RuleKind::Range { min, max } => Self::Range {
                min: bound(field, min.as_deref())?,
                max: bound(field, max.as_deref())?,
            },
            RuleKind::OneOf { options } => Self::OneOf(
                options
                    .iter()
                    .filter(|option| !option.trim().is_empty())
                    .map(|option| field.parse(option.trim()))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    // Default message when the rule carries none.
    fn describe(&self, label: &str) -> String {
        match self {
            Self::Required => format!("{label} is required."),
            Self::Pattern(regex) => format!("{label} must match the pattern {}.", regex.as_str()),
            Self::Range { min: Some(min), max: Some(max) } => {
                format!("{label} must be between {min} and {max}.")
            }
            Self::Range { min: Some(min), .. } => format!("{label} must be at least {min}."),
            Self::Range { max: Some(max), .. } => format!("{label} must be at most {max}."),
            Self::Range { .. } => format!("{label} is out of range."),
            Self::OneOf(options) => {
                let listed: Vec<String> = options.iter().map(Value::to_text).collect();
                format!("{label} must be one of: {}.", listed.join(", "))
            }
        }
    }

    // Only `Required` looks at blank values; the other checks skip them.
    fn passes(&self, value: &Value) -> bool {
        if value.is_blank() {
            return !matches!(self, Self::Required);
        }

        match self {
            Self::Required => true,
            Self::Pattern(regex) => regex.is_match(&value.to_text()),
            Self::Range { min, max } => {
                let above = min.as_ref().is_none_or(|min| {
                    matches!(value.compare(min), Some(Ordering::Greater | Ordering::Equal))
                });
                let below = max.as_ref().is_none_or(|max| {
                    matches!(value.compare(max), Some(Ordering::Less | Ordering::Equal))
                });

                above && below
            }
            Self::OneOf(options) => options
                .iter()
                .any(|option| value.compare(option) == Some(Ordering::Equal)),
        }
    }
}

fn bound(field: &FieldDescriptor, literal: Option<&str>) -> Result<Option<Value>, ValidateError> {
    match literal.map(str::trim) {
        None | Some("") => Ok(None),
        Some(literal) => Ok(Some(field.parse(literal)?)),
    }
}

///
/// RuleVisitor
///
/// Walk strategy: evaluate the rules of each visited record's module.
///

struct RuleVisitor {
    root: &'static ModuleDescriptor,
    rules: Vec<CompiledRule>,
    labels: Vec<String>,
    violations: Vec<Violation>,
}

impl ChainVisitor for RuleVisitor {
    fn visit_record(&mut self, record: &Record, _: &Lineage<'_>) -> Result<(), WalkError> {
        let module = record.module();

        for (rule, label) in self.rules.iter().zip(&self.labels) {
            if rule.field.module != module {
                continue;
            }

            let value = rule.field.read(record)?;
            if rule.check.passes(&value) {
                continue;
            }

            let text = rule
                .message
                .clone()
                .unwrap_or_else(|| rule.check.describe(label));
            let message = if module == self.root {
                text
            } else {
                format!("{}: {text}", module.label)
            };

            self.violations.push(Violation {
                module: module.name.to_string(),
                record_id: record.record_ref().map(|RecordRef { id, .. }| id),
                field: rule.field.uid.clone(),
                message,
            });
        }

        Ok(())
    }
}
