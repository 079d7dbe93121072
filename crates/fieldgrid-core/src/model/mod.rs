//! Runtime metamodel: module descriptors, module chains, field descriptors
//! and untyped entity records.

pub mod chain;
pub mod field;
pub mod module;
pub mod record;

#[cfg(test)]
mod tests;

use crate::value::DataType;
use thiserror::Error as ThisError;

///
/// FieldError
///
/// Registry-level failures. These are caller-visible and never retried.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum FieldError {
    #[error("unknown module '{module}'")]
    UnknownModule { module: String },

    #[error("unknown field id '{field}' for module '{module}'")]
    UnknownFieldId { module: String, field: String },

    #[error("field id '{field}' is declared twice on module '{module}'")]
    DuplicateFieldId { module: String, field: String },

    #[error("field '{field}' belongs to module '{module}', which is not part of the module chain")]
    FieldNotInChain { field: String, module: String },

    #[error("field '{field}' expects {expected}, got '{value}'")]
    TypeMismatch {
        field: String,
        value: String,
        expected: DataType,
    },
}
