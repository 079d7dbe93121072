//! Module: error
//! Responsibility: the engine-wide error roll-up and its stable
//! classification.
//! Does not own: the per-module error enums, which stay next to their code.
//!
//! `class()` says what kind of failure happened, `origin()` says which
//! subsystem raised it. Callers branch on those, never on message text.

use crate::{
    cursor::CursorError,
    export::ExportError,
    model::FieldError,
    query::{CompileError, operator::OperatorError},
    store::StoreError,
    validate::ValidateError,
    walk::WalkError,
};
use fieldgrid_config::ConfigError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Validate(#[from] ValidateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{action} requires {permission} access")]
    Unauthorized {
        action: &'static str,
        permission: &'static str,
    },
}

impl Error {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Field(err) => field_class(err),
            Self::Operator(err) => operator_class(err),
            Self::Compile(err) => compile_class(err),
            Self::Store(err) => store_class(err),
            Self::Cursor(err) => cursor_class(err),
            Self::Walk(err) => walk_class(err),
            Self::Export(err) => export_class(err),
            Self::Validate(err) => validate_class(err),
            Self::Config(err) => config_class(err),
            Self::Unauthorized { .. } => ErrorClass::Unauthorized,
        }
    }

    #[must_use]
    pub const fn origin(&self) -> ErrorOrigin {
        match self {
            Self::Field(_) => ErrorOrigin::Catalog,
            Self::Operator(_) | Self::Compile(_) => ErrorOrigin::Query,
            Self::Store(_) => ErrorOrigin::Store,
            Self::Cursor(_) => ErrorOrigin::Cursor,
            Self::Walk(_) => ErrorOrigin::Walk,
            Self::Export(_) => ErrorOrigin::Export,
            Self::Validate(_) => ErrorOrigin::Validate,
            Self::Config(_) => ErrorOrigin::Config,
            Self::Unauthorized { .. } => ErrorOrigin::Session,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Cancelled
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {self}", self.origin(), self.class())
    }
}

const fn field_class(err: &FieldError) -> ErrorClass {
    match err {
        FieldError::UnknownModule { .. } | FieldError::UnknownFieldId { .. } => {
            ErrorClass::NotFound
        }
        FieldError::DuplicateFieldId { .. } => ErrorClass::Conflict,
        FieldError::FieldNotInChain { .. } | FieldError::TypeMismatch { .. } => {
            ErrorClass::InvalidInput
        }
    }
}

const fn operator_class(err: &OperatorError) -> ErrorClass {
    match err {
        OperatorError::Duplicate(_) => ErrorClass::Conflict,
        OperatorError::BadTemplate { .. } => ErrorClass::InvalidInput,
    }
}

const fn compile_class(err: &CompileError) -> ErrorClass {
    match err {
        CompileError::Field(err) => field_class(err),
        CompileError::Operator(err) => operator_class(err),
        CompileError::UnknownOperator { .. } => ErrorClass::NotFound,
        CompileError::UnsupportedOperator { .. } => ErrorClass::Unsupported,
        CompileError::MissingValue { .. } | CompileError::InvalidPattern { .. } => {
            ErrorClass::InvalidInput
        }
    }
}

// Values read back from storage that fail to decode are corruption, not
// caller mistakes.
const fn store_class(err: &StoreError) -> ErrorClass {
    match err {
        StoreError::Sqlite(_) => ErrorClass::Internal,
        StoreError::Json(_) | StoreError::Coercion(_) | StoreError::Corrupt { .. } => {
            ErrorClass::Corruption
        }
        StoreError::TypeMismatch { .. } => ErrorClass::InvalidInput,
        StoreError::DefinitionNotFound { .. } | StoreError::RecordNotFound { .. } => {
            ErrorClass::NotFound
        }
        StoreError::DefinitionInUse { .. } => ErrorClass::Conflict,
    }
}

const fn cursor_class(err: &CursorError) -> ErrorClass {
    match err {
        CursorError::NotReady { .. } => ErrorClass::Conflict,
        CursorError::Store(err) => store_class(err),
    }
}

const fn walk_class(err: &WalkError) -> ErrorClass {
    match err {
        WalkError::Cancelled => ErrorClass::Cancelled,
        WalkError::EmptyChain | WalkError::RootMismatch { .. } => ErrorClass::InvalidInput,
        WalkError::Field(err) => field_class(err),
        WalkError::Store(err) => store_class(err),
    }
}

const fn export_class(err: &ExportError) -> ErrorClass {
    match err {
        ExportError::Csv(_) | ExportError::CellCount { .. } | ExportError::KeyNotNative { .. } => {
            ErrorClass::InvalidInput
        }
        ExportError::Io(_) => ErrorClass::Internal,
        ExportError::Field(err) => field_class(err),
        ExportError::Store(err) => store_class(err),
        ExportError::Walk(err) => walk_class(err),
    }
}

const fn validate_class(err: &ValidateError) -> ErrorClass {
    match err {
        ValidateError::Field(err) => field_class(err),
        ValidateError::InvalidRule { .. } => ErrorClass::InvalidInput,
        ValidateError::Store(err) => store_class(err),
        ValidateError::Walk(err) => walk_class(err),
    }
}

const fn config_class(err: &ConfigError) -> ErrorClass {
    match err {
        ConfigError::Io { .. } => ErrorClass::Internal,
        ConfigError::Parse(_) | ConfigError::Invalid(_) => ErrorClass::InvalidInput,
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorClass {
    Cancelled,
    Conflict,
    Corruption,
    Internal,
    InvalidInput,
    NotFound,
    Unauthorized,
    Unsupported,
}

impl ErrorClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Conflict => "conflict",
            Self::Corruption => "corruption",
            Self::Internal => "internal",
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorOrigin {
    Catalog,
    Config,
    Cursor,
    Export,
    Query,
    Session,
    Store,
    Validate,
    Walk,
}

impl ErrorOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Config => "config",
            Self::Cursor => "cursor",
            Self::Export => "export",
            Self::Query => "query",
            Self::Session => "session",
            Self::Store => "store",
            Self::Validate => "validate",
            Self::Walk => "walk",
        }
    }
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
