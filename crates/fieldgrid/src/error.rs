use derive_more::Display;
use fieldgrid_core::{
    cursor::CursorError,
    error::{Error as CoreError, ErrorClass, ErrorOrigin as CoreErrorOrigin},
    export::ExportError,
    model::FieldError,
    query::CompileError,
    store::StoreError,
    validate::ValidateError,
    walk::WalkError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }
}

impl From<CoreError> for Error {
    fn from(err: CoreError) -> Self {
        let kind = if let Some(field) = field_kind(&err) {
            ErrorKind::Field(field)
        } else {
            match &err {
                CoreError::Compile(inner) => match QueryErrorKind::from_compile(inner) {
                    Some(kind) => ErrorKind::Query(kind),
                    None => ErrorKind::from_class(err.class()),
                },
                CoreError::Cursor(CursorError::NotReady { .. }) => {
                    ErrorKind::Cursor(CursorErrorKind::NotReady)
                }
                _ => ErrorKind::from_class(err.class()),
            }
        };

        Self::new(kind, err.origin().into(), err.to_string())
    }
}

// Field errors keep their kind however deep the engine nested them.
fn field_kind(err: &CoreError) -> Option<FieldErrorKind> {
    let field = match err {
        CoreError::Field(inner)
        | CoreError::Compile(CompileError::Field(inner))
        | CoreError::Walk(WalkError::Field(inner))
        | CoreError::Export(ExportError::Field(inner) | ExportError::Walk(WalkError::Field(inner)))
        | CoreError::Validate(
            ValidateError::Field(inner) | ValidateError::Walk(WalkError::Field(inner)),
        ) => Some(inner),
        _ => None,
    };
    if let Some(inner) = field {
        return Some(inner.into());
    }

    match store_error(err) {
        Some(StoreError::TypeMismatch { .. }) => Some(FieldErrorKind::TypeMismatch),
        _ => None,
    }
}

fn store_error(err: &CoreError) -> Option<&StoreError> {
    match err {
        CoreError::Store(inner)
        | CoreError::Cursor(CursorError::Store(inner))
        | CoreError::Walk(WalkError::Store(inner))
        | CoreError::Export(ExportError::Store(inner) | ExportError::Walk(WalkError::Store(inner)))
        | CoreError::Validate(
            ValidateError::Store(inner) | ValidateError::Walk(WalkError::Store(inner)),
        ) => Some(inner),
        _ => None,
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Field(FieldErrorKind),
    Query(QueryErrorKind),
    Cursor(CursorErrorKind),

    /// Caller input other than fields and criteria: files, rules, config.
    InvalidInput,

    NotFound,

    /// The request clashes with current state, e.g. deleting a definition
    /// that still has values.
    Conflict,

    Cancelled,
    Unauthorized,
    Unsupported,

    /// Stored data could not be decoded.
    Corruption,

    /// The caller cannot remediate this.
    Internal,
}

impl ErrorKind {
    const fn from_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Cancelled => Self::Cancelled,
            ErrorClass::Conflict => Self::Conflict,
            ErrorClass::Corruption => Self::Corruption,
            ErrorClass::Internal => Self::Internal,
            ErrorClass::InvalidInput => Self::InvalidInput,
            ErrorClass::NotFound => Self::NotFound,
            ErrorClass::Unauthorized => Self::Unauthorized,
            ErrorClass::Unsupported => Self::Unsupported,
        }
    }
}

///
/// FieldErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FieldErrorKind {
    UnknownModule,

    /// The field id is not registered for that module.
    UnknownFieldId,

    DuplicateFieldId,

    /// The field's module is outside the chain being searched or walked.
    NotInChain,

    /// A literal could not be coerced to the field's data type.
    TypeMismatch,
}

impl From<&FieldError> for FieldErrorKind {
    fn from(err: &FieldError) -> Self {
        match err {
            FieldError::UnknownModule { .. } => Self::UnknownModule,
            FieldError::UnknownFieldId { .. } => Self::UnknownFieldId,
            FieldError::DuplicateFieldId { .. } => Self::DuplicateFieldId,
            FieldError::FieldNotInChain { .. } => Self::NotInChain,
            FieldError::TypeMismatch { .. } => Self::TypeMismatch,
        }
    }
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    UnknownOperator,

    /// The operator does not apply to the field's data type.
    UnsupportedOperator,

    MissingValue,
    InvalidPattern,
}

impl QueryErrorKind {
    const fn from_compile(err: &CompileError) -> Option<Self> {
        match err {
            CompileError::UnknownOperator { .. } => Some(Self::UnknownOperator),
            CompileError::UnsupportedOperator { .. } => Some(Self::UnsupportedOperator),
            CompileError::MissingValue { .. } => Some(Self::MissingValue),
            CompileError::InvalidPattern { .. } => Some(Self::InvalidPattern),
            CompileError::Field(_) | CompileError::Operator(_) => None,
        }
    }
}

///
/// CursorErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CursorErrorKind {
    /// The run has no computed result to move over.
    NotReady,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
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

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Catalog => Self::Catalog,
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Cursor => Self::Cursor,
            CoreErrorOrigin::Export => Self::Export,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Session => Self::Session,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Validate => Self::Validate,
            CoreErrorOrigin::Walk => Self::Walk,
        }
    }
}
