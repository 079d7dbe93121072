//! Core engine for fieldgrid: addressable fields over native columns and
//! custom attributes, search compilation, resumable cursors, chain walks,
//! tabular export and rule validation.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod catalog;
pub mod cursor;
pub mod error;
pub mod export;
pub mod model;
pub mod obs;
pub mod query;
pub mod session;
pub mod store;
pub mod validate;
pub mod value;
pub mod walk;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        model::{
            field::{FieldDescriptor, NativeFieldModel},
            module::{ModuleDescriptor, ModuleRegistry},
            record::Record,
        },
        query::{SearchSetup, SortCriterion},
        session::{AccessDecision, Session},
        validate::ValidationRule,
        value::{DataType, Value},
    };
}
