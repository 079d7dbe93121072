//! ## Crate layout
//! - `config`: TOML engine configuration.
//! - `core`: field catalog, search compiler, cursors, chain walks, export,
//!   import and validation.
//! - `error`: the public error taxonomy.
//!
//! Most callers only need the `prelude` and a `Session`.

pub use fieldgrid_config as config;
pub use fieldgrid_core as core;

pub mod error;

pub use error::Error;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use fieldgrid_config::EngineConfig;
use fieldgrid_core::{
    model::{field::NativeFieldModel, module::ModuleRegistry},
    session::Session,
    store::Database,
};
use std::sync::Arc;

/// Open a session over `db` with the given modules and native fields.
pub fn open(
    db: Arc<Database>,
    modules: Arc<ModuleRegistry>,
    natives: &'static [NativeFieldModel],
    config: EngineConfig,
) -> Result<Session, Error> {
    Ok(Session::new(db, modules, natives, config)?)
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        config::EngineConfig,
        core::{
            export::{ExportPlan, Row},
            model::{
                field::NativeFieldModel,
                module::{ModuleDescriptor, ModuleRegistry},
                record::Record,
            },
            query::{SearchSetup, SortCriterion},
            session::{AccessDecision, Session},
            store::Database,
            validate::{RuleKind, ValidationRule, Violation},
            value::{DataType, Value},
            walk::CancelToken,
        },
        error::{Error, ErrorKind, ErrorOrigin},
    };
}
