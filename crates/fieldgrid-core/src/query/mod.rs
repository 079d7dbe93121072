//! Module: query
//! Responsibility: criteria, operators and the search compiler.
//! Does not own: field resolution (see `catalog`) or cursor state (see
//! `cursor`).

pub mod compile;
pub mod criterion;
mod execute;
pub mod operator;
pub mod plan;

#[cfg(test)]
mod tests;

pub use compile::{CompileError, QueryCompiler};
pub use criterion::{SearchCriterion, SearchSetup, SortCriterion};
pub use operator::{OperatorSpec, OperatorTable};
pub use plan::CompiledQuery;
