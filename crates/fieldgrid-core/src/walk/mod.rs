//! Module: walk
//! Responsibility: the single depth-first traversal of a module chain shared
//! by export and validation.
//! Does not own: what happens at each node (see `ChainVisitor` implementors).
//!
//! Fan-out: a record's rows are the concatenation of the rows produced under
//! each of its child modules, so children multiply within one nesting but
//! never across siblings. A record with no children at all still yields one
//! row of its own.


use crate::{
    model::{FieldError, chain::ModuleChain, module::ModuleDescriptor, record::Record},
    store::{Database, StoreError, custom::ID_CHUNK, record::RecordStore},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use thiserror::Error as ThisError;

///
/// WalkError
///

#[derive(Debug, ThisError)]
pub enum WalkError {
    #[error("walk cancelled")]
    Cancelled,

    #[error("module chain is empty")]
    EmptyChain,

    #[error("record of module '{found}' cannot start a walk rooted at '{expected}'")]
    RootMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

///
/// CancelToken
///
/// Shared flag a caller flips to stop a running walk. Clones observe the same
/// flag.
///

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), WalkError> {
        if self.is_cancelled() {
            return Err(WalkError::Cancelled);
        }

        Ok(())
    }
}

///
/// Lineage
///
/// The records currently in scope, one slot per chain position. Slots below
/// the current node, and slots of sibling subtrees, are empty.
///

#[derive(Debug)]
pub struct Lineage<'c> {
    chain: &'c ModuleChain,
    slots: Vec<Option<Record>>,
    leaf: usize,
}

impl<'c> Lineage<'c> {
    fn new(chain: &'c ModuleChain) -> Self {
        Self {
            chain,
            slots: vec![None; chain.len()],
            leaf: 0,
        }
    }

    #[must_use]
    pub const fn chain(&self) -> &'c ModuleChain {
        self.chain
    }

    /// Record in scope for `module`, if any.
    #[must_use]
    pub fn record(&self, module: &str) -> Option<&Record> {
        let position = self.chain.position(module)?;
        self.slots.get(position)?.as_ref()
    }

    /// Deepest record of the current row.
    #[must_use]
    pub fn leaf(&self) -> Option<&Record> {
        self.slots.get(self.leaf)?.as_ref()
    }

    /// Root record of the current walk.
    #[must_use]
    pub fn root(&self) -> Option<&Record> {
        self.slots.first()?.as_ref()
    }
}

///
/// ChainVisitor
///
/// Strategy plugged into the walk. Both hooks default to doing nothing.
///

pub trait ChainVisitor {
    /// Called once per loaded record, parents before children.
    fn visit_record(&mut self, _record: &Record, _lineage: &Lineage<'_>) -> Result<(), WalkError> {
        Ok(())
    }

    /// Called once per output row, when the walk bottoms out.
    fn leaf_row(&mut self, _lineage: &Lineage<'_>) -> Result<(), WalkError> {
        Ok(())
    }
}

///
/// WalkStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WalkStats {
    pub roots: u64,
    pub records: u64,
    pub rows: u64,
}

///
/// ChainWalk
///

pub struct ChainWalk<'a> {
    records: RecordStore<'a>,
    chain: &'a ModuleChain,
    cancel: Option<&'a CancelToken>,
}

impl<'a> ChainWalk<'a> {
    #[must_use]
    pub const fn new(db: &'a Database, chain: &'a ModuleChain) -> Self {
        Self {
            records: RecordStore::new(db),
            chain,
            cancel: None,
        }
    }

    #[must_use]
    pub const fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Walk the chain below every root id, in the given order. Ids with no
    /// live row are skipped.
    pub fn walk_ids(
        &self,
        root_ids: &[i64],
        visitor: &mut dyn ChainVisitor,
    ) -> Result<WalkStats, WalkError> {
        let root = self.root_module()?;
        let mut stats = WalkStats::default();

        for chunk in root_ids.chunks(ID_CHUNK) {
            self.check_cancel()?;
            for record in self.records.load_many(root, chunk)? {
                self.walk_one(record, visitor, &mut stats)?;
            }
        }

        Ok(stats)
    }

    /// Walk below already-loaded root records, which may be unsaved.
    pub fn walk_records(
        &self,
        roots: impl IntoIterator<Item = Record>,
        visitor: &mut dyn ChainVisitor,
    ) -> Result<WalkStats, WalkError> {
        let mut stats = WalkStats::default();
        for record in roots {
            self.walk_one(record, visitor, &mut stats)?;
        }

        Ok(stats)
    }

    fn walk_one(
        &self,
        record: Record,
        visitor: &mut dyn ChainVisitor,
        stats: &mut WalkStats,
    ) -> Result<(), WalkError> {
        let root = self.root_module()?;
        if record.module() != root {
            return Err(WalkError::RootMismatch {
                expected: root.name,
                found: record.module().name,
            });
        }

        self.check_cancel()?;
        let mut lineage = Lineage::new(self.chain);
        stats.roots += 1;
        let rows = self.visit(0, record, &mut lineage, visitor, stats)?;
        stats.rows += rows;

        Ok(())
    }

    // Place `record` at `position`, descend, and return the rows emitted.
    fn visit(
        &self,
        position: usize,
        record: Record,
        lineage: &mut Lineage<'_>,
        visitor: &mut dyn ChainVisitor,
        stats: &mut WalkStats,
    ) -> Result<u64, WalkError> {
        self.check_cancel()?;
        let module = record.module();
        let id = record.id();
        lineage.slots[position] = Some(record);
        stats.records += 1;

        if let Some(current) = lineage.slots[position].as_ref() {
            visitor.visit_record(current, lineage)?;
        }

        let mut rows = 0;
        if let Some(id) = id {
            for child in self.chain.direct_children(module.name) {
                let emitted = self.visit_children(child, id, lineage, visitor, stats)?;
                rows += emitted;
            }
        }

        if rows == 0 {
            lineage.leaf = position;
            visitor.leaf_row(lineage)?;
            rows = 1;
        }

        lineage.slots[position] = None;

        Ok(rows)
    }

    fn visit_children(
        &self,
        child: &'static ModuleDescriptor,
        parent_id: i64,
        lineage: &mut Lineage<'_>,
        visitor: &mut dyn ChainVisitor,
        stats: &mut WalkStats,
    ) -> Result<u64, WalkError> {
        let Some(position) = self.chain.position(child.name) else {
            return Ok(0);
        };

        let mut rows = 0;
        for record in self.records.children(child, parent_id)? {
            rows += self.visit(position, record, lineage, visitor, stats)?;
        }

        Ok(rows)
    }

    fn root_module(&self) -> Result<&'static ModuleDescriptor, WalkError> {
        self.chain.root().ok_or(WalkError::EmptyChain)
    }

    fn check_cancel(&self) -> Result<(), WalkError> {
        match self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}
