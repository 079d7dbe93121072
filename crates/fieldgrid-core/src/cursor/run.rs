//! Cursor logic, independent of where ids come from.

use crate::{
    cursor::{CursorError, CursorTarget, RunKey, RunState},
    obs::sink::{self, MetricsEvent},
    model::module::ModuleDescriptor,
    query::CompiledQuery,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

///
/// RunBackend
///
/// What a cursor needs from the outside world: a liveness check for ids,
/// and page fetches and a recount for the paged strategy.
///

pub trait RunBackend {
    fn is_live(&self, module: &'static ModuleDescriptor, id: i64) -> Result<bool, CursorError>;

    fn count(&self, query: &CompiledQuery) -> Result<u64, CursorError>;

    fn fetch_page(
        &self,
        query: &CompiledQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<i64>, CursorError>;
}

///
/// RunSource
///
/// Execution strategy of a ready cursor.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RunSource {
    /// The complete ordered id list, cached.
    Materialized { ids: Vec<i64> },
    /// Only the page definition; pages are re-queried on demand.
    Paged {
        query: CompiledQuery,
        page_size: u64,
        total: u64,
    },
}

impl RunSource {
    #[must_use]
    pub fn total(&self) -> u64 {
        match self {
            Self::Materialized { ids } => ids.len() as u64,
            Self::Paged { total, .. } => *total,
        }
    }
}

///
/// SearchRun
///

#[derive(Clone, Debug)]
pub struct SearchRun {
    pub(crate) row_id: Option<i64>,
    owner: i64,
    target: CursorTarget,
    module: &'static ModuleDescriptor,
    state: RunState,
    source: Option<RunSource>,
    position: u64,
    fingerprint: Option<String>,
    last_accessed: NaiveDateTime,
    // (page index, ids) of the last page fetched; never persisted
    page: Option<(u64, Vec<i64>)>,
    // set when the source changed outside execute/reset
    source_changed: bool,
}

impl SearchRun {
    #[must_use]
    pub const fn new(
        owner: i64,
        target: CursorTarget,
        module: &'static ModuleDescriptor,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            row_id: None,
            owner,
            target,
            module,
            state: RunState::Empty,
            source: None,
            position: 0,
            fingerprint: None,
            last_accessed: now,
            page: None,
            source_changed: false,
        }
    }

    #[expect(clippy::too_many_arguments)]
    pub(crate) fn restore(
        row_id: i64,
        owner: i64,
        target: CursorTarget,
        module: &'static ModuleDescriptor,
        state: RunState,
        source: Option<RunSource>,
        position: u64,
        fingerprint: Option<String>,
        last_accessed: NaiveDateTime,
    ) -> Self {
        Self {
            row_id: Some(row_id),
            owner,
            target,
            module,
            state,
            source,
            position,
            fingerprint,
            last_accessed,
            page: None,
            source_changed: false,
        }
    }

    #[must_use]
    pub const fn key(&self) -> RunKey {
        RunKey {
            owner: self.owner,
            target: self.target,
        }
    }

    #[must_use]
    pub const fn owner(&self) -> i64 {
        self.owner
    }

    #[must_use]
    pub const fn target(&self) -> CursorTarget {
        self.target
    }

    #[must_use]
    pub const fn module(&self) -> &'static ModuleDescriptor {
        self.module
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub const fn source(&self) -> Option<&RunSource> {
        self.source.as_ref()
    }

    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    #[must_use]
    pub const fn last_accessed(&self) -> NaiveDateTime {
        self.last_accessed
    }

    pub(crate) const fn touch(&mut self, now: NaiveDateTime) {
        self.last_accessed = now;
    }

    /// Whether a move rewrote the source (a paged total shrank), clearing
    /// the flag.
    pub(crate) const fn take_source_changed(&mut self) -> bool {
        let changed = self.source_changed;
        self.source_changed = false;
        changed
    }

    /// Empty or Stale -> Computing.
    pub fn begin(&mut self, module: &'static ModuleDescriptor) {
        self.module = module;
        self.state = RunState::Computing;
        self.source = None;
        self.position = 0;
        self.page = None;
    }

    /// Computing -> Ready at position 0.
    pub fn complete(&mut self, source: RunSource, fingerprint: Option<String>) {
        self.state = RunState::Ready;
        self.source = Some(source);
        self.fingerprint = fingerprint;
        self.position = 0;
        self.page = None;
    }

    /// Drop cached results; ownership and target are kept.
    pub fn reset(&mut self) {
        self.state = RunState::Stale;
        self.source = None;
        self.fingerprint = None;
        self.position = 0;
        self.page = None;
    }

    pub fn total_count(&self) -> Result<u64, CursorError> {
        Ok(self.ready_source()?.total())
    }

    /// Live id at the position. A dangling id moves the cursor forward to
    /// the next live one, or back when nothing live follows.
    pub fn current(&mut self, backend: &dyn RunBackend) -> Result<Option<i64>, CursorError> {
        let total = self.total_count()?;
        if total == 0 {
            return Ok(None);
        }
        let start = self.position.min(total - 1);

        if let Some((index, id)) = self.scan(backend, start, Direction::Forward)? {
            self.position = index;
            return Ok(Some(id));
        }
        if let Some((index, id)) = self.scan(backend, start, Direction::Backward)? {
            self.position = index;
            return Ok(Some(id));
        }

        Ok(None)
    }

    /// Advance to the next live id. At the end this is a no-op.
    pub fn move_next(&mut self, backend: &dyn RunBackend) -> Result<Option<i64>, CursorError> {
        let total = self.total_count()?;
        if self.position + 1 < total
            && let Some((index, id)) = self.scan(backend, self.position + 1, Direction::Forward)?
        {
            self.moved(index);
            return Ok(Some(id));
        }

        self.current(backend)
    }

    /// Step back to the previous live id. At position 0 this is a no-op.
    pub fn move_previous(&mut self, backend: &dyn RunBackend) -> Result<Option<i64>, CursorError> {
        self.total_count()?;
        if self.position > 0
            && let Some((index, id)) = self.scan(backend, self.position - 1, Direction::Backward)?
        {
            self.moved(index);
            return Ok(Some(id));
        }

        self.current(backend)
    }

    /// Move to an absolute index, clamped to the last entry.
    pub fn jump(
        &mut self,
        backend: &dyn RunBackend,
        index: u64,
    ) -> Result<Option<i64>, CursorError> {
        let total = self.total_count()?;
        if total == 0 {
            return Ok(None);
        }
        self.moved(index.min(total - 1));

        self.current(backend)
    }

    /// Every id in order, without moving. Dangling ids are included; the
    /// consumer's own load skips them.
    pub fn ids(&mut self, backend: &dyn RunBackend) -> Result<Vec<i64>, CursorError> {
        let source = self.ready_source()?.clone();

        match source {
            RunSource::Materialized { ids } => Ok(ids),
            RunSource::Paged {
                query,
                page_size,
                total,
            } => {
                let mut ids = Vec::new();
                let mut offset = 0;
                while offset < total {
                    let page = backend.fetch_page(&query, offset, page_size)?;
                    if page.is_empty() {
                        break;
                    }
                    ids.extend(page);
                    offset += page_size;
                }

                Ok(ids)
            }
        }
    }

    fn moved(&mut self, index: u64) {
        self.position = index;
        sink::record(MetricsEvent::CursorMoved {
            module: self.module.name,
        });
        tracing::debug!(
            owner = self.owner,
            target = ?self.target,
            position = index,
            "cursor moved"
        );
    }

    fn ready_source(&self) -> Result<&RunSource, CursorError> {
        match (&self.state, &self.source) {
            (RunState::Ready, Some(source)) => Ok(source),
            _ => Err(CursorError::NotReady { state: self.state }),
        }
    }

    // First live id at or beyond `from` in `direction`.
    fn scan(
        &mut self,
        backend: &dyn RunBackend,
        from: u64,
        direction: Direction,
    ) -> Result<Option<(u64, i64)>, CursorError> {
        let mut total = self.total_count()?;
        if total == 0 {
            return Ok(None);
        }
        let mut index = match direction {
            Direction::Forward => from,
            Direction::Backward => from.min(total - 1),
        };
        let mut skipped = 0u64;

        let found = loop {
            if index >= total {
                break None;
            }
            let Some(id) = self.id_at(backend, index)? else {
                // Rows deleted since the run was computed shift later pages
                // down; the recount tells how far.
                let shrunk = self.refresh_total(backend)?;
                match direction {
                    Direction::Backward if shrunk > 0 && shrunk < total => {
                        total = shrunk;
                        index = index.min(shrunk - 1);
                        continue;
                    }
                    _ => break None,
                }
            };
            if backend.is_live(self.module, id)? {
                break Some((index, id));
            }

            skipped += 1;
            tracing::warn!(module = self.module.name, id, index, "skipping dangling cursor id");

            match direction {
                Direction::Forward => index += 1,
                Direction::Backward if index == 0 => break None,
                Direction::Backward => index -= 1,
            }
        };

        if skipped > 0 {
            sink::record(MetricsEvent::DanglingSkipped {
                module: self.module.name,
                skipped,
            });
        }

        Ok(found)
    }

    // Recount a paged source whose page came back short. Materialized
    // sources never shrink.
    fn refresh_total(&mut self, backend: &dyn RunBackend) -> Result<u64, CursorError> {
        let Some(RunSource::Paged { query, total, .. }) = &mut self.source else {
            return self.total_count();
        };

        let count = backend.count(query)?;
        if count != *total {
            tracing::debug!(
                module = self.module.name,
                was = *total,
                now = count,
                "paged search shrank"
            );
            *total = count;
            self.source_changed = true;
        }
        self.page = None;
        self.position = self.position.min(count.saturating_sub(1));

        Ok(count)
    }

    fn id_at(&mut self, backend: &dyn RunBackend, index: u64) -> Result<Option<i64>, CursorError> {
        let Some(source) = &self.source else {
            return Ok(None);
        };

        match source {
            RunSource::Materialized { ids } => {
                Ok(usize::try_from(index).ok().and_then(|i| ids.get(i)).copied())
            }
            RunSource::Paged {
                query, page_size, ..
            } => {
                let page_size = (*page_size).max(1);
                let page_index = index / page_size;
                let cached = matches!(&self.page, Some((p, _)) if *p == page_index);
                if !cached {
                    let ids = backend.fetch_page(query, page_index * page_size, page_size)?;
                    self.page = Some((page_index, ids));
                }

                Ok(self.page.as_ref().and_then(|(_, ids)| {
                    usize::try_from(index % page_size)
                        .ok()
                        .and_then(|i| ids.get(i))
                        .copied()
                }))
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}
