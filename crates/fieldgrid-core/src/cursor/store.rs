//! Module: cursor::store
//! Responsibility: persisting search runs and serializing access to them.
//! Does not own: cursor movement rules (see `cursor::run`).
//! Boundary: every mutation is written through to `search_runs` before the
//! handle returns. Moves write only the position and access time.
//!
//! Open runs are shared through weak references: the run lives as long as
//! some handle does, and the next open after that reloads the persisted row.

use crate::{
    cursor::{
        CursorError, CursorTarget, RunKey, RunState,
        run::{RunBackend, RunSource, SearchRun},
    },
    model::module::{ModuleDescriptor, ModuleRegistry},
    obs::sink::{self, MetricsEvent},
    query::CompiledQuery,
    store::{Database, StoreError, record::RecordStore},
};
use chrono::{NaiveDateTime, Utc};
use fieldgrid_config::CursorConfig;
use rusqlite::{Connection, OptionalExtension, params};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

///
/// SqlBackend
///
/// Cursor backend over the live store.
///

pub struct SqlBackend<'a> {
    db: &'a Database,
}

impl<'a> SqlBackend<'a> {
    #[must_use]
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl RunBackend for SqlBackend<'_> {
    fn is_live(&self, module: &'static ModuleDescriptor, id: i64) -> Result<bool, CursorError> {
        Ok(RecordStore::new(self.db).exists(module, id)?)
    }

    fn count(&self, query: &CompiledQuery) -> Result<u64, CursorError> {
        Ok(query.count(self.db)?)
    }

    fn fetch_page(
        &self,
        query: &CompiledQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<i64>, CursorError> {
        Ok(query.page(self.db, offset, limit)?)
    }
}

///
/// CursorStore
///
/// Owner of every open cursor. Opening the same (owner, target) while a
/// handle is alive yields a handle onto the same run, so concurrent callers
/// serialize on it.
///

pub struct CursorStore {
    db: Arc<Database>,
    modules: Arc<ModuleRegistry>,
    config: CursorConfig,
    runs: Mutex<HashMap<RunKey, Weak<Mutex<SearchRun>>>>,
}

impl CursorStore {
    #[must_use]
    pub fn new(db: Arc<Database>, modules: Arc<ModuleRegistry>, config: CursorConfig) -> Self {
        Self {
            db,
            modules,
            config,
            runs: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CursorConfig {
        &self.config
    }

    /// Open the cursor for `(owner, target)`, restoring its persisted state.
    ///
    /// Only the most recently accessed row survives; older duplicates are
    /// removed. A missing row is created in the Empty state.
    pub fn open(
        &self,
        owner: i64,
        target: CursorTarget,
        module: &'static ModuleDescriptor,
    ) -> Result<CursorHandle<'_>, CursorError> {
        let key = RunKey { owner, target };
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(run) = runs.get(&key).and_then(Weak::upgrade) {
            return Ok(CursorHandle { store: self, run });
        }
        runs.retain(|_, run| run.strong_count() > 0);

        let run = self
            .db
            .with_conn(|conn| load_or_create(conn, &self.modules, key, module))?;
        let run = Arc::new(Mutex::new(run));
        runs.insert(key, Arc::downgrade(&run));

        Ok(CursorHandle { store: self, run })
    }

    /// Runs with at least one live handle.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|run| run.strong_count() > 0)
            .count()
    }

    /// Forget a cursor, both cached and persisted.
    pub fn discard(&self, owner: i64, target: CursorTarget) -> Result<(), CursorError> {
        let key = RunKey { owner, target };
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM search_runs WHERE owner_id = ? AND target_kind = ? AND target_id = ?",
                params![owner, target.kind(), target.id()],
            )?;
            Ok(())
        })?;

        Ok(())
    }

    fn persist(&self, run: &mut SearchRun) -> Result<(), CursorError> {
        run.touch(Utc::now().naive_utc());
        self.db.with_conn(|conn| save(conn, run))?;

        Ok(())
    }

    fn persist_position(&self, run: &mut SearchRun) -> Result<(), CursorError> {
        run.touch(Utc::now().naive_utc());
        self.db.with_conn(|conn| save_position(conn, run))?;

        Ok(())
    }
}

///
/// CursorHandle
///
/// One caller's view of a shared run. Operations lock the run for their
/// whole duration.
///

pub struct CursorHandle<'s> {
    store: &'s CursorStore,
    run: Arc<Mutex<SearchRun>>,
}

impl CursorHandle<'_> {
    /// Execute `query` and make its ids the cursor's contents, positioned at
    /// the first result. Always recomputes; reopening a cursor without
    /// executing is how a previous result is resumed.
    ///
    /// The run goes through Computing, and on failure ends up Stale.
    pub fn execute(
        &self,
        module: &'static ModuleDescriptor,
        query: &CompiledQuery,
    ) -> Result<u64, CursorError> {
        self.with_run(|store, run| {
            run.begin(module);
            store.persist(run)?;

            match compute_source(&store.db, &store.config, query) {
                Ok(source) => {
                    let total = source.total();
                    run.complete(source, Some(query.fingerprint.clone()));
                    store.persist(run)?;

                    sink::record(MetricsEvent::SearchExecuted {
                        module: module.name,
                        ids: total,
                    });
                    tracing::info!(
                        module = module.name,
                        owner = run.owner(),
                        total,
                        "search executed"
                    );

                    Ok(total)
                }
                Err(err) => {
                    run.reset();
                    store.persist(run)?;
                    tracing::warn!(module = module.name, error = %err, "search failed");

                    Err(err.into())
                }
            }
        })
    }

    pub fn current(&self) -> Result<Option<i64>, CursorError> {
        self.with_backend(|run, backend| run.current(backend))
    }

    pub fn move_next(&self) -> Result<Option<i64>, CursorError> {
        self.with_backend(|run, backend| run.move_next(backend))
    }

    pub fn move_previous(&self) -> Result<Option<i64>, CursorError> {
        self.with_backend(|run, backend| run.move_previous(backend))
    }

    pub fn jump(&self, index: u64) -> Result<Option<i64>, CursorError> {
        self.with_backend(|run, backend| run.jump(backend, index))
    }

    pub fn ids(&self) -> Result<Vec<i64>, CursorError> {
        self.with_backend(|run, backend| run.ids(backend))
    }

    pub fn total_count(&self) -> Result<u64, CursorError> {
        self.with_run(|_, run| run.total_count())
    }

    /// Throw away cached results; the next search recomputes.
    pub fn reset(&self) -> Result<(), CursorError> {
        self.with_run(|store, run| {
            run.reset();
            store.persist(run)
        })
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.lock().position()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.lock().state()
    }

    #[must_use]
    pub fn module(&self) -> &'static ModuleDescriptor {
        self.lock().module()
    }

    /// Copy of the run as it stands.
    #[must_use]
    pub fn snapshot(&self) -> SearchRun {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SearchRun> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_run<T>(
        &self,
        f: impl FnOnce(&CursorStore, &mut SearchRun) -> Result<T, CursorError>,
    ) -> Result<T, CursorError> {
        let mut run = self.lock();
        f(self.store, &mut run)
    }

    // Movement persists the position even when the move failed half way.
    fn with_backend<T>(
        &self,
        f: impl FnOnce(&mut SearchRun, &dyn RunBackend) -> Result<T, CursorError>,
    ) -> Result<T, CursorError> {
        self.with_run(|store, run| {
            let backend = SqlBackend::new(&store.db);
            let result = f(run, &backend);
            if run.state() == RunState::Ready {
                if run.take_source_changed() {
                    store.persist(run)?;
                } else {
                    store.persist_position(run)?;
                }
            }

            result
        })
    }
}

fn compute_source(
    db: &Database,
    config: &CursorConfig,
    query: &CompiledQuery,
) -> Result<RunSource, StoreError> {
    let total = query.count(db)?;

    if total > u64::from(config.materialize_limit) {
        return Ok(RunSource::Paged {
            query: query.clone(),
            page_size: u64::from(config.page_size.max(1)),
            total,
        });
    }

    Ok(RunSource::Materialized { ids: query.ids(db)? })
}

fn load_or_create(
    conn: &Connection,
    modules: &ModuleRegistry,
    key: RunKey,
    module: &'static ModuleDescriptor,
) -> Result<SearchRun, StoreError> {
    let target = key.target;
    let row = conn
        .query_row(
            "SELECT id, module_type, state, source, cursor_position, fingerprint, last_accessed
             FROM search_runs
             WHERE owner_id = ? AND target_kind = ? AND target_id = ?
             ORDER BY last_accessed DESC, id DESC
             LIMIT 1",
            params![key.owner, target.kind(), target.id()],
            |row| {
                Ok(StoredRun {
                    id: row.get(0)?,
                    module: row.get(1)?,
                    state: row.get(2)?,
                    source: row.get(3)?,
                    position: row.get(4)?,
                    fingerprint: row.get(5)?,
                    last_accessed: row.get(6)?,
                })
            },
        )
        .optional()?;

    let Some(stored) = row else {
        let mut run = SearchRun::new(key.owner, target, module, Utc::now().naive_utc());
        insert(conn, &mut run)?;
        return Ok(run);
    };

    let removed = conn.execute(
        "DELETE FROM search_runs
         WHERE owner_id = ? AND target_kind = ? AND target_id = ? AND id <> ?",
        params![key.owner, target.kind(), target.id(), stored.id],
    )?;
    if removed > 0 {
        tracing::debug!(owner = key.owner, removed, "dropped older search runs");
    }

    stored.into_run(modules, key, module)
}

///
/// StoredRun
///
/// Raw `search_runs` row before validation.
///

struct StoredRun {
    id: i64,
    module: String,
    state: String,
    source: String,
    position: i64,
    fingerprint: Option<String>,
    last_accessed: String,
}

impl StoredRun {
    fn into_run(
        self,
        modules: &ModuleRegistry,
        key: RunKey,
        requested: &'static ModuleDescriptor,
    ) -> Result<SearchRun, StoreError> {
        let state = RunState::parse(&self.state).ok_or_else(|| {
            StoreError::corrupt(format!(
                "search run {} has unknown state '{}'",
                self.id, self.state
            ))
        })?;
        let source: Option<RunSource> = serde_json::from_str(&self.source)?;
        let last_accessed = NaiveDateTime::parse_from_str(&self.last_accessed, TIMESTAMP_FORMAT)
            .map_err(|err| {
                StoreError::corrupt(format!("search run {} timestamp: {err}", self.id))
            })?;

        let mut run = SearchRun::restore(
            self.id,
            key.owner,
            key.target,
            modules.get(&self.module).unwrap_or(requested),
            state,
            source,
            u64::try_from(self.position).unwrap_or_default(),
            self.fingerprint,
            last_accessed,
        );

        // An interrupted computation or a module that no longer exists can
        // only be recovered by searching again.
        if state == RunState::Computing
            || (state == RunState::Ready && run.source().is_none())
            || modules.get(&self.module).is_none()
        {
            run.reset();
        }

        Ok(run)
    }
}

fn insert(conn: &Connection, run: &mut SearchRun) -> Result<(), StoreError> {
    let target = run.target();
    conn.execute(
        "INSERT INTO search_runs
            (owner_id, target_kind, target_id, module_type, state, source,
             cursor_position, fingerprint, last_accessed)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            run.owner(),
            target.kind(),
            target.id(),
            run.module().name,
            run.state().as_str(),
            serde_json::to_string(&run.source())?,
            i64::try_from(run.position()).unwrap_or(i64::MAX),
            run.fingerprint(),
            run.last_accessed().format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    run.row_id = Some(conn.last_insert_rowid());

    Ok(())
}

fn save(conn: &Connection, run: &mut SearchRun) -> Result<(), StoreError> {
    let Some(row_id) = run.row_id else {
        return insert(conn, run);
    };

    let updated = conn.execute(
        "UPDATE search_runs
         SET module_type = ?, state = ?, source = ?, cursor_position = ?,
             fingerprint = ?, last_accessed = ?
         WHERE id = ?",
        params![
            run.module().name,
            run.state().as_str(),
            serde_json::to_string(&run.source())?,
            i64::try_from(run.position()).unwrap_or(i64::MAX),
            run.fingerprint(),
            run.last_accessed().format(TIMESTAMP_FORMAT).to_string(),
            row_id,
        ],
    )?;

    // Row removed underneath us (for example by `discard` on another
    // handle); write it back.
    if updated == 0 {
        insert(conn, run)?;
    }

    Ok(())
}

fn save_position(conn: &Connection, run: &mut SearchRun) -> Result<(), StoreError> {
    let Some(row_id) = run.row_id else {
        return insert(conn, run);
    };

    let updated = conn.execute(
        "UPDATE search_runs SET cursor_position = ?, last_accessed = ? WHERE id = ?",
        params![
            i64::try_from(run.position()).unwrap_or(i64::MAX),
            run.last_accessed().format(TIMESTAMP_FORMAT).to_string(),
            row_id,
        ],
    )?;
    if updated == 0 {
        insert(conn, run)?;
    }

    Ok(())
}
