use serde::{Deserialize, Serialize};
use std::{cell::RefCell, collections::BTreeMap};

///
/// EventState
/// Ephemeral, per-thread counters.
///

#[derive(Clone, Debug, Default)]
pub(crate) struct EventState {
    pub ops: EventOps,
    pub modules: BTreeMap<String, ModuleCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Search
    pub searches_compiled: u64,
    pub searches_executed: u64,
    pub ids_matched: u64,

    // Cursor
    pub cursor_moves: u64,
    pub dangling_skipped: u64,

    // Custom value store
    pub custom_values_written: u64,
    pub upserts_recovered: u64,

    // Export / validation
    pub rows_materialized: u64,
    pub violations_reported: u64,
}

///
/// ModuleCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ModuleCounters {
    pub searches_executed: u64,
    pub ids_matched: u64,
    pub dangling_skipped: u64,
    pub rows_materialized: u64,
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventReport {
    pub ops: EventOps,
    pub modules: BTreeMap<String, ModuleCounters>,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

pub(crate) fn report() -> EventReport {
    EVENT_STATE.with(|m| {
        let state = m.borrow();
        EventReport {
            ops: state.ops.clone(),
            modules: state.modules.clone(),
        }
    })
}

pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}
