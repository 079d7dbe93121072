//! Metrics sink boundary.
//!
//! All instrumentation flows through `MetricsEvent` and `MetricsSink`. This
//! module is the only bridge between engine code and the metrics state.

use crate::obs::metrics;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = RefCell::new(None);
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent {
    SearchCompiled {
        module: &'static str,
    },
    SearchExecuted {
        module: &'static str,
        ids: u64,
    },
    CursorMoved {
        module: &'static str,
    },
    DanglingSkipped {
        module: &'static str,
        skipped: u64,
    },
    CustomValueWritten,
    UpsertRecovered,
    RowsMaterialized {
        module: &'static str,
        rows: u64,
    },
    ViolationsReported {
        count: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent);
}

/// GlobalMetricsSink
/// Default sink writing into the thread-local counters.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::SearchCompiled { .. } => {
                m.ops.searches_compiled = m.ops.searches_compiled.saturating_add(1);
            }

            MetricsEvent::SearchExecuted { module, ids } => {
                m.ops.searches_executed = m.ops.searches_executed.saturating_add(1);
                m.ops.ids_matched = m.ops.ids_matched.saturating_add(ids);
                let entry = m.modules.entry(module.to_string()).or_default();
                entry.searches_executed = entry.searches_executed.saturating_add(1);
                entry.ids_matched = entry.ids_matched.saturating_add(ids);
            }

            MetricsEvent::CursorMoved { .. } => {
                m.ops.cursor_moves = m.ops.cursor_moves.saturating_add(1);
            }

            MetricsEvent::DanglingSkipped { module, skipped } => {
                m.ops.dangling_skipped = m.ops.dangling_skipped.saturating_add(skipped);
                let entry = m.modules.entry(module.to_string()).or_default();
                entry.dangling_skipped = entry.dangling_skipped.saturating_add(skipped);
            }

            MetricsEvent::CustomValueWritten => {
                m.ops.custom_values_written = m.ops.custom_values_written.saturating_add(1);
            }

            MetricsEvent::UpsertRecovered => {
                m.ops.upserts_recovered = m.ops.upserts_recovered.saturating_add(1);
            }

            MetricsEvent::RowsMaterialized { module, rows } => {
                m.ops.rows_materialized = m.ops.rows_materialized.saturating_add(rows);
                let entry = m.modules.entry(module.to_string()).or_default();
                entry.rows_materialized = entry.rows_materialized.saturating_add(rows);
            }

            MetricsEvent::ViolationsReported { count } => {
                m.ops.violations_reported = m.ops.violations_reported.saturating_add(count);
            }
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current thread's metrics. Events recorded on other threads
/// are not included.
#[must_use]
pub fn metrics_report() -> metrics::EventReport {
    metrics::report()
}

/// Reset all metrics state on the current thread.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override. The previous sink
/// is restored on every exit path, including unwinding.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let previous = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = previous;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}
