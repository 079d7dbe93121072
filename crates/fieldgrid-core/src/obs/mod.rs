//! Observability: runtime counters and the sink they flow through.
//!
//! Engine code never touches `obs::metrics` directly; it emits a
//! `MetricsEvent` and the active sink decides what to do with it.
//!
//! Counters are thread-local. `metrics_report` sees only the events recorded
//! on the calling thread, and `metrics_reset_all` clears only that thread.
//! Work spread over several threads needs a shared sink installed with
//! `with_metrics_sink` on each of them.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, ModuleCounters};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
