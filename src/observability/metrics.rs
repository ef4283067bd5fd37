//! Prometheus metrics for the admission gate and the persistence sinks.
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder, so the
//! gate and sinks can call in here unconditionally (tests included).

use crate::error::{IngestError, StorageError};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Names follow `ingest_{component}_{name}` with `_total` on counters.
macro_rules! component_metric {
    (counter, $component:literal, $name:literal) => {
        concat!("ingest_", $component, "_", $name, "_total")
    };
    (histogram, $component:literal, $name:literal) => {
        concat!("ingest_", $component, "_", $name)
    };
    (gauge, $component:literal, $name:literal) => {
        concat!("ingest_", $component, "_", $name)
    };
}

/// Install the Prometheus recorder. Idempotent; later calls return `false`.
pub fn init_metrics() -> bool {
    if HANDLE.get().is_some() {
        return false;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                return false;
            }
            GateMetrics::describe();
            SinkMetrics::describe();
            info!("Prometheus recorder installed");
            true
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            false
        }
    }
}

/// Prometheus text exposition, if the recorder is installed.
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

pub struct GateMetrics;

impl GateMetrics {
    fn describe() {
        ::metrics::describe_counter!(
            component_metric!(counter, "gate", "admissions"),
            "Callers admitted through the rate gate"
        );
        ::metrics::describe_histogram!(
            component_metric!(histogram, "gate", "wait_seconds"),
            "Time between calling acquire and being admitted"
        );
        ::metrics::describe_counter!(
            component_metric!(counter, "gate", "interrupted"),
            "Parked callers released without a slot"
        );
        ::metrics::describe_counter!(
            component_metric!(counter, "gate", "window_resets"),
            "Windows opened after the previous one elapsed"
        );
        ::metrics::describe_gauge!(
            component_metric!(gauge, "gate", "waiting"),
            "Callers currently parked at the gate"
        );
    }

    pub fn record_admission(waited: Duration) {
        ::metrics::counter!(component_metric!(counter, "gate", "admissions")).increment(1);
        ::metrics::histogram!(component_metric!(histogram, "gate", "wait_seconds"))
            .record(waited.as_secs_f64());
    }

    pub fn record_interrupted(reason: &IngestError) {
        let reason = match reason {
            IngestError::Cancelled => "cancelled",
            IngestError::TimedOut(_) => "timed_out",
            _ => "other",
        };
        ::metrics::counter!(component_metric!(counter, "gate", "interrupted"), "reason" => reason)
            .increment(1);
    }

    pub fn record_window_reset() {
        ::metrics::counter!(component_metric!(counter, "gate", "window_resets")).increment(1);
    }

    pub fn set_waiting(waiting: usize) {
        ::metrics::gauge!(component_metric!(gauge, "gate", "waiting")).set(waiting as f64);
    }
}

pub struct SinkMetrics;

impl SinkMetrics {
    fn describe() {
        ::metrics::describe_counter!(
            component_metric!(counter, "sink", "saved"),
            "Documents durably stored"
        );
        ::metrics::describe_counter!(
            component_metric!(counter, "sink", "failed"),
            "Admitted documents the sink failed to store"
        );
    }

    pub fn record_saved(backend: &'static str) {
        ::metrics::counter!(component_metric!(counter, "sink", "saved"), "backend" => backend)
            .increment(1);
    }

    pub fn record_failed(error: &StorageError) {
        let kind = match error {
            StorageError::Duplicate(_) => "duplicate",
            StorageError::Database { .. } => "database",
        };
        ::metrics::counter!(component_metric!(counter, "sink", "failed"), "kind" => kind)
            .increment(1);
    }
}
