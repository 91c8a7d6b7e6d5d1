//! Driver operation metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric names
pub mod names {
    /// Counter: Total driver operations by type and status
    pub const DRIVER_OPERATIONS_TOTAL: &str = "zol_driver_operations_total";
    /// Histogram: Duration of driver operations in seconds
    pub const DRIVER_OPERATION_DURATION_SECONDS: &str = "zol_driver_operation_duration_seconds";
    /// Counter: Errors converted into "absent" / "nothing to do" outcomes
    pub const SWALLOWED_ERRORS_TOTAL: &str = "zol_driver_swallowed_errors_total";
}

/// Record a driver operation with its result
pub fn record_operation(operation: &str, status: &str, duration_secs: f64) {
    counter!(names::DRIVER_OPERATIONS_TOTAL, "operation" => operation.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::DRIVER_OPERATION_DURATION_SECONDS, "operation" => operation.to_string())
        .record(duration_secs);
}

/// Record an error that a probe or idempotent teardown turned into success
pub fn record_swallowed_error(operation: &str) {
    counter!(names::SWALLOWED_ERRORS_TOTAL, "operation" => operation.to_string()).increment(1);
}

/// Helper for timing operations
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Complete the operation with success
    pub fn success(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_operation(self.operation, "success", duration);
    }

    /// Complete the operation with failure
    pub fn failure(self, error_code: &str) {
        let duration = self.start.elapsed().as_secs_f64();
        record_operation(self.operation, error_code, duration);
    }
}
