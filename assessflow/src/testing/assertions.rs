//! Test assertions for execution records.

use crate::core::{ComponentStatus, ExecutionRecord, ExecutionStatus};

/// Asserts that the record has a result for `component` with `expected`.
pub fn assert_component_status(record: &ExecutionRecord, component: &str, expected: ComponentStatus) {
    let result = record
        .result(component)
        .unwrap_or_else(|| panic!("No result recorded for '{component}'"));
    assert_eq!(
        result.status, expected,
        "Expected '{component}' to be {expected}, got {} ({:?})",
        result.status, result.error_detail
    );
}

/// Asserts that `component` succeeded.
pub fn assert_component_succeeded(record: &ExecutionRecord, component: &str) {
    assert_component_status(record, component, ComponentStatus::Success);
}

/// Asserts that `component` was skipped.
pub fn assert_component_skipped(record: &ExecutionRecord, component: &str) {
    assert_component_status(record, component, ComponentStatus::Skipped);
}

/// Asserts that `component` has no result at all.
pub fn assert_not_invoked(record: &ExecutionRecord, component: &str) {
    assert!(
        record.result(component).is_none(),
        "Expected no result for '{component}', got {:?}",
        record.result(component).map(|r| r.status)
    );
}

/// Asserts the terminal status of the record.
pub fn assert_execution_status(record: &ExecutionRecord, expected: ExecutionStatus) {
    assert_eq!(
        record.status(),
        expected,
        "Expected execution {expected}, got {} (errors: {:?})",
        record.status(),
        record.error_summary()
    );
}

/// Asserts the success rate within a small tolerance.
pub fn assert_success_rate(record: &ExecutionRecord, expected: f64) {
    assert!(
        (record.success_rate() - expected).abs() < 1e-9,
        "Expected success rate {expected}, got {}",
        record.success_rate()
    );
}
