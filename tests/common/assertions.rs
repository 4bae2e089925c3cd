//! Assertion utilities for testing.
//!
//! Floating-point comparisons and checks on the JSON error bodies returned
//! by the API.

use reqwest::StatusCode;

/// Default epsilon for floating-point comparisons
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Assert that two floating-point values are approximately equal.
///
/// # Panics
///
/// Panics if the absolute difference between `actual` and `expected` is greater than `epsilon`.
pub fn assert_approx_eq(actual: f64, expected: f64, epsilon: Option<f64>) {
    let epsilon = epsilon.unwrap_or(DEFAULT_EPSILON);
    let diff = (actual - expected).abs();

    assert!(
        diff <= epsilon,
        "Values not approximately equal: actual = {}, expected = {}, diff = {}, epsilon = {}",
        actual,
        expected,
        diff,
        epsilon
    );
}

/// Assert that two slices are approximately element-wise equal; NaN matches NaN.
pub fn assert_slice_approx_eq(actual: &[f32], expected: &[f32], epsilon: Option<f32>) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Slices have different lengths: actual = {}, expected = {}",
        actual.len(),
        expected.len()
    );

    let eps = epsilon.unwrap_or(1e-6);
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        if a.is_nan() && e.is_nan() {
            continue;
        }
        assert!(
            (a - e).abs() <= eps,
            "Slices differ at index {}: actual = {}, expected = {}",
            i,
            a,
            e
        );
    }
}

/// Assert that an API error body has the expected status and kind.
pub fn assert_api_error(status: StatusCode, body: &serde_json::Value, expected: StatusCode, kind: &str) {
    assert_eq!(status, expected, "unexpected status, body: {}", body);
    assert_eq!(body["kind"], kind, "unexpected error kind, body: {}", body);
    assert!(body["error"].is_string(), "error message missing: {}", body);
    assert!(body["request_id"].is_string(), "request id missing: {}", body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_approx_eq() {
        assert_approx_eq(1.0, 1.0, None);
        assert_approx_eq(1.0, 1.0000001, None);
        assert_approx_eq(1.0, 1.001, Some(0.01));
    }

    #[test]
    fn test_assert_slice_approx_eq() {
        assert_slice_approx_eq(&[1.0, f32::NAN], &[1.0000001, f32::NAN], None);
    }
}
