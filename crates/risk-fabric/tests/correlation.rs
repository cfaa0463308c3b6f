// Black-box coverage of the correlation math the spec names directly in its
// worked example 5 (Pearson 0.87 against the 0.85 guard threshold).

use risk_fabric::correlation::pearson;

#[test]
fn worked_example_correlation_guard_threshold() {
    // Two series engineered to sit just above the 0.85 rejection threshold.
    let a = vec![
        100.0, 101.0, 99.0, 102.0, 103.0, 101.0, 104.0, 105.0, 103.0, 106.0,
    ];
    let b = vec![
        50.0, 50.6, 49.7, 51.1, 51.4, 50.8, 52.0, 52.4, 51.8, 52.9,
    ];
    let coefficient = pearson(&a, &b);
    assert!(coefficient > 0.85, "expected strong positive correlation, got {coefficient}");
}

#[test]
fn unrelated_series_fall_below_threshold() {
    let a = vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0];
    let b = vec![5.0, 5.0, 9.0, 1.0, 3.0, 7.0, 2.0, 6.0];
    let coefficient = pearson(&a, &b);
    assert!(coefficient.abs() < 0.85);
}
