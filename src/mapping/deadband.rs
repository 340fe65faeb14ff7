/// Zeroes stick drift near center and rescales the rest to keep full range.
///
/// Input is clamped to `[-1, 1]` first. For threshold `d`:
/// `|x| < d → 0`, otherwise `sign(x) · (|x| − d) / (1 − d)`, which is
/// continuous at `±d` and maps `±1` to `±1`.
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    let value = if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) };
    if value.abs() < deadband {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadband) / (1.0 - deadband)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn inside_band_reads_zero() {
        assert_eq!(apply_deadband(0.05, 0.1), 0.0);
        assert_eq!(apply_deadband(-0.05, 0.1), 0.0);
        assert_eq!(apply_deadband(0.1, 0.1), 0.0);
        assert_eq!(apply_deadband(-0.1, 0.1), 0.0);
    }

    #[test]
    fn extremes_stay_at_full_scale() {
        assert_eq!(apply_deadband(1.0, 0.1), 1.0);
        assert_eq!(apply_deadband(-1.0, 0.1), -1.0);
    }

    #[test]
    fn midpoint_rescales_linearly() {
        let out = apply_deadband(0.55, 0.1);
        assert!((out - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_band_is_identity() {
        assert_eq!(apply_deadband(0.3, 0.0), 0.3);
        assert_eq!(apply_deadband(-0.7, 0.0), -0.7);
    }

    #[test]
    fn glitched_input_is_clamped() {
        assert_eq!(apply_deadband(1.4, 0.1), 1.0);
        assert_eq!(apply_deadband(f64::NAN, 0.1), 0.0);
    }

    proptest! {
        #[test]
        fn output_stays_in_range_and_keeps_sign(x in -1.0f64..=1.0, d in 0.0f64..0.9) {
            let out = apply_deadband(x, d);
            prop_assert!((-1.0..=1.0).contains(&out));
            prop_assert!(out == 0.0 || out.signum() == x.signum());
        }

        #[test]
        fn continuous_at_band_edge(d in 0.01f64..0.9) {
            let eps = 1e-9;
            prop_assert!(apply_deadband(d + eps, d).abs() < 1e-6);
            prop_assert!(apply_deadband(-(d + eps), d).abs() < 1e-6);
        }

        #[test]
        fn monotonic(a in -1.0f64..=1.0, b in -1.0f64..=1.0, d in 0.0f64..0.9) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(apply_deadband(lo, d) <= apply_deadband(hi, d));
        }
    }
}
