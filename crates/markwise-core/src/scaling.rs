//! Converts a normalized score into marks.

/// Scales scores in [0, 1] to marks out of a question's maximum.
///
/// The product is snapped to 1e-9 before rounding so float noise such as
/// `0.7 * 15 = 10.499999999999998` rounds as the exact value would. Rounding
/// is half away from zero, and the result is clamped to `[0, max_marks]`, so
/// a full score on a 2.5-mark question yields 2.5 rather than 3.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkScaler;

impl MarkScaler {
    pub fn scale(&self, final_score: f64, max_marks: f64) -> f64 {
        if !max_marks.is_finite() || max_marks <= 0.0 || !final_score.is_finite() {
            return 0.0;
        }
        let raw = final_score.clamp(0.0, 1.0) * max_marks;
        let snapped = (raw * 1e9).round() / 1e9;
        snapped.round().clamp(0.0, max_marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seventy_five_percent_of_fifteen() {
        assert_eq!(MarkScaler.scale(0.75, 15.0), 11.0);
    }

    #[test]
    fn half_rounds_away_from_zero() {
        assert_eq!(MarkScaler.scale(0.5, 5.0), 3.0);
        assert_eq!(MarkScaler.scale(0.7, 15.0), 11.0);
    }

    #[test]
    fn fractional_max_is_capped() {
        assert_eq!(MarkScaler.scale(1.0, 2.5), 2.5);
        assert_eq!(MarkScaler.scale(0.9, 10.5), 9.0);
        assert_eq!(MarkScaler.scale(0.5, 2.5), 1.0);
    }

    #[test]
    fn always_within_bounds() {
        for max in [0.5, 1.0, 2.5, 7.0, 10.5, 100.0] {
            for i in 0..=20 {
                let marks = MarkScaler.scale(i as f64 / 20.0, max);
                assert!((0.0..=max).contains(&marks), "{marks} out of {max}");
            }
        }
        assert_eq!(MarkScaler.scale(1.7, 4.0), 4.0);
        assert_eq!(MarkScaler.scale(-0.2, 4.0), 0.0);
        assert_eq!(MarkScaler.scale(f64::NAN, 4.0), 0.0);
        assert_eq!(MarkScaler.scale(1.0, 0.0), 0.0);
    }
}
