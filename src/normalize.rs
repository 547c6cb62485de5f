/// Remainders at or below this are treated as float noise.
pub const EPSILON: f64 = 0.0001;

/// Declared bounds and granularity of a control-surface value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn normalize(&self, value: f64) -> f64 {
        normalize(value, self.min, self.max, self.step)
    }
}

/// Fan speed as a percentage, settable in tens.
pub const ROTATION_SPEED: Range = Range::new(0.0, 100.0, 10.0);

/// Clamp `value` into `[min, max]` and snap it down onto the `min + k*step`
/// grid.
///
/// A request that is clearly above `min` never collapses onto `min`: it goes
/// up one step instead, so `normalize(5.0, 0.0, 100.0, 10.0)` is `10.0`. The
/// round-up is skipped when it would leave the range.
///
/// Non-finite input yields `min`. A `step <= 0` disables snapping, and an
/// inverted range (`min > max`) yields `min`.
pub fn normalize(value: f64, min: f64, max: f64, step: f64) -> f64 {
    if !(min <= max) || !value.is_finite() {
        return min;
    }

    let out = value.max(min).min(max);
    if !(step > 0.0) {
        return out;
    }

    let offset = out - min;
    let remainder = offset % step;
    if remainder == 0.0 {
        return out;
    }
    // Whole steps below `out`, counted so the result lands exactly on the grid.
    let steps = ((offset - remainder) / step).round();
    // (0.3 - 0.0) % 0.1 lands just under 0.1
    if step - remainder <= EPSILON {
        return (min + (steps + 1.0) * step).min(max);
    }

    let snapped = steps * step;
    if remainder > EPSILON && snapped.abs() < EPSILON && min + step <= max {
        return min + step;
    }
    min + snapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_off_the_minimum() {
        assert_eq!(normalize(5.0, 0.0, 100.0, 10.0), 10.0);
        assert_eq!(normalize(1.0, 0.0, 100.0, 10.0), 10.0);
    }

    #[test]
    fn rounds_down_elsewhere() {
        assert_eq!(normalize(23.0, 0.0, 100.0, 10.0), 20.0);
        assert_eq!(normalize(99.0, 0.0, 100.0, 10.0), 90.0);
    }

    #[test]
    fn clamps_into_range() {
        assert_eq!(normalize(30.0, 19.0, 28.0, 1.0), 28.0);
        assert_eq!(normalize(10.0, 19.0, 28.0, 1.0), 19.0);
        assert_eq!(normalize(-5.0, 0.0, 100.0, 10.0), 0.0);
    }

    #[test]
    fn exact_minimum_stays() {
        assert_eq!(normalize(0.0, 0.0, 100.0, 10.0), 0.0);
        assert_eq!(normalize(19.0, 19.0, 28.0, 1.0), 19.0);
    }

    #[test]
    fn round_up_never_leaves_range() {
        assert_eq!(normalize(5.0, 0.0, 7.0, 10.0), 0.0);
    }

    #[test]
    fn tiny_remainders_are_noise() {
        let out = normalize(0.3, 0.0, 1.0, 0.1);
        assert!((out - 0.3).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn degenerate_inputs_do_not_panic() {
        assert_eq!(normalize(f64::NAN, 0.0, 100.0, 10.0), 0.0);
        assert_eq!(normalize(f64::INFINITY, 18.0, 28.0, 1.0), 18.0);
        assert_eq!(normalize(50.0, 100.0, 0.0, 10.0), 100.0);
        assert_eq!(normalize(55.0, 0.0, 100.0, 0.0), 55.0);
    }
}
