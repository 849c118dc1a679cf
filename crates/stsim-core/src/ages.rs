//! Age and time-since-transition arithmetic.
//!
//! Pure functions; the driver supplies the deterministic-transition window
//! of the cell's destination state.

use crate::rng::SimRng;

/// Sentinel for an unbounded maximum age or TST.
pub const UNBOUNDED: i32 = i32::MAX;

/// Age of a cell after a probabilistic transition.
///
/// Without reset the age moves by `age_relative` and is clamped to the
/// destination window. With reset it restarts at the window minimum,
/// shifted forward by a positive `age_relative`. Never negative.
pub fn determine_target_age(
    current_age: i32,
    age_reset: bool,
    age_relative: i32,
    age_min: i32,
    age_max: i32,
) -> i32 {
    let new_age = if !age_reset {
        current_age
            .saturating_add(age_relative)
            .max(age_min)
            .min(age_max)
    } else {
        age_min.max(age_min.saturating_add(age_relative)).min(age_max)
    };
    new_age.max(0)
}

/// Clamp a requested initial age range into a deterministic window. The
/// window itself is normalized first, so reversed bounds are tolerated.
pub fn age_min_max(dt_min: i32, dt_max: i32, age_min_in: i32, age_max_in: i32) -> (i32, i32) {
    let lo = dt_min.min(dt_max);
    let hi = dt_min.max(dt_max);
    (age_min_in.clamp(lo, hi), age_max_in.clamp(lo, hi))
}

/// TST value after a transition fires. `None` relative resets to zero;
/// otherwise the value moves by the relative amount and is clamped to the
/// transition's TST window. Never negative.
pub fn determine_target_tst(current: i32, relative: Option<i32>, min: Option<i32>, max: Option<i32>) -> i32 {
    match relative {
        None => 0,
        Some(r) => current
            .saturating_add(r)
            .max(min.unwrap_or(0))
            .min(max.unwrap_or(UNBOUNDED))
            .max(0),
    }
}

/// Whether a TST value lies inside an applicability window.
pub fn tst_in_window(value: i32, min: Option<i32>, max: Option<i32>) -> bool {
    value >= min.unwrap_or(0) && value <= max.unwrap_or(UNBOUNDED)
}

/// Initial age for a cell. A deterministic window, when present, first
/// clamps the requested range. An unbounded maximum yields the minimum;
/// otherwise the age is drawn uniformly from the inclusive range.
pub fn initial_age(age_min: i32, age_max: i32, dt_window: Option<(i32, i32)>, rng: &mut SimRng) -> i32 {
    let (lo, hi) = match dt_window {
        Some((dt_min, dt_max)) => age_min_max(dt_min, dt_max, age_min, age_max),
        None => (age_min, age_max),
    };
    if hi == UNBOUNDED {
        lo
    } else {
        rng.next_in_range(lo, hi.saturating_add(1))
    }
}
