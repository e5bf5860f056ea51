//! Instability-to-multiplier scaling law
//!
//! `multiplier = (fraction / 0.5) ^ scaling_factor`
//!
//! The curve is centered on the baseline fraction: at 0.5 every rule runs
//! at its configured rate and count whatever its scaling factor. Factors
//! above 1 make a rule ramp up late and steeply, factors below 1 flatten it.
//! At factor 1 the law reduces to `fraction / 0.5`.

use rand::Rng;

/// Fraction at which configured rates apply unscaled
pub const BASELINE_FRACTION: f32 = 0.5;

pub const MIN_FREQUENCY_MULTIPLIER: f32 = 0.1;
pub const MAX_FREQUENCY_MULTIPLIER: f32 = 10.0;

/// At or below this fraction intervals use the baseline unscaled
pub const NEAR_ZERO_FRACTION: f32 = 0.01;

/// Raw multiplier; unclamped, zero for non-positive fractions
pub fn scaling_multiplier(fraction: f32, scaling_factor: f32) -> f32 {
    if fraction <= 0.0 {
        return 0.0;
    }
    (fraction / BASELINE_FRACTION).powf(scaling_factor)
}

/// Multiplier applied to check frequency
pub fn frequency_multiplier(fraction: f32, scaling_factor: f32) -> f32 {
    scaling_multiplier(fraction, scaling_factor)
        .clamp(MIN_FREQUENCY_MULTIPLIER, MAX_FREQUENCY_MULTIPLIER)
}

/// Multiplier applied to batch size; unclamped
pub fn count_multiplier(fraction: f32, scaling_factor: f32) -> f32 {
    scaling_multiplier(fraction, scaling_factor)
}

/// Ticks until the rule's next check; always at least one
pub fn next_interval(baseline_interval: u64, fraction: f32, scaling_factor: f32) -> u64 {
    if fraction <= NEAR_ZERO_FRACTION {
        return baseline_interval.max(1);
    }
    let multiplier = frequency_multiplier(fraction, scaling_factor);
    ((baseline_interval as f64 / multiplier as f64).round() as u64).max(1)
}

/// `max(1, round(uniform(min*m, max*m)))`
pub fn sample_count<R: Rng + ?Sized>(rng: &mut R, range: [u32; 2], multiplier: f32) -> u32 {
    let multiplier = if multiplier.is_finite() { multiplier.max(0.0) } else { 0.0 };
    let lo = range[0] as f32 * multiplier;
    let hi = range[1] as f32 * multiplier;
    let value = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
    (value.round() as u32).max(1)
}
