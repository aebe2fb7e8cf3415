//! Numeric helpers shared by anchor generation and suppression.

/// Clamps a normalized coordinate to `[0, 1]`.
#[inline]
pub(crate) fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Integer division rounding up.
#[inline]
pub(crate) fn ceil_div(value: usize, divisor: usize) -> usize {
    value.div_ceil(divisor)
}

/// Divides `num` by `den`, returning 0 when the denominator is zero.
#[inline]
pub(crate) fn guarded_ratio(num: f32, den: f32) -> f32 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
