/// Floating point type used throughout system
pub type Real = f64;

/// Index of the first non-finite entry, if any.
pub fn first_non_finite(values: &[Real]) -> Option<usize> {
    values.iter().position(|v| !v.is_finite())
}

/// Clamp negative values to zero while letting NaN through untouched.
///
/// `f64::max` would silently turn NaN into zero, which hides divergence
/// from anyone reading the result stream.
#[inline]
pub fn clamp_non_negative(v: Real) -> Real {
    if v < 0.0 { 0.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_nan() {
        assert_eq!(clamp_non_negative(-1.0), 0.0);
        assert_eq!(clamp_non_negative(2.5), 2.5);
        assert!(clamp_non_negative(Real::NAN).is_nan());
    }

    #[test]
    fn first_non_finite_finds_position() {
        assert_eq!(first_non_finite(&[1.0, 2.0]), None);
        assert_eq!(first_non_finite(&[1.0, Real::INFINITY, Real::NAN]), Some(1));
    }
}
