// tw-core/src/units.rs

use uom::si::f64::Length as UomLength;
use uom::si::length::meter;

pub type Length = UomLength;

#[inline]
pub fn m(v: f64) -> Length {
    Length::new::<meter>(v)
}

#[inline]
pub fn meters(l: Length) -> f64 {
    l.get::<meter>()
}

pub mod constants {
    /// Seconds per day; kinetic rates are given per day.
    pub const DAY_S: f64 = 86_400.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_round_trips_in_meters() {
        assert_eq!(meters(m(3.5)), 3.5);
        assert_eq!(meters(m(-0.25)), -0.25);
    }
}
