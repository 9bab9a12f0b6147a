//! Periodic piecewise-linear time series.
//!
//! Boundary forcing is given as `(time, value)` pairs. Outside the covered
//! span the series repeats with period `t_last - t_first`.

use crate::error::{TwError, TwResult};

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series from `(time, value)` pairs with strictly increasing times.
    pub fn new(points: Vec<(f64, f64)>) -> TwResult<Self> {
        if points.is_empty() {
            return Err(TwError::InvalidArg {
                what: "time series needs at least one point",
            });
        }
        for (t, v) in &points {
            if !t.is_finite() || !v.is_finite() {
                return Err(TwError::NonFinite {
                    what: "time series point",
                    value: if t.is_finite() { *v } else { *t },
                });
            }
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(TwError::InvalidArg {
                what: "time series times must be strictly increasing",
            });
        }
        let (times, values) = points.into_iter().unzip();
        Ok(Self { times, values })
    }

    /// A series that holds one value forever.
    pub fn constant(value: f64) -> Self {
        Self {
            times: vec![0.0],
            values: vec![value],
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn period(&self) -> f64 {
        self.times[self.times.len() - 1] - self.times[0]
    }

    /// Map `t` into the covered span `[t_first, t_last)`.
    fn wrap(&self, t: f64) -> f64 {
        let t0 = self.times[0];
        let period = self.period();
        if period <= 0.0 {
            return t0;
        }
        t0 + (t - t0).rem_euclid(period)
    }

    /// Segment index `i` such that `times[i] <= t < times[i + 1]`.
    fn segment(&self, t: f64) -> usize {
        match self.times.binary_search_by(|x| x.total_cmp(&t)) {
            Ok(i) => i.min(self.times.len() - 2),
            Err(i) => i.saturating_sub(1).min(self.times.len() - 2),
        }
    }

    /// Value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        if self.times.len() == 1 {
            return self.values[0];
        }
        let tw = self.wrap(t);
        let i = self.segment(tw);
        let (t0, t1) = (self.times[i], self.times[i + 1]);
        let (v0, v1) = (self.values[i], self.values[i + 1]);
        v0 + (v1 - v0) * (tw - t0) / (t1 - t0)
    }

    /// Time derivative at time `t` (slope of the active segment).
    pub fn derivative(&self, t: f64) -> f64 {
        if self.times.len() == 1 {
            return 0.0;
        }
        let i = self.segment(self.wrap(t));
        (self.values[i + 1] - self.values[i]) / (self.times[i + 1] - self.times[i])
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn value_is_periodic(t in -1.0e4_f64..1.0e4, k in -5_i32..5) {
            let s = TimeSeries::new(vec![(0.0, 1.0), (3.0, 4.0), (7.0, -2.0)]).unwrap();
            let shifted = t + f64::from(k) * s.period();
            prop_assert!((s.value(t) - s.value(shifted)).abs() < 1e-6);
        }

        #[test]
        fn value_stays_within_point_range(t in -1.0e3_f64..1.0e3) {
            let s = TimeSeries::new(vec![(0.0, 1.0), (3.0, 4.0), (7.0, -2.0)]).unwrap();
            let v = s.value(t);
            prop_assert!((-2.0 - 1e-9..=4.0 + 1e-9).contains(&v));
        }
    }
}
