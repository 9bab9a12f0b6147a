//! Run-wide settings threaded explicitly into model construction.
//!
//! Everything a model needs to know about the run (reference date, map
//! projection, wet/dry thresholds, stabilization switches, worker count)
//! lives here instead of in process-wide statics.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{TwError, TwResult};
use crate::units::{Length, m, meters};

/// How element contributions are accumulated into shared per-DOF arrays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Accumulation {
    /// One mutex around the whole result array; each element takes it once.
    #[default]
    Locked,
    /// Each worker fills a private array; arrays are summed afterwards.
    PerThread,
}

/// Wet/dry handling parameters.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WetDry {
    /// Nodes shallower than this are treated as dry.
    pub dry_depth: Length,
    /// Upper bound on the off-diagonal mass blending factor.
    pub wetting_factor: f64,
}

impl Default for WetDry {
    fn default() -> Self {
        Self {
            dry_depth: m(0.01),
            wetting_factor: 1.0,
        }
    }
}

impl WetDry {
    pub fn dry_depth_m(&self) -> f64 {
        meters(self.dry_depth)
    }
}

/// SUPG stabilization switches.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stabilization {
    /// Below this velocity magnitude the stabilization parameter is zero.
    pub velocity_threshold: f64,
    /// Damp tau by `coth(Pe) - 1/Pe`.
    pub optimal_peclet: bool,
}

impl Default for Stabilization {
    fn default() -> Self {
        Self {
            velocity_threshold: 1e-5,
            optimal_peclet: true,
        }
    }
}

/// Explicit run configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Calendar time corresponding to simulation time zero.
    pub reference_date: NaiveDateTime,
    /// EPSG code of the mesh coordinates.
    pub epsg: u32,
    /// Release builds suppress per-step diagnostics.
    pub release: bool,
    /// Requested worker threads; `None` uses every available core.
    pub threads: Option<usize>,
    pub accumulation: Accumulation,
    pub wet_dry: WetDry,
    pub stabilization: Stabilization,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            reference_date: NaiveDate::from_ymd_opt(2000, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            epsg: 25832,
            release: false,
            threads: None,
            accumulation: Accumulation::default(),
            wet_dry: WetDry::default(),
            stabilization: Stabilization::default(),
        }
    }
}

impl SimConfig {
    /// Check ranges that would otherwise surface as NaN deep in the loops.
    pub fn validate(&self) -> TwResult<()> {
        if self.threads == Some(0) {
            return Err(TwError::InvalidArg {
                what: "threads must be at least 1",
            });
        }
        if !(self.wet_dry.dry_depth_m() >= 0.0) {
            return Err(TwError::InvalidArg {
                what: "dry_depth must be non-negative",
            });
        }
        if !(0.0..=1.0).contains(&self.wet_dry.wetting_factor) {
            return Err(TwError::InvalidArg {
                what: "wetting_factor must lie in [0, 1]",
            });
        }
        if !(self.stabilization.velocity_threshold > 0.0) {
            return Err(TwError::InvalidArg {
                what: "velocity_threshold must be positive",
            });
        }
        Ok(())
    }

    /// Calendar time of a simulation time in seconds.
    pub fn date_at(&self, t_s: f64) -> NaiveDateTime {
        let millis = (t_s * 1000.0).round() as i64;
        self.reference_date + chrono::Duration::milliseconds(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_threads_rejected() {
        let cfg = SimConfig {
            threads: Some(0),
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn wetting_factor_out_of_range_rejected() {
        let mut cfg = SimConfig::default();
        cfg.wet_dry.wetting_factor = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn date_at_offsets_reference() {
        let cfg = SimConfig::default();
        let d = cfg.date_at(3600.0);
        assert_eq!(d - cfg.reference_date, chrono::Duration::hours(1));
    }
}
