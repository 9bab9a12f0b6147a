//! Run definition schema.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tw_core::units::m;
use tw_core::{Accumulation, SimConfig, Stabilization, WetDry};

pub const LATEST_VERSION: u32 = 1;

/// Format of `SettingsDef::reference_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Name of the prescribed current model and its result stream.
pub const CURRENT_MODEL_NAME: &str = "current";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunDef {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub settings: SettingsDef,
    pub mesh: MeshDef,
    pub current: CurrentDef,
    /// Enabled models, advanced in this order.
    #[serde(default)]
    pub models: Vec<ModelDef>,
    #[serde(default)]
    pub npzd: NpzdDef,
    pub time: TimeDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsDef {
    #[serde(default = "default_reference_date")]
    pub reference_date: String,
    #[serde(default = "default_epsg")]
    pub epsg: u32,
    #[serde(default)]
    pub release: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(default)]
    pub accumulation: AccumulationDef,
    #[serde(default)]
    pub integrator: IntegratorDef,
    #[serde(default = "default_dry_depth")]
    pub dry_depth_m: f64,
    #[serde(default = "default_wetting_factor")]
    pub wetting_factor: f64,
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold_mps: f64,
    #[serde(default = "default_true")]
    pub optimal_peclet: bool,
}

impl Default for SettingsDef {
    fn default() -> Self {
        Self {
            reference_date: default_reference_date(),
            epsg: default_epsg(),
            release: false,
            threads: None,
            accumulation: AccumulationDef::default(),
            integrator: IntegratorDef::default(),
            dry_depth_m: default_dry_depth(),
            wetting_factor: default_wetting_factor(),
            velocity_threshold_mps: default_velocity_threshold(),
            optimal_peclet: true,
        }
    }
}

impl SettingsDef {
    pub fn reference_date(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.reference_date, DATE_FORMAT).ok()
    }

    /// Run configuration for model construction.
    ///
    /// An unparsable reference date falls back to the default; validation
    /// rejects such definitions before they get here.
    pub fn to_config(&self) -> SimConfig {
        let defaults = SimConfig::default();
        SimConfig {
            reference_date: self.reference_date().unwrap_or(defaults.reference_date),
            epsg: self.epsg,
            release: self.release,
            threads: self.threads,
            accumulation: match self.accumulation {
                AccumulationDef::Locked => Accumulation::Locked,
                AccumulationDef::PerThread => Accumulation::PerThread,
            },
            wet_dry: WetDry {
                dry_depth: m(self.dry_depth_m),
                wetting_factor: self.wetting_factor,
            },
            stabilization: Stabilization {
                velocity_threshold: self.velocity_threshold_mps,
                optimal_peclet: self.optimal_peclet,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationDef {
    #[default]
    Locked,
    PerThread,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorDef {
    #[default]
    ForwardEuler,
    Heun,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MeshDef {
    /// Structured channel of `nx * ny` cells, two triangles each.
    Rectangle {
        nx: usize,
        ny: usize,
        dx_m: f64,
        dy_m: f64,
        /// Bed elevation (negative below datum).
        bed_m: f64,
    },
}

impl MeshDef {
    pub fn node_count(&self) -> usize {
        match self {
            MeshDef::Rectangle { nx, ny, .. } => (nx + 1) * (ny + 1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentDef {
    #[serde(default)]
    pub u_mps: f64,
    #[serde(default)]
    pub v_mps: f64,
    #[serde(default)]
    pub level_m: f64,
    /// Periodic water level `[t_s, level_m]`; overrides `level_m` when set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tide: Vec<[f64; 2]>,
    #[serde(default)]
    pub eddy_diffusivity_m2ps: f64,
    #[serde(default)]
    pub dispersion: f64,
    /// Zero-based node indices on open boundaries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open_boundary: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_step_s: Option<f64>,
    #[serde(default)]
    pub output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub name: String,
    pub kinetics: KineticsDef,
    #[serde(default)]
    pub initial: InitialDef,
    /// Boundary-condition text file, relative to the run definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary_file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum KineticsDef {
    Salinity,
    Tracer { half_life_s: f64 },
    Nitrogen,
    Phytoplankton,
    Zooplankton,
    Detritus,
}

impl KineticsDef {
    pub fn label(&self) -> &'static str {
        match self {
            KineticsDef::Salinity => "salinity",
            KineticsDef::Tracer { .. } => "tracer",
            KineticsDef::Nitrogen => "nitrogen",
            KineticsDef::Phytoplankton => "phytoplankton",
            KineticsDef::Zooplankton => "zooplankton",
            KineticsDef::Detritus => "detritus",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum InitialDef {
    Constant { value: f64 },
    FromBoundaries,
    FromResult { path: PathBuf, record: usize },
}

impl Default for InitialDef {
    fn default() -> Self {
        InitialDef::Constant { value: 0.0 }
    }
}

/// NPZD rate constants (per day) shared by the nitrogen-cycle models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NpzdDef {
    pub max_growth: f64,
    pub nutrient_half_saturation: f64,
    pub light_limitation: f64,
    pub phyto_mortality: f64,
    pub max_grazing: f64,
    pub grazing_half_saturation: f64,
    pub assimilation: f64,
    pub zoo_mortality: f64,
    pub remineralization: f64,
}

impl Default for NpzdDef {
    fn default() -> Self {
        Self {
            max_growth: 1.0,
            nutrient_half_saturation: 0.5,
            light_limitation: 0.6,
            phyto_mortality: 0.05,
            max_grazing: 0.8,
            grazing_half_saturation: 1.0,
            assimilation: 0.7,
            zoo_mortality: 0.05,
            remineralization: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeDef {
    #[serde(default)]
    pub start_s: f64,
    pub end_s: f64,
    /// Result interval; `<= 0` writes after every sub-step.
    pub interval_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_step_s: Option<f64>,
}

impl RunDef {
    /// Files read at run start (boundary files and start-from results),
    /// resolved against `base_dir`, in model order.
    pub fn input_files(&self, base_dir: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for model in &self.models {
            if let Some(file) = &model.boundary_file {
                files.push(resolve_path(base_dir, file));
            }
            if let InitialDef::FromResult { path, .. } = &model.initial {
                files.push(resolve_path(base_dir, path));
            }
        }
        files
    }
}

/// Resolve `path` against the directory of the run definition.
pub fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn default_reference_date() -> String {
    "2000-01-01T00:00:00".to_string()
}

fn default_epsg() -> u32 {
    25832
}

fn default_dry_depth() -> f64 {
    0.01
}

fn default_wetting_factor() -> f64 {
    1.0
}

fn default_velocity_threshold() -> f64 {
    1e-5
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_core_defaults() {
        let config = SettingsDef::default().to_config();
        let core = SimConfig::default();
        assert_eq!(config.reference_date, core.reference_date);
        assert_eq!(config.epsg, core.epsg);
        assert_eq!(config.accumulation, core.accumulation);
        assert_eq!(config.wet_dry.wetting_factor, core.wet_dry.wetting_factor);
        assert!((config.wet_dry.dry_depth_m() - core.wet_dry.dry_depth_m()).abs() < 1e-15);
        assert_eq!(
            config.stabilization.velocity_threshold,
            core.stabilization.velocity_threshold
        );
        config.validate().unwrap();
    }

    #[test]
    fn kinetics_tag_parses() {
        let k: KineticsDef = serde_yaml::from_str("type: Tracer\nhalf_life_s: 3600.0\n").unwrap();
        assert_eq!(k, KineticsDef::Tracer { half_life_s: 3600.0 });
        assert_eq!(k.label(), "tracer");
    }

    #[test]
    fn rectangle_node_count() {
        let mesh = MeshDef::Rectangle {
            nx: 4,
            ny: 2,
            dx_m: 10.0,
            dy_m: 10.0,
            bed_m: -2.0,
        };
        assert_eq!(mesh.node_count(), 15);
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/runs/estuary");
        assert_eq!(
            resolve_path(base, Path::new("bc/salt.txt")),
            PathBuf::from("/runs/estuary/bc/salt.txt")
        );
        assert_eq!(
            resolve_path(base, Path::new("/abs/salt.txt")),
            PathBuf::from("/abs/salt.txt")
        );
    }

    #[test]
    fn input_files_list_boundary_and_start_files() {
        let mut model = ModelDef {
            name: "salt".to_string(),
            kinetics: KineticsDef::Salinity,
            initial: InitialDef::FromResult {
                path: PathBuf::from("prev/salt.twr"),
                record: 0,
            },
            boundary_file: Some(PathBuf::from("salt.bc")),
            output: false,
        };
        let mut run: RunDef = serde_yaml::from_str(
            "version: 1\nname: x\nmesh: {type: Rectangle, nx: 1, ny: 1, dx_m: 1.0, dy_m: 1.0, bed_m: -1.0}\ncurrent: {}\ntime: {end_s: 1.0, interval_s: 1.0}\n",
        )
        .unwrap();
        run.models.push(model.clone());
        model.name = "dye".to_string();
        model.kinetics = KineticsDef::Tracer { half_life_s: 60.0 };
        model.initial = InitialDef::Constant { value: 0.0 };
        model.boundary_file = None;
        run.models.push(model);

        let base = Path::new("/runs/estuary");
        assert_eq!(
            run.input_files(base),
            [
                PathBuf::from("/runs/estuary/salt.bc"),
                PathBuf::from("/runs/estuary/prev/salt.twr"),
            ]
        );
    }
}
