//! Run definition validation.

use std::collections::HashSet;

use crate::schema::{CurrentDef, InitialDef, KineticsDef, MeshDef, ModelDef, RunDef, SettingsDef, TimeDef};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(field: &str, v: f64) -> Result<(), ValidationError> {
    if !v.is_finite() || v <= 0.0 {
        return Err(invalid(field, v, "must be positive and finite"));
    }
    Ok(())
}

fn finite(field: &str, v: f64) -> Result<(), ValidationError> {
    if !v.is_finite() {
        return Err(invalid(field, v, "must be finite"));
    }
    Ok(())
}

pub fn validate_run(run: &RunDef) -> Result<(), ValidationError> {
    if run.version == 0 || run.version > crate::schema::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: run.version,
        });
    }
    if run.name.trim().is_empty() {
        return Err(invalid("name", &run.name, "must not be empty"));
    }

    validate_settings(&run.settings)?;
    validate_mesh(&run.mesh)?;
    validate_current(&run.current, run.mesh.node_count())?;
    validate_time(&run.time)?;

    let mut names = HashSet::new();
    let mut kinds = HashSet::new();
    for model in &run.models {
        if !names.insert(model.name.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: model.name.clone(),
                context: "models".to_string(),
            });
        }
        // One record type per DOF and kinetics.
        if !kinds.insert(model.kinetics.label()) {
            return Err(ValidationError::DuplicateId {
                id: model.kinetics.label().to_string(),
                context: format!("model '{}' kinetics", model.name),
            });
        }
        validate_model(model)?;
    }

    Ok(())
}

fn validate_settings(settings: &SettingsDef) -> Result<(), ValidationError> {
    if settings.reference_date().is_none() {
        return Err(invalid(
            "settings reference_date",
            &settings.reference_date,
            "expected YYYY-MM-DDTHH:MM:SS",
        ));
    }
    if settings.threads == Some(0) {
        return Err(invalid("settings threads", 0, "must be at least 1"));
    }
    if !settings.dry_depth_m.is_finite() || settings.dry_depth_m < 0.0 {
        return Err(invalid(
            "settings dry_depth_m",
            settings.dry_depth_m,
            "must be non-negative and finite",
        ));
    }
    if !(0.0..=1.0).contains(&settings.wetting_factor) {
        return Err(invalid(
            "settings wetting_factor",
            settings.wetting_factor,
            "must lie in [0, 1]",
        ));
    }
    positive("settings velocity_threshold_mps", settings.velocity_threshold_mps)
}

fn validate_mesh(mesh: &MeshDef) -> Result<(), ValidationError> {
    match mesh {
        MeshDef::Rectangle {
            nx,
            ny,
            dx_m,
            dy_m,
            bed_m,
        } => {
            if *nx == 0 || *ny == 0 {
                return Err(invalid(
                    "mesh nx/ny",
                    format!("{nx}x{ny}"),
                    "need at least one cell in each direction",
                ));
            }
            positive("mesh dx_m", *dx_m)?;
            positive("mesh dy_m", *dy_m)?;
            finite("mesh bed_m", *bed_m)
        }
    }
}

fn validate_current(current: &CurrentDef, nodes: usize) -> Result<(), ValidationError> {
    finite("current u_mps", current.u_mps)?;
    finite("current v_mps", current.v_mps)?;
    finite("current level_m", current.level_m)?;
    if !current.eddy_diffusivity_m2ps.is_finite() || current.eddy_diffusivity_m2ps < 0.0 {
        return Err(invalid(
            "current eddy_diffusivity_m2ps",
            current.eddy_diffusivity_m2ps,
            "must be non-negative and finite",
        ));
    }
    if !current.dispersion.is_finite() || current.dispersion < 0.0 {
        return Err(invalid(
            "current dispersion",
            current.dispersion,
            "must be non-negative and finite",
        ));
    }
    if let Some(step) = current.max_step_s {
        positive("current max_step_s", step)?;
    }

    let mut previous = f64::NEG_INFINITY;
    for [t, level] in &current.tide {
        finite("current tide level", *level)?;
        if !t.is_finite() || *t <= previous {
            return Err(invalid(
                "current tide time",
                t,
                "times must be finite and strictly increasing",
            ));
        }
        previous = *t;
    }

    let mut seen = HashSet::new();
    for node in &current.open_boundary {
        if *node >= nodes {
            return Err(ValidationError::MissingReference {
                id: node.to_string(),
                context: format!("current open_boundary (mesh has {nodes} nodes)"),
            });
        }
        if !seen.insert(*node) {
            return Err(ValidationError::DuplicateId {
                id: node.to_string(),
                context: "current open_boundary".to_string(),
            });
        }
    }
    Ok(())
}

fn validate_time(time: &TimeDef) -> Result<(), ValidationError> {
    finite("time start_s", time.start_s)?;
    finite("time end_s", time.end_s)?;
    finite("time interval_s", time.interval_s)?;
    if time.end_s < time.start_s {
        return Err(invalid("time end_s", time.end_s, "must not precede start_s"));
    }
    if let Some(step) = time.max_step_s {
        positive("time max_step_s", step)?;
    }
    Ok(())
}

fn validate_model(model: &ModelDef) -> Result<(), ValidationError> {
    if model.name.trim().is_empty() {
        return Err(invalid("model name", &model.name, "must not be empty"));
    }
    if model.name == crate::schema::CURRENT_MODEL_NAME {
        return Err(ValidationError::DuplicateId {
            id: model.name.clone(),
            context: "models (reserved for the current)".to_string(),
        });
    }
    if let KineticsDef::Tracer { half_life_s } = model.kinetics {
        positive(&format!("model '{}' half_life_s", model.name), half_life_s)?;
    }
    match &model.initial {
        InitialDef::Constant { value } => {
            if !value.is_finite() || *value < 0.0 {
                return Err(invalid(
                    format!("model '{}' initial value", model.name),
                    value,
                    "must be non-negative and finite",
                ));
            }
        }
        InitialDef::FromBoundaries => {
            if model.boundary_file.is_none() {
                return Err(ValidationError::MissingReference {
                    id: "boundary_file".to_string(),
                    context: format!("model '{}' initial FromBoundaries", model.name),
                });
            }
        }
        InitialDef::FromResult { path, .. } => {
            if path.as_os_str().is_empty() {
                return Err(invalid(
                    format!("model '{}' initial path", model.name),
                    "",
                    "must not be empty",
                ));
            }
        }
    }
    Ok(())
}
