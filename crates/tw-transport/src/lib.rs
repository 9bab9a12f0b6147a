//! Transport models for tidewater.
//!
//! Provides:
//! - SUPG-stabilized linear triangle assembly with wet/dry blending
//! - A thread-pool element loop with locked or per-thread accumulation
//! - Model capability traits (ODE-style, self-stepping, result output)
//! - A generic scalar transport engine parameterized by its source term
//! - A prescribed current model feeding velocity, depth and diffusivity
//! - Salinity, decaying tracer and NPZD kinetics

pub mod assembly;
pub mod contract;
pub mod current;
pub mod error;
pub mod executor;
pub mod initial;
pub mod kinetics;
pub mod scalar;
pub mod source;

pub use assembly::{
    AssemblyParams, ElementContribution, ElementInput, NodeInput, NodeResidual, assemble,
};
pub use contract::{BoundaryEnforcement, OdeModel, ResultOutput, SelfStepping};
pub use current::{
    CurrentData, CurrentParams, FlowElementData, FlowField, FlowSample, PrescribedCurrent,
    UniformFlow,
};
pub use error::{TransportError, TransportResult};
pub use executor::ElementExecutor;
pub use initial::InitialCondition;
pub use kinetics::{
    Detritus, NpzdParams, Nitrogen, Phytoplankton, Salinity, Tracer, Zooplankton,
};
pub use scalar::{ScalarTransport, TransportData, TransportOptions};
pub use source::{Coupled, SourceContext, SourceTerm, couple};
