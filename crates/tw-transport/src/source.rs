//! Source/sink terms plugged into the scalar transport engine.

use tw_mesh::{ExtKind, ExtensionRegistry};
use tw_results::Field;

use crate::current::CurrentData;
use crate::scalar::TransportData;

/// Handle to the per-DOF records of the model driven by source term `T`.
pub type Coupled<T> = ExtKind<TransportData<T>>;

/// Resolve the handle of a coupled model's records.
///
/// The kind is registered if that model has not been built yet, so models
/// may be added in any order; lookups stay absent until it attaches.
pub fn couple<T: SourceTerm>(dofs: &mut ExtensionRegistry) -> Coupled<T> {
    dofs.register::<TransportData<T>>()
}

/// Local reaction physics of one scalar field.
///
/// `evaluate` runs once per DOF per rate evaluation, in parallel, with
/// read-only access to every model's records. The fluxes it returns are
/// published on the DOF's record afterwards, where other models can read
/// them.
pub trait SourceTerm: Send + Sync + 'static {
    /// Per-DOF diagnostics shared with coupled models.
    type Fluxes: Default + Clone + Send + Sync + 'static;

    /// Handles of the coupled models' records, resolved once per model.
    type Links: Copy + Send + Sync + 'static;

    /// Result field under which the state is written.
    fn output_field(&self) -> Field {
        Field::Scalar
    }

    /// Resolve [`Self::Links`] on the DOF registry.
    fn link(dofs: &mut ExtensionRegistry) -> Self::Links;

    /// Net source (per second) and the fluxes that produced it.
    fn evaluate(&self, ctx: &SourceContext<'_>, links: &Self::Links) -> (f64, Self::Fluxes);
}

/// What a source term sees at one DOF.
pub struct SourceContext<'a> {
    pub dof: usize,
    pub t: f64,
    /// This model's value at the DOF.
    pub value: f64,
    pub current: Option<&'a CurrentData>,
    pub dofs: &'a ExtensionRegistry,
}

impl<'a> SourceContext<'a> {
    pub fn depth(&self) -> f64 {
        self.current.map_or(0.0, |c| c.depth)
    }

    /// Record of the model driven by source term `T` at this DOF, if that
    /// model is part of the run.
    pub fn coupled<T: SourceTerm>(&self, kind: Coupled<T>) -> Option<&'a TransportData<T>> {
        self.dofs.extract(kind, self.dof)
    }

    /// Last published value of a coupled model, 0 when absent.
    pub fn coupled_value<T: SourceTerm>(&self, kind: Coupled<T>) -> f64 {
        self.coupled(kind).map_or(0.0, |r| r.value)
    }
}
