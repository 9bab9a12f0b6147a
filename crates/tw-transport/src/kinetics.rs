//! Concrete source terms.
//!
//! Salinity is conservative and the tracer decays at a first-order rate.
//! Nitrogen, phytoplankton, zooplankton and detritus form a closed NPZD
//! nitrogen cycle in which each model reads the values or the fluxes that
//! the others last published on the shared DOF records. Fluxes are refreshed
//! whenever their owner evaluates its rate, so what a model sees depends on
//! whether its partner ran earlier or later in the same step.

use tw_core::units::constants::DAY_S;
use tw_mesh::ExtensionRegistry;
use tw_results::Field;

use crate::source::{Coupled, SourceContext, SourceTerm, couple};

/// Conservative salinity.
#[derive(Clone, Copy, Debug, Default)]
pub struct Salinity;

impl SourceTerm for Salinity {
    type Fluxes = ();
    type Links = ();

    fn output_field(&self) -> Field {
        Field::Salinity
    }

    fn link(_dofs: &mut ExtensionRegistry) {}

    fn evaluate(&self, _ctx: &SourceContext<'_>, _links: &()) -> (f64, ()) {
        (0.0, ())
    }
}

/// Passive tracer with first-order decay.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tracer {
    /// Decay rate (1/s).
    pub decay_rate: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TracerFluxes {
    pub decay: f64,
}

impl Tracer {
    /// Decay with the given half-life in seconds.
    pub fn with_half_life(half_life_s: f64) -> Self {
        Self {
            decay_rate: std::f64::consts::LN_2 / half_life_s,
        }
    }
}

impl SourceTerm for Tracer {
    type Fluxes = TracerFluxes;
    type Links = ();

    fn link(_dofs: &mut ExtensionRegistry) {}

    fn evaluate(&self, ctx: &SourceContext<'_>, _links: &()) -> (f64, TracerFluxes) {
        let decay = self.decay_rate * ctx.value.max(0.0);
        (-decay, TracerFluxes { decay })
    }
}

/// NPZD rate constants. Rates are per day, concentrations in mmol N/m³.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NpzdParams {
    pub max_growth: f64,
    pub nutrient_half_saturation: f64,
    /// Depth-averaged light limitation, 0..=1.
    pub light_limitation: f64,
    pub phyto_mortality: f64,
    pub max_grazing: f64,
    pub grazing_half_saturation: f64,
    /// Fraction of grazed nitrogen assimilated by zooplankton.
    pub assimilation: f64,
    pub zoo_mortality: f64,
    pub remineralization: f64,
}

impl Default for NpzdParams {
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

impl NpzdParams {
    fn per_second(rate_per_day: f64) -> f64 {
        rate_per_day / DAY_S
    }

    fn uptake(&self, n: f64, p: f64) -> f64 {
        let n = n.max(0.0);
        Self::per_second(self.max_growth)
            * self.light_limitation
            * n
            / (self.nutrient_half_saturation + n)
            * p.max(0.0)
    }

    /// Holling type III grazing.
    fn grazing(&self, p: f64, z: f64) -> f64 {
        let p2 = p.max(0.0).powi(2);
        let k2 = self.grazing_half_saturation.powi(2);
        Self::per_second(self.max_grazing) * z.max(0.0) * p2 / (k2 + p2)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Nitrogen(pub NpzdParams);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NitrogenFluxes {
    /// Uptake by phytoplankton, as last published by phytoplankton.
    pub uptake: f64,
    /// Regeneration from detritus, as last published by detritus.
    pub regeneration: f64,
}

impl SourceTerm for Nitrogen {
    type Fluxes = NitrogenFluxes;
    type Links = (Coupled<Phytoplankton>, Coupled<Detritus>);

    fn link(dofs: &mut ExtensionRegistry) -> Self::Links {
        (couple(dofs), couple(dofs))
    }

    fn evaluate(&self, ctx: &SourceContext<'_>, links: &Self::Links) -> (f64, NitrogenFluxes) {
        let (phyto, detritus) = *links;
        let uptake = ctx.coupled(phyto).map_or(0.0, |p| p.fluxes.uptake);
        let regeneration = ctx
            .coupled(detritus)
            .map_or(0.0, |d| d.fluxes.remineralization);
        (
            regeneration - uptake,
            NitrogenFluxes {
                uptake,
                regeneration,
            },
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Phytoplankton(pub NpzdParams);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhytoFluxes {
    pub uptake: f64,
    pub mortality: f64,
    pub grazing: f64,
}

impl SourceTerm for Phytoplankton {
    type Fluxes = PhytoFluxes;
    type Links = (Coupled<Nitrogen>, Coupled<Zooplankton>);

    fn link(dofs: &mut ExtensionRegistry) -> Self::Links {
        (couple(dofs), couple(dofs))
    }

    fn evaluate(&self, ctx: &SourceContext<'_>, links: &Self::Links) -> (f64, PhytoFluxes) {
        let (nitrogen, zoo) = *links;
        let p = ctx.value;
        let n = ctx.coupled_value(nitrogen);
        let z = ctx.coupled_value(zoo);
        let params = &self.0;

        let uptake = params.uptake(n, p);
        let mortality = NpzdParams::per_second(params.phyto_mortality) * p.max(0.0);
        let grazing = params.grazing(p, z);
        (
            uptake - mortality - grazing,
            PhytoFluxes {
                uptake,
                mortality,
                grazing,
            },
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Zooplankton(pub NpzdParams);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ZooFluxes {
    pub grazing: f64,
    /// Grazed but not assimilated.
    pub egestion: f64,
    pub mortality: f64,
}

impl SourceTerm for Zooplankton {
    type Fluxes = ZooFluxes;
    type Links = Coupled<Phytoplankton>;

    fn link(dofs: &mut ExtensionRegistry) -> Self::Links {
        couple(dofs)
    }

    fn evaluate(&self, ctx: &SourceContext<'_>, phyto: &Self::Links) -> (f64, ZooFluxes) {
        let z = ctx.value;
        let p = ctx.coupled_value(*phyto);
        let params = &self.0;

        let grazing = params.grazing(p, z);
        let egestion = (1.0 - params.assimilation) * grazing;
        let mortality = NpzdParams::per_second(params.zoo_mortality) * z.max(0.0);
        (
            grazing - egestion - mortality,
            ZooFluxes {
                grazing,
                egestion,
                mortality,
            },
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Detritus(pub NpzdParams);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DetritusFluxes {
    pub remineralization: f64,
}

impl SourceTerm for Detritus {
    type Fluxes = DetritusFluxes;
    type Links = (Coupled<Phytoplankton>, Coupled<Zooplankton>);

    fn link(dofs: &mut ExtensionRegistry) -> Self::Links {
        (couple(dofs), couple(dofs))
    }

    fn evaluate(&self, ctx: &SourceContext<'_>, links: &Self::Links) -> (f64, DetritusFluxes) {
        let (phyto, zoo) = *links;
        let d = ctx.value;
        let from_phyto = ctx.coupled(phyto).map_or(0.0, |p| p.fluxes.mortality);
        let from_zoo = ctx
            .coupled(zoo)
            .map_or(0.0, |z| z.fluxes.egestion + z.fluxes.mortality);
        let remineralization = NpzdParams::per_second(self.0.remineralization) * d.max(0.0);
        (
            from_phyto + from_zoo - remineralization,
            DetritusFluxes { remineralization },
        )
    }
}
