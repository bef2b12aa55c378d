//! Configuration model
//!
//! Immutable, plain-data description of a simulation: chemicals, solid
//! matrix components, layers, sorption relations, the reaction network,
//! boundary/initial conditions, forcings and solver options.
//!
//! # Design
//!
//! The configuration is the "WHAT to solve": it carries no solver
//! state, no rendering concerns and no global paths. The core treats it
//! as read-only input for the whole run; a batch of runs shares it
//! freely because nothing here is mutated.
//!
//! Every selection that used to be a string-valued "kind" field in
//! legacy tools (isotherm name, boundary type, advection mode) is a
//! tagged enum here, so the solver matches exhaustively and the compiler
//! rejects incomplete handling.
//!
//! # Validation
//!
//! [`SimulationConfig::validate`] performs all pre-run configuration
//! checks: dangling layer→component and relation→chemical references,
//! component fraction sums, per-layer reaction-rate table lengths, and
//! discretization sanity. Validation failures are
//! [`SimulationError::Configuration`] and are reported before any time
//! stepping or allocation.

use crate::error::SimulationError;

// =================================================================================================
// Chemicals and solid components
// =================================================================================================

/// A transported chemical species.
#[derive(Debug, Clone, PartialEq)]
pub struct Chemical {
    /// Display name, also used in error messages
    pub name: String,
    /// Free-water molecular diffusivity Dw \[L²/T\]
    pub diffusivity: f64,
    /// Whether the species is dissolved (insoluble species are carried
    /// on particles only and see no porewater diffusion)
    pub soluble: bool,
    /// DOC binding coefficient \[L³/M\]; zero disables the
    /// three-phase DOC correction
    pub kdoc: f64,
}

impl Chemical {
    /// Create a soluble chemical with no DOC binding.
    pub fn new(name: impl Into<String>, diffusivity: f64) -> Self {
        Self {
            name: name.into(),
            diffusivity,
            soluble: true,
            kdoc: 0.0,
        }
    }

    /// Set the DOC binding coefficient.
    pub fn with_kdoc(mut self, kdoc: f64) -> Self {
        self.kdoc = kdoc;
        self
    }
}

/// A solid matrix component (sand, organic matter, activated carbon...).
///
/// Layers are built as volume-fraction mixtures of components; all bulk
/// node properties derive from the mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    /// Porosity of the pure component bed
    pub porosity: f64,
    /// Particle density \[M/L³\]
    pub density: f64,
    /// Organic carbon mass fraction
    pub foc: f64,
    /// Tortuosity model used to correct free-water diffusivity
    pub tortuosity: TortuosityModel,
}

/// Porosity-dependent tortuosity correction applied to free-water
/// diffusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TortuosityModel {
    /// Millington–Quirk: `e^(4/3)`
    MillingtonQuirk,
    /// Boudreau: `1 / (1 - 2 ln e)`
    Boudreau,
    /// No correction
    Identity,
}

impl TortuosityModel {
    /// Tortuosity factor at porosity `e`, multiplying Dw.
    pub fn factor(&self, porosity: f64) -> f64 {
        match self {
            TortuosityModel::MillingtonQuirk => porosity.powf(4.0 / 3.0),
            TortuosityModel::Boudreau => 1.0 / (1.0 - 2.0 * porosity.ln()),
            TortuosityModel::Identity => 1.0,
        }
    }
}

// =================================================================================================
// Layers
// =================================================================================================

/// Node spacing within one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerDiscretization {
    /// Target node spacing \[L\]; rounded up to a whole number of
    /// uniform sub-intervals covering the layer
    FixedSpacing(f64),
    /// A fixed count of uniform sub-intervals
    NodeCount(usize),
}

/// One layer of the sediment/cap column, top first.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Layer thickness \[L\]
    pub thickness: f64,
    /// Mixture of solid components: (component index, volume fraction).
    /// Fractions must sum to 1.
    pub components: Vec<(usize, f64)>,
    pub discretization: LayerDiscretization,
    /// Longitudinal dispersivity α \[L\]
    pub dispersivity: f64,
    /// Dissolved organic carbon concentration in porewater \[M/L³\]
    pub doc: f64,
}

// =================================================================================================
// Sorption
// =================================================================================================

/// Isotherm relating porewater concentration to equilibrium solid
/// concentration for one (component, chemical) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Isotherm {
    /// Linear: q = Kd·C
    Kd(f64),
    /// Linear via organic carbon: q = foc·10^log_koc·C
    KocFoc { log_koc: f64 },
    /// Freundlich: q = Kf·C^n
    Freundlich { kf: f64, n: f64 },
    /// Langmuir: q = qmax·b·C / (1 + b·C)
    Langmuir { qmax: f64, b: f64 },
}

impl Isotherm {
    /// Whether the isotherm slope depends on concentration.
    pub fn is_nonlinear(&self) -> bool {
        match self {
            Isotherm::Kd(_) | Isotherm::KocFoc { .. } => false,
            Isotherm::Freundlich { n, .. } => (*n - 1.0).abs() > f64::EPSILON,
            Isotherm::Langmuir { .. } => true,
        }
    }
}

/// Sorption kinetics for one (component, chemical) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kinetics {
    /// Local equilibrium: solid concentration is a derived quantity
    Equilibrium,
    /// First-order exchange with forward rate `ksorp` \[1/T\]; the
    /// backward rate is derived once from the equilibrium slope so the
    /// kinetic law relaxes onto the equilibrium line
    Transient { ksorp: f64 },
}

/// Sorption relation for one (component, chemical) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SorptionRelation {
    pub component: usize,
    pub chemical: usize,
    pub isotherm: Isotherm,
    pub kinetics: Kinetics,
}

// =================================================================================================
// Reactions
// =================================================================================================

/// One reactant term of a reaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionTerm {
    pub chemical: usize,
    /// Stoichiometric coefficient (consumption per unit rate)
    pub stoichiometry: f64,
    /// Reaction order in this species; zero-order species do not enter
    /// the rate product
    pub order: f64,
}

/// One product term of a reaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionProduct {
    pub chemical: usize,
    /// Yield coefficient (production per unit rate)
    pub yield_coefficient: f64,
}

/// A chemical reaction with per-layer rate constants.
///
/// Rate law: `λ_layer · Π Cᵢ^orderᵢ` over reactants with nonzero order.
/// A zero layer coefficient makes the reaction inactive in that layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub name: String,
    pub reactants: Vec<ReactionTerm>,
    pub products: Vec<ReactionProduct>,
    /// One rate constant per layer, same order as `SimulationConfig::layers`
    pub rates: Vec<f64>,
}

// =================================================================================================
// Boundary conditions
// =================================================================================================

/// Top (sediment–water interface) boundary condition for one chemical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopBoundary {
    /// Dirichlet: fixed surface concentration
    FixedConcentration(f64),
    /// Robin: benthic boundary-layer mass transfer against a fixed
    /// overlying water concentration
    MassTransfer {
        coefficient: f64,
        water_concentration: f64,
    },
    /// Zero-dimensional mixed water column coupled to the top node,
    /// with its own inflow/outflow/decay/evaporation mass balance
    FiniteMixedWaterColumn {
        initial_concentration: f64,
        /// Water column depth \[L\]
        depth: f64,
        /// Hydraulic retention time τ \[T\]
        retention_time: f64,
        /// First-order decay rate \[1/T\]
        decay_rate: f64,
        /// Evaporation rate \[1/T\]
        evaporation_rate: f64,
    },
}

/// Bottom boundary condition for one chemical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BottomBoundary {
    /// Dirichlet: fixed concentration in the underlying sediment
    FixedConcentration(f64),
    /// Flux continuity into a semi-infinite underlying medium
    FluxMatching,
    /// Reflecting: no diffusive flux through the bottom
    ZeroGradient,
}

/// Boundary condition pair for one chemical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryConditions {
    pub top: TopBoundary,
    pub bottom: BottomBoundary,
}

// =================================================================================================
// Initial conditions
// =================================================================================================

/// Initial porewater profile within one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialProfile {
    Uniform(f64),
    /// Linear from the layer top value to the layer bottom value
    Linear { top: f64, bottom: f64 },
}

impl InitialProfile {
    /// Evaluate at relative depth `s ∈ [0, 1]` within the layer.
    pub fn evaluate(&self, s: f64) -> f64 {
        match self {
            InitialProfile::Uniform(c) => *c,
            InitialProfile::Linear { top, bottom } => top + (bottom - top) * s,
        }
    }
}

/// Initial porewater condition keyed by (layer, chemical).
#[derive(Debug, Clone, PartialEq)]
pub struct InitialCondition {
    pub layer: usize,
    pub chemical: usize,
    pub profile: InitialProfile,
}

/// Initial kinetic solid concentration keyed by (layer, component,
/// chemical). Only meaningful for relations with `Kinetics::Transient`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidInitialCondition {
    pub layer: usize,
    pub component: usize,
    pub chemical: usize,
    pub value: f64,
}

// =================================================================================================
// Forcings
// =================================================================================================

/// Porewater advection mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advection {
    /// No flow
    None,
    /// Constant Darcy velocity \[L/T\], positive downward
    Steady(f64),
    /// Mean Darcy velocity plus a tidal oscillation of the given
    /// amplitude and period
    Periodic {
        mean: f64,
        amplitude: f64,
        period: f64,
    },
}

impl Advection {
    /// Mean (time-averaged) Darcy velocity.
    pub fn mean_velocity(&self) -> f64 {
        match self {
            Advection::None => 0.0,
            Advection::Steady(v) => *v,
            Advection::Periodic { mean, .. } => *mean,
        }
    }

    /// Tidal period, if the mode is periodic.
    pub fn period(&self) -> Option<f64> {
        match self {
            Advection::Periodic { period, .. } => Some(*period),
            _ => None,
        }
    }
}

/// Consolidation of an underlying deposit: a decaying upward expulsion
/// of porewater parameterized by total settlement and the time to 90 %
/// completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consolidation {
    /// Total consolidation settlement hcon \[L\]
    pub settlement: f64,
    /// Time at which 90 % of the settlement is expressed \[T\]
    pub t90: f64,
}

/// Continuous deposition of new sediment at the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deposition {
    /// Deposition rate Vdep \[L/T\]
    pub rate: f64,
    /// Index into `SimulationConfig::layers` describing the deposited
    /// material (thickness of that layer entry is ignored; its
    /// discretization sets the deposition cell size)
    pub layer: usize,
}

/// Bioturbation depth profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BioturbationProfile {
    /// Full mixing intensity over the bioturbation depth, none below
    Uniform,
    /// Gaussian decay of intensity with depth
    Gaussian { sigma: f64 },
}

/// Biologically driven particle and porewater mixing near the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bioturbation {
    /// Particle biodiffusion coefficient \[L²/T\]
    pub particle_coefficient: f64,
    /// Porewater biodiffusion coefficient \[L²/T\]
    pub porewater_coefficient: f64,
    /// Bioturbation depth hbio \[L\]
    pub depth: f64,
    pub profile: BioturbationProfile,
}

impl Bioturbation {
    /// Mixing intensity weight at depth `z` below the current surface.
    pub fn weight(&self, z: f64) -> f64 {
        if z < 0.0 {
            return 0.0;
        }
        match self.profile {
            BioturbationProfile::Uniform => {
                if z <= self.depth {
                    1.0
                } else {
                    0.0
                }
            }
            BioturbationProfile::Gaussian { sigma } => (-0.5 * (z / sigma).powi(2)).exp(),
        }
    }
}

// =================================================================================================
// Solver options
// =================================================================================================

/// Time weighting of the transport operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWeighting {
    /// Fully implicit (backward Euler), unconditionally stable
    Implicit,
    /// Crank–Nicolson (time-centered), second-order accurate
    CrankNicolson,
}

impl TimeWeighting {
    /// Implicitness factor θ.
    pub fn theta(&self) -> f64 {
        match self {
            TimeWeighting::Implicit => 1.0,
            TimeWeighting::CrankNicolson => 0.5,
        }
    }
}

/// Output sampling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingMode {
    /// Interpolate raw steps onto each requested output time
    Instantaneous,
    /// Average all raw sub-steps over one tidal period and store the
    /// mean at the period midpoint; requires periodic advection
    PeriodAverage,
}

/// Numerical options for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Final simulation time tfinal \[T\]
    pub final_time: f64,
    /// Number of raw time steps
    pub time_steps: usize,
    /// Number of requested output intervals
    pub output_steps: usize,
    pub weighting: TimeWeighting,
    /// Relative-change tolerance of the nonlinear fixed-point loop
    pub nonlinear_tolerance: f64,
    pub averaging: AveragingMode,
}

impl SolverOptions {
    /// Sensible defaults: implicit weighting, instantaneous sampling.
    pub fn new(final_time: f64, time_steps: usize, output_steps: usize) -> Self {
        Self {
            final_time,
            time_steps,
            output_steps,
            weighting: TimeWeighting::Implicit,
            nonlinear_tolerance: 1e-6,
            averaging: AveragingMode::Instantaneous,
        }
    }
}

// =================================================================================================
// Simulation configuration
// =================================================================================================

/// Complete, immutable description of one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub chemicals: Vec<Chemical>,
    pub components: Vec<Component>,
    /// Layers ordered top first
    pub layers: Vec<Layer>,
    pub sorption: Vec<SorptionRelation>,
    pub reactions: Vec<Reaction>,
    /// One boundary-condition pair per chemical, same order as `chemicals`
    pub boundaries: Vec<BoundaryConditions>,
    pub initial_conditions: Vec<InitialCondition>,
    pub solid_initial_conditions: Vec<SolidInitialCondition>,
    pub advection: Advection,
    pub consolidation: Option<Consolidation>,
    pub deposition: Option<Deposition>,
    pub bioturbation: Option<Bioturbation>,
    pub options: SolverOptions,
}

impl SimulationConfig {
    /// Look up the sorption relation for a (component, chemical) pair.
    pub fn relation(&self, component: usize, chemical: usize) -> Option<&SorptionRelation> {
        self.sorption
            .iter()
            .find(|r| r.component == component && r.chemical == chemical)
    }

    /// Look up the initial porewater profile for a (layer, chemical)
    /// pair; missing entries default to a uniform zero profile.
    pub fn initial_profile(&self, layer: usize, chemical: usize) -> InitialProfile {
        self.initial_conditions
            .iter()
            .find(|ic| ic.layer == layer && ic.chemical == chemical)
            .map(|ic| ic.profile)
            .unwrap_or(InitialProfile::Uniform(0.0))
    }

    /// Look up the initial kinetic solid concentration for a
    /// (layer, component, chemical) triple; defaults to zero.
    pub fn solid_initial(&self, layer: usize, component: usize, chemical: usize) -> f64 {
        self.solid_initial_conditions
            .iter()
            .find(|ic| ic.layer == layer && ic.component == component && ic.chemical == chemical)
            .map(|ic| ic.value)
            .unwrap_or(0.0)
    }

    /// Whether any sorption relation or reaction makes the per-step
    /// system nonlinear, requiring the fixed-point loop.
    pub fn is_nonlinear(&self) -> bool {
        let nonlinear_sorption = self.sorption.iter().any(|r| r.isotherm.is_nonlinear());
        let nonlinear_reaction = self.reactions.iter().any(|r| {
            r.reactants
                .iter()
                .any(|t| t.order != 0.0 && (t.order - 1.0).abs() > f64::EPSILON)
                || r.reactants.iter().filter(|t| t.order != 0.0).count() > 1
        });
        let coupled_products = self.reactions.iter().any(|r| !r.products.is_empty());
        nonlinear_sorption || nonlinear_reaction || coupled_products
    }

    /// Validate all cross-references and structural invariants.
    ///
    /// Called by the driver before grid construction; any failure is a
    /// [`SimulationError::Configuration`] and no stepping occurs.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.chemicals.is_empty() {
            return Err(SimulationError::config("no chemicals defined"));
        }
        if self.layers.is_empty() {
            return Err(SimulationError::config("no layers defined"));
        }
        if self.boundaries.len() != self.chemicals.len() {
            return Err(SimulationError::config(format!(
                "expected {} boundary-condition entries (one per chemical), got {}",
                self.chemicals.len(),
                self.boundaries.len()
            )));
        }

        for layer in &self.layers {
            if layer.thickness <= 0.0 {
                return Err(SimulationError::config(format!(
                    "layer '{}' has non-positive thickness {}",
                    layer.name, layer.thickness
                )));
            }
            if layer.components.is_empty() {
                return Err(SimulationError::config(format!(
                    "layer '{}' has no solid components",
                    layer.name
                )));
            }
            let mut fraction_sum = 0.0;
            for &(component, fraction) in &layer.components {
                if component >= self.components.len() {
                    return Err(SimulationError::config(format!(
                        "layer '{}' references undefined component index {}",
                        layer.name, component
                    )));
                }
                if fraction < 0.0 {
                    return Err(SimulationError::config(format!(
                        "layer '{}' has negative fraction for component '{}'",
                        layer.name, self.components[component].name
                    )));
                }
                fraction_sum += fraction;
            }
            if (fraction_sum - 1.0).abs() > 1e-9 {
                return Err(SimulationError::config(format!(
                    "layer '{}' component fractions sum to {}, expected 1",
                    layer.name, fraction_sum
                )));
            }
            match layer.discretization {
                LayerDiscretization::FixedSpacing(h) if h <= 0.0 => {
                    return Err(SimulationError::config(format!(
                        "layer '{}' has non-positive node spacing {}",
                        layer.name, h
                    )));
                }
                LayerDiscretization::NodeCount(0) => {
                    return Err(SimulationError::config(format!(
                        "layer '{}' has zero sub-intervals",
                        layer.name
                    )));
                }
                _ => {}
            }
        }

        for relation in &self.sorption {
            if relation.component >= self.components.len() {
                return Err(SimulationError::config(format!(
                    "sorption relation references undefined component index {}",
                    relation.component
                )));
            }
            if relation.chemical >= self.chemicals.len() {
                return Err(SimulationError::config(format!(
                    "sorption relation references undefined chemical index {}",
                    relation.chemical
                )));
            }
            if let Kinetics::Transient { ksorp } = relation.kinetics {
                if ksorp <= 0.0 {
                    return Err(SimulationError::config(format!(
                        "transient sorption of '{}' on '{}' needs a positive rate, got {}",
                        self.chemicals[relation.chemical].name,
                        self.components[relation.component].name,
                        ksorp
                    )));
                }
            }
        }

        for reaction in &self.reactions {
            if reaction.rates.len() != self.layers.len() {
                return Err(SimulationError::config(format!(
                    "reaction '{}' has {} layer rates, expected {}",
                    reaction.name,
                    reaction.rates.len(),
                    self.layers.len()
                )));
            }
            for term in &reaction.reactants {
                if term.chemical >= self.chemicals.len() {
                    return Err(SimulationError::config(format!(
                        "reaction '{}' references undefined chemical index {}",
                        reaction.name, term.chemical
                    )));
                }
            }
            for product in &reaction.products {
                if product.chemical >= self.chemicals.len() {
                    return Err(SimulationError::config(format!(
                        "reaction '{}' produces undefined chemical index {}",
                        reaction.name, product.chemical
                    )));
                }
            }
        }

        for ic in &self.initial_conditions {
            if ic.layer >= self.layers.len() || ic.chemical >= self.chemicals.len() {
                return Err(SimulationError::config(
                    "initial condition references an undefined layer or chemical",
                ));
            }
        }

        if let Some(deposition) = &self.deposition {
            if deposition.layer >= self.layers.len() {
                return Err(SimulationError::config(format!(
                    "deposition references undefined layer index {}",
                    deposition.layer
                )));
            }
            if deposition.rate < 0.0 {
                return Err(SimulationError::config(format!(
                    "deposition rate must be non-negative, got {}",
                    deposition.rate
                )));
            }
        }

        if let Some(consolidation) = &self.consolidation {
            if consolidation.t90 <= 0.0 {
                return Err(SimulationError::config(format!(
                    "consolidation t90 must be positive, got {}",
                    consolidation.t90
                )));
            }
        }

        let options = &self.options;
        if options.final_time <= 0.0 {
            return Err(SimulationError::config("final time must be positive"));
        }
        if options.time_steps == 0 {
            return Err(SimulationError::config("time steps must be positive"));
        }
        if options.output_steps == 0 {
            return Err(SimulationError::config("output steps must be positive"));
        }
        if options.nonlinear_tolerance <= 0.0 {
            return Err(SimulationError::config(
                "nonlinear tolerance must be positive",
            ));
        }
        if options.averaging == AveragingMode::PeriodAverage
            && self.advection.period().is_none()
        {
            return Err(SimulationError::config(
                "period-averaged output requires periodic advection",
            ));
        }

        Ok(())
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sand() -> Component {
        Component {
            name: "sand".to_string(),
            porosity: 0.4,
            density: 2.6,
            foc: 0.001,
            tortuosity: TortuosityModel::MillingtonQuirk,
        }
    }

    fn single_layer_config() -> SimulationConfig {
        SimulationConfig {
            chemicals: vec![Chemical::new("naphthalene", 6.0e-6)],
            components: vec![sand()],
            layers: vec![Layer {
                name: "cap".to_string(),
                thickness: 0.3,
                components: vec![(0, 1.0)],
                discretization: LayerDiscretization::NodeCount(30),
                dispersivity: 0.0,
                doc: 0.0,
            }],
            sorption: vec![],
            reactions: vec![],
            boundaries: vec![BoundaryConditions {
                top: TopBoundary::FixedConcentration(1.0),
                bottom: BottomBoundary::ZeroGradient,
            }],
            initial_conditions: vec![],
            solid_initial_conditions: vec![],
            advection: Advection::None,
            consolidation: None,
            deposition: None,
            bioturbation: None,
            options: SolverOptions::new(100.0, 1000, 10),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(single_layer_config().validate().is_ok());
    }

    #[test]
    fn test_undefined_component_is_configuration_error() {
        let mut config = single_layer_config();
        config.layers[0].components = vec![(5, 1.0)];

        let err = config.validate().unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
        assert!(err.to_string().contains("undefined component"));
    }

    #[test]
    fn test_fraction_sum_must_be_one() {
        let mut config = single_layer_config();
        config.layers[0].components = vec![(0, 0.7)];

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 0.7"));
    }

    #[test]
    fn test_boundary_table_must_cover_all_chemicals() {
        let mut config = single_layer_config();
        config.chemicals.push(Chemical::new("pyrene", 5.0e-6));

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_period_average_requires_periodic_advection() {
        let mut config = single_layer_config();
        config.options.averaging = AveragingMode::PeriodAverage;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("periodic advection"));
    }

    #[test]
    fn test_reaction_rate_table_length() {
        let mut config = single_layer_config();
        config.reactions.push(Reaction {
            name: "decay".to_string(),
            reactants: vec![ReactionTerm {
                chemical: 0,
                stoichiometry: 1.0,
                order: 1.0,
            }],
            products: vec![],
            rates: vec![0.01, 0.02], // two rates, one layer
        });

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("layer rates"));
    }

    #[test]
    fn test_tortuosity_factors() {
        let e: f64 = 0.5;
        assert!((TortuosityModel::MillingtonQuirk.factor(e) - e.powf(4.0 / 3.0)).abs() < 1e-12);
        assert!(
            (TortuosityModel::Boudreau.factor(e) - 1.0 / (1.0 - 2.0 * e.ln())).abs() < 1e-12
        );
        assert_eq!(TortuosityModel::Identity.factor(e), 1.0);
    }

    #[test]
    fn test_nonlinearity_detection() {
        let mut config = single_layer_config();
        assert!(!config.is_nonlinear());

        config.sorption.push(SorptionRelation {
            component: 0,
            chemical: 0,
            isotherm: Isotherm::Freundlich { kf: 10.0, n: 0.8 },
            kinetics: Kinetics::Equilibrium,
        });
        assert!(config.is_nonlinear());

        config.sorption[0].isotherm = Isotherm::Kd(2.0);
        assert!(!config.is_nonlinear());
    }

    #[test]
    fn test_linear_profile_evaluation() {
        let profile = InitialProfile::Linear {
            top: 1.0,
            bottom: 3.0,
        };
        assert!((profile.evaluate(0.0) - 1.0).abs() < 1e-12);
        assert!((profile.evaluate(0.5) - 2.0).abs() < 1e-12);
        assert!((profile.evaluate(1.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_bioturbation_weight_profiles() {
        let uniform = Bioturbation {
            particle_coefficient: 1e-5,
            porewater_coefficient: 1e-5,
            depth: 0.1,
            profile: BioturbationProfile::Uniform,
        };
        assert_eq!(uniform.weight(0.05), 1.0);
        assert_eq!(uniform.weight(0.2), 0.0);

        let gaussian = Bioturbation {
            profile: BioturbationProfile::Gaussian { sigma: 0.05 },
            ..uniform
        };
        assert!(gaussian.weight(0.0) > gaussian.weight(0.05));
        assert!(gaussian.weight(0.05) > gaussian.weight(0.2));
    }
}
