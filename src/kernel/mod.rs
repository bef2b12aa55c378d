//! Sorption/reaction kernel
//!
//! Pure, stateless functions mapping local concentration and local
//! material properties to partition coefficients, equilibrium solid
//! concentrations, isotherm slopes and reaction rates. The assembler
//! and the time-stepping engine call these per node; nothing here holds
//! state or allocates.
//!
//! # Isotherms
//!
//! | Kind       | q(C)                    | K(C) = q/C            |
//! |------------|-------------------------|-----------------------|
//! | Kd         | Kd·C                    | Kd                    |
//! | Koc·foc    | foc·10^Koc·C            | foc·10^Koc            |
//! | Freundlich | Kf·C^n                  | Kf·C^(n-1)            |
//! | Langmuir   | qmax·b·C/(1+b·C)        | qmax·b/(1+b·C)        |
//!
//! The Freundlich partition coefficient is evaluated at
//! `max(C, 1e-4·Cmax)` to avoid the singularity at C = 0 for n < 1.
//! This floor is a numerical-stability choice, not a physical cutoff.

use crate::config::{Isotherm, Kinetics, Reaction, SimulationConfig};
use crate::grid::Node;

/// Relative floor applied to the Freundlich evaluation concentration.
const FREUNDLICH_FLOOR: f64 = 1.0e-4;

/// Concentration guard used when linearizing power-law reaction rates.
const RATE_LINEARIZATION_FLOOR: f64 = 1.0e-30;

// =================================================================================================
// Isotherm functions
// =================================================================================================

/// Partition coefficient K(C) = q/C for the given isotherm.
///
/// `cmax` is the largest concentration the chemical has reached in the
/// column so far; it scales the Freundlich evaluation floor.
pub fn partition_coefficient(isotherm: &Isotherm, foc: f64, c: f64, cmax: f64) -> f64 {
    match isotherm {
        Isotherm::Kd(kd) => *kd,
        Isotherm::KocFoc { log_koc } => foc * 10f64.powf(*log_koc),
        Isotherm::Freundlich { kf, n } => {
            let floor = FREUNDLICH_FLOOR * cmax;
            let c_eval = c.max(floor);
            if c_eval <= 0.0 {
                0.0
            } else {
                kf * c_eval.powf(n - 1.0)
            }
        }
        Isotherm::Langmuir { qmax, b } => {
            let c_eval = c.max(0.0);
            qmax * b / (1.0 + b * c_eval)
        }
    }
}

/// Equilibrium solid concentration q(C) = K(C)·C.
///
/// Zero for non-positive concentrations under Freundlich (the power law
/// is undefined there).
pub fn equilibrium_solid_concentration(isotherm: &Isotherm, foc: f64, c: f64, cmax: f64) -> f64 {
    match isotherm {
        Isotherm::Freundlich { .. } if c <= 0.0 => 0.0,
        _ => partition_coefficient(isotherm, foc, c, cmax) * c,
    }
}

/// Analytic isotherm slope dq/dC.
///
/// Used both to build the nonlinear-iteration correction and to
/// assemble the linearized retardation factor
/// `R = 1 + ρ(1-e)/e · dq/dC`.
pub fn isotherm_derivative(isotherm: &Isotherm, foc: f64, c: f64, cmax: f64) -> f64 {
    match isotherm {
        Isotherm::Kd(kd) => *kd,
        Isotherm::KocFoc { log_koc } => foc * 10f64.powf(*log_koc),
        Isotherm::Freundlich { kf, n } => {
            let floor = FREUNDLICH_FLOOR * cmax;
            let c_eval = c.max(floor);
            if c_eval <= 0.0 {
                0.0
            } else {
                kf * n * c_eval.powf(n - 1.0)
            }
        }
        Isotherm::Langmuir { qmax, b } => {
            let c_eval = c.max(0.0);
            let denom = 1.0 + b * c_eval;
            qmax * b / (denom * denom)
        }
    }
}

// =================================================================================================
// Kinetic (transient) sorption
// =================================================================================================

/// First-order exchange rates for a transient sorption relation at one
/// node.
///
/// The solid-phase ODE is `dq/dt = kf·C − kb·q` with the forward rate
/// scaled to the node's bulk properties, `kf = e·ksorp/ρb`, and the
/// backward rate derived once from the equilibrium slope,
/// `kb = kf / slope`, so the kinetic law relaxes onto the same
/// equilibrium line `q = slope·C`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KineticRates {
    /// Forward rate kf \[1/T\] on the solid-phase ODE
    pub forward: f64,
    /// Backward rate kb \[1/T\]
    pub backward: f64,
}

/// Derive the kinetic exchange rates from the raw sorption rate, the
/// node porosity/bulk density and the local equilibrium slope.
pub fn kinetic_rates(ksorp: f64, porosity: f64, bulk_density: f64, slope: f64) -> KineticRates {
    let forward = porosity * ksorp / bulk_density;
    let backward = if slope > 0.0 { forward / slope } else { 0.0 };
    KineticRates { forward, backward }
}

// =================================================================================================
// Node-level aggregation
// =================================================================================================

/// Aggregated equilibrium sorption at one node for one chemical.
///
/// `storage` is the equilibrium-sorbed mass per bulk volume,
/// `Σ fᵢ·(1-e)·ρᵢ·qᵢ(C)`, over the components sorbing the chemical at
/// equilibrium; `slope` is its derivative in C. The slope feeds both
/// the linearized retardation factor and the particle-bioturbation
/// conductance of the sorbed phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeSorption {
    /// Sorbed mass per bulk volume \[M/L³\]
    pub storage: f64,
    /// d(storage)/dC \[-\]
    pub slope: f64,
}

/// Three-phase DOC mobility factor: the fraction of the apparent
/// porewater concentration that is freely dissolved (and thus
/// available to sorb). Unity when the chemical does not bind DOC.
pub fn doc_factor(kdoc: f64, doc: f64) -> f64 {
    1.0 / (1.0 + kdoc * doc)
}

/// Equilibrium sorption storage and slope at one node.
///
/// Components without a sorption relation for the chemical, and
/// components under transient kinetics (whose solid phase is explicit
/// state, not a derived quantity), contribute nothing.
pub fn node_equilibrium_sorption(
    config: &SimulationConfig,
    node: &Node,
    chemical: usize,
    c: f64,
    cmax: f64,
) -> NodeSorption {
    let docf = doc_factor(config.chemicals[chemical].kdoc, node.doc);
    let mut storage = 0.0;
    let mut slope = 0.0;

    for (component, &fraction) in node.fractions.iter().enumerate() {
        if fraction <= 0.0 {
            continue;
        }
        let Some(relation) = config.relation(component, chemical) else {
            continue;
        };
        if !matches!(relation.kinetics, Kinetics::Equilibrium) {
            continue;
        }
        let mass = fraction * (1.0 - node.porosity) * config.components[component].density;
        let foc = config.components[component].foc;
        storage +=
            mass * equilibrium_solid_concentration(&relation.isotherm, foc, c * docf, cmax) ;
        slope += mass * docf * isotherm_derivative(&relation.isotherm, foc, c * docf, cmax);
    }

    NodeSorption { storage, slope }
}

/// Solid concentration on one component at a node \[M/M\]: the
/// equilibrium-derived value under equilibrium kinetics, or the
/// explicit kinetic state when one is supplied.
pub fn component_solid_concentration(
    config: &SimulationConfig,
    node: &Node,
    component: usize,
    chemical: usize,
    c: f64,
    cmax: f64,
    kinetic_q: Option<f64>,
) -> f64 {
    let Some(relation) = config.relation(component, chemical) else {
        return 0.0;
    };
    match relation.kinetics {
        Kinetics::Equilibrium => {
            let docf = doc_factor(config.chemicals[chemical].kdoc, node.doc);
            let foc = config.components[component].foc;
            equilibrium_solid_concentration(&relation.isotherm, foc, c * docf, cmax)
        }
        Kinetics::Transient { .. } => kinetic_q.unwrap_or(0.0),
    }
}

// =================================================================================================
// Reaction rates
// =================================================================================================

/// Reaction rate `λ · Π Cᵢ^orderᵢ` over reactants with nonzero order.
///
/// `layer_rate` is the layer-specific rate constant; zero makes the
/// reaction inactive in that layer and short-circuits the product.
/// Negative concentrations are clamped to zero inside the power law.
pub fn reaction_rate(reaction: &Reaction, layer_rate: f64, concentrations: &[f64]) -> f64 {
    if layer_rate == 0.0 {
        return 0.0;
    }
    let mut rate = layer_rate;
    for term in &reaction.reactants {
        if term.order == 0.0 {
            continue;
        }
        let c = concentrations[term.chemical].max(0.0);
        if c == 0.0 {
            return 0.0;
        }
        rate *= c.powf(term.order);
    }
    rate
}

/// Partial derivative of the reaction rate with respect to one
/// chemical's concentration, evaluated at the given concentrations.
///
/// For `r = λ·Π Cᵢ^orderᵢ` the derivative in species j is
/// `λ·order_j·C_j^(order_j−1)·Π_{i≠j} Cᵢ^orderᵢ`. The power is built
/// directly rather than as `order·r/C` so first-order terms keep their
/// finite derivative at C = 0 (where the rate itself vanishes); for
/// fractional orders the evaluation concentration is floored to keep
/// the linearization finite.
pub fn reaction_rate_derivative(
    reaction: &Reaction,
    layer_rate: f64,
    concentrations: &[f64],
    chemical: usize,
) -> f64 {
    let order = reaction
        .reactants
        .iter()
        .find(|t| t.chemical == chemical)
        .map(|t| t.order)
        .unwrap_or(0.0);
    if order == 0.0 || layer_rate == 0.0 {
        return 0.0;
    }

    let mut derivative = layer_rate * order;
    for term in &reaction.reactants {
        if term.order == 0.0 {
            continue;
        }
        let c = concentrations[term.chemical].max(0.0);
        if term.chemical == chemical {
            if (term.order - 1.0).abs() > f64::EPSILON {
                derivative *= c.max(RATE_LINEARIZATION_FLOOR).powf(term.order - 1.0);
            }
        } else {
            if c == 0.0 {
                return 0.0;
            }
            derivative *= c.powf(term.order);
        }
    }
    derivative
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReactionProduct, ReactionTerm};
    use approx::assert_relative_eq;

    #[test]
    fn test_kd_partition_is_constant() {
        let isotherm = Isotherm::Kd(2.5);
        assert_eq!(partition_coefficient(&isotherm, 0.0, 0.0, 1.0), 2.5);
        assert_eq!(partition_coefficient(&isotherm, 0.0, 10.0, 1.0), 2.5);
    }

    #[test]
    fn test_koc_foc_partition() {
        let isotherm = Isotherm::KocFoc { log_koc: 3.0 };
        assert_relative_eq!(
            partition_coefficient(&isotherm, 0.01, 1.0, 1.0),
            0.01 * 1000.0
        );
    }

    #[test]
    fn test_freundlich_floor_prevents_singularity() {
        // n < 1 makes K(C) = Kf·C^(n-1) blow up at C = 0; the floor at
        // 1e-4·Cmax keeps it finite.
        let isotherm = Isotherm::Freundlich { kf: 10.0, n: 0.5 };
        let cmax = 2.0;

        let at_zero = partition_coefficient(&isotherm, 0.0, 0.0, cmax);
        let at_floor = partition_coefficient(&isotherm, 0.0, 1.0e-4 * cmax, cmax);

        assert!(at_zero.is_finite());
        assert_relative_eq!(at_zero, at_floor);
    }

    #[test]
    fn test_langmuir_partition_decreases_with_concentration() {
        let isotherm = Isotherm::Langmuir { qmax: 5.0, b: 2.0 };
        let k0 = partition_coefficient(&isotherm, 0.0, 0.0, 1.0);
        let k1 = partition_coefficient(&isotherm, 0.0, 1.0, 1.0);

        assert_relative_eq!(k0, 10.0); // qmax·b at C = 0
        assert!(k1 < k0);
    }

    #[test]
    fn test_equilibrium_solid_concentration_is_zero_at_zero() {
        // Required property: q(0) = 0 for all isotherm kinds.
        let isotherms = [
            Isotherm::Kd(2.0),
            Isotherm::KocFoc { log_koc: 3.0 },
            Isotherm::Freundlich { kf: 10.0, n: 0.7 },
            Isotherm::Langmuir { qmax: 5.0, b: 2.0 },
        ];
        for isotherm in &isotherms {
            assert_eq!(
                equilibrium_solid_concentration(isotherm, 0.01, 0.0, 1.0),
                0.0
            );
        }
    }

    #[test]
    fn test_partition_coefficient_non_negative() {
        let isotherms = [
            Isotherm::Kd(2.0),
            Isotherm::KocFoc { log_koc: 3.0 },
            Isotherm::Freundlich { kf: 10.0, n: 0.7 },
            Isotherm::Langmuir { qmax: 5.0, b: 2.0 },
        ];
        for isotherm in &isotherms {
            for &c in &[0.0, 1.0e-6, 0.1, 1.0, 100.0] {
                assert!(partition_coefficient(isotherm, 0.01, c, 100.0) >= 0.0);
            }
        }
    }

    #[test]
    fn test_freundlich_solid_concentration_zero_below_zero() {
        let isotherm = Isotherm::Freundlich { kf: 10.0, n: 0.7 };
        assert_eq!(equilibrium_solid_concentration(&isotherm, 0.0, -1.0, 1.0), 0.0);
    }

    #[test]
    fn test_isotherm_derivative_matches_finite_difference() {
        let isotherms = [
            Isotherm::Freundlich { kf: 10.0, n: 0.7 },
            Isotherm::Langmuir { qmax: 5.0, b: 2.0 },
        ];
        let c = 0.5;
        let h = 1.0e-7;

        for isotherm in &isotherms {
            let analytic = isotherm_derivative(isotherm, 0.0, c, 1.0);
            let numeric = (equilibrium_solid_concentration(isotherm, 0.0, c + h, 1.0)
                - equilibrium_solid_concentration(isotherm, 0.0, c - h, 1.0))
                / (2.0 * h);
            assert_relative_eq!(analytic, numeric, max_relative = 1.0e-5);
        }
    }

    #[test]
    fn test_kinetic_rates_relax_to_equilibrium_line() {
        let rates = kinetic_rates(0.05, 0.4, 1.56, 2.0);

        // At equilibrium kf·C = kb·q, so q/C = kf/kb = slope.
        assert_relative_eq!(rates.forward / rates.backward, 2.0);
        assert_relative_eq!(rates.forward, 0.4 * 0.05 / 1.56);
    }

    #[test]
    fn test_kinetic_rates_zero_slope() {
        let rates = kinetic_rates(0.05, 0.4, 1.56, 0.0);
        assert_eq!(rates.backward, 0.0);
    }

    fn decay_reaction() -> Reaction {
        Reaction {
            name: "decay".to_string(),
            reactants: vec![ReactionTerm {
                chemical: 0,
                stoichiometry: 1.0,
                order: 1.0,
            }],
            products: vec![],
            rates: vec![0.1],
        }
    }

    #[test]
    fn test_first_order_reaction_rate() {
        let reaction = decay_reaction();
        assert_relative_eq!(reaction_rate(&reaction, 0.1, &[2.0]), 0.2);
    }

    #[test]
    fn test_zero_layer_rate_makes_reaction_inactive() {
        let reaction = decay_reaction();
        assert_eq!(reaction_rate(&reaction, 0.0, &[2.0]), 0.0);
    }

    #[test]
    fn test_multi_species_fractional_order_rate() {
        let reaction = Reaction {
            name: "oxidation".to_string(),
            reactants: vec![
                ReactionTerm {
                    chemical: 0,
                    stoichiometry: 1.0,
                    order: 1.0,
                },
                ReactionTerm {
                    chemical: 1,
                    stoichiometry: 0.5,
                    order: 0.5,
                },
            ],
            products: vec![ReactionProduct {
                chemical: 2,
                yield_coefficient: 1.0,
            }],
            rates: vec![2.0],
        };

        let concentrations = [3.0, 4.0, 0.0];
        // λ · C0^1 · C1^0.5 = 2 · 3 · 2 = 12
        assert_relative_eq!(reaction_rate(&reaction, 2.0, &concentrations), 12.0);
    }

    #[test]
    fn test_reaction_rate_derivative() {
        let reaction = decay_reaction();
        // r = 0.1·C, dr/dC = 0.1 independent of C
        assert_relative_eq!(
            reaction_rate_derivative(&reaction, 0.1, &[2.0], 0),
            0.1
        );
        // species not in the reaction: derivative is zero
        let two_species = [2.0, 1.0];
        assert_eq!(
            reaction_rate_derivative(&reaction, 0.1, &two_species, 1),
            0.0
        );
    }

    #[test]
    fn test_negative_concentration_clamped_in_rate() {
        let reaction = decay_reaction();
        assert_eq!(reaction_rate(&reaction, 0.1, &[-1.0]), 0.0);
    }

    // ====== Node-level aggregation ======

    use crate::config::{
        Advection, BoundaryConditions, BottomBoundary, Chemical, Component, Layer,
        LayerDiscretization, SimulationConfig, SolverOptions, SorptionRelation, TopBoundary,
        TortuosityModel,
    };
    use crate::grid::Grid;

    fn sorbing_config(kinetics: Kinetics) -> SimulationConfig {
        SimulationConfig {
            chemicals: vec![Chemical::new("pcb", 4.0e-6)],
            components: vec![Component {
                name: "sand".to_string(),
                porosity: 0.4,
                density: 2.5,
                foc: 0.01,
                tortuosity: TortuosityModel::Identity,
            }],
            layers: vec![Layer {
                name: "cap".to_string(),
                thickness: 0.1,
                components: vec![(0, 1.0)],
                discretization: LayerDiscretization::NodeCount(4),
                dispersivity: 0.0,
                doc: 0.0,
            }],
            sorption: vec![SorptionRelation {
                component: 0,
                chemical: 0,
                isotherm: Isotherm::Kd(2.0),
                kinetics,
            }],
            reactions: vec![],
            boundaries: vec![BoundaryConditions {
                top: TopBoundary::FixedConcentration(0.0),
                bottom: BottomBoundary::ZeroGradient,
            }],
            initial_conditions: vec![],
            solid_initial_conditions: vec![],
            advection: Advection::None,
            consolidation: None,
            deposition: None,
            bioturbation: None,
            options: SolverOptions::new(1.0, 10, 5),
        }
    }

    #[test]
    fn test_node_equilibrium_sorption_linear() {
        let config = sorbing_config(Kinetics::Equilibrium);
        let grid = Grid::build(&config).unwrap();
        let node = grid.node(0);

        let sorption = node_equilibrium_sorption(&config, node, 0, 1.0, 1.0);

        // storage = (1-e)·ρ·Kd·C, slope = (1-e)·ρ·Kd
        let bulk = 0.6 * 2.5;
        assert_relative_eq!(sorption.storage, bulk * 2.0);
        assert_relative_eq!(sorption.slope, bulk * 2.0);
    }

    #[test]
    fn test_transient_relation_excluded_from_equilibrium_storage() {
        let config = sorbing_config(Kinetics::Transient { ksorp: 0.1 });
        let grid = Grid::build(&config).unwrap();

        let sorption = node_equilibrium_sorption(&config, grid.node(0), 0, 1.0, 1.0);
        assert_eq!(sorption.storage, 0.0);
        assert_eq!(sorption.slope, 0.0);
    }

    #[test]
    fn test_component_solid_concentration_kinetic_uses_state() {
        let config = sorbing_config(Kinetics::Transient { ksorp: 0.1 });
        let grid = Grid::build(&config).unwrap();

        let q = component_solid_concentration(&config, grid.node(0), 0, 0, 1.0, 1.0, Some(0.7));
        assert_relative_eq!(q, 0.7);
    }

    #[test]
    fn test_doc_factor_reduces_sorption() {
        let mut config = sorbing_config(Kinetics::Equilibrium);
        config.chemicals[0].kdoc = 10.0;
        config.layers[0].doc = 0.1;
        let grid = Grid::build(&config).unwrap();

        let with_doc = node_equilibrium_sorption(&config, grid.node(0), 0, 1.0, 1.0);
        assert_relative_eq!(with_doc.slope, 0.6 * 2.5 * 2.0 / 2.0);
    }
}
