//! Output series and field conversion
//!
//! [`FieldSnapshot`] is the converter's product: one instant of raw
//! solver state mapped into the named physical fields. The accumulator
//! interpolates or averages snapshots onto the output time grid and
//! packs them into the final [`OutputSeries`].

use std::collections::HashMap;

use nalgebra::DVector;
use ndarray::{Array2, Array3, Array4};

use crate::config::{SimulationConfig, TopBoundary};
use crate::grid::Grid;
use crate::kernel;
use crate::solver::assemble::flux_profile;
use crate::solver::engine::ColumnState;

// =================================================================================================
// Field snapshot (converter output)
// =================================================================================================

/// Converted fields at one raw time step.
///
/// All node-indexed vectors run top to bottom over the *current* grid;
/// the accumulator bottom-anchors them into the fixed-shape arrays.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    pub time: f64,
    /// Porewater concentration per chemical \[M/L³\]
    pub porewater: Vec<DVector<f64>>,
    /// Flux per chemical (diffusive + advective + bioturbative),
    /// positive downward \[M/L²/T\]
    pub flux: Vec<DVector<f64>>,
    /// Mass-weighted total solid concentration per chemical \[M/M\]
    pub solid: Vec<DVector<f64>>,
    /// Solid concentration per chemical and component \[M/M\]
    pub solid_by_component: Vec<Vec<DVector<f64>>>,
    /// Total concentration per chemical (all phases, per bulk volume)
    /// \[M/L³\]
    pub total: Vec<DVector<f64>>,
    /// Volumetric fraction per solid component
    pub fractions: Vec<DVector<f64>>,
    /// Water-column concentration per chemical \[M/L³\]
    pub water_column: Vec<f64>,
}

impl FieldSnapshot {
    /// Convert one instant of raw state into the named output fields.
    pub fn capture(
        config: &SimulationConfig,
        grid: &Grid,
        state: &ColumnState,
        cmax: &[f64],
        velocity: f64,
    ) -> Self {
        let n = grid.len();
        let n_chems = config.chemicals.len();
        let n_comps = config.components.len();
        let densities: Vec<f64> = config.components.iter().map(|c| c.density).collect();

        let mut porewater = Vec::with_capacity(n_chems);
        let mut flux = Vec::with_capacity(n_chems);
        let mut solid = Vec::with_capacity(n_chems);
        let mut solid_by_component = Vec::with_capacity(n_chems);
        let mut total = Vec::with_capacity(n_chems);
        let mut water_column = Vec::with_capacity(n_chems);

        for chem in 0..n_chems {
            let c = &state.porewater[chem];
            porewater.push(c.clone());
            flux.push(flux_profile(config, grid, chem, velocity, c, cmax[chem]));

            let mut q_by_comp: Vec<DVector<f64>> =
                (0..n_comps).map(|_| DVector::zeros(n)).collect();
            let mut q_total = DVector::zeros(n);
            let mut w_total = DVector::zeros(n);

            for (j, node) in grid.nodes().iter().enumerate() {
                let mass_fractions = node.mass_fractions(&densities);
                let mut sorbed_mass = 0.0;

                for comp in 0..n_comps {
                    let kinetic = Some(state.solid[chem][comp][j]);
                    let q = kernel::component_solid_concentration(
                        config, node, comp, chem, c[j], cmax[chem], kinetic,
                    );
                    q_by_comp[comp][j] = q;
                    q_total[j] += mass_fractions[comp] * q;
                    sorbed_mass +=
                        node.fractions[comp] * (1.0 - node.porosity) * densities[comp] * q;
                }
                w_total[j] = node.porosity * c[j] + sorbed_mass;
            }

            solid_by_component.push(q_by_comp);
            solid.push(q_total);
            total.push(w_total);

            water_column.push(match config.boundaries[chem].top {
                TopBoundary::FiniteMixedWaterColumn { .. } => state.water_column[chem],
                TopBoundary::MassTransfer {
                    water_concentration,
                    ..
                } => water_concentration,
                TopBoundary::FixedConcentration(c0) => c0,
            });
        }

        let fractions = (0..n_comps)
            .map(|comp| {
                DVector::from_iterator(n, grid.nodes().iter().map(|node| node.fractions[comp]))
            })
            .collect();

        Self {
            time: state.time,
            porewater,
            flux,
            solid,
            solid_by_component,
            total,
            fractions,
            water_column,
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.porewater.first().map(|c| c.len()).unwrap_or(0)
    }
}

// =================================================================================================
// Output series
// =================================================================================================

/// The complete result of a run.
///
/// Array axes: `[time, depth, chemical]` for the per-chemical blocks,
/// `[time, depth, chemical, component]` for the per-component solid
/// block, `[time, depth, component]` for the fractions and
/// `[time, chemical]` for the water column. Shapes are fixed at
/// allocation; depth rows above a sample's `surface_index` are zero
/// (their nodes did not exist yet).
#[derive(Debug, Clone)]
pub struct OutputSeries {
    /// Stored output times, strictly increasing, within \[0, tfinal\]
    pub times: Vec<f64>,
    /// Depth coordinate of every output row, top first
    pub depths: Vec<f64>,
    /// First active depth row per sample
    pub surface_index: Vec<usize>,
    /// Porewater concentration `C[t, z, chem]`
    pub porewater: Array3<f64>,
    /// Flux `F[t, z, chem]`
    pub flux: Array3<f64>,
    /// Total solid concentration `q[t, z, chem]`
    pub solid: Array3<f64>,
    /// Per-component solid concentration `qm[t, z, chem, comp]`
    pub solid_by_component: Array4<f64>,
    /// Total concentration `W[t, z, chem]`
    pub total: Array3<f64>,
    /// Component volume fractions `[t, z, comp]`
    pub fractions: Array3<f64>,
    /// Water-column concentration `Cw[t, chem]`
    pub water_column: Array2<f64>,
    /// Run diagnostics (solver, step counts, dt)
    pub metadata: HashMap<String, String>,
}

impl OutputSeries {
    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Add a metadata entry.
    pub fn add_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    /// Porewater profile of one chemical at one sample, active rows only.
    pub fn porewater_profile(&self, sample: usize, chemical: usize) -> Vec<f64> {
        (self.surface_index[sample]..self.depths.len())
            .map(|z| self.porewater[[sample, z, chemical]])
            .collect()
    }

    /// Water-column history of one chemical.
    pub fn water_column_history(&self, chemical: usize) -> Vec<f64> {
        (0..self.len())
            .map(|t| self.water_column[[t, chemical]])
            .collect()
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use crate::solver::engine::TransportEngine;
    use approx::assert_relative_eq;

    fn sorbing_config() -> SimulationConfig {
        SimulationConfig {
            chemicals: vec![Chemical::new("pah", 1.0e-2)],
            components: vec![Component {
                name: "sand".to_string(),
                porosity: 0.4,
                density: 2.6,
                foc: 0.01,
                tortuosity: TortuosityModel::Identity,
            }],
            layers: vec![Layer {
                name: "cap".to_string(),
                thickness: 0.5,
                components: vec![(0, 1.0)],
                discretization: LayerDiscretization::NodeCount(10),
                dispersivity: 0.0,
                doc: 0.0,
            }],
            sorption: vec![SorptionRelation {
                component: 0,
                chemical: 0,
                isotherm: Isotherm::Kd(2.0),
                kinetics: Kinetics::Equilibrium,
            }],
            reactions: vec![],
            boundaries: vec![BoundaryConditions {
                top: TopBoundary::FixedConcentration(1.0),
                bottom: BottomBoundary::ZeroGradient,
            }],
            initial_conditions: vec![InitialCondition {
                layer: 0,
                chemical: 0,
                profile: InitialProfile::Uniform(0.5),
            }],
            solid_initial_conditions: vec![],
            advection: Advection::None,
            consolidation: None,
            deposition: None,
            bioturbation: None,
            options: SolverOptions::new(1.0, 10, 5),
        }
    }

    #[test]
    fn test_capture_equilibrium_solid_and_total() {
        let config = sorbing_config();
        let engine = TransportEngine::new(&config).unwrap();
        let snapshot = FieldSnapshot::capture(
            &config,
            engine.grid(),
            engine.state(),
            engine.cmax(),
            0.0,
        );

        // q = Kd·C = 1.0 on the single component.
        assert_relative_eq!(snapshot.solid[0][5], 2.0 * 0.5);
        assert_relative_eq!(snapshot.solid_by_component[0][0][5], 1.0);

        // W = e·C + (1-e)·ρ·q
        let expected = 0.4 * 0.5 + 0.6 * 2.6 * 1.0;
        assert_relative_eq!(snapshot.total[0][5], expected);
    }

    #[test]
    fn test_capture_uniform_profile_has_zero_interior_flux() {
        let config = sorbing_config();
        let engine = TransportEngine::new(&config).unwrap();
        let snapshot = FieldSnapshot::capture(
            &config,
            engine.grid(),
            engine.state(),
            engine.cmax(),
            0.0,
        );

        for j in 1..snapshot.n_nodes() - 1 {
            assert_relative_eq!(snapshot.flux[0][j], 0.0);
        }
    }

    #[test]
    fn test_capture_fraction_field() {
        let config = sorbing_config();
        let engine = TransportEngine::new(&config).unwrap();
        let snapshot = FieldSnapshot::capture(
            &config,
            engine.grid(),
            engine.state(),
            engine.cmax(),
            0.0,
        );

        assert_eq!(snapshot.fractions.len(), 1);
        for j in 0..snapshot.n_nodes() {
            assert_relative_eq!(snapshot.fractions[0][j], 1.0);
        }
    }

    #[test]
    fn test_water_column_mirror_of_top_boundary() {
        let config = sorbing_config();
        let engine = TransportEngine::new(&config).unwrap();
        let snapshot = FieldSnapshot::capture(
            &config,
            engine.grid(),
            engine.state(),
            engine.cmax(),
            0.0,
        );
        assert_relative_eq!(snapshot.water_column[0], 1.0);
    }
}
