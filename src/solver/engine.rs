//! Time-stepping engine
//!
//! Orchestrates one step of the simulation:
//!
//! 1. grow the grid by the deposited thickness since the last step and
//!    remap state onto the new node set;
//! 2. recompute time-dependent forcings (consolidation, tide);
//! 3. propagate bioturbative mixing of the solid-component fractions;
//! 4. reassemble the per-chemical transport systems;
//! 5. run the nonlinear fixed-point loop when sorption or reaction is
//!    nonlinear, otherwise solve each system once;
//! 6. advance the explicit kinetic-sorption solid state;
//! 7. hand the new state to the output accumulator (driver's job);
//! 8. check cooperative cancellation (driver's job).
//!
//! The engine owns all per-step buffers (band systems, solution and
//! iterate vectors, assembly scratch) and reuses them in place across
//! steps; allocation happens at setup and after deposition growth only.

use log::{debug, info, warn};
use nalgebra::DVector;

use crate::config::{Kinetics, SimulationConfig, TopBoundary};
use crate::error::SimulationError;
use crate::grid::Grid;
use crate::kernel;
use crate::solver::assemble::{
    assemble, system_len, water_column_offset, AssemblyContext, AssemblyScratch,
};
use crate::solver::forcing::{DepositionTracker, VelocityForcing};
use crate::solver::tridiag::TridiagonalSystem;

/// Iteration cap of the nonlinear fixed-point loop. Exceeding it is a
/// fatal [`SimulationError::NonConvergence`], never a silent accept.
pub const MAX_NONLINEAR_ITERATIONS: usize = 50;

/// Tolerance applied to the node-fraction sum invariant.
const FRACTION_SUM_TOLERANCE: f64 = 1.0e-8;

// =================================================================================================
// Engine state machine
// =================================================================================================

/// Observable engine state.
///
/// `Idle → Initializing → Stepping → (NonlinearIterating)* →
/// Averaging? → Sampling → Stepping | Finished | Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Initializing,
    Stepping,
    NonlinearIterating,
    /// Sub-step fields are being folded into a period average
    Averaging,
    Sampling,
    Finished,
    Aborted,
}

// =================================================================================================
// Column state
// =================================================================================================

/// Full mutable state of the column at one instant.
#[derive(Debug, Clone)]
pub struct ColumnState {
    pub time: f64,
    /// Porewater concentration per chemical, node-indexed
    pub porewater: Vec<DVector<f64>>,
    /// Kinetic solid concentration `[chemical][component][node]`;
    /// all-zero vectors where the relation is not transient
    pub solid: Vec<Vec<DVector<f64>>>,
    /// Water-column concentration per chemical (meaningful only for
    /// finite-mixed-water-column top boundaries)
    pub water_column: Vec<f64>,
}

impl ColumnState {
    /// Number of nodes the state is sized for.
    pub fn n_nodes(&self) -> usize {
        self.porewater.first().map(|c| c.len()).unwrap_or(0)
    }
}

// =================================================================================================
// Engine
// =================================================================================================

/// The time-stepping engine for one configuration.
pub struct TransportEngine<'a> {
    config: &'a SimulationConfig,
    grid: Grid,
    state: ColumnState,
    forcing: VelocityForcing,
    deposition: Option<DepositionTracker>,

    // Per-step buffers, reused in place.
    systems: Vec<TridiagonalSystem>,
    solutions: Vec<DVector<f64>>,
    iterates: Vec<DVector<f64>>,
    scratch: AssemblyScratch,

    cmax: Vec<f64>,
    velocity: f64,
    dt: f64,
    theta: f64,
    step: usize,
    nonlinear: bool,
    engine_state: EngineState,
}

impl<'a> TransportEngine<'a> {
    /// Build the engine from a validated configuration, with the
    /// initial state read from the configured initial conditions.
    pub fn new(config: &'a SimulationConfig) -> Result<Self, SimulationError> {
        let grid = Grid::build(config)?;
        let state = Self::initial_state(config, &grid);
        Self::with_state(config, grid, state)
    }

    /// Build the engine with an explicit starting state (continuous
    /// batch chaining). The state must match the configuration's grid.
    pub fn seeded(config: &'a SimulationConfig, seed: ColumnState) -> Result<Self, SimulationError> {
        let grid = Grid::build(config)?;
        if seed.n_nodes() != grid.len() || seed.porewater.len() != config.chemicals.len() {
            return Err(SimulationError::config(format!(
                "seed state has {} nodes / {} chemicals, configuration needs {} / {}",
                seed.n_nodes(),
                seed.porewater.len(),
                grid.len(),
                config.chemicals.len()
            )));
        }
        let mut seed = seed;
        seed.time = 0.0;
        Self::with_state(config, grid, seed)
    }

    fn with_state(
        config: &'a SimulationConfig,
        grid: Grid,
        state: ColumnState,
    ) -> Result<Self, SimulationError> {
        let n_chems = config.chemicals.len();
        let n_nodes = grid.len();
        let dt = config.options.final_time / config.options.time_steps as f64;
        let theta = config.options.weighting.theta();

        let mut cmax = vec![0.0; n_chems];
        for (i, max) in cmax.iter_mut().enumerate() {
            *max = initial_cmax(config, &state, i);
        }

        let systems = (0..n_chems)
            .map(|i| TridiagonalSystem::new(system_len(config, i, n_nodes)))
            .collect();
        let solutions = (0..n_chems)
            .map(|i| DVector::zeros(system_len(config, i, n_nodes)))
            .collect();
        let iterates = state.porewater.clone();

        info!(
            "engine initialized: {} nodes, {} chemicals, dt = {:.3e}, theta = {}",
            n_nodes, n_chems, dt, theta
        );

        let forcing = VelocityForcing::new(config.advection, config.consolidation);
        let velocity = forcing.velocity(0.0);
        Ok(Self {
            config,
            grid,
            state,
            forcing,
            deposition: DepositionTracker::from_config(config),
            systems,
            solutions,
            iterates,
            scratch: AssemblyScratch::new(),
            cmax,
            velocity,
            dt,
            theta,
            step: 0,
            nonlinear: config.is_nonlinear(),
            engine_state: EngineState::Initializing,
        })
    }

    /// Read initial conditions into the t = 0 snapshot.
    fn initial_state(config: &SimulationConfig, grid: &Grid) -> ColumnState {
        let n_nodes = grid.len();
        let n_chems = config.chemicals.len();
        let n_comps = config.components.len();

        // Layer top depths, for relative positioning within a layer.
        let mut layer_tops = Vec::with_capacity(config.layers.len());
        let mut z = 0.0;
        for layer in &config.layers {
            layer_tops.push(z);
            z += layer.thickness;
        }

        let mut porewater = Vec::with_capacity(n_chems);
        let mut solid = Vec::with_capacity(n_chems);
        let mut water_column = Vec::with_capacity(n_chems);

        for chem in 0..n_chems {
            let mut c = DVector::zeros(n_nodes);
            for (j, node) in grid.nodes().iter().enumerate() {
                let layer = &config.layers[node.layer];
                let s = ((node.z - layer_tops[node.layer]) / layer.thickness).clamp(0.0, 1.0);
                c[j] = config.initial_profile(node.layer, chem).evaluate(s);
            }
            porewater.push(c);

            let mut per_component = Vec::with_capacity(n_comps);
            for comp in 0..n_comps {
                let mut q = DVector::zeros(n_nodes);
                if let Some(relation) = config.relation(comp, chem) {
                    if matches!(relation.kinetics, Kinetics::Transient { .. }) {
                        for (j, node) in grid.nodes().iter().enumerate() {
                            q[j] = config.solid_initial(node.layer, comp, chem);
                        }
                    }
                }
                per_component.push(q);
            }
            solid.push(per_component);

            water_column.push(match config.boundaries[chem].top {
                TopBoundary::FiniteMixedWaterColumn {
                    initial_concentration,
                    ..
                } => initial_concentration,
                _ => 0.0,
            });
        }

        ColumnState {
            time: 0.0,
            porewater,
            solid,
            water_column,
        }
    }

    // ========================================= Accessors =========================================

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn state(&self) -> &ColumnState {
        &self.state
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine_state
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn step_count(&self) -> usize {
        self.step
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn cmax(&self) -> &[f64] {
        &self.cmax
    }

    /// Whether the run has reached the final time (within one step).
    pub fn is_finished(&self) -> bool {
        self.step >= self.config.options.time_steps
    }

    /// Consume the engine and return the final state (continuous batch
    /// chaining).
    pub fn into_state(self) -> ColumnState {
        self.state
    }

    pub(crate) fn set_engine_state(&mut self, state: EngineState) {
        self.engine_state = state;
    }

    // =========================================== Stepping ========================================

    /// Advance the state by one time step.
    pub fn advance(&mut self) -> Result<(), SimulationError> {
        self.engine_state = EngineState::Stepping;

        // Time computed directly from the step index so the final step
        // lands on tfinal without floating-point drift.
        let new_time = (self.step as f64 + 1.0) * self.dt;

        // (1) Deposition: grow the grid, remap state.
        let growth = self
            .deposition
            .as_mut()
            .map(|tracker| (tracker.cells_due(new_time), tracker.layer(), tracker.cell()));
        if let Some((due, layer, cell)) = growth {
            for _ in 0..due {
                self.grow_surface(layer, cell);
            }
            if due > 0 {
                if let Some(bio) = &self.config.bioturbation {
                    self.grid.update_bioturbation(bio);
                }
                self.resize_buffers();
                debug!(
                    "deposition: {} new cell(s), surface now at z = {:.4}",
                    due,
                    self.grid.surface()
                );
            }
        }

        // (2) Forcings.
        self.velocity = self.forcing.velocity(new_time);

        // (3) Bioturbative drift of the component fractions.
        if self.config.bioturbation.is_some() && self.config.components.len() > 1 {
            self.drift_fractions()?;
        }

        // (4)–(5) Assemble and solve, iterating when nonlinear.
        self.solve_systems(new_time)?;

        // (6) Advance the kinetic solid state with the new porewater
        // concentrations.
        self.advance_solid();

        // Bookkeeping: commit solutions into the state, track maxima,
        // validate finiteness.
        for chem in 0..self.config.chemicals.len() {
            let off = water_column_offset(self.config, chem);
            let n = self.grid.len();
            self.state.porewater[chem].copy_from(&self.solutions[chem].rows(off, n));
            if off == 1 {
                self.state.water_column[chem] = self.solutions[chem][0];
            }
            let peak = self.state.porewater[chem]
                .iter()
                .fold(0.0f64, |a, &b| a.max(b.abs()));
            self.cmax[chem] = self.cmax[chem].max(peak);
        }
        self.state.time = new_time;
        self.step += 1;
        self.validate_finite()?;

        if self.is_finished() {
            self.engine_state = EngineState::Finished;
        }
        Ok(())
    }

    /// Insert one deposited cell at the surface. The new node copies
    /// the previous top node's porewater concentration; kinetic solid
    /// state starts from the deposition layer's initial condition.
    fn grow_surface(&mut self, layer: usize, cell: f64) {
        self.grid.push_surface_node(self.config, layer, cell);

        for chem in 0..self.config.chemicals.len() {
            let top = self.state.porewater[chem][0];
            self.state.porewater[chem] = push_front(&self.state.porewater[chem], top);

            for comp in 0..self.config.components.len() {
                let q0 = self.config.solid_initial(layer, comp, chem);
                self.state.solid[chem][comp] = push_front(&self.state.solid[chem][comp], q0);
            }
        }
    }

    /// Resize band systems, solutions and iterates after grid growth.
    fn resize_buffers(&mut self) {
        let n = self.grid.len();
        for chem in 0..self.config.chemicals.len() {
            let len = system_len(self.config, chem, n);
            self.systems[chem].resize(len);
            self.solutions[chem] = DVector::zeros(len);
            self.iterates[chem] = self.state.porewater[chem].clone();
        }
    }

    /// Explicit bioturbative mixing of the per-node component volume
    /// fractions. The particle biodiffusion coefficient is zero outside
    /// the bioturbation zone, so only surface nodes mix. Fractions are
    /// renormalized to keep the sum-to-one invariant exact.
    fn drift_fractions(&mut self) -> Result<(), SimulationError> {
        let n = self.grid.len();
        let n_comps = self.config.components.len();
        if n < 2 {
            return Ok(());
        }

        let old: Vec<Vec<f64>> = (0..n)
            .map(|j| self.grid.node(j).fractions.clone())
            .collect();

        for j in 0..n {
            let w = self.grid.cell_width(j);
            if w <= 0.0 {
                continue;
            }
            for comp in 0..n_comps {
                let mut divergence = 0.0;
                if j > 0 {
                    let g = 0.5
                        * (self.grid.node(j - 1).bio_particle + self.grid.node(j).bio_particle)
                        / self.grid.spacing(j - 1);
                    divergence += g * (old[j - 1][comp] - old[j][comp]);
                }
                if j < n - 1 {
                    let g = 0.5
                        * (self.grid.node(j).bio_particle + self.grid.node(j + 1).bio_particle)
                        / self.grid.spacing(j);
                    divergence -= g * (old[j][comp] - old[j + 1][comp]);
                }
                self.grid.node_mut(j).fractions[comp] += self.dt * divergence / w;
            }

            // Renormalize against drift of the sum.
            let sum: f64 = self.grid.node(j).fractions.iter().sum();
            if sum > 0.0 {
                for f in &mut self.grid.node_mut(j).fractions {
                    *f /= sum;
                }
            }
        }

        self.grid.check_fraction_sums(FRACTION_SUM_TOLERANCE)
    }

    /// Assemble and solve all per-chemical systems, iterating the
    /// nonlinear fixed point when required.
    fn solve_systems(&mut self, new_time: f64) -> Result<(), SimulationError> {
        let n = self.grid.len();
        let n_chems = self.config.chemicals.len();

        for chem in 0..n_chems {
            self.iterates[chem].copy_from(&self.state.porewater[chem]);
        }

        let max_iterations = if self.nonlinear {
            MAX_NONLINEAR_ITERATIONS
        } else {
            1
        };

        for iteration in 0..max_iterations {
            if self.nonlinear {
                self.engine_state = EngineState::NonlinearIterating;
            }
            let mut change = 0.0f64;

            for chem in 0..n_chems {
                let off = water_column_offset(self.config, chem);
                let ctx = AssemblyContext {
                    config: self.config,
                    grid: &self.grid,
                    chemical: chem,
                    dt: self.dt,
                    theta: self.theta,
                    velocity: self.velocity,
                    previous: &self.state.porewater[chem],
                    iterates: &self.iterates,
                    solid: &self.state.solid[chem],
                    cmax: self.cmax[chem],
                    water_column_previous: Some(self.state.water_column[chem]),
                };
                assemble(&ctx, &mut self.scratch, &mut self.systems[chem]);
                self.systems[chem].solve_into(&mut self.solutions[chem], self.step)?;

                // Relative change across the grid for this chemical.
                let scale = self.cmax[chem].max(1.0e-30);
                for j in 0..n {
                    let new = self.solutions[chem][j + off];
                    let old = self.iterates[chem][j];
                    let denom = new.abs().max(scale * 1.0e-3);
                    change = change.max((new - old).abs() / denom);
                }
                for j in 0..n {
                    self.iterates[chem][j] = self.solutions[chem][j + off];
                }
            }

            if !self.nonlinear || change < self.config.options.nonlinear_tolerance {
                if iteration + 2 >= MAX_NONLINEAR_ITERATIONS {
                    warn!(
                        "nonlinear loop converged near the iteration cap \
                         ({} iterations) at t = {:.4}",
                        iteration + 1,
                        new_time
                    );
                }
                return Ok(());
            }
            if iteration + 1 == max_iterations {
                return Err(SimulationError::NonConvergence {
                    step: self.step,
                    time: new_time,
                    iterations: max_iterations,
                    change,
                });
            }
        }
        Ok(())
    }

    /// Advance the kinetic solid-phase ODE `dq/dt = kf·C − kb·q` with
    /// the freshly solved porewater concentration, implicitly in q.
    fn advance_solid(&mut self) {
        for chem in 0..self.config.chemicals.len() {
            let off = water_column_offset(self.config, chem);
            let docf_chem = self.config.chemicals[chem].kdoc;

            for comp in 0..self.config.components.len() {
                let Some(relation) = self.config.relation(comp, chem) else {
                    continue;
                };
                let Kinetics::Transient { ksorp } = relation.kinetics else {
                    continue;
                };
                let foc = self.config.components[comp].foc;

                for j in 0..self.grid.len() {
                    let node = self.grid.node(j);
                    if node.fractions[comp] <= 0.0 {
                        continue;
                    }
                    let c_new = self.solutions[chem][j + off];
                    let docf = kernel::doc_factor(docf_chem, node.doc);
                    let slope = docf
                        * kernel::isotherm_derivative(
                            &relation.isotherm,
                            foc,
                            c_new * docf,
                            self.cmax[chem],
                        );
                    let rates = kernel::kinetic_rates(ksorp, node.porosity, node.bulk_density, slope);

                    let q_old = self.state.solid[chem][comp][j];
                    self.state.solid[chem][comp][j] = (q_old
                        + self.dt * rates.forward * c_new)
                        / (1.0 + self.dt * rates.backward);
                }
            }
        }
    }

    /// NaN/Inf guard over the advanced state, in the spirit of
    /// validating every stored step before it can poison the output.
    fn validate_finite(&self) -> Result<(), SimulationError> {
        for (chem, c) in self.state.porewater.iter().enumerate() {
            if c.iter().any(|x| !x.is_finite()) {
                return Err(SimulationError::Numerical {
                    quantity: format!(
                        "porewater concentration of '{}'",
                        self.config.chemicals[chem].name
                    ),
                    step: self.step,
                });
            }
        }
        for (chem, per_comp) in self.state.solid.iter().enumerate() {
            for q in per_comp {
                if q.iter().any(|x| !x.is_finite()) {
                    return Err(SimulationError::Numerical {
                        quantity: format!(
                            "solid concentration of '{}'",
                            self.config.chemicals[chem].name
                        ),
                        step: self.step,
                    });
                }
            }
        }
        Ok(())
    }
}

fn initial_cmax(config: &SimulationConfig, state: &ColumnState, chemical: usize) -> f64 {
    let mut cmax = state.porewater[chemical]
        .iter()
        .fold(0.0f64, |a, &b| a.max(b.abs()));
    cmax = cmax.max(match config.boundaries[chemical].top {
        TopBoundary::FixedConcentration(c0) => c0.abs(),
        TopBoundary::MassTransfer {
            water_concentration,
            ..
        } => water_concentration.abs(),
        TopBoundary::FiniteMixedWaterColumn {
            initial_concentration,
            ..
        } => initial_concentration.abs(),
    });
    cmax
}

fn push_front(v: &DVector<f64>, value: f64) -> DVector<f64> {
    let mut out = DVector::zeros(v.len() + 1);
    out[0] = value;
    out.rows_mut(1, v.len()).copy_from(v);
    out
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use approx::assert_relative_eq;

    fn base_config() -> SimulationConfig {
        SimulationConfig {
            chemicals: vec![Chemical::new("tracer", 1.0e-2)],
            components: vec![Component {
                name: "sand".to_string(),
                porosity: 0.4,
                density: 2.6,
                foc: 0.001,
                tortuosity: TortuosityModel::Identity,
            }],
            layers: vec![Layer {
                name: "cap".to_string(),
                thickness: 1.0,
                components: vec![(0, 1.0)],
                discretization: LayerDiscretization::NodeCount(20),
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
            options: SolverOptions::new(10.0, 200, 10),
        }
    }

    #[test]
    fn test_initial_state_from_uniform_profile() {
        let mut config = base_config();
        config.initial_conditions.push(InitialCondition {
            layer: 0,
            chemical: 0,
            profile: InitialProfile::Uniform(0.5),
        });

        let engine = TransportEngine::new(&config).unwrap();
        for j in 0..engine.grid().len() {
            assert_relative_eq!(engine.state().porewater[0][j], 0.5);
        }
    }

    #[test]
    fn test_initial_state_from_linear_profile() {
        let mut config = base_config();
        config.initial_conditions.push(InitialCondition {
            layer: 0,
            chemical: 0,
            profile: InitialProfile::Linear {
                top: 0.0,
                bottom: 1.0,
            },
        });

        let engine = TransportEngine::new(&config).unwrap();
        let state = engine.state();
        assert_relative_eq!(state.porewater[0][0], 0.0);
        assert_relative_eq!(state.porewater[0][engine.grid().len() - 1], 1.0);
    }

    #[test]
    fn test_dirichlet_diffusion_step_moves_toward_boundary() {
        let config = base_config();
        let mut engine = TransportEngine::new(&config).unwrap();

        engine.advance().unwrap();

        // Top node pinned at 1.0, interior relaxing up from 0.
        assert_relative_eq!(engine.state().porewater[0][0], 1.0);
        assert!(engine.state().porewater[0][1] > 0.0);
        assert!(engine.state().porewater[0][1] < 1.0);
    }

    #[test]
    fn test_profile_is_monotone_for_dirichlet_top() {
        let config = base_config();
        let mut engine = TransportEngine::new(&config).unwrap();
        for _ in 0..50 {
            engine.advance().unwrap();
        }

        let c = &engine.state().porewater[0];
        for j in 1..c.len() {
            assert!(
                c[j] <= c[j - 1] + 1.0e-12,
                "profile not monotone at node {}",
                j
            );
        }
    }

    #[test]
    fn test_finishes_after_configured_steps() {
        let mut config = base_config();
        config.options.time_steps = 5;
        let mut engine = TransportEngine::new(&config).unwrap();

        while !engine.is_finished() {
            engine.advance().unwrap();
        }
        assert_eq!(engine.step_count(), 5);
        assert_relative_eq!(engine.time(), 10.0);
        assert_eq!(engine.engine_state(), EngineState::Finished);
    }

    #[test]
    fn test_deposition_grows_grid_and_preserves_fractions() {
        let mut config = base_config();
        config.deposition = Some(Deposition {
            rate: 0.02,
            layer: 0,
        });
        // cell = 1.0/20 = 0.05; 0.02·10 = 0.2 → 4 cells over the run
        let mut engine = TransportEngine::new(&config).unwrap();
        let n0 = engine.grid().len();

        while !engine.is_finished() {
            engine.advance().unwrap();
        }

        assert_eq!(engine.grid().len(), n0 + 4);
        assert_relative_eq!(engine.grid().surface(), -0.2, max_relative = 1e-12);
        assert!(engine.grid().check_fraction_sums(1e-9).is_ok());
    }

    #[test]
    fn test_seeded_engine_rejects_mismatched_state() {
        let config = base_config();
        let engine = TransportEngine::new(&config).unwrap();
        let mut state = engine.state().clone();
        state.porewater[0] = DVector::zeros(3); // wrong node count

        assert!(matches!(
            TransportEngine::seeded(&config, state),
            Err(SimulationError::Configuration(_))
        ));
    }

    #[test]
    fn test_seeded_engine_starts_from_seed() {
        let config = base_config();
        let mut donor = TransportEngine::new(&config).unwrap();
        for _ in 0..10 {
            donor.advance().unwrap();
        }
        let seed = donor.into_state();
        let expected = seed.porewater[0].clone();

        let engine = TransportEngine::seeded(&config, seed).unwrap();
        assert_relative_eq!(engine.time(), 0.0);
        assert_relative_eq!(
            engine.state().porewater[0][5],
            expected[5],
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_kinetic_solid_relaxes_toward_equilibrium() {
        let mut config = base_config();
        config.sorption.push(SorptionRelation {
            component: 0,
            chemical: 0,
            isotherm: Isotherm::Kd(2.0),
            kinetics: Kinetics::Transient { ksorp: 5.0 },
        });
        config.initial_conditions.push(InitialCondition {
            layer: 0,
            chemical: 0,
            profile: InitialProfile::Uniform(1.0),
        });
        // Seal the column so the exchange is the only dynamics.
        config.boundaries[0].top = TopBoundary::MassTransfer {
            coefficient: 0.0,
            water_concentration: 0.0,
        };
        config.options.final_time = 200.0;
        config.options.time_steps = 2000;

        let mut engine = TransportEngine::new(&config).unwrap();
        while !engine.is_finished() {
            engine.advance().unwrap();
        }

        // q should have relaxed toward slope·C = Kd·C.
        let mid = engine.grid().len() / 2;
        let c = engine.state().porewater[0][mid];
        let q = engine.state().solid[0][0][mid];
        assert_relative_eq!(q, 2.0 * c, max_relative = 0.05);
    }

    #[test]
    fn test_nonconvergence_is_reported_not_swallowed() {
        // An autocatalytic amplification loop (A feeds B, B feeds A,
        // both with yield 10 at a fast rate) makes the sequential
        // per-species sweep diverge; the engine must report it rather
        // than silently accept the last iterate.
        let mut config = base_config();
        config.chemicals.push(Chemical::new("product", 1.0e-2));
        config.boundaries.push(config.boundaries[0]);
        config.initial_conditions.push(InitialCondition {
            layer: 0,
            chemical: 0,
            profile: InitialProfile::Uniform(1.0),
        });
        config.reactions.push(Reaction {
            name: "a-to-b".to_string(),
            reactants: vec![ReactionTerm {
                chemical: 0,
                stoichiometry: 1.0,
                order: 1.0,
            }],
            products: vec![ReactionProduct {
                chemical: 1,
                yield_coefficient: 10.0,
            }],
            rates: vec![1000.0],
        });
        config.reactions.push(Reaction {
            name: "b-to-a".to_string(),
            reactants: vec![ReactionTerm {
                chemical: 1,
                stoichiometry: 1.0,
                order: 1.0,
            }],
            products: vec![ReactionProduct {
                chemical: 0,
                yield_coefficient: 10.0,
            }],
            rates: vec![1000.0],
        });

        let mut engine = TransportEngine::new(&config).unwrap();
        match engine.advance() {
            Err(SimulationError::NonConvergence {
                iterations, step, ..
            }) => {
                assert_eq!(iterations, MAX_NONLINEAR_ITERATIONS);
                assert_eq!(step, 0);
            }
            other => panic!("expected NonConvergence, got {other:?}"),
        }
    }
}
