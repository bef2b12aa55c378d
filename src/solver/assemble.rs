//! Transport matrix assembler
//!
//! Builds the per-chemical tridiagonal system discretizing
//!
//! ```text
//! R·∂C/∂t = ∂/∂z (D·∂C/∂z) − v·∂C/∂z − Σ reaction sinks/sources
//! ```
//!
//! in conservative control-volume form on the (possibly non-uniform)
//! node grid. Faces between nodes carry a diffusive conductance and a
//! centrally weighted advective flux; writing the balance per control
//! volume makes discrete mass conservation exact for sealed boundaries.
//!
//! # Time weighting
//!
//! The transport operator is θ-weighted (θ = 1 implicit, θ = 1/2
//! Crank–Nicolson). Sorption storage and reaction terms are handled
//! implicitly through linearization about the current nonlinear
//! iterate (modified Picard), which keeps nonlinear storage exactly
//! conservative at convergence.
//!
//! # Boundary rows
//!
//! Boundary rows are overwritten after interior assembly according to
//! the active boundary kind: Dirichlet rows for fixed concentrations, a
//! Robin-type row for benthic mass transfer, and, for the finite mixed
//! water column, an auxiliary scalar unknown prepended to the system.
//! The water column exchanges with the top node only, so the augmented
//! system is still tridiagonal.
//!
//! # Coupling strategy
//!
//! Multi-species reaction coupling is resolved sequentially: each
//! species' system is assembled with the other species frozen at the
//! current iterate, and the outer nonlinear loop iterates to joint
//! convergence. The self-derivative of each reaction folds into the
//! diagonal; cross-species contributions ride on the right-hand side.

use nalgebra::DVector;

use crate::config::{BottomBoundary, Kinetics, SimulationConfig, TopBoundary};
use crate::grid::Grid;
use crate::kernel;
use crate::solver::tridiag::TridiagonalSystem;

// =================================================================================================
// Assembly context
// =================================================================================================

/// Everything the assembler needs for one chemical at one iteration.
pub struct AssemblyContext<'a> {
    pub config: &'a SimulationConfig,
    pub grid: &'a Grid,
    /// Chemical index being assembled
    pub chemical: usize,
    /// Time step size
    pub dt: f64,
    /// Implicitness factor θ
    pub theta: f64,
    /// Current Darcy velocity (positive downward)
    pub velocity: f64,
    /// Porewater concentrations at the previous time step, this chemical
    pub previous: &'a DVector<f64>,
    /// Current nonlinear iterate for every chemical, node-indexed
    pub iterates: &'a [DVector<f64>],
    /// Kinetic solid state for this chemical, `[component][node]`
    pub solid: &'a [DVector<f64>],
    /// Largest concentration this chemical has reached so far
    pub cmax: f64,
    /// Water-column concentration at the previous step, when the top
    /// boundary is a finite mixed water column
    pub water_column_previous: Option<f64>,
}

/// Reusable per-assembly scratch, owned by the engine.
#[derive(Debug, Default)]
pub struct AssemblyScratch {
    sigma: Vec<f64>,
    conc: Vec<f64>,
}

impl AssemblyScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Number of unknowns for one chemical: one per node, plus the
/// water-column scalar when the top boundary couples to one.
pub fn system_len(config: &SimulationConfig, chemical: usize, n_nodes: usize) -> usize {
    n_nodes + water_column_offset(config, chemical)
}

/// Index offset of node 0 in the unknown vector (1 when a water-column
/// row is prepended).
pub fn water_column_offset(config: &SimulationConfig, chemical: usize) -> usize {
    match config.boundaries[chemical].top {
        TopBoundary::FiniteMixedWaterColumn { .. } => 1,
        _ => 0,
    }
}

// =================================================================================================
// Effective transport coefficient
// =================================================================================================

/// Per-node effective diffusive transport coefficient σ for one
/// chemical \[L²/T · (bulk)\]:
///
/// ```text
/// σ = e·(Dw·τ(e) + α·|v| + Dbio_pw) + Dbio_p·S'(C)
/// ```
///
/// The porewater part combines the tortuosity-corrected molecular
/// diffusivity, mechanical dispersion and porewater bioturbation; the
/// particle bioturbation term moves the equilibrium-sorbed phase
/// down-gradient through the chain rule, with `S'` the storage slope
/// from [`kernel::node_equilibrium_sorption`]. Insoluble chemicals have
/// no porewater pathway and move by particle mixing only.
pub(crate) fn effective_sigma(
    config: &SimulationConfig,
    grid: &Grid,
    chemical: usize,
    velocity: f64,
    iterate: &DVector<f64>,
    cmax: f64,
    out: &mut Vec<f64>,
) {
    let chem = &config.chemicals[chemical];
    out.clear();
    out.reserve(grid.len());

    for (j, node) in grid.nodes().iter().enumerate() {
        let porewater = if chem.soluble {
            chem.diffusivity * node.tortuosity_factor
                + node.dispersivity * velocity.abs()
                + node.bio_porewater
        } else {
            node.bio_porewater
        };
        let sorption = kernel::node_equilibrium_sorption(config, node, chemical, iterate[j], cmax);
        out.push(node.porosity * porewater + node.bio_particle * sorption.slope);
    }
}

/// Depth-resolved flux of one chemical \[M/L²/T\], positive downward:
/// diffusive (porewater + bioturbative) plus advective. Central
/// differences in the interior, one-sided at the column ends.
pub(crate) fn flux_profile(
    config: &SimulationConfig,
    grid: &Grid,
    chemical: usize,
    velocity: f64,
    c: &DVector<f64>,
    cmax: f64,
) -> DVector<f64> {
    let n = grid.len();
    let mut sigma = Vec::new();
    effective_sigma(config, grid, chemical, velocity, c, cmax, &mut sigma);

    let mut flux = DVector::zeros(n);
    for j in 0..n {
        let gradient = if n == 1 {
            0.0
        } else if j == 0 {
            (c[1] - c[0]) / grid.spacing(0)
        } else if j == n - 1 {
            (c[n - 1] - c[n - 2]) / grid.spacing(n - 2)
        } else {
            (c[j + 1] - c[j - 1]) / (grid.spacing(j - 1) + grid.spacing(j))
        };
        flux[j] = -sigma[j] * gradient + velocity * c[j];
    }
    flux
}

// =================================================================================================
// Assembly
// =================================================================================================

/// Fill `system` with the θ-weighted transport system for one chemical.
///
/// The system must already be sized to [`system_len`]; the engine
/// resizes after deposition events and the bands are zeroed here.
pub fn assemble(ctx: &AssemblyContext, scratch: &mut AssemblyScratch, system: &mut TridiagonalSystem) {
    let grid = ctx.grid;
    let config = ctx.config;
    let n = grid.len();
    let off = water_column_offset(config, ctx.chemical);
    debug_assert_eq!(system.len(), n + off);

    system.reset();

    let theta = ctx.theta;
    let v = ctx.velocity;
    let dt = ctx.dt;
    let c_prev = ctx.previous;
    let c_it = &ctx.iterates[ctx.chemical];

    effective_sigma(config, grid, ctx.chemical, v, c_it, ctx.cmax, &mut scratch.sigma);
    let sigma = &scratch.sigma;

    // ====== Storage, reactions and kinetic exchange per control volume ======

    for j in 0..n {
        let node = grid.node(j);
        let w = grid.cell_width(j);
        let e = node.porosity;
        let row = j + off;

        // Modified-Picard storage: e·C plus the equilibrium-sorbed mass,
        // linearized about the current iterate so that the converged
        // solution satisfies the fully nonlinear balance.
        let sorption_prev =
            kernel::node_equilibrium_sorption(config, node, ctx.chemical, c_prev[j], ctx.cmax);
        let sorption_it =
            kernel::node_equilibrium_sorption(config, node, ctx.chemical, c_it[j], ctx.cmax);

        system.diag[row] += w * (e + sorption_it.slope) / dt;
        system.rhs[row] += w
            * (e * c_prev[j] + sorption_prev.storage - sorption_it.storage
                + sorption_it.slope * c_it[j])
            / dt;

        // Reactions (implicit, linearized about the iterate).
        if !config.reactions.is_empty() {
            scratch.conc.clear();
            scratch
                .conc
                .extend(ctx.iterates.iter().map(|iterate| iterate[j]));

            for reaction in &config.reactions {
                let layer_rate = reaction.rates[node.layer];
                if layer_rate == 0.0 {
                    continue;
                }
                let rate = kernel::reaction_rate(reaction, layer_rate, &scratch.conc);

                for term in &reaction.reactants {
                    if term.chemical != ctx.chemical {
                        continue;
                    }
                    let drate = kernel::reaction_rate_derivative(
                        reaction,
                        layer_rate,
                        &scratch.conc,
                        ctx.chemical,
                    );
                    system.diag[row] += w * e * term.stoichiometry * drate;
                    system.rhs[row] -= w * e * term.stoichiometry * (rate - drate * c_it[j]);
                }
                for product in &reaction.products {
                    if product.chemical != ctx.chemical {
                        continue;
                    }
                    system.rhs[row] += w * e * product.yield_coefficient * rate;
                }
            }
        }

        // Kinetic (transient) sorption exchange with the explicit solid
        // state: sink kf·C implicit, return kb·q from the previous step.
        for (component, &fraction) in node.fractions.iter().enumerate() {
            if fraction <= 0.0 {
                continue;
            }
            let Some(relation) = config.relation(component, ctx.chemical) else {
                continue;
            };
            let Kinetics::Transient { ksorp } = relation.kinetics else {
                continue;
            };
            let foc = config.components[component].foc;
            let docf = kernel::doc_factor(config.chemicals[ctx.chemical].kdoc, node.doc);
            let slope = docf
                * kernel::isotherm_derivative(
                    &relation.isotherm,
                    foc,
                    c_it[j] * docf,
                    ctx.cmax,
                );
            let rates = kernel::kinetic_rates(ksorp, e, node.bulk_density, slope);
            let mass = fraction * (1.0 - e) * config.components[component].density;

            system.diag[row] += w * mass * rates.forward;
            system.rhs[row] += w * mass * rates.backward * ctx.solid[component][j];
        }
    }

    // ====== Interior faces ======
    //
    // Φ_{j+1/2} = G·(C_j − C_{j+1}) + v·(C_j + C_{j+1})/2, downward
    // positive. Node j loses Φ, node j+1 gains it.

    for j in 0..n.saturating_sub(1) {
        let h = grid.spacing(j);
        let g = 0.5 * (sigma[j] + sigma[j + 1]) / h;

        // Implicit part.
        system.diag[j + off] += theta * (g + 0.5 * v);
        system.upper[j + off] += theta * (-g + 0.5 * v);
        system.diag[j + 1 + off] += theta * (g - 0.5 * v);
        system.lower[j + 1 + off] += theta * (-g - 0.5 * v);

        // Explicit part at the previous step.
        if theta < 1.0 {
            let phi = g * (c_prev[j] - c_prev[j + 1]) + 0.5 * v * (c_prev[j] + c_prev[j + 1]);
            system.rhs[j + off] -= (1.0 - theta) * phi;
            system.rhs[j + 1 + off] += (1.0 - theta) * phi;
        }
    }

    // ====== Top boundary ======

    match config.boundaries[ctx.chemical].top {
        TopBoundary::FixedConcentration(c0) => {
            system.lower[0] = 0.0;
            system.diag[0] = 1.0;
            system.upper[0] = 0.0;
            system.rhs[0] = c0;
        }
        TopBoundary::MassTransfer {
            coefficient,
            water_concentration,
        } => {
            // Φ_top = kbl·(cw − C₀) + v·(cw if downward else C₀)
            let kbl = coefficient;
            let cw = water_concentration;
            system.diag[0] += theta * (kbl - v.min(0.0));
            system.rhs[0] += theta * (kbl + v.max(0.0)) * cw;
            if theta < 1.0 {
                let phi = kbl * (cw - c_prev[0]) + v.max(0.0) * cw + v.min(0.0) * c_prev[0];
                system.rhs[0] += (1.0 - theta) * phi;
            }
        }
        TopBoundary::FiniteMixedWaterColumn {
            depth,
            retention_time,
            decay_rate,
            evaporation_rate,
            ..
        } => {
            // Exchange conductance over the top half-cell; the
            // water-column coupling is handled fully implicitly.
            let kex = 2.0 * sigma[0] / grid.spacing(0);
            let cw_prev = ctx.water_column_previous.unwrap_or(0.0);

            // Top node row: gains Φ_top = kex·(Cw − C₀) + v·(upwind).
            system.diag[1] += kex - v.min(0.0);
            system.lower[1] += -(kex + v.max(0.0));

            // Water-column row: hw·dCw/dt = −hw·Cw/τ − hw·(kd+ke)·Cw − Φ_top,
            // with clean inflow at retention time τ.
            system.diag[0] = depth / dt
                + depth * (1.0 / retention_time + decay_rate + evaporation_rate)
                + kex
                + v.max(0.0);
            system.upper[0] = -(kex - v.min(0.0));
            system.rhs[0] = depth / dt * cw_prev;
        }
    }

    // ====== Bottom boundary ======

    let last = n - 1 + off;
    match config.boundaries[ctx.chemical].bottom {
        BottomBoundary::FixedConcentration(cb) => {
            system.lower[last] = 0.0;
            system.diag[last] = 1.0;
            system.upper[last] = 0.0;
            system.rhs[last] = cb;
        }
        BottomBoundary::ZeroGradient => {
            // No diffusive flux through the bottom; advection carries
            // the bottom-node concentration across in either direction.
            system.diag[last] += theta * v;
            if theta < 1.0 {
                system.rhs[last] -= (1.0 - theta) * v * c_prev[n - 1];
            }
        }
        BottomBoundary::FluxMatching => {
            if n >= 2 {
                // The interior gradient continues into the underlying
                // medium: Φ_bot = G·(C_{n-2} − C_{n-1}) + v·C_{n-1}.
                let h = grid.spacing(n - 2);
                let g = sigma[n - 1] / h;
                system.lower[last] += theta * g;
                system.diag[last] += theta * (v - g);
                if theta < 1.0 {
                    let phi = g * (c_prev[n - 2] - c_prev[n - 1]) + v * c_prev[n - 1];
                    system.rhs[last] -= (1.0 - theta) * phi;
                }
            }
        }
    }
}

// =================================================================================================
// Tests
// =================================================================================================
