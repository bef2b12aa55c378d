//! Time-dependent forcings
//!
//! Evaluates the Darcy velocity (mean flow, consolidation transient,
//! tidal oscillation) and tracks deposition-thickness accounting. The
//! engine recomputes these once per step; everything here is a pure
//! function of time apart from the deposition cell counter.

use crate::config::{Advection, Consolidation, Deposition, SimulationConfig};
use crate::config::LayerDiscretization;

/// Decimal-log constant of the consolidation completion curve.
const LN_10: f64 = std::f64::consts::LN_10;

// =================================================================================================
// Velocity forcing
// =================================================================================================

/// Darcy velocity evaluator combining advection mode and consolidation.
#[derive(Debug, Clone)]
pub struct VelocityForcing {
    advection: Advection,
    consolidation: Option<Consolidation>,
}

impl VelocityForcing {
    pub fn new(advection: Advection, consolidation: Option<Consolidation>) -> Self {
        Self {
            advection,
            consolidation,
        }
    }

    /// Darcy velocity at time `t`, positive downward.
    ///
    /// The consolidation transient expels porewater upward as the
    /// deposit settles: the completion curve is `F(t) = 1 − 10^(−t/t90)`
    /// (90 % complete at `t90`), so the expulsion velocity is
    /// `hcon·dF/dt = hcon·(ln 10/t90)·10^(−t/t90)` directed upward.
    pub fn velocity(&self, t: f64) -> f64 {
        let mut v = match self.advection {
            Advection::None => 0.0,
            Advection::Steady(v) => v,
            Advection::Periodic {
                mean,
                amplitude,
                period,
            } => mean + amplitude * (2.0 * std::f64::consts::PI * t / period).sin(),
        };
        if let Some(con) = &self.consolidation {
            let lambda = LN_10 / con.t90;
            v -= con.settlement * lambda * (-lambda * t).exp();
        }
        v
    }

    /// Mean velocity over a tidal period (the oscillation averages out).
    pub fn mean_velocity(&self, t: f64) -> f64 {
        let tidal_free = VelocityForcing {
            advection: match self.advection {
                Advection::Periodic { mean, .. } => Advection::Steady(mean),
                other => other,
            },
            consolidation: self.consolidation,
        };
        tidal_free.velocity(t)
    }

    /// Whether the velocity changes between steps (forces per-step
    /// matrix reassembly even for otherwise linear configurations).
    pub fn is_time_dependent(&self) -> bool {
        self.consolidation.is_some() || matches!(self.advection, Advection::Periodic { .. })
    }
}

// =================================================================================================
// Deposition accounting
// =================================================================================================

/// Tracks deposited thickness and decides when the grid grows.
///
/// The grid grows one deposition cell at a time: a new surface node is
/// inserted whenever the accumulated deposited thickness covers one
/// more cell of the deposition layer's discretization.
#[derive(Debug, Clone)]
pub struct DepositionTracker {
    rate: f64,
    layer: usize,
    cell: f64,
    cells_added: usize,
}

impl DepositionTracker {
    /// Build from the configuration; `None` when deposition is off or
    /// the rate is zero.
    pub fn from_config(config: &SimulationConfig) -> Option<Self> {
        let deposition: &Deposition = config.deposition.as_ref()?;
        if deposition.rate <= 0.0 {
            return None;
        }
        let layer = &config.layers[deposition.layer];
        let cell = match layer.discretization {
            LayerDiscretization::FixedSpacing(h) => h,
            LayerDiscretization::NodeCount(n) => layer.thickness / n as f64,
        };
        Some(Self {
            rate: deposition.rate,
            layer: deposition.layer,
            cell,
            cells_added: 0,
        })
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    pub fn cell(&self) -> f64 {
        self.cell
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Number of new surface cells owed at time `t`; advances the
    /// internal counter. Returns 0 most steps, 1 when a cell boundary
    /// was crossed (more only if the time step exceeds a cell period).
    pub fn cells_due(&mut self, t: f64) -> usize {
        let total = (self.rate * t / self.cell).floor() as usize;
        let due = total.saturating_sub(self.cells_added);
        self.cells_added = total;
        due
    }

    /// Upper bound on deposited cells over a whole run, used by the
    /// pre-flight output size estimate.
    pub fn max_cells(&self, final_time: f64) -> usize {
        (self.rate * final_time / self.cell).ceil() as usize
    }
}

// =================================================================================================
// Tests
// =================================================================================================
