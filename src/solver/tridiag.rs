//! Tridiagonal linear solver
//!
//! Thomas-algorithm forward elimination and back substitution over the
//! band vectors the assembler fills. The per-chemical transport systems
//! are tridiagonal by construction (one unknown per node, plus one
//! auxiliary water-column unknown when the top boundary couples to a
//! finite mixed water column; the augmented system is still
//! tridiagonal because the water column exchanges with the top node
//! only).
//!
//! Scratch buffers are owned by [`TridiagonalSystem`] and reused across
//! steps, so solving allocates nothing after setup.

use crate::error::SimulationError;
use nalgebra::DVector;

/// A resizable tridiagonal system `A·x = rhs` with reusable scratch.
///
/// `lower[i]` couples row `i` to `i - 1` (entry 0 unused), `upper[i]`
/// couples row `i` to `i + 1` (last entry unused).
#[derive(Debug, Clone)]
pub struct TridiagonalSystem {
    pub lower: DVector<f64>,
    pub diag: DVector<f64>,
    pub upper: DVector<f64>,
    pub rhs: DVector<f64>,
    scratch_c: DVector<f64>,
    scratch_d: DVector<f64>,
}

impl TridiagonalSystem {
    /// Create a system of dimension `n` with all bands zeroed.
    pub fn new(n: usize) -> Self {
        Self {
            lower: DVector::zeros(n),
            diag: DVector::zeros(n),
            upper: DVector::zeros(n),
            rhs: DVector::zeros(n),
            scratch_c: DVector::zeros(n),
            scratch_d: DVector::zeros(n),
        }
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.len() == 0
    }

    /// Zero all bands, keeping the allocation. Called by the assembler
    /// at the start of every fill.
    pub fn reset(&mut self) {
        self.lower.fill(0.0);
        self.diag.fill(0.0);
        self.upper.fill(0.0);
        self.rhs.fill(0.0);
    }

    /// Grow the system to dimension `n` (deposition added nodes).
    /// Existing band contents are discarded.
    pub fn resize(&mut self, n: usize) {
        if self.len() != n {
            self.lower = DVector::zeros(n);
            self.diag = DVector::zeros(n);
            self.upper = DVector::zeros(n);
            self.rhs = DVector::zeros(n);
            self.scratch_c = DVector::zeros(n);
            self.scratch_d = DVector::zeros(n);
        }
    }

    /// Solve in place into `solution` using the Thomas algorithm.
    ///
    /// Fails with [`SimulationError::Numerical`] on a singular pivot
    /// (which indicates a degenerate assembly, not a user error).
    pub fn solve_into(
        &mut self,
        solution: &mut DVector<f64>,
        step: usize,
    ) -> Result<(), SimulationError> {
        let n = self.len();
        debug_assert_eq!(solution.len(), n);
        if n == 0 {
            return Ok(());
        }

        let singular = |_: f64| SimulationError::Numerical {
            quantity: "tridiagonal pivot".to_string(),
            step,
        };

        if self.diag[0].abs() < 1e-300 {
            return Err(singular(self.diag[0]));
        }
        self.scratch_c[0] = self.upper[0] / self.diag[0];
        self.scratch_d[0] = self.rhs[0] / self.diag[0];

        for i in 1..n {
            let denom = self.diag[i] - self.lower[i] * self.scratch_c[i - 1];
            if denom.abs() < 1e-300 {
                return Err(singular(denom));
            }
            self.scratch_c[i] = self.upper[i] / denom;
            self.scratch_d[i] = (self.rhs[i] - self.lower[i] * self.scratch_d[i - 1]) / denom;
        }

        solution[n - 1] = self.scratch_d[n - 1];
        for i in (0..n - 1).rev() {
            solution[i] = self.scratch_d[i] - self.scratch_c[i] * solution[i + 1];
        }
        Ok(())
    }
}

// =================================================================================================
// Tests
// =================================================================================================
