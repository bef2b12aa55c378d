//! Error taxonomy for the transport core
//!
//! Every fallible operation in the crate returns [`SimulationError`].
//! The taxonomy mirrors when each failure can occur:
//!
//! - [`SimulationError::Configuration`]: detected while building the
//!   grid or validating the configuration, before any time stepping.
//! - [`SimulationError::OutputBudget`]: the pre-flight output size
//!   estimate exceeds the safety budget, before any allocation.
//! - [`SimulationError::NonConvergence`]: the nonlinear fixed-point
//!   loop failed within the bounded iteration count, mid-run.
//! - [`SimulationError::Numerical`]: NaN/Inf detected in the advanced
//!   state, mid-run.
//!
//! User cancellation is deliberately NOT an error: the driver returns
//! `RunOutcome::Cancelled` on the `Ok` path instead, so a cancelled run
//! can never be mistaken for a failed one.

use thiserror::Error;

/// Error type for the transport core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Invalid configuration: undefined references, inconsistent layer
    /// assignments, malformed discretization. Always reported before
    /// stepping starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The output series would exceed the allocation safety budget.
    #[error(
        "output budget exceeded: run requires {required} values, budget is {budget} \
         (reduce output steps, node count or chemical count)"
    )]
    OutputBudget { required: usize, budget: usize },

    /// The nonlinear fixed-point loop did not reach the requested
    /// tolerance within the iteration cap.
    #[error(
        "nonlinear iteration failed to converge at step {step} (t = {time}): \
         relative change {change:e} after {iterations} iterations"
    )]
    NonConvergence {
        step: usize,
        time: f64,
        iterations: usize,
        change: f64,
    },

    /// NaN or Inf appeared in the solution, indicating numerical
    /// instability. Carries the field name and the offending step.
    #[error(
        "non-finite value in {quantity} at step {step}; \
         the time step is likely too large for this configuration"
    )]
    Numerical { quantity: String, step: usize },
}

impl SimulationError {
    /// Shorthand for a configuration error with a formatted message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message() {
        let err = SimulationError::config("layer 'cap' references undefined component 'sand'");
        assert!(err.to_string().contains("undefined component 'sand'"));
    }

    #[test]
    fn test_budget_message_names_both_sides() {
        let err = SimulationError::OutputBudget {
            required: 100,
            budget: 50,
        };
        let text = err.to_string();
        assert!(text.contains("100"));
        assert!(text.contains("50"));
    }

    #[test]
    fn test_nonconvergence_reports_iterations() {
        let err = SimulationError::NonConvergence {
            step: 12,
            time: 3.5,
            iterations: 50,
            change: 1e-2,
        };
        assert!(err.to_string().contains("50 iterations"));
    }
}
