//! Numerical solver
//!
//! This module owns everything between the configuration model and the
//! output series: the per-step linear systems, the time-dependent
//! forcings, the stepping engine and the run drivers.
//!
//! # The Architecture (WHAT vs HOW)
//!
//! The solver separates concerns into three layers:
//!
//! 1. **Configuration** ([`crate::config`]): WHAT to solve. Layers,
//!    chemicals, sorption and reaction definitions, boundary and
//!    initial conditions. Immutable per run.
//!
//! 2. **Engine** ([`TransportEngine`]): HOW the state advances. Grid
//!    growth, forcing updates, matrix assembly, the nonlinear
//!    fixed-point loop, kinetic solid-state integration.
//!
//! 3. **Driver** ([`run`], [`BatchDriver`]): the orchestration loop of
//!    validation, output accumulation, cooperative cancellation,
//!    sequential batching.
//!
//! This separation allows the same engine to serve single runs and
//! batches, and keeps the numerical method independent of how results
//! are sampled and stored.
//!
//! # Module Organization
//!
//! - **`tridiag`**: Thomas-algorithm banded solver with reusable scratch
//! - **`forcing`**: consolidation/tidal velocity, deposition accounting
//! - **`assemble`**: per-chemical θ-weighted transport systems
//! - **`engine`**: the time-stepping state machine
//! - **`driver`**: single-run and batch entry points, cancellation
//!
//! # Workflow
//!
//! ```text
//! ┌───────────────────┐
//! │ SimulationConfig  │  (WHAT to solve)
//! └─────────┬─────────┘
//!           │ validate, build grid
//! ┌─────────▼─────────┐     ┌────────────────────┐
//! │ TransportEngine   │────▶│ OutputAccumulator  │
//! │ (step, iterate)   │     │ (sample, average)  │
//! └─────────┬─────────┘     └─────────┬──────────┘
//!           │ finished                │ finish
//! ┌─────────▼────────────────────────▼──────────┐
//! │ RunOutcome::Completed(OutputSeries)          │
//! │ RunOutcome::Cancelled (no partial results)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! Every entry point returns `Result<_, SimulationError>`. Common
//! failures:
//! - invalid configuration (dangling references, bad discretization)
//! - output budget exceeded (refused before allocation)
//! - nonlinear non-convergence (never silently accepted)
//! - numerical instability (NaN/Inf detected after a step)

// =================================================================================================
// Module Declarations
// =================================================================================================

pub mod assemble;
pub mod driver;
pub mod engine;
pub mod forcing;
pub mod tridiag;

// =================================================================================================
// Public Re-exports
// =================================================================================================

pub use assemble::{AssemblyContext, AssemblyScratch};
pub use driver::{run, BatchDriver, BatchMode, CancelToken, RunOutcome};
pub use engine::{ColumnState, EngineState, TransportEngine, MAX_NONLINEAR_ITERATIONS};
pub use forcing::{DepositionTracker, VelocityForcing};
pub use tridiag::TridiagonalSystem;
