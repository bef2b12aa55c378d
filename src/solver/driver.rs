//! Run drivers
//!
//! The orchestration loop visible to the presentation layer: validate,
//! build the engine and the output accumulator, step to the final time,
//! and return the output series, or no result at all when the caller
//! cancels.
//!
//! # Cancellation
//!
//! Cancellation is cooperative: the caller holds a [`CancelToken`]
//! (a shared atomic flag) and the driver checks it once per completed
//! step, never mid-assembly. On cancellation the partial output is
//! discarded and [`RunOutcome::Cancelled`] is returned on the `Ok`
//! path; a cancelled run is not an error and never yields a partial
//! series.
//!
//! # Batches
//!
//! [`BatchDriver`] runs several configurations sequentially. In
//! [`BatchMode::Separate`] each run starts from its own initial
//! conditions; in [`BatchMode::Continuous`] the ending state of one
//! configuration seeds the next (the grids must match). No two
//! configurations ever execute concurrently, so no locking is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::config::{AveragingMode, SimulationConfig};
use crate::error::SimulationError;
use crate::output::{FieldSnapshot, OutputAccumulator, OutputSeries};
use crate::solver::engine::{ColumnState, EngineState, TransportEngine};

// =================================================================================================
// Cancellation
// =================================================================================================

/// Shared cancellation flag.
///
/// Clone the token and hand one copy to the caller; the driver polls
/// the flag once per completed step. Relaxed ordering is sufficient:
/// the flag is a stop hint, not a synchronization point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the run holding this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// =================================================================================================
// Outcomes
// =================================================================================================

/// Result of a single run: the full series, or nothing on cancellation.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(OutputSeries),
    Cancelled,
}

impl RunOutcome {
    /// The output series, if the run completed.
    pub fn series(&self) -> Option<&OutputSeries> {
        match self {
            RunOutcome::Completed(series) => Some(series),
            RunOutcome::Cancelled => None,
        }
    }
}

/// Batch chaining behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Every configuration runs from its own initial conditions.
    Separate,
    /// The ending state of each configuration seeds the next.
    Continuous,
}

// =================================================================================================
// Single-run driver
// =================================================================================================

/// Run one configuration to completion or cancellation.
pub fn run(
    config: &SimulationConfig,
    cancel: &CancelToken,
) -> Result<RunOutcome, SimulationError> {
    config.validate()?;
    let engine = TransportEngine::new(config)?;
    run_engine(config, engine, cancel).map(|(outcome, _)| outcome)
}

/// Drive a prepared engine; also returns the final column state for
/// continuous batch chaining (None when cancelled).
fn run_engine(
    config: &SimulationConfig,
    mut engine: TransportEngine<'_>,
    cancel: &CancelToken,
) -> Result<(RunOutcome, Option<ColumnState>), SimulationError> {
    let mut accumulator = OutputAccumulator::new(config, &engine.grid().depths())?;

    info!(
        "run started: tfinal = {}, {} steps, {} output samples",
        config.options.final_time,
        config.options.time_steps,
        accumulator.times().len()
    );

    // t = 0 snapshot.
    accumulator.offer(FieldSnapshot::capture(
        config,
        engine.grid(),
        engine.state(),
        engine.cmax(),
        engine.velocity(),
    ));

    let sampling_state = match config.options.averaging {
        AveragingMode::Instantaneous => EngineState::Sampling,
        AveragingMode::PeriodAverage => EngineState::Averaging,
    };

    while !engine.is_finished() {
        engine.advance()?;

        engine.set_engine_state(sampling_state);
        accumulator.offer(FieldSnapshot::capture(
            config,
            engine.grid(),
            engine.state(),
            engine.cmax(),
            engine.velocity(),
        ));

        // Cooperative cancellation, once per completed step.
        if cancel.is_cancelled() {
            engine.set_engine_state(EngineState::Aborted);
            info!("run cancelled at t = {:.4}; output discarded", engine.time());
            return Ok((RunOutcome::Cancelled, None));
        }
    }

    let steps = engine.step_count();
    let dt = engine.dt();
    let state = engine.into_state();

    let mut series = accumulator.finish();
    series.add_metadata(
        "solver",
        match config.options.weighting {
            crate::config::TimeWeighting::Implicit => "implicit finite volume",
            crate::config::TimeWeighting::CrankNicolson => "Crank-Nicolson finite volume",
        },
    );
    series.add_metadata("time steps", &steps.to_string());
    series.add_metadata("dt", &dt.to_string());
    series.add_metadata("nodes", &state.n_nodes().to_string());

    info!("run completed: {} samples stored", series.len());
    Ok((RunOutcome::Completed(series), Some(state)))
}

// =================================================================================================
// Batch driver
// =================================================================================================

/// Runs multiple independent configurations sequentially.
pub struct BatchDriver {
    configs: Vec<SimulationConfig>,
    mode: BatchMode,
}

impl BatchDriver {
    pub fn new(configs: Vec<SimulationConfig>, mode: BatchMode) -> Self {
        Self { configs, mode }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Run every configuration in order.
    ///
    /// Cancellation stops the batch: the cancelled run yields
    /// [`RunOutcome::Cancelled`] and the remaining configurations are
    /// not started. In continuous mode each run is seeded with the
    /// previous run's final state.
    pub fn run_all(&self, cancel: &CancelToken) -> Result<Vec<RunOutcome>, SimulationError> {
        let mut outcomes = Vec::with_capacity(self.configs.len());
        let mut carry: Option<ColumnState> = None;

        for (index, config) in self.configs.iter().enumerate() {
            config.validate()?;
            info!("batch run {}/{}", index + 1, self.configs.len());

            let engine = match (&self.mode, carry.take()) {
                (BatchMode::Continuous, Some(seed)) => TransportEngine::seeded(config, seed)?,
                _ => TransportEngine::new(config)?,
            };

            let (outcome, state) = run_engine(config, engine, cancel)?;
            let cancelled = matches!(outcome, RunOutcome::Cancelled);
            if self.mode == BatchMode::Continuous {
                carry = state;
            }
            outcomes.push(outcome);
            if cancelled {
                break;
            }
        }
        Ok(outcomes)
    }
}

// =================================================================================================
// Tests
// =================================================================================================
