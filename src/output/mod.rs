//! Output accumulation
//!
//! Converts raw per-node solver state into named physical fields and
//! stores them at the requested output times.
//!
//! # Architecture
//!
//! ```text
//! output/
//! ├── mod.rs          ← this file
//! ├── series.rs       ← OutputSeries result type, field conversion
//! └── accumulator.rs  ← output time grid, sampling, size budget
//! ```
//!
//! # Sampling modes
//!
//! - **Instantaneous**: each requested output time is filled by linear
//!   interpolation between the two bracketing raw time steps.
//! - **Period-averaged**: every raw sub-step inside one tidal period is
//!   accumulated and the arithmetic mean is written at the period
//!   midpoint. Only valid with periodic advection.
//!
//! # Growth and alignment
//!
//! Deposition grows the node grid during a run, but output array shapes
//! are fixed at allocation. The depth axis is therefore sized for the
//! projected final node count and rows are **bottom-anchored**: the
//! column's bottom node always maps to the last row, and rows above the
//! current surface hold zeros until their node exists. The first active
//! row of each sample is recorded in `OutputSeries::surface_index`.
//!
//! # Budget
//!
//! A pre-flight estimate of the stored value count is checked against a
//! fixed safety budget before anything is allocated; exceeding it
//! refuses the run with an `OutputBudget` error
//! (see [`accumulator::OUTPUT_BUDGET_VALUES`]).

pub mod accumulator;
pub mod series;

pub use accumulator::{OutputAccumulator, OUTPUT_BUDGET_VALUES};
pub use series::{FieldSnapshot, OutputSeries};
