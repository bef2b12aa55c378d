//! Output accumulator
//!
//! Owns the output time grid and the fixed-shape result arrays, and
//! folds raw per-step snapshots into them, by linear interpolation
//! onto the requested times (instantaneous mode) or by arithmetic
//! averaging over tidal periods (period-averaged mode).
//!
//! The accumulator never fails after construction: the pre-flight size
//! estimate either refuses the run before allocation or guarantees the
//! arrays fit the budget.

use std::collections::HashMap;

use log::debug;
use nalgebra::DVector;
use ndarray::{Array2, Array3, Array4};

use crate::config::{AveragingMode, SimulationConfig};
use crate::error::SimulationError;
use crate::output::series::{FieldSnapshot, OutputSeries};
use crate::solver::forcing::DepositionTracker;

/// Safety budget on the number of stored f64 values (≈ 256 MiB).
pub const OUTPUT_BUDGET_VALUES: usize = 1 << 25;

// =================================================================================================
// Accumulator
// =================================================================================================

#[derive(Debug)]
enum Sampling {
    /// Interpolate raw steps onto the requested times.
    Instantaneous { previous: Option<FieldSnapshot> },
    /// Average raw sub-steps over each tidal period.
    PeriodAverage { period: f64, count: usize },
}

/// Accumulates converted snapshots into the output series.
#[derive(Debug)]
pub struct OutputAccumulator<'a> {
    config: &'a SimulationConfig,
    times: Vec<f64>,
    depths: Vec<f64>,
    time_tolerance: f64,
    sampling: Sampling,

    /// Next output row to fill
    cursor: usize,
    surface_index: Vec<usize>,

    porewater: Array3<f64>,
    flux: Array3<f64>,
    solid: Array3<f64>,
    solid_by_component: Array4<f64>,
    total: Array3<f64>,
    fractions: Array3<f64>,
    water_column: Array2<f64>,
}

impl<'a> OutputAccumulator<'a> {
    /// Build the accumulator: derive the output time grid, run the
    /// pre-flight size estimate and allocate the result arrays.
    ///
    /// `initial_depths` is the node depth ladder at t = 0; deposition
    /// extends it upward by the projected number of deposited cells.
    pub fn new(
        config: &'a SimulationConfig,
        initial_depths: &[f64],
    ) -> Result<Self, SimulationError> {
        let options = &config.options;
        let n_chems = config.chemicals.len();
        let n_comps = config.components.len();

        // Projected depth ladder: deposited cells stack on top.
        let max_cells = DepositionTracker::from_config(config)
            .map(|tracker| tracker.max_cells(options.final_time))
            .unwrap_or(0);
        let cell = DepositionTracker::from_config(config)
            .map(|tracker| tracker.cell())
            .unwrap_or(0.0);
        let mut depths = Vec::with_capacity(initial_depths.len() + max_cells);
        for i in 0..max_cells {
            depths.push(-((max_cells - i) as f64) * cell);
        }
        depths.extend_from_slice(initial_depths);
        let z_max = depths.len();

        // Output time grid.
        let (times, sampling) = match options.averaging {
            AveragingMode::Instantaneous => {
                let dt_out = options.final_time / options.output_steps as f64;
                let times: Vec<f64> = (0..=options.output_steps)
                    .map(|k| k as f64 * dt_out)
                    .collect();
                (times, Sampling::Instantaneous { previous: None })
            }
            AveragingMode::PeriodAverage => {
                let period = config
                    .advection
                    .period()
                    .ok_or_else(|| {
                        SimulationError::config(
                            "period-averaged output requires periodic advection",
                        )
                    })?;
                let n_periods = (options.final_time / period + 1.0e-9).floor() as usize;
                if n_periods == 0 {
                    return Err(SimulationError::config(
                        "final time is shorter than one tidal period",
                    ));
                }
                let times: Vec<f64> = (0..n_periods)
                    .map(|k| (k as f64 + 0.5) * period)
                    .collect();
                (times, Sampling::PeriodAverage { period, count: 0 })
            }
        };
        let n_times: usize = match &sampling {
            Sampling::Instantaneous { .. } => options.output_steps + 1,
            Sampling::PeriodAverage { .. } => times.len(),
        };

        // Pre-flight budget check, before any array allocation.
        let required =
            n_times * z_max * (n_chems * (5 + n_comps) + n_comps) + n_times * n_chems;
        if required > OUTPUT_BUDGET_VALUES {
            return Err(SimulationError::OutputBudget {
                required,
                budget: OUTPUT_BUDGET_VALUES,
            });
        }
        debug!(
            "output allocation: {} samples × {} rows, {} values",
            n_times, z_max, required
        );

        Ok(Self {
            config,
            times,
            depths,
            time_tolerance: 1.0e-9 * options.final_time,
            sampling,
            cursor: 0,
            surface_index: vec![0; n_times],
            porewater: Array3::zeros((n_times, z_max, n_chems)),
            flux: Array3::zeros((n_times, z_max, n_chems)),
            solid: Array3::zeros((n_times, z_max, n_chems)),
            solid_by_component: Array4::zeros((n_times, z_max, n_chems, n_comps)),
            total: Array3::zeros((n_times, z_max, n_chems)),
            fractions: Array3::zeros((n_times, z_max, n_comps)),
            water_column: Array2::zeros((n_times, n_chems)),
        })
    }

    /// Requested output times.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Offer one raw snapshot to the accumulator.
    pub fn offer(&mut self, snapshot: FieldSnapshot) {
        match &mut self.sampling {
            Sampling::Instantaneous { .. } => self.offer_instantaneous(snapshot),
            Sampling::PeriodAverage { .. } => self.offer_period(snapshot),
        }
    }

    fn offer_instantaneous(&mut self, snapshot: FieldSnapshot) {
        // Take the previous snapshot out of the sampling state so the
        // result arrays can be written while it is read.
        let previous = match &mut self.sampling {
            Sampling::Instantaneous { previous } => previous.take(),
            _ => unreachable!(),
        };

        while self.cursor < self.times.len()
            && self.times[self.cursor] <= snapshot.time + self.time_tolerance
        {
            let t_out = self.times[self.cursor];
            let alpha = match previous.as_ref() {
                Some(prev) if snapshot.time - prev.time > self.time_tolerance => {
                    ((t_out - prev.time) / (snapshot.time - prev.time)).clamp(0.0, 1.0)
                }
                _ => 1.0,
            };

            let row = self.cursor;
            self.store_interpolated(row, previous.as_ref(), &snapshot, alpha);
            self.cursor += 1;
            debug!("stored output sample {} at t = {:.4}", row, t_out);
        }

        if let Sampling::Instantaneous { previous: slot } = &mut self.sampling {
            *slot = Some(snapshot);
        }
    }

    fn offer_period(&mut self, snapshot: FieldSnapshot) {
        // The t = 0 snapshot sits on a period boundary and belongs to
        // no averaging window.
        if snapshot.time <= self.time_tolerance {
            return;
        }

        loop {
            if self.cursor >= self.times.len() {
                return; // trailing partial period is discarded
            }
            let Sampling::PeriodAverage { period, count } = &mut self.sampling else {
                unreachable!()
            };
            let period = *period;
            let row = self.cursor;
            let boundary = (row as f64 + 1.0) * period;

            if snapshot.time <= boundary + self.time_tolerance {
                accumulate_row(
                    row,
                    &snapshot,
                    self.depths.len(),
                    &mut self.porewater,
                    &mut self.flux,
                    &mut self.solid,
                    &mut self.solid_by_component,
                    &mut self.total,
                    &mut self.fractions,
                    &mut self.water_column,
                );
                *count += 1;
                self.surface_index[row] = self.depths.len() - snapshot.n_nodes();

                if (snapshot.time - boundary).abs() <= self.time_tolerance {
                    // Period complete: turn the accumulated sums into
                    // the arithmetic mean at the period midpoint.
                    let scale = 1.0 / *count as f64;
                    scale_row(
                        row,
                        scale,
                        &mut self.porewater,
                        &mut self.flux,
                        &mut self.solid,
                        &mut self.solid_by_component,
                        &mut self.total,
                        &mut self.fractions,
                        &mut self.water_column,
                    );
                    *count = 0;
                    self.cursor += 1;
                    debug!(
                        "stored period-averaged sample {} at t = {:.4}",
                        row, self.times[row]
                    );
                }
                return;
            }

            // The snapshot belongs to a later period: close this one
            // with the sub-steps it already received and move on.
            if *count > 0 {
                let scale = 1.0 / *count as f64;
                scale_row(
                    row,
                    scale,
                    &mut self.porewater,
                    &mut self.flux,
                    &mut self.solid,
                    &mut self.solid_by_component,
                    &mut self.total,
                    &mut self.fractions,
                    &mut self.water_column,
                );
                *count = 0;
            }
            self.cursor += 1;
        }
    }

    fn store_interpolated(
        &mut self,
        row: usize,
        previous: Option<&FieldSnapshot>,
        current: &FieldSnapshot,
        alpha: f64,
    ) {
        let z_max = self.depths.len();
        let n_chems = self.config.chemicals.len();
        let n_comps = self.config.components.len();
        let offset = z_max - current.n_nodes();

        let lerp = |prev: Option<f64>, cur: f64| match prev {
            Some(p) => p + alpha * (cur - p),
            None => cur,
        };
        let prev_at = |field: &dyn Fn(&FieldSnapshot) -> &DVector<f64>, z: usize| {
            previous.map(|p| embedded(field(p), z_max, z))
        };

        for z in 0..z_max {
            for chem in 0..n_chems {
                self.porewater[[row, z, chem]] = lerp(
                    prev_at(&|s| &s.porewater[chem], z),
                    embedded(&current.porewater[chem], z_max, z),
                );
                self.flux[[row, z, chem]] = lerp(
                    prev_at(&|s| &s.flux[chem], z),
                    embedded(&current.flux[chem], z_max, z),
                );
                self.solid[[row, z, chem]] = lerp(
                    prev_at(&|s| &s.solid[chem], z),
                    embedded(&current.solid[chem], z_max, z),
                );
                self.total[[row, z, chem]] = lerp(
                    prev_at(&|s| &s.total[chem], z),
                    embedded(&current.total[chem], z_max, z),
                );
                for comp in 0..n_comps {
                    self.solid_by_component[[row, z, chem, comp]] = lerp(
                        prev_at(&|s| &s.solid_by_component[chem][comp], z),
                        embedded(&current.solid_by_component[chem][comp], z_max, z),
                    );
                }
            }
            for comp in 0..n_comps {
                self.fractions[[row, z, comp]] = lerp(
                    prev_at(&|s| &s.fractions[comp], z),
                    embedded(&current.fractions[comp], z_max, z),
                );
            }
        }
        for chem in 0..n_chems {
            self.water_column[[row, chem]] = lerp(
                previous.map(|p| p.water_column[chem]),
                current.water_column[chem],
            );
        }
        self.surface_index[row] = offset;
    }

    /// Number of samples stored so far.
    pub fn stored(&self) -> usize {
        self.cursor
    }

    /// Pack the accumulated arrays into the final series.
    pub fn finish(self) -> OutputSeries {
        OutputSeries {
            times: self.times,
            depths: self.depths,
            surface_index: self.surface_index,
            porewater: self.porewater,
            flux: self.flux,
            solid: self.solid,
            solid_by_component: self.solid_by_component,
            total: self.total,
            fractions: self.fractions,
            water_column: self.water_column,
            metadata: HashMap::new(),
        }
    }
}

/// Bottom-anchored read: row `z` of the fixed ladder maps to node
/// `z - (z_max - n)`; rows above the current surface read zero.
fn embedded(v: &DVector<f64>, z_max: usize, z: usize) -> f64 {
    let offset = z_max - v.len();
    if z >= offset {
        v[z - offset]
    } else {
        0.0
    }
}

#[allow(clippy::too_many_arguments)]
fn accumulate_row(
    row: usize,
    snapshot: &FieldSnapshot,
    z_max: usize,
    porewater: &mut Array3<f64>,
    flux: &mut Array3<f64>,
    solid: &mut Array3<f64>,
    solid_by_component: &mut Array4<f64>,
    total: &mut Array3<f64>,
    fractions: &mut Array3<f64>,
    water_column: &mut Array2<f64>,
) {
    let n_chems = snapshot.porewater.len();
    let n_comps = snapshot.fractions.len();

    for z in 0..z_max {
        for chem in 0..n_chems {
            porewater[[row, z, chem]] += embedded(&snapshot.porewater[chem], z_max, z);
            flux[[row, z, chem]] += embedded(&snapshot.flux[chem], z_max, z);
            solid[[row, z, chem]] += embedded(&snapshot.solid[chem], z_max, z);
            total[[row, z, chem]] += embedded(&snapshot.total[chem], z_max, z);
            for comp in 0..n_comps {
                solid_by_component[[row, z, chem, comp]] +=
                    embedded(&snapshot.solid_by_component[chem][comp], z_max, z);
            }
        }
        for comp in 0..n_comps {
            fractions[[row, z, comp]] += embedded(&snapshot.fractions[comp], z_max, z);
        }
    }
    for chem in 0..n_chems {
        water_column[[row, chem]] += snapshot.water_column[chem];
    }
}

#[allow(clippy::too_many_arguments)]
fn scale_row(
    row: usize,
    scale: f64,
    porewater: &mut Array3<f64>,
    flux: &mut Array3<f64>,
    solid: &mut Array3<f64>,
    solid_by_component: &mut Array4<f64>,
    total: &mut Array3<f64>,
    fractions: &mut Array3<f64>,
    water_column: &mut Array2<f64>,
) {
    porewater.index_axis_mut(ndarray::Axis(0), row).mapv_inplace(|x| x * scale);
    flux.index_axis_mut(ndarray::Axis(0), row).mapv_inplace(|x| x * scale);
    solid.index_axis_mut(ndarray::Axis(0), row).mapv_inplace(|x| x * scale);
    solid_by_component
        .index_axis_mut(ndarray::Axis(0), row)
        .mapv_inplace(|x| x * scale);
    total.index_axis_mut(ndarray::Axis(0), row).mapv_inplace(|x| x * scale);
    fractions.index_axis_mut(ndarray::Axis(0), row).mapv_inplace(|x| x * scale);
    water_column
        .index_axis_mut(ndarray::Axis(0), row)
        .mapv_inplace(|x| x * scale);
}

// =================================================================================================
// Tests
// =================================================================================================
