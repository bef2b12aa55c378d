//! Helper functions and configuration builders for integration tests

use sedtran_rs::output::OutputSeries;
use sedtran_rs::prelude::*;

/// Compute relative error: |actual - expected| / |expected|
pub fn relative_error(actual: f64, expected: f64) -> f64 {
    if expected.abs() < 1e-10 {
        (actual - expected).abs()
    } else {
        (actual - expected).abs() / expected.abs()
    }
}

/// A plain sand component.
pub fn sand() -> Component {
    Component {
        name: "sand".to_string(),
        porosity: 0.4,
        density: 2.6,
        foc: 0.001,
        tortuosity: TortuosityModel::Identity,
    }
}

/// Single sand layer, one tracer chemical, Dirichlet top at 1.0,
/// zero-gradient bottom, no sorption/reaction/advection.
pub fn tracer_config() -> SimulationConfig {
    SimulationConfig {
        chemicals: vec![Chemical::new("tracer", 1.0e-2)],
        components: vec![sand()],
        layers: vec![Layer {
            name: "cap".to_string(),
            thickness: 1.0,
            components: vec![(0, 1.0)],
            discretization: LayerDiscretization::NodeCount(25),
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
        options: SolverOptions::new(20.0, 400, 10),
    }
}

/// Sealed column: no flux through either boundary, a linear initial
/// profile so diffusion has work to do.
pub fn sealed_tracer_config() -> SimulationConfig {
    let mut config = tracer_config();
    config.boundaries[0] = BoundaryConditions {
        top: TopBoundary::MassTransfer {
            coefficient: 0.0,
            water_concentration: 0.0,
        },
        bottom: BottomBoundary::ZeroGradient,
    };
    config.initial_conditions = vec![InitialCondition {
        layer: 0,
        chemical: 0,
        profile: InitialProfile::Linear {
            top: 2.0,
            bottom: 0.0,
        },
    }];
    config
}

/// Porewater mass in the column at one stored sample, as the
/// cell-width-weighted sum of e·C over the active rows.
pub fn column_mass(series: &OutputSeries, sample: usize, chemical: usize, porosity: f64) -> f64 {
    let z0 = series.surface_index[sample];
    let n = series.depths.len();
    let mut mass = 0.0;
    for z in z0..n {
        let width = if z == z0 {
            0.5 * (series.depths[z + 1] - series.depths[z])
        } else if z == n - 1 {
            0.5 * (series.depths[z] - series.depths[z - 1])
        } else {
            0.5 * (series.depths[z + 1] - series.depths[z - 1])
        };
        mass += porosity * width * series.porewater[[sample, z, chemical]];
    }
    mass
}
