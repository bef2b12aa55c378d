//! sedtran-rs: 1-D Reactive Sediment Transport
//!
//! A solver for one-dimensional reactive contaminant transport through
//! multi-layer sediment/cap columns: porewater diffusion, steady or
//! tidal advection, bioturbative mixing, equilibrium and kinetic
//! sorption (linear, Freundlich, Langmuir), multi-reactant reaction
//! networks, consolidation-driven velocity fields, and
//! deposition-driven growth of the spatial domain.
//!
//! # Architecture
//!
//! The crate is built on two core principles:
//!
//! 1. **Separation of configuration and numerics**
//!    - The configuration model describes the problem (immutable data)
//!    - The solver advances it (engine, assembler, drivers)
//!
//! 2. **Typed selections everywhere**
//!    - Isotherms, kinetics, boundary kinds, advection and averaging
//!      modes are tagged enums with exhaustive matching
//!    - Errors are a typed taxonomy; cancellation is not an error
//!
//! # Quick Start
//!
//! ```rust
//! use sedtran_rs::prelude::*;
//!
//! // 1. Describe the column: one chemical, one sand cap layer.
//! let config = SimulationConfig {
//!     chemicals: vec![Chemical::new("naphthalene", 6.0e-6)],
//!     components: vec![Component {
//!         name: "sand".to_string(),
//!         porosity: 0.4,
//!         density: 2.6,
//!         foc: 0.001,
//!         tortuosity: TortuosityModel::MillingtonQuirk,
//!     }],
//!     layers: vec![Layer {
//!         name: "cap".to_string(),
//!         thickness: 0.3,
//!         components: vec![(0, 1.0)],
//!         discretization: LayerDiscretization::NodeCount(30),
//!         dispersivity: 0.0,
//!         doc: 0.0,
//!     }],
//!     sorption: vec![],
//!     reactions: vec![],
//!     boundaries: vec![BoundaryConditions {
//!         top: TopBoundary::FixedConcentration(1.0),
//!         bottom: BottomBoundary::ZeroGradient,
//!     }],
//!     initial_conditions: vec![],
//!     solid_initial_conditions: vec![],
//!     advection: Advection::None,
//!     consolidation: None,
//!     deposition: None,
//!     bioturbation: None,
//!     options: SolverOptions::new(100.0, 1000, 10),
//! };
//!
//! // 2. Run it.
//! let outcome = sedtran_rs::solver::run(&config, &CancelToken::new())?;
//!
//! // 3. Access results.
//! if let RunOutcome::Completed(series) = outcome {
//!     println!("{} samples over {} depths", series.len(), series.depths.len());
//! }
//! # Ok::<(), sedtran_rs::error::SimulationError>(())
//! ```
//!
//! # Modules
//!
//! - [`config`]: the configuration model (problem definition)
//! - [`grid`]: grid and material builder
//! - [`kernel`]: sorption/reaction kernel (pure functions)
//! - [`solver`]: matrix assembly, time stepping, drivers
//! - [`output`]: output accumulation and the result series
//! - [`error`]: the error taxonomy

// Core modules
pub mod config;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod output;
pub mod solver;

pub mod prelude {
    //! Convenient imports for common usage
    //!
    //! ```rust
    //! use sedtran_rs::prelude::*;
    //! ```
    pub use crate::config::{
        Advection, AveragingMode, Bioturbation, BioturbationProfile, BoundaryConditions,
        BottomBoundary, Chemical, Component, Consolidation, Deposition, InitialCondition,
        InitialProfile, Isotherm, Kinetics, Layer, LayerDiscretization, Reaction,
        ReactionProduct, ReactionTerm, SimulationConfig, SolidInitialCondition, SolverOptions,
        SorptionRelation, TimeWeighting, TopBoundary, TortuosityModel,
    };
    pub use crate::error::SimulationError;
    pub use crate::output::{FieldSnapshot, OutputSeries};
    pub use crate::solver::{
        run, BatchDriver, BatchMode, CancelToken, RunOutcome, TransportEngine,
    };
}
