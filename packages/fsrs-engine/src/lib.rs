#![deny(clippy::all)]

pub mod autodiff;
pub mod benchmark;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod sanitize;
pub mod scheduler;
pub mod simulator;
pub mod types;

// Re-export the main types and functions
pub use benchmark::{CalibrationBin, Evaluation};
pub use error::{FSRSError, Result};
pub use model::{default_parameters, Parameters, DEFAULT_PARAMETERS, PARAMETER_COUNT};
pub use optimizer::OptimizerConfig;
pub use scheduler::FSRS;
pub use simulator::{
    default_simulator_config, optimal_retention, simulate, RatingTable, SimulationResult,
    SimulatorConfig,
};
pub use types::*;
