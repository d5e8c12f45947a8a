//! # aceqd-core
//!
//! **Multi-time correlation functions for a driven two-level quantum
//! emitter, computed by orchestrating the external ACE solver.**
//!
//! The solver propagates an open two-level system over one time window per
//! invocation. Correlation functions of the emitted light need the state at
//! two times, so every time point becomes its own solver job: propagate to
//! `t`, insert the lowering operator, propagate on through the delay
//! window. This crate owns everything around those invocations: isolated
//! scratch files per job, the shared process-tensor artifact, the bounded
//! worker pool, and the combination algebra per correlation order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aceqd_core::{g2, CorrelationConfig, DriveSource, GaussianPulse};
//!
//! let pulses: Vec<Box<dyn DriveSource>> = vec![Box::new(GaussianPulse {
//!     area: 1.0,
//!     sigma: 5.0,
//!     center: 20.0,
//!     detuning: 0.0,
//! })];
//! let cfg = CorrelationConfig::default();
//! let result = g2(0.0, 100.0, 0.0, 100.0, &pulses, &cfg).unwrap();
//! println!("{} x {} grid", result.grid.rows(), result.grid.cols());
//! ```
//!
//! ## Architecture
//!
//! Process tensor (serial, once) → shared pulse file (once) →
//! worker pool (one solver process per time point, tag-isolated scratch
//! files) → ordered results → correlation grid.
//!
//! Shared artifacts are read-only once written; everything else a job
//! touches is exclusively owned via its tag, so no locking is needed.

pub mod correlation;
pub mod error;
pub mod export;
pub mod grid;
pub mod pool;
pub mod process_tensor;
pub mod pulse;
pub mod scratch;
pub mod solver;

pub use correlation::{g1, g2, g2hom, Correlation, CorrelationConfig, Grid2};
pub use error::{Error, Result};
pub use pool::WorkerPool;
pub use process_tensor::{default_artifact_name, ensure_process_tensor};
pub use pulse::{DriveSource, GaussianPulse};
pub use solver::{
    run_solver, InsertionSide, OperatorInsertion, SolverOptions, SolverResult, HBAR, OP_EXCITED,
    OP_GROUND, OP_LOWER, OP_RAISE,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
