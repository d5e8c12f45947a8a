//! Process tensor cache.
//!
//! A process tensor captures the phonon environment's influence over a fixed
//! time span. It is expensive to build and reusable read-only by any job
//! restricted to a shorter sub-window, so it is computed once for the
//! longest window any dependent job will request, strictly before the worker
//! pool dispatches anything. This layer never deletes the artifact; callers
//! may reuse it across runs.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::pulse::DriveSource;
use crate::solver::{resolve_artifact_path, run_solver, SolverOptions};

/// Conventional artifact file name for a (duration, temperature, coupling
/// length) key.
pub fn default_artifact_name(duration: f64, temperature: f64, ae: f64) -> String {
    format!("tls_generate_{}ps_{}K_{}nm.pt", duration, temperature, ae)
}

/// Ensure a usable process tensor exists for the window `[t_start, t_end]`.
///
/// Idempotent: an existing artifact is reused without any solver
/// invocation. Otherwise one generation run covers the full window; its
/// failure aborts the whole correlation computation before any parallel
/// dispatch begins.
pub fn ensure_process_tensor(
    t_start: f64,
    t_end: f64,
    pulses: &[Box<dyn DriveSource>],
    options: &SolverOptions,
) -> Result<PathBuf> {
    let path = resolve_artifact_path(t_start, t_end, options);
    if path.exists() {
        log::info!("reusing process tensor {}", path.display());
        return Ok(path);
    }

    log::info!(
        "process tensor {} not found, generating for [{}, {}]",
        path.display(),
        t_start,
        t_end
    );
    let build = SolverOptions {
        generate_pt: true,
        phonons: true,
        lindblad: false,
        pt_file: Some(path.clone()),
        ..options.clone()
    };
    run_solver(t_start, t_end, pulses, None, &build, "pt")
        .map_err(|e| Error::Artifact(Box::new(e)))?;
    Ok(path)
}
