//! Correlation grids and the G1 / G2 / G2hom entry points.
//!
//! Every correlation function follows the same orchestration: sample the
//! shared pulse file once, make sure the process tensor exists (phonon runs
//! only), dispatch one solver job per time point through the worker pool
//! (window `[t0, t_i + tauend]`, lowering operator inserted at `t_i`), then
//! combine the ordered per-job series into a (time x delay) grid with the
//! algebra of the requested correlation order.

use std::ops::{Index, IndexMut};
use std::path::PathBuf;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::{arange, coarse_time_grid, delay_grid, time_grid};
use crate::pool::{into_ordered, WorkerPool};
use crate::process_tensor::ensure_process_tensor;
use crate::pulse::{sample_drive, write_pulse_file, DriveSource};
use crate::scratch::ScratchFile;
use crate::solver::{
    run_solver, InsertionSide, OperatorInsertion, SolverOptions, OP_LOWER,
};

// ---------------------------------------------------------------------------
// Grid types
// ---------------------------------------------------------------------------

/// Row-major 2D array indexed by `(time index, delay index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid2<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid2<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }
}

impl<T> Grid2<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// One grid row: all delays for a fixed time index.
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

impl<T: Clone> Grid2<T> {
    pub fn to_rows(&self) -> Vec<Vec<T>> {
        (0..self.rows).map(|i| self.row(i).to_vec()).collect()
    }
}

impl<T> Index<(usize, usize)> for Grid2<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[i * self.cols + j]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid2<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        &mut self.data[i * self.cols + j]
    }
}

/// A computed correlation function: time grid, delay grid and the value
/// grid with row `i` at `t[i]`, column `j` at `tau[j]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation<T> {
    pub t: Vec<f64>,
    pub tau: Vec<f64>,
    pub grid: Grid2<T>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration shared by all three correlation functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Time grid step (ps). Discretizes the grid rows only.
    pub dt: f64,
    /// Delay grid step (ps). Also the solver propagation step.
    pub dtau: f64,
    /// Exciton confinement length (nm).
    pub ae: f64,
    /// Phonon bath temperature (K).
    pub temperature: f64,
    /// Radiative decay rate (1/ps).
    pub gamma_e: f64,
    /// Couple to the phonon environment (requires the process tensor).
    pub phonons: bool,
    /// Process tensor path; derived from the window when absent.
    pub pt_file: Option<PathBuf>,
    /// Intermediate solver steps per output step.
    pub nintermediate: u32,
    /// Worker pool size.
    pub workers: usize,
    /// Directory for all scratch files.
    pub work_dir: PathBuf,
    /// Solver executable.
    pub solver_cmd: String,
    /// Refine the time grid during pulses, coarsen it elsewhere
    /// (G1/G2 only; G2hom needs the uniform grid).
    pub coarse_grid: bool,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            dtau: 0.1,
            ae: 5.0,
            temperature: 1.0,
            gamma_e: 0.01,
            phonons: false,
            pt_file: None,
            nintermediate: 100,
            workers: 15,
            work_dir: std::env::temp_dir(),
            solver_cmd: "ACE".to_string(),
            coarse_grid: false,
        }
    }
}

impl CorrelationConfig {
    /// Per-job solver options: propagation at the delay step with the decay
    /// channel on, reading the shared pulse file.
    fn job_options(&self, pulse_file: PathBuf) -> SolverOptions {
        SolverOptions {
            dt: self.dtau,
            phonons: self.phonons,
            ae: self.ae,
            temperature: self.temperature,
            nintermediate: self.nintermediate,
            lindblad: true,
            gamma_e: self.gamma_e,
            pt_file: self.pt_file.clone(),
            pulse_file: Some(pulse_file),
            solver_cmd: self.solver_cmd.clone(),
            work_dir: self.work_dir.clone(),
            ..SolverOptions::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Shared orchestration helpers
// ---------------------------------------------------------------------------

/// Sample the summed drive over the whole computation and write the shared
/// pulse file every job reads. The solver takes intermediate steps, so the
/// sampling is much finer than the propagation step.
fn shared_pulse(
    name: &str,
    t0: f64,
    t_max: f64,
    step: f64,
    pulses: &[Box<dyn DriveSource>],
    cfg: &CorrelationConfig,
) -> Result<ScratchFile> {
    let guard = ScratchFile::new(cfg.work_dir.join(name));
    let times = arange(1.1 * t0, 1.1 * t_max, step);
    let amplitude = sample_drive(pulses, &times);
    write_pulse_file(guard.path(), &times, &amplitude)?;
    Ok(guard)
}

fn build_time_grid(
    t0: f64,
    tend: f64,
    pulses: &[Box<dyn DriveSource>],
    cfg: &CorrelationConfig,
) -> Vec<f64> {
    if cfg.coarse_grid {
        coarse_time_grid(t0, tend, cfg.dt, 10.0 * cfg.dt, pulses)
    } else {
        time_grid(t0, tend, cfg.dt)
    }
}

/// Precompute the process tensor for the longest window any job needs, so
/// every sub-window job reuses it. Must finish before pool dispatch.
fn prepare_environment(
    t0: f64,
    t_max: f64,
    pulses: &[Box<dyn DriveSource>],
    options: &mut SolverOptions,
) -> Result<()> {
    if options.phonons {
        let pt = ensure_process_tensor(t0, t_max, pulses, options)?;
        options.pt_file = Some(pt);
    }
    Ok(())
}

/// Dispatch one insertion job per time point and hand back the ordered
/// results, the first failure attributed to its time index.
fn dispatch_insertion_jobs(
    t: &[f64],
    t0: f64,
    tauend: f64,
    side: InsertionSide,
    pulses: &[Box<dyn DriveSource>],
    options: &SolverOptions,
    pool: &WorkerPool,
) -> Result<Vec<crate::solver::SolverResult>> {
    let results = pool.run(t.len(), |i| {
        let insertion = OperatorInsertion {
            time: t[i],
            operator: OP_LOWER.to_string(),
            side,
        };
        run_solver(t0, t[i] + tauend, pulses, Some(&insertion), options, &i.to_string())
    });
    into_ordered(results)
}

/// Last `n` samples of a job's series.
fn tail<'a, T>(series: &'a [T], n: usize, index: usize) -> Result<&'a [T]> {
    if series.len() < n {
        return Err(Error::Job {
            index,
            source: Box::new(Error::ShortSeries {
                tag: index.to_string(),
                needed: n,
                got: series.len(),
            }),
        });
    }
    Ok(&series[series.len() - n..])
}

// ---------------------------------------------------------------------------
// G2
// ---------------------------------------------------------------------------

/// Second-order correlation G2(t, tau) of the x->g emission.
///
/// For every `t_i`: propagate to `t_i`, apply the lowering operator from
/// the left and its conjugate from the right, propagate on to
/// `t_i + tauend`. The excited population of the tail is
/// `Tr(sigma^dagger sigma rho)`, i.e. the G2 value at nonzero delay.
pub fn g2(
    t0: f64,
    tend: f64,
    tau0: f64,
    tauend: f64,
    pulses: &[Box<dyn DriveSource>],
    cfg: &CorrelationConfig,
) -> Result<Correlation<f64>> {
    let t = build_time_grid(t0, tend, pulses, cfg);
    let (tau, n_tau) = delay_grid(tau0, tauend, cfg.dtau);

    let pulse = shared_pulse("g2_pulse.dat", t0, tend + tauend, 0.01 * cfg.dtau, pulses, cfg)?;
    let mut options = cfg.job_options(pulse.path().to_path_buf());
    prepare_environment(t0, tend + tauend, pulses, &mut options)?;

    let pool = WorkerPool::new(cfg.workers);
    let results =
        dispatch_insertion_jobs(&t, t0, tauend, InsertionSide::Both, pulses, &options, &pool)?;

    let mut grid = Grid2::zeros(t.len(), tau.len());
    for (i, r) in results.iter().enumerate() {
        let x = tail(&r.excited, n_tau, i)?;
        for (j, &v) in x.iter().enumerate() {
            grid[(i, j + 1)] = v;
        }
        // column 0 stays exactly zero: applying the lowering operator twice
        // annihilates the state, G2(t, 0) = Tr(sd s s rho sd) = 0
    }
    Ok(Correlation { t, tau, grid })
}

// ---------------------------------------------------------------------------
// G1
// ---------------------------------------------------------------------------

/// First-order correlation G1(t, tau) of the x->g emission.
///
/// The lowering operator acts from the left only; the x->g coherence of the
/// tail is `Tr(sigma^dagger rho)`. At zero delay the insertion has no
/// visible effect yet, and `Tr(sigma^dagger sigma rho) = x` reduces the
/// value to the excited population one step before the insertion point.
pub fn g1(
    t0: f64,
    tend: f64,
    tau0: f64,
    tauend: f64,
    pulses: &[Box<dyn DriveSource>],
    cfg: &CorrelationConfig,
) -> Result<Correlation<Complex64>> {
    let t = build_time_grid(t0, tend, pulses, cfg);
    let (tau, n_tau) = delay_grid(tau0, tauend, cfg.dtau);

    let step = cfg.dtau / (10.0 * cfg.nintermediate as f64);
    let pulse = shared_pulse("g1_pulse.dat", t0, tend + tauend, step, pulses, cfg)?;
    let mut options = cfg.job_options(pulse.path().to_path_buf());
    prepare_environment(t0, tend + tauend, pulses, &mut options)?;

    let pool = WorkerPool::new(cfg.workers);
    let results =
        dispatch_insertion_jobs(&t, t0, tauend, InsertionSide::Left, pulses, &options, &pool)?;

    let mut grid = Grid2::zeros(t.len(), tau.len());
    for (i, r) in results.iter().enumerate() {
        let x = tail(&r.excited, n_tau + 1, i)?;
        grid[(i, 0)] = Complex64::new(x[0], 0.0);
        let p = tail(&r.pxg, n_tau, i)?;
        for (j, &v) in p.iter().enumerate() {
            grid[(i, j + 1)] = v;
        }
    }
    Ok(Correlation { t, tau, grid })
}

// ---------------------------------------------------------------------------
// G2hom
// ---------------------------------------------------------------------------

/// G2 of the x->g emission behind a balanced beam splitter, as measured in
/// a homodyne-type setup.
///
/// Three contributions per cell: the occupation product `x(t) x(t+tau)`
/// from one auxiliary long run, plus the two-sided G2 term, minus the
/// squared magnitude of the G1 term.
pub fn g2hom(
    t0: f64,
    tend: f64,
    tau0: f64,
    tauend: f64,
    pulses: &[Box<dyn DriveSource>],
    cfg: &CorrelationConfig,
) -> Result<Correlation<f64>> {
    // the product term re-samples the auxiliary run at the t-grid step, so
    // the step ratio must be integral
    let ratio = cfg.dt / cfg.dtau;
    let stride = ratio.round();
    if stride < 1.0 || (ratio - stride).abs() > 1e-9 {
        return Err(Error::StepMismatch {
            dt: cfg.dt,
            dtau: cfg.dtau,
        });
    }
    let stride = stride as usize;

    if cfg.coarse_grid {
        log::warn!("g2hom needs the uniform time grid; ignoring coarse_grid");
    }
    let t = time_grid(t0, tend, cfg.dt);
    let (tau, n_tau) = delay_grid(tau0, tauend, cfg.dtau);

    let pulse = shared_pulse("g2hom_pulse.dat", t0, tend + tauend, 0.01 * cfg.dtau, pulses, cfg)?;
    let mut options = cfg.job_options(pulse.path().to_path_buf());
    prepare_environment(t0, tend + tauend, pulses, &mut options)?;

    let mut grid = Grid2::zeros(t.len(), tau.len());

    // occupation product from a single long run over the whole window
    let aux = run_solver(t0, tend + tauend, pulses, None, &options, "hom")?;
    for i in 0..t.len() {
        let i0 = i * stride;
        let needed = i0 + n_tau + 1;
        if aux.excited.len() < needed {
            return Err(Error::ShortSeries {
                tag: "hom".to_string(),
                needed,
                got: aux.excited.len(),
            });
        }
        let xi = aux.excited[i0];
        for j in 0..=n_tau {
            grid[(i, j)] += xi * aux.excited[i0 + j];
        }
    }

    let pool = WorkerPool::new(cfg.workers);

    // two-sided part, added like G2
    let both =
        dispatch_insertion_jobs(&t, t0, tauend, InsertionSide::Both, pulses, &options, &pool)?;
    for (i, r) in both.iter().enumerate() {
        let x = tail(&r.excited, n_tau, i)?;
        for (j, &v) in x.iter().enumerate() {
            grid[(i, j + 1)] += v;
        }
    }

    // left-only part, subtracted as squared magnitude
    let left =
        dispatch_insertion_jobs(&t, t0, tauend, InsertionSide::Left, pulses, &options, &pool)?;
    for (i, r) in left.iter().enumerate() {
        let x = tail(&r.excited, n_tau + 1, i)?;
        grid[(i, 0)] -= x[0] * x[0];
        let p = tail(&r.pxg, n_tau, i)?;
        for (j, v) in p.iter().enumerate() {
            grid[(i, j + 1)] -= v.norm_sqr();
        }
    }

    Ok(Correlation { t, tau, grid })
}
