//! Time and delay grid construction.
//!
//! Correlation grids are indexed by (time, delay). The time grid is either
//! uniform or, for pulsed drives, non-uniform with a fine step inside every
//! pulse window and a coarse step elsewhere. The delay grid is always
//! uniform.

use crate::pulse::DriveSource;

/// `n` evenly spaced points from `start` to `stop`, both inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![start];
    }
    let step = (stop - start) / (n - 1) as f64;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Evenly spaced points in the half-open interval `[start, stop)`.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// Uniform time grid from `t0` to `tend` (inclusive) at step `dt`.
///
/// The point count is `round((tend - t0) / dt) + 1`; the rounding absorbs
/// float fuzz in the step ratio.
pub fn time_grid(t0: f64, tend: f64, dt: f64) -> Vec<f64> {
    let n = ((tend - t0) / dt).round() as usize;
    linspace(t0, tend, n + 1)
}

/// Uniform delay grid from `tau0` to `tauend` at step `dtau`.
///
/// Returns the grid (length `n_tau + 1`) and `n_tau`, the number of nonzero
/// delay columns the aggregator slices from each job's series tail.
pub fn delay_grid(tau0: f64, tauend: f64, dtau: f64) -> (Vec<f64>, usize) {
    let n_tau = ((tauend - tau0) / dtau).round() as usize;
    (linspace(tau0, tauend, n_tau + 1), n_tau)
}

/// Non-uniform time grid: step `dt` inside any pulse support window, step
/// `dt_coarse` outside. `tend` is always the last point.
pub fn coarse_time_grid(
    t0: f64,
    tend: f64,
    dt: f64,
    dt_coarse: f64,
    pulses: &[Box<dyn DriveSource>],
) -> Vec<f64> {
    let windows: Vec<(f64, f64)> = pulses.iter().map(|p| p.support()).collect();
    let in_window = |t: f64| windows.iter().any(|&(a, b)| t >= a && t <= b);

    let mut t = Vec::new();
    let mut cur = t0;
    // half a fine step of slack so the loop cannot emit a near-duplicate of tend
    while cur < tend - 0.5 * dt {
        t.push(cur);
        cur += if in_window(cur) { dt } else { dt_coarse };
    }
    t.push(tend);
    t
}
