//! Drive sources and pulse file export.
//!
//! The solver consumes the drive as a text file of whitespace-delimited
//! columns (time, Re amplitude, Im amplitude). Anything that can produce a
//! complex amplitude over time implements [`DriveSource`]; the shipped model
//! is a Gaussian pulse with a fixed pulse area.

use std::io;
use std::path::Path;

use num_complex::Complex64;

use crate::export::write_columns;
use crate::solver::HBAR;

/// Decimal digits written to pulse files.
pub const PULSE_PRECISION: usize = 8;

/// A time-dependent complex drive amplitude.
pub trait DriveSource: Send + Sync {
    /// Drive amplitude at time `t` (ps).
    fn amplitude(&self, t: f64) -> Complex64;

    /// Interval outside which the amplitude is negligible. Used by the
    /// coarse time grid to decide where fine sampling is needed.
    fn support(&self) -> (f64, f64);
}

/// Gaussian pulse with pulse area given in units of pi.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPulse {
    /// Pulse area in units of pi.
    pub area: f64,
    /// Gaussian width sigma (ps).
    pub sigma: f64,
    /// Center time (ps).
    pub center: f64,
    /// Detuning from the transition energy (meV).
    pub detuning: f64,
}

impl DriveSource for GaussianPulse {
    fn amplitude(&self, t: f64) -> Complex64 {
        let x = (t - self.center) / self.sigma;
        let envelope = self.area * std::f64::consts::PI
            / (self.sigma * (2.0 * std::f64::consts::PI).sqrt())
            * (-0.5 * x * x).exp();
        envelope * Complex64::new(0.0, -self.detuning * t / HBAR).exp()
    }

    fn support(&self) -> (f64, f64) {
        (self.center - 4.0 * self.sigma, self.center + 4.0 * self.sigma)
    }
}

/// Sum of all drive sources evaluated on a time grid.
pub fn sample_drive(pulses: &[Box<dyn DriveSource>], times: &[f64]) -> Vec<Complex64> {
    times
        .iter()
        .map(|&t| {
            pulses
                .iter()
                .fold(Complex64::new(0.0, 0.0), |acc, p| acc + p.amplitude(t))
        })
        .collect()
}

/// Write a sampled drive as the three-column pulse file the solver reads.
pub fn write_pulse_file(path: &Path, times: &[f64], amplitude: &[Complex64]) -> io::Result<()> {
    let re: Vec<f64> = amplitude.iter().map(|a| a.re).collect();
    let im: Vec<f64> = amplitude.iter().map(|a| a.im).collect();
    write_columns(path, &[times, &re, &im], PULSE_PRECISION)
}
