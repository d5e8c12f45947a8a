pub mod g1;
pub mod g2;
pub mod g2hom;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use num_complex::Complex64;

use aceqd_core::{Correlation, CorrelationConfig, DriveSource, GaussianPulse};

/// Arguments shared by all three correlation subcommands.
#[derive(Args, Debug)]
pub struct CorrelateArgs {
    /// Start of the observation window (ps)
    #[arg(long, default_value_t = 0.0)]
    pub t0: f64,

    /// End of the observation window (ps)
    #[arg(long, default_value_t = 600.0)]
    pub tend: f64,

    /// First delay (ps)
    #[arg(long, default_value_t = 0.0)]
    pub tau0: f64,

    /// Last delay (ps)
    #[arg(long, default_value_t = 600.0)]
    pub tauend: f64,

    /// Time grid step (ps)
    #[arg(long, default_value_t = 0.1)]
    pub dt: f64,

    /// Delay grid step, also the solver propagation step (ps)
    #[arg(long, default_value_t = 0.1)]
    pub dtau: f64,

    /// Exciton confinement length (nm)
    #[arg(long, default_value_t = 5.0)]
    pub ae: f64,

    /// Phonon bath temperature (K)
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Radiative decay rate (1/ps)
    #[arg(long, default_value_t = 0.01)]
    pub gamma_e: f64,

    /// Couple the emitter to the phonon environment
    #[arg(long)]
    pub phonons: bool,

    /// Process tensor artifact path (derived from the window when absent)
    #[arg(long)]
    pub pt_file: Option<PathBuf>,

    /// Intermediate solver steps per output step
    #[arg(long, default_value_t = 100)]
    pub nintermediate: u32,

    /// Worker pool size
    #[arg(long, default_value_t = 15)]
    pub workers: usize,

    /// Scratch directory (system temp dir when absent)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Solver executable
    #[arg(long, default_value = "ACE")]
    pub solver: String,

    /// Gaussian drive pulse as area:sigma:center[:detuning]; repeatable
    #[arg(long = "pulse")]
    pub pulses: Vec<String>,

    /// Refine the time grid during pulses, coarsen elsewhere (g1/g2 only)
    #[arg(long)]
    pub coarse: bool,

    /// Write the JSON result here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl CorrelateArgs {
    pub fn config(&self) -> CorrelationConfig {
        CorrelationConfig {
            dt: self.dt,
            dtau: self.dtau,
            ae: self.ae,
            temperature: self.temperature,
            gamma_e: self.gamma_e,
            phonons: self.phonons,
            pt_file: self.pt_file.clone(),
            nintermediate: self.nintermediate,
            workers: self.workers,
            work_dir: self
                .work_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            solver_cmd: self.solver.clone(),
            coarse_grid: self.coarse,
        }
    }

    pub fn drive(&self) -> Result<Vec<Box<dyn DriveSource>>, String> {
        self.pulses
            .iter()
            .map(|spec| parse_pulse(spec).map(|p| Box::new(p) as Box<dyn DriveSource>))
            .collect()
    }
}

/// Parse `area:sigma:center[:detuning]` into a Gaussian pulse.
pub fn parse_pulse(spec: &str) -> Result<GaussianPulse, String> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(format!(
            "pulse '{}': expected area:sigma:center[:detuning]",
            spec
        ));
    }
    let mut values = [0.0f64; 4];
    for (i, part) in parts.iter().enumerate() {
        values[i] = part
            .parse()
            .map_err(|_| format!("pulse '{}': '{}' is not a number", spec, part))?;
    }
    if values[1] <= 0.0 {
        return Err(format!("pulse '{}': sigma must be positive", spec));
    }
    Ok(GaussianPulse {
        area: values[0],
        sigma: values[1],
        center: values[2],
        detuning: values[3],
    })
}

fn write_json(value: &serde_json::Value, output: Option<&Path>) -> io::Result<()> {
    match output {
        Some(path) => {
            let mut w = BufWriter::new(File::create(path)?);
            serde_json::to_writer(&mut w, value)?;
            writeln!(w)?;
            w.flush()
        }
        None => {
            let stdout = io::stdout();
            let mut w = stdout.lock();
            serde_json::to_writer(&mut w, value)?;
            writeln!(w)
        }
    }
}

/// Emit a real-valued correlation grid as JSON. Returns the exit code.
pub fn emit_real(name: &str, result: &Correlation<f64>, output: Option<&Path>) -> i32 {
    let value = serde_json::json!({
        "function": name,
        "t": &result.t,
        "tau": &result.tau,
        "grid": result.grid.to_rows(),
    });
    match write_json(&value, output) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: cannot write result: {}", e);
            1
        }
    }
}

/// Emit a complex-valued correlation grid as separate re/im planes.
pub fn emit_complex(name: &str, result: &Correlation<Complex64>, output: Option<&Path>) -> i32 {
    let rows = result.grid.to_rows();
    let re: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| row.iter().map(|v| v.re).collect())
        .collect();
    let im: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| row.iter().map(|v| v.im).collect())
        .collect();
    let value = serde_json::json!({
        "function": name,
        "t": &result.t,
        "tau": &result.tau,
        "grid_re": re,
        "grid_im": im,
    });
    match write_json(&value, output) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: cannot write result: {}", e);
            1
        }
    }
}
