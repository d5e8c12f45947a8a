//! Driver for one invocation of the external ACE solver.
//!
//! Each run builds an isolated parameter file for a single time window,
//! optionally inserts a quantum operator at a fixed time (the multi-time
//! measurement), executes the solver binary synchronously and parses its
//! output file into typed time series. All files the run owns exclusively
//! are tagged with the job tag and removed on every exit path.
//!
//! # Output column contract
//!
//! The solver writes one line per time step with fixed column positions:
//! time, ground population (Re, Im), excited population (Re, Im),
//! coherence g->x (Re, Im), coherence x->g (Re, Im). The imaginary parts of
//! the populations are identically zero and ignored.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::arange;
use crate::process_tensor::default_artifact_name;
use crate::pulse::{sample_drive, write_pulse_file, DriveSource};
use crate::scratch::{tagged_path, ScratchFile};

/// hbar in meV*ps.
pub const HBAR: f64 = 0.6582173;

/// Ground state projector |0><0|.
pub const OP_GROUND: &str = "|0><0|_2";
/// Excited state projector |1><1|.
pub const OP_EXCITED: &str = "|1><1|_2";
/// Lowering operator sigma = |0><1| (x -> g emission).
pub const OP_LOWER: &str = "|0><1|_2";
/// Raising operator sigma^dagger = |1><0|.
pub const OP_RAISE: &str = "|1><0|_2";

/// Which side of the density matrix an inserted operator acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionSide {
    /// Operator from the left, hermitian conjugate from the right.
    Both,
    /// Operator from the left only.
    Left,
    /// Operator from the right only.
    Right,
}

/// Operator applied to the evolving density matrix at a fixed time.
///
/// The effect becomes visible one step after the insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorInsertion {
    /// Insertion time (ps).
    pub time: f64,
    /// Solver operator descriptor, e.g. [`OP_LOWER`].
    pub operator: String,
    pub side: InsertionSide,
}

/// Configuration for a single solver invocation. Passed by reference to
/// every job and never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Propagation step size (ps).
    pub dt: f64,
    /// Couple the emitter to the phonon environment.
    pub phonons: bool,
    /// Precompute the process tensor instead of reading it.
    pub generate_pt: bool,
    /// Environment memory time for tensor generation (ps).
    pub t_mem: f64,
    /// Exciton confinement length (nm).
    pub ae: f64,
    /// Phonon bath temperature (K).
    pub temperature: f64,
    /// Intermediate propagation steps per output step.
    pub nintermediate: u32,
    /// Add the radiative decay channel.
    pub lindblad: bool,
    /// Radiative decay rate (1/ps).
    pub gamma_e: f64,
    /// Let the solver inherit stdio instead of capturing it.
    pub verbose: bool,
    /// Process tensor artifact path; derived from the window when absent.
    pub pt_file: Option<PathBuf>,
    /// Shared pulse file; the driver samples its own when absent.
    pub pulse_file: Option<PathBuf>,
    /// Solver executable.
    pub solver_cmd: String,
    /// Directory for all scratch files.
    pub work_dir: PathBuf,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            dt: 0.1,
            phonons: false,
            generate_pt: false,
            t_mem: 10.0,
            ae: 3.0,
            temperature: 1.0,
            nintermediate: 10,
            lindblad: false,
            gamma_e: 0.01,
            verbose: false,
            pt_file: None,
            pulse_file: None,
            solver_cmd: "ACE".to_string(),
            work_dir: std::env::temp_dir(),
        }
    }
}

/// Parsed solver output over the job's internal time grid.
#[derive(Debug, Clone, Default)]
pub struct SolverResult {
    pub time: Vec<f64>,
    /// Ground state population.
    pub ground: Vec<f64>,
    /// Excited state population.
    pub excited: Vec<f64>,
    /// Coherence g -> x.
    pub pgx: Vec<Complex64>,
    /// Coherence x -> g.
    pub pxg: Vec<Complex64>,
}

impl SolverResult {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Process tensor path for this window: the explicit option if set,
/// otherwise the conventional name derived from the window and bath.
pub fn resolve_artifact_path(t_start: f64, t_end: f64, options: &SolverOptions) -> PathBuf {
    match &options.pt_file {
        Some(p) => p.clone(),
        None => PathBuf::from(default_artifact_name(
            t_start.abs() + t_end.abs(),
            options.temperature,
            options.ae,
        )),
    }
}

/// Run one solver invocation over `[t_start, t_end]`.
///
/// `tag` must be unique among concurrently running jobs; it partitions the
/// scratch file namespace. A shared pulse file from `options` is used
/// read-only and never deleted; without one the driver samples the drive
/// itself over a 10% wider window at a tenth of the step and cleans the
/// file up afterwards.
pub fn run_solver(
    t_start: f64,
    t_end: f64,
    pulses: &[Box<dyn DriveSource>],
    insertion: Option<&OperatorInsertion>,
    options: &SolverOptions,
    tag: &str,
) -> Result<SolverResult> {
    let param = ScratchFile::new(tagged_path(&options.work_dir, "tls", tag, "param"));
    let out = ScratchFile::new(tagged_path(&options.work_dir, "tls", tag, "out"));

    let (pulse_path, _own_pulse) = match &options.pulse_file {
        Some(shared) => (shared.clone(), None),
        None => {
            let path = tagged_path(&options.work_dir, "tls_pulse", tag, "dat");
            let guard = ScratchFile::new(path.clone());
            let times = arange(1.1 * t_start, 1.1 * t_end, 0.1 * options.dt);
            let amplitude = sample_drive(pulses, &times);
            write_pulse_file(&path, &times, &amplitude)?;
            (path, Some(guard))
        }
    };

    let pt_path = resolve_artifact_path(t_start, t_end, options);
    let params = parameter_file(
        t_start,
        t_end,
        options,
        insertion,
        &pulse_path,
        &pt_path,
        out.path(),
    );
    fs::write(param.path(), params)?;

    log::debug!(
        "job '{}': solving [{}, {}] via {}",
        tag,
        t_start,
        t_end,
        options.solver_cmd
    );

    if options.verbose {
        let status = Command::new(&options.solver_cmd).arg(param.path()).status()?;
        if !status.success() {
            return Err(Error::Solver {
                tag: tag.to_string(),
                code: status.code(),
                stderr: String::new(),
            });
        }
    } else {
        let output = Command::new(&options.solver_cmd).arg(param.path()).output()?;
        if !output.status.success() {
            return Err(Error::Solver {
                tag: tag.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
    }

    parse_output(out.path())
}

/// Render the solver parameter file for one job.
fn parameter_file(
    t_start: f64,
    t_end: f64,
    options: &SolverOptions,
    insertion: Option<&OperatorInsertion>,
    pulse_path: &Path,
    pt_path: &Path,
    out_path: &Path,
) -> String {
    let mut s = String::new();
    // writeln! into a String cannot fail
    let _ = writeln!(s, "ta    {}", t_start);
    let _ = writeln!(s, "te    {}", t_end);
    let _ = writeln!(s, "dt    {}", options.dt);
    if options.generate_pt {
        let _ = writeln!(s, "t_mem    {}", options.t_mem);
        let _ = writeln!(s, "threshold 1e-7");
        let _ = writeln!(s, "use_Gaussian true");
        let _ = writeln!(s, "Boson_SysOp    {{ {} }}", OP_EXCITED);
        let _ = writeln!(s, "Boson_J_type         QDPhonon");
        let _ = writeln!(s, "Boson_J_a_e    {}", options.ae);
        let _ = writeln!(s, "Boson_temperature    {}", options.temperature);
        let _ = writeln!(s, "Boson_subtract_polaron_shift       true");
    } else {
        let _ = writeln!(s, "Nintermediate    {}", options.nintermediate);
        let _ = writeln!(s, "use_symmetric_Trotter true");
    }
    if options.phonons && !options.generate_pt {
        let _ = writeln!(s, "read_PT    {}", pt_path.display());
        let _ = writeln!(s, "Boson_subtract_polaron_shift       true");
    }
    let _ = writeln!(s, "initial    {{{}}}", OP_GROUND);
    if options.lindblad {
        let _ = writeln!(s, "add_Lindblad {:.5}  {{{}}}", options.gamma_e, OP_LOWER);
    }
    let _ = writeln!(
        s,
        "add_Pulse file {}  {{-{}*({})}}",
        pulse_path.display(),
        std::f64::consts::PI * HBAR / 2.0,
        OP_RAISE
    );
    if let Some(op) = insertion {
        let directive = match op.side {
            InsertionSide::Both => "apply_Operator",
            InsertionSide::Left => "apply_Operator_left",
            InsertionSide::Right => "apply_Operator_right",
        };
        let _ = writeln!(s, "{} {} {{ {} }}", directive, op.time, op.operator);
    }
    let _ = writeln!(s, "add_Output {{{}}}", OP_GROUND);
    let _ = writeln!(s, "add_Output {{{}}}", OP_EXCITED);
    let _ = writeln!(s, "add_Output {{{}}}", OP_LOWER);
    let _ = writeln!(s, "add_Output {{{}}}", OP_RAISE);
    if options.generate_pt {
        let _ = writeln!(s, "write_PT {}", pt_path.display());
    }
    let _ = writeln!(s, "outfile {}", out_path.display());
    s
}

/// Parse the solver's output file into aligned time series.
fn parse_output(path: &Path) -> Result<SolverResult> {
    let text = fs::read_to_string(path).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        reason: format!("cannot read: {}", e),
    })?;

    let mut result = SolverResult::default();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: std::result::Result<Vec<f64>, _> =
            line.split_whitespace().map(str::parse::<f64>).collect();
        let cols = cols.map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            reason: format!("line {}: {}", lineno + 1, e),
        })?;
        if cols.len() < 9 {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                reason: format!("line {}: expected 9 columns, got {}", lineno + 1, cols.len()),
            });
        }
        result.time.push(cols[0]);
        result.ground.push(cols[1]);
        result.excited.push(cols[3]);
        result.pgx.push(Complex64::new(cols[5], cols[6]));
        result.pxg.push(Complex64::new(cols[7], cols[8]));
    }

    if result.is_empty() {
        return Err(Error::Parse {
            path: path.to_path_buf(),
            reason: "no data rows".to_string(),
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(dir: &Path) -> SolverOptions {
        SolverOptions {
            work_dir: dir.to_path_buf(),
            ..SolverOptions::default()
        }
    }

    // -----------------------------------------------------------------------
    // Parameter file rendering
    // -----------------------------------------------------------------------

    #[test]
    fn parameter_file_plain_propagation() {
        let o = opts(Path::new("/w"));
        let params = parameter_file(
            0.0,
            10.0,
            &o,
            None,
            Path::new("/w/pulse.dat"),
            Path::new("/w/t.pt"),
            Path::new("/w/tls0.out"),
        );
        assert!(params.contains("ta    0\n"));
        assert!(params.contains("te    10\n"));
        assert!(params.contains("dt    0.1\n"));
        assert!(params.contains("Nintermediate    10\n"));
        assert!(params.contains("use_symmetric_Trotter true\n"));
        assert!(params.contains("initial    {|0><0|_2}\n"));
        assert!(params.contains("add_Pulse file /w/pulse.dat"));
        assert!(params.contains("add_Output {|1><1|_2}\n"));
        assert!(params.ends_with("outfile /w/tls0.out\n"));
        // plain run: no environment blocks, no decay, no insertion
        assert!(!params.contains("Boson"));
        assert!(!params.contains("read_PT"));
        assert!(!params.contains("write_PT"));
        assert!(!params.contains("add_Lindblad"));
        assert!(!params.contains("apply_Operator"));
    }

    #[test]
    fn parameter_file_lindblad_rate_format() {
        let o = SolverOptions {
            lindblad: true,
            gamma_e: 0.01,
            ..opts(Path::new("/w"))
        };
        let params = parameter_file(
            0.0,
            1.0,
            &o,
            None,
            Path::new("/w/p.dat"),
            Path::new("/w/t.pt"),
            Path::new("/w/o.out"),
        );
        assert!(params.contains("add_Lindblad 0.01000  {|0><1|_2}\n"));
    }

    #[test]
    fn parameter_file_tensor_generation_block() {
        let o = SolverOptions {
            generate_pt: true,
            phonons: true,
            t_mem: 10.0,
            ae: 5.0,
            temperature: 4.2,
            ..opts(Path::new("/w"))
        };
        let params = parameter_file(
            0.0,
            100.0,
            &o,
            None,
            Path::new("/w/p.dat"),
            Path::new("/w/env.pt"),
            Path::new("/w/o.out"),
        );
        assert!(params.contains("t_mem    10\n"));
        assert!(params.contains("threshold 1e-7\n"));
        assert!(params.contains("use_Gaussian true\n"));
        assert!(params.contains("Boson_SysOp    { |1><1|_2 }\n"));
        assert!(params.contains("Boson_J_type         QDPhonon\n"));
        assert!(params.contains("Boson_J_a_e    5\n"));
        assert!(params.contains("Boson_temperature    4.2\n"));
        assert!(params.contains("write_PT /w/env.pt\n"));
        // generation replaces the plain propagation block and never reads
        assert!(!params.contains("Nintermediate"));
        assert!(!params.contains("read_PT"));
    }

    #[test]
    fn parameter_file_reads_existing_tensor() {
        let o = SolverOptions {
            phonons: true,
            ..opts(Path::new("/w"))
        };
        let params = parameter_file(
            0.0,
            1.0,
            &o,
            None,
            Path::new("/w/p.dat"),
            Path::new("/w/env.pt"),
            Path::new("/w/o.out"),
        );
        assert!(params.contains("read_PT    /w/env.pt\n"));
        assert!(params.contains("Boson_subtract_polaron_shift       true\n"));
        assert!(params.contains("Nintermediate"));
        assert!(!params.contains("write_PT"));
    }

    #[test]
    fn parameter_file_insertion_sides() {
        let o = opts(Path::new("/w"));
        for (side, directive) in [
            (InsertionSide::Both, "apply_Operator 2.5 { |0><1|_2 }"),
            (InsertionSide::Left, "apply_Operator_left 2.5 { |0><1|_2 }"),
            (InsertionSide::Right, "apply_Operator_right 2.5 { |0><1|_2 }"),
        ] {
            let op = OperatorInsertion {
                time: 2.5,
                operator: OP_LOWER.to_string(),
                side,
            };
            let params = parameter_file(
                0.0,
                5.0,
                &o,
                Some(&op),
                Path::new("/w/p.dat"),
                Path::new("/w/t.pt"),
                Path::new("/w/o.out"),
            );
            assert!(params.contains(directive), "missing '{}'", directive);
        }
    }

    // -----------------------------------------------------------------------
    // Output parsing
    // -----------------------------------------------------------------------

    fn write_output(path: &Path, lines: &[&str]) {
        fs::write(path, lines.join("\n")).unwrap();
    }

    #[test]
    fn parse_output_maps_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tls.out");
        write_output(
            &path,
            &[
                "0.0 1.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0",
                "0.1 0.9 0.0 0.1 0.0 0.01 -0.02 0.01 0.02",
            ],
        );
        let r = parse_output(&path).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r.time[1] - 0.1).abs() < 1e-12);
        assert!((r.ground[1] - 0.9).abs() < 1e-12);
        assert!((r.excited[1] - 0.1).abs() < 1e-12);
        assert!((r.pgx[1] - Complex64::new(0.01, -0.02)).norm() < 1e-12);
        assert!((r.pxg[1] - Complex64::new(0.01, 0.02)).norm() < 1e-12);
    }

    #[test]
    fn parse_output_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tls.out");
        write_output(
            &path,
            &[
                "# header",
                "",
                "0.0 1.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0",
            ],
        );
        let r = parse_output(&path).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn parse_output_rejects_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tls.out");
        write_output(&path, &["0.0 1.0 0.0"]);
        let err = parse_output(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("expected 9 columns"));
    }

    #[test]
    fn parse_output_rejects_non_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tls.out");
        write_output(&path, &["0.0 abc 0.0 0.0 0.0 0.0 0.0 0.0 0.0"]);
        assert!(matches!(parse_output(&path), Err(Error::Parse { .. })));
    }

    #[test]
    fn parse_output_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_output(&dir.path().join("nope.out")).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn parse_output_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tls.out");
        fs::write(&path, "").unwrap();
        let err = parse_output(&path).unwrap_err();
        assert!(err.to_string().contains("no data rows"));
    }

    // -----------------------------------------------------------------------
    // Driver against a stand-in solver
    // -----------------------------------------------------------------------

    #[cfg(unix)]
    fn install_script(dir: &Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ace");
        fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn run_solver_success_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        // stand-in: emit two flat rows to the declared outfile
        let solver = install_script(
            dir.path(),
            r#"out=$(awk '$1 == "outfile" { print $2 }' "$1")
printf '0.0 1.0 0.0 0.5 0.0 0.0 0.0 0.0 0.0\n0.1 1.0 0.0 0.5 0.0 0.0 0.0 0.0 0.0\n' > "$out"
"#,
        );
        let o = SolverOptions {
            solver_cmd: solver,
            ..opts(dir.path())
        };
        let r = run_solver(0.0, 0.1, &[], None, &o, "0").unwrap();
        assert_eq!(r.len(), 2);
        assert!((r.excited[0] - 0.5).abs() < 1e-12);

        // all tagged scratch files are gone, only the script remains
        let leftover: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n != "fake-ace")
            .collect();
        assert!(leftover.is_empty(), "leftover scratch files: {:?}", leftover);
    }

    #[cfg(unix)]
    #[test]
    fn run_solver_failure_carries_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let solver = install_script(dir.path(), "echo 'bad directive' >&2\nexit 3\n");
        let o = SolverOptions {
            solver_cmd: solver,
            ..opts(dir.path())
        };
        let err = run_solver(0.0, 0.1, &[], None, &o, "9").unwrap_err();
        match err {
            Error::Solver { tag, code, stderr } => {
                assert_eq!(tag, "9");
                assert_eq!(code, Some(3));
                assert!(stderr.contains("bad directive"));
            }
            other => panic!("expected Solver error, got {:?}", other),
        }
        // failure path also cleans up
        let leftover: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n != "fake-ace")
            .collect();
        assert!(leftover.is_empty(), "leftover scratch files: {:?}", leftover);
    }

    #[cfg(unix)]
    #[test]
    fn run_solver_keeps_shared_pulse_file() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared_pulse.dat");
        fs::write(&shared, "0.0 0.0 0.0\n").unwrap();
        let solver = install_script(
            dir.path(),
            r#"out=$(awk '$1 == "outfile" { print $2 }' "$1")
printf '0.0 1.0 0.0 0.0 0.0 0.0 0.0 0.0 0.0\n' > "$out"
"#,
        );
        let o = SolverOptions {
            solver_cmd: solver,
            pulse_file: Some(shared.clone()),
            ..opts(dir.path())
        };
        run_solver(0.0, 0.1, &[], None, &o, "0").unwrap();
        assert!(shared.exists(), "driver must not delete the shared pulse file");
    }

    #[cfg(unix)]
    #[test]
    fn run_solver_parse_failure_on_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let solver = install_script(
            dir.path(),
            r#"out=$(awk '$1 == "outfile" { print $2 }' "$1")
: > "$out"
"#,
        );
        let o = SolverOptions {
            solver_cmd: solver,
            ..opts(dir.path())
        };
        assert!(matches!(
            run_solver(0.0, 0.1, &[], None, &o, "0"),
            Err(Error::Parse { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Artifact path resolution
    // -----------------------------------------------------------------------

    #[test]
    fn artifact_path_prefers_explicit_option() {
        let o = SolverOptions {
            pt_file: Some(PathBuf::from("custom.pt")),
            ..SolverOptions::default()
        };
        assert_eq!(
            resolve_artifact_path(0.0, 100.0, &o),
            PathBuf::from("custom.pt")
        );
    }

    #[test]
    fn artifact_path_derives_from_window() {
        let o = SolverOptions {
            temperature: 4.0,
            ae: 5.0,
            ..SolverOptions::default()
        };
        assert_eq!(
            resolve_artifact_path(0.0, 100.0, &o),
            PathBuf::from("tls_generate_100ps_4K_5nm.pt")
        );
    }

    #[test]
    fn solver_options_serde_round_trip() {
        let o = SolverOptions::default();
        let json = serde_json::to_string(&o).unwrap();
        let back: SolverOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dt, o.dt);
        assert_eq!(back.solver_cmd, o.solver_cmd);
        assert_eq!(back.nintermediate, o.nintermediate);
    }
}
