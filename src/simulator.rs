//! External simulator processes.
//!
//! Runs deck invocations produced by the deck generator, and provides the
//! ngspice-backed oracle used by the max load search.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::Backend;
use crate::deck::spice_number;
use crate::error::{LdoSimError, Result};
use crate::search::Oracle;
use crate::signals::{parse_measurement, Measurement};

/// Process runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Kill a simulation that runs longer than this.
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { timeout_secs: 3600 }
    }
}

/// Check that a simulator executable is on `PATH`.
pub fn is_available(backend: Backend) -> bool {
    Command::new(backend.descriptor().executable)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run one shell invocation from `dir`, discarding its console output.
pub fn run_invocation(dir: &Path, invocation: &str, config: &RunnerConfig) -> Result<()> {
    let _span = tracing::info_span!("run_invocation", invocation).entered();
    let child = Command::new("sh")
        .arg("-c")
        .arg(invocation)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| LdoSimError::Simulator(format!("failed to start '{}': {}", invocation, e)))?;
    let status = wait_with_timeout(child, Duration::from_secs(config.timeout_secs))?;
    if !status.success() {
        return Err(LdoSimError::Simulator(format!(
            "'{}' exited with {}",
            invocation, status
        )));
    }
    Ok(())
}

/// Run invocations one after another, stopping at the first failure.
pub fn run_all(dir: &Path, invocations: &[String], config: &RunnerConfig) -> Result<()> {
    for (i, invocation) in invocations.iter().enumerate() {
        tracing::info!(job = i + 1, of = invocations.len(), "running simulation");
        run_invocation(dir, invocation, config)?;
    }
    Ok(())
}

/// Wait for a child process, killing it after `timeout`.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<ExitStatus> {
    let start = Instant::now();
    let poll_interval = Duration::from_millis(100);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LdoSimError::SimulatorTimeout(timeout.as_secs()));
                }
                thread::sleep(poll_interval);
            }
            Err(e) => return Err(LdoSimError::Simulator(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Power array oracle
// ---------------------------------------------------------------------------

/// Template for the single-point power array simulation, in the run dir.
pub const POWER_ARRAY_TEMPLATE: &str = "power_array_template_ngspice.sp";
pub const OUTPUT_RESISTANCE_KEY: &str = "@OUTPUT_RESISTANCE";
const POWER_ARRAY_NETLIST: &str = "power_array.sp";
const LOAD_RESULT: &str = "load_result.txt";
const BANNER: &str = "discard_banner.txt";

/// Runs the power array at a given output resistance through ngspice.
#[derive(Debug, Clone)]
pub struct PowerArrayOracle {
    run_dir: PathBuf,
    template: String,
    config: RunnerConfig,
}

impl PowerArrayOracle {
    /// Load the template from `run_dir`. Only ngspice is supported.
    pub fn new(run_dir: impl Into<PathBuf>, backend: Backend, config: RunnerConfig) -> Result<Self> {
        if backend != Backend::Ngspice {
            return Err(LdoSimError::Simulator(format!(
                "power array search only supports ngspice, not {}",
                backend
            )));
        }
        let run_dir = run_dir.into();
        let path = run_dir.join(POWER_ARRAY_TEMPLATE);
        let template = fs::read_to_string(&path)
            .map_err(|e| LdoSimError::Template(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            run_dir,
            template,
            config,
        })
    }

    /// The deck for one resistance.
    pub fn deck(&self, resistance: f64) -> String {
        self.template
            .replace(OUTPUT_RESISTANCE_KEY, &spice_number(resistance))
    }

    fn simulate(&self) -> Result<()> {
        let banner = File::create(self.run_dir.join(BANNER))?;
        let child = Command::new(Backend::Ngspice.descriptor().executable)
            .args(["-b", "-o", LOAD_RESULT, POWER_ARRAY_NETLIST])
            .current_dir(&self.run_dir)
            .stdout(banner)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| LdoSimError::Simulator(format!("failed to start ngspice: {}", e)))?;
        let status = wait_with_timeout(child, Duration::from_secs(self.config.timeout_secs))?;
        if !status.success() {
            return Err(LdoSimError::Simulator(format!("ngspice exited with {}", status)));
        }
        Ok(())
    }
}

impl Oracle for PowerArrayOracle {
    fn measure(&mut self, resistance: f64) -> Result<Measurement> {
        tracing::info!(resistance, "running load simulation");
        fs::write(self.run_dir.join(POWER_ARRAY_NETLIST), self.deck(resistance))?;
        self.simulate()?;
        let output = fs::read_to_string(self.run_dir.join(LOAD_RESULT))?;
        parse_measurement(&output)
    }
}
