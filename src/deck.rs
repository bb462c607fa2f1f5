//! Simulation deck generation.
//!
//! Deck templates carry `@`-prefixed placeholders that are substituted
//! verbatim. One transient deck is produced per (frequency, capacitance)
//! pair, followed by the power-array sweep deck and the load-step deck.
//! Substitution keys and enumeration order are the same for every backend;
//! only template names and the command line come from the
//! `BackendDescriptor`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::Backend;
use crate::config::{SweepSpec, UserSpec};
use crate::error::{LdoSimError, Result};

/// Interconnect list of the synthesized (pre-layout) top level.
pub const PRE_LAYOUT_PIN_ORDERING: &str = "clk cmp_out ctrl_out[0] ctrl_out[1] ctrl_out[2] ctrl_out[3]
+ ctrl_out[4] ctrl_out[5] ctrl_out[6] ctrl_out[7] ctrl_out[8] mode_sel[0] mode_sel[1]
+ reset std_ctrl_in std_pt_in_cnt[0] std_pt_in_cnt[1] std_pt_in_cnt[2] std_pt_in_cnt[3]
+ std_pt_in_cnt[4] std_pt_in_cnt[5] std_pt_in_cnt[6] std_pt_in_cnt[7] std_pt_in_cnt[8]
+ trim1 trim10 trim2 trim3 trim4 trim5 trim6 trim7 trim8 trim9 VDD VSS VREF VREG";

/// Simulator init file copied next to the decks.
pub const INIT_FILE: &str = ".spiceinit";

/// Samples per transient run.
const STEPS_PER_RUN: f64 = 2000.0;

/// Clock used to size the load-step run.
const LOAD_STEP_CLOCK_HZ: f64 = 1_000_000.0;

pub const POWER_ARRAY_DECK: &str = "pwrarr.sp";
pub const LOAD_STEP_DECK: &str = "ldo_load_change.sp";

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Where deck templates come from.
pub trait TemplateSource {
    fn load(&self, name: &str) -> Result<String>;
}

/// Templates stored as files in one directory, alongside the init file.
#[derive(Debug, Clone)]
pub struct TemplateDir {
    pub dir: PathBuf,
}

impl TemplateDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn init_file(&self) -> PathBuf {
        self.dir.join(INIT_FILE)
    }
}

impl TemplateSource for TemplateDir {
    fn load(&self, name: &str) -> Result<String> {
        let path = self.dir.join(name);
        fs::read_to_string(&path)
            .map_err(|e| LdoSimError::Template(format!("{}: {}", path.display(), e)))
    }
}

impl TemplateSource for HashMap<String, String> {
    fn load(&self, name: &str) -> Result<String> {
        self.get(name)
            .cloned()
            .ok_or_else(|| LdoSimError::Template(format!("no template named {}", name)))
    }
}

/// A template being specialised, one placeholder at a time.
#[derive(Debug, Clone)]
struct Template(String);

impl Template {
    fn fill(self, key: &str, value: &str) -> Self {
        Template(self.0.replace(key, value))
    }

    fn fill_number(self, key: &str, value: f64) -> Self {
        self.fill(key, &spice_number(value))
    }
}

/// Format a value for a deck or a file name: plain decimal in the usual
/// range, scientific notation for very small or very large magnitudes.
pub fn spice_number(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || (1e-3..1e7).contains(&magnitude) {
        format!("{}", value)
    } else {
        format!("{:e}", value)
    }
}

/// File-name label for a clock frequency.
///
/// Only 100 kHz and 1 MHz have their own labels; every other frequency is
/// filed under `10.0MHz`.
pub fn frequency_label(frequency: f64) -> &'static str {
    if frequency == 100_000.0 {
        "0.1MHz"
    } else if frequency == 1_000_000.0 {
        "1.0MHz"
    } else {
        "10.0MHz"
    }
}

// ---------------------------------------------------------------------------
// Deck plan
// ---------------------------------------------------------------------------

/// Which top-level interconnect list the decks instantiate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinOrdering<'a> {
    PreLayout,
    /// Derived from the extracted netlist header.
    PostLayout(&'a str),
}

impl PinOrdering<'_> {
    pub fn text(&self) -> &str {
        match self {
            PinOrdering::PreLayout => PRE_LAYOUT_PIN_ORDERING,
            PinOrdering::PostLayout(head) => head,
        }
    }
}

/// One fully specialised deck, ready to be written and run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckJob {
    pub directory: PathBuf,
    pub filename: String,
    pub content: String,
    /// Shell command, run from `directory`.
    pub invocation: String,
}

impl DeckJob {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// Decks plus the raw output files the transient sweep will produce.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckPlan {
    pub jobs: Vec<DeckJob>,
    pub raw_outputs: Vec<String>,
}

/// What the process runner and result collection need after generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimManifest {
    pub invocations: Vec<String>,
    pub raw_outputs: Vec<String>,
}

/// Build every deck for one design without touching the filesystem.
pub fn plan(
    templates: &dyn TemplateSource,
    sweep: &SweepSpec,
    user: &UserSpec,
    pins: PinOrdering<'_>,
    backend: Backend,
    directory: &Path,
) -> Result<DeckPlan> {
    let _span = tracing::info_span!("plan_decks", %backend, design = %user.design_name).entered();
    let descriptor = backend.descriptor();
    let names = descriptor.templates;
    let load = spice_number(user.load_ma());

    let base = |name: &str| -> Result<Template> {
        Ok(Template(templates.load(name)?)
            .fill("@model_file", &user.model_file().display().to_string())
            .fill("@model_corner", &user.model_corner)
            .fill("@design_nickname", &user.design_name)
            .fill_number("@VALUE_REF_VOLTAGE", user.vref)
            .fill_number("@Res_Value", user.load_resistance())
            .fill("@proper_pin_ordering", pins.text()))
    };

    let transient = base(names.transient)?;
    let mut jobs = Vec::with_capacity(sweep.frequencies.len() * sweep.capacitances.len() + 2);
    let mut raw_outputs = Vec::with_capacity(sweep.frequencies.len() * sweep.capacitances.len());

    for &freq in &sweep.frequencies {
        let sim_time = 1.2 * f64::from(sweep.array_size) / freq;
        let timed = transient
            .clone()
            .fill_number("@clk_period", 1.0 / freq)
            .fill_number("@duty_cycle", 0.5 / freq)
            .fill_number("@sim_time", sim_time)
            .fill_number("@sim_step", sim_time / STEPS_PER_RUN);
        let label = frequency_label(freq);

        for &cap in &sweep.capacitances {
            let cap_name = spice_number(cap);
            let raw = format!("{}mA_{}_{}_cap_output.raw", load, label, cap_name);
            let filename = format!("ldo_tran_{}mA_{}_{}.sp", load, label, cap_name);
            let content = timed
                .clone()
                .fill("@Cap_Value", &cap_name)
                .fill("@output_raw", &raw)
                .0;
            let invocation =
                descriptor.invocation(&format!("ldo_{}_{}_out", label, cap_name), &filename);
            tracing::debug!(deck = %filename, "transient deck");
            jobs.push(DeckJob {
                directory: directory.to_path_buf(),
                filename,
                content,
                invocation,
            });
            raw_outputs.push(raw);
        }
    }

    jobs.push(DeckJob {
        directory: directory.to_path_buf(),
        filename: POWER_ARRAY_DECK.to_string(),
        content: base(names.power_array)?.0,
        invocation: descriptor.invocation("pwrout", POWER_ARRAY_DECK),
    });

    let sim_time = 1.2 * f64::from(sweep.array_size) / LOAD_STEP_CLOCK_HZ;
    let load_step = base(names.load_step)?
        .fill_number("@sim_time", sim_time)
        .fill_number("@sim_step", sim_time / STEPS_PER_RUN)
        .fill("@output_raw", &format!("{}mA_output_load_change.raw", load));
    jobs.push(DeckJob {
        directory: directory.to_path_buf(),
        filename: LOAD_STEP_DECK.to_string(),
        content: load_step.0,
        invocation: descriptor.invocation("ldo_load_change", LOAD_STEP_DECK),
    });

    tracing::info!(decks = jobs.len(), "deck plan ready");
    Ok(DeckPlan { jobs, raw_outputs })
}

/// Write every deck and copy `init_file` into each destination directory.
///
/// Not transactional: on error some decks may already be on disk, and the
/// destination should be cleared before retrying.
pub fn materialize(plan: &DeckPlan, init_file: &Path) -> Result<SimManifest> {
    let _span = tracing::info_span!("materialize_decks").entered();
    let mut initialised: BTreeSet<&Path> = BTreeSet::new();
    let mut invocations = Vec::with_capacity(plan.jobs.len());

    for job in &plan.jobs {
        fs::write(job.path(), &job.content)?;
        if initialised.insert(job.directory.as_path()) {
            fs::copy(init_file, job.directory.join(INIT_FILE))?;
        }
        invocations.push(job.invocation.clone());
    }

    Ok(SimManifest {
        invocations,
        raw_outputs: plan.raw_outputs.clone(),
    })
}

/// Plan and write all decks from a template directory.
pub fn generate(
    templates: &TemplateDir,
    sweep: &SweepSpec,
    user: &UserSpec,
    pins: PinOrdering<'_>,
    backend: Backend,
    directory: &Path,
) -> Result<SimManifest> {
    let plan = plan(templates, sweep, user, pins, backend, directory)?;
    materialize(&plan, &templates.init_file())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
