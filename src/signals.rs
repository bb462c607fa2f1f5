//! Reading measured signals out of simulator text output.
//!
//! A signal is reported on a line whose first few characters contain its
//! name, e.g.
//!
//! ```text
//! vreg = 1.797512e+00
//! id   = 9.713442e-03
//! ```
//!
//! The value is the last token on the line that parses as a float.

use crate::error::{LdoSimError, Result};

/// A signal name and how far into the line it may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPrefix {
    pub name: &'static str,
    /// Number of leading characters searched for `name`.
    pub window: usize,
}

/// Regulated output voltage.
pub const VREG: SignalPrefix = SignalPrefix {
    name: "vreg",
    window: 6,
};

/// Load current through the output device.
pub const LOAD_CURRENT: SignalPrefix = SignalPrefix {
    name: "id",
    window: 4,
};

impl SignalPrefix {
    fn matches(&self, line: &str) -> bool {
        let end = line
            .char_indices()
            .nth(self.window)
            .map_or(line.len(), |(i, _)| i);
        line[..end].contains(self.name)
    }
}

/// One oracle observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Regulated voltage (V).
    pub vreg: f64,
    /// Load current (A).
    pub load_current: f64,
}

/// Last float-parseable token of a line.
fn last_float(line: &str) -> Option<f64> {
    line.split_whitespace()
        .filter_map(|token| token.parse::<f64>().ok())
        .last()
}

/// Scan `output` for the regulated voltage and load current.
///
/// Scanning stops as soon as both have been seen. Fails with
/// `MissingSignal` naming whichever signal never appeared.
pub fn parse_measurement(output: &str) -> Result<Measurement> {
    let mut vreg = None;
    let mut load_current = None;

    for line in output.lines() {
        if VREG.matches(line) {
            if let Some(v) = last_float(line) {
                vreg = Some(v);
            }
        }
        if LOAD_CURRENT.matches(line) {
            if let Some(v) = last_float(line) {
                load_current = Some(v);
            }
        }
        if vreg.is_some() && load_current.is_some() {
            break;
        }
    }

    match (vreg, load_current) {
        (Some(vreg), Some(load_current)) => Ok(Measurement { vreg, load_current }),
        (None, None) => Err(LdoSimError::MissingSignal(format!(
            "neither {} nor {} found in simulator output",
            VREG.name, LOAD_CURRENT.name
        ))),
        (None, _) => Err(LdoSimError::MissingSignal(format!(
            "{} not found in simulator output",
            VREG.name
        ))),
        (_, None) => Err(LdoSimError::MissingSignal(format!(
            "{} not found in simulator output",
            LOAD_CURRENT.name
        ))),
    }
}
