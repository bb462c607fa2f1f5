//! Maximum load current search.
//!
//! Treats the simulator as an oracle that, for a given output resistance,
//! reports the regulated voltage and the load current. The resistance is
//! bisected until the regulated voltage lands inside a window just below
//! the reference:
//!
//! ```text
//! R small ---- [VREG = VREF - 2e] ==== stop ==== [VREG = VREF - e] ---- [VREG = VREF] ---- R large
//! ```
//!
//! The window sits below the reference because the output sags under load.

use crate::error::{LdoSimError, Result};
use crate::signals::Measurement;

/// Something that can be asked for the operating point at a given output
/// resistance.
pub trait Oracle {
    fn measure(&mut self, resistance: f64) -> Result<Measurement>;
}

impl<F> Oracle for F
where
    F: FnMut(f64) -> Result<Measurement>,
{
    fn measure(&mut self, resistance: f64) -> Result<Measurement> {
        self(resistance)
    }
}

/// Search bounds and budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Initial resistance interval (ohms).
    pub r_min: f64,
    pub r_max: f64,
    /// Allowed deviation unit `e` (V); the window is `[VREF - 2e, VREF - e]`.
    pub max_error: f64,
    /// Iteration bound. The oracle is consulted at most
    /// `max_iterations - 1` times.
    pub max_iterations: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            r_min: 1.0,
            r_max: 100_000.0,
            max_error: 0.001,
            max_iterations: 1000,
        }
    }
}

/// Open interval the regulated voltage must fall into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetWindow {
    pub min: f64,
    pub max: f64,
}

impl TargetWindow {
    pub fn below_reference(vref: f64, max_error: f64) -> Self {
        Self {
            min: vref - 2.0 * max_error,
            max: vref - max_error,
        }
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min < v && v < self.max
    }
}

/// Result of a converged search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    /// Load current reported by the final simulation (A).
    pub load_current: f64,
    pub resistance: f64,
    pub vreg: f64,
    /// Oracle calls made, including the final one.
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailureReason {
    NonConvergence { iterations: usize },
    ComparisonInconsistency { iteration: usize, voltage: f64 },
}

impl From<FailureReason> for LdoSimError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::NonConvergence { iterations } => {
                LdoSimError::NonConvergence { iterations }
            }
            FailureReason::ComparisonInconsistency { iteration, voltage } => {
                LdoSimError::ComparisonInconsistency { iteration, voltage }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchState {
    Searching { low: f64, high: f64 },
    Converged(Convergence),
    Failed(FailureReason),
}

/// Bisection over output resistance.
#[derive(Debug, Clone)]
pub struct BisectionSearch {
    params: SearchParams,
    window: TargetWindow,
    calls: usize,
    state: SearchState,
}

impl BisectionSearch {
    pub fn new(vref: f64, params: SearchParams) -> Result<Self> {
        if !(params.r_min > 0.0 && params.r_min < params.r_max) {
            return Err(LdoSimError::InvalidArgument(format!(
                "resistance interval [{}, {}] is empty or non-positive",
                params.r_min, params.r_max
            )));
        }
        if !(params.max_error > 0.0) {
            return Err(LdoSimError::InvalidArgument(format!(
                "max_error must be positive, got {}",
                params.max_error
            )));
        }
        Ok(Self {
            params,
            window: TargetWindow::below_reference(vref, params.max_error),
            calls: 0,
            state: SearchState::Searching {
                low: params.r_min,
                high: params.r_max,
            },
        })
    }

    pub fn window(&self) -> TargetWindow {
        self.window
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Oracle calls made so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Advance by one simulation. Terminal states are returned unchanged.
    /// Oracle errors are returned as-is and leave the state untouched.
    pub fn step(&mut self, oracle: &mut dyn Oracle) -> Result<SearchState> {
        let SearchState::Searching { low, high } = self.state else {
            return Ok(self.state);
        };

        if self.calls + 1 >= self.params.max_iterations {
            tracing::error!(calls = self.calls, "max load search exhausted its budget");
            self.state = SearchState::Failed(FailureReason::NonConvergence {
                iterations: self.calls,
            });
            return Ok(self.state);
        }

        let iteration = self.calls + 1;
        let mid = (low + high) / 2.0;
        let _span = tracing::debug_span!("bisection_iter", iteration).entered();
        let m = oracle.measure(mid)?;
        self.calls = iteration;
        tracing::debug!(resistance = mid, vreg = m.vreg, load_current = m.load_current, "load simulation");

        self.state = if self.window.contains(m.vreg) {
            tracing::info!(iteration, load_current = m.load_current, "max load search converged");
            SearchState::Converged(Convergence {
                load_current: m.load_current,
                resistance: mid,
                vreg: m.vreg,
                iterations: iteration,
            })
        } else if m.vreg > self.window.max {
            SearchState::Searching { low, high: mid }
        } else if m.vreg < self.window.min {
            SearchState::Searching { low: mid, high }
        } else {
            SearchState::Failed(FailureReason::ComparisonInconsistency {
                iteration,
                voltage: m.vreg,
            })
        };
        Ok(self.state)
    }

    /// Step until a terminal state.
    pub fn run(mut self, oracle: &mut dyn Oracle) -> Result<Convergence> {
        loop {
            match self.step(oracle)? {
                SearchState::Searching { .. } => continue,
                SearchState::Converged(c) => return Ok(c),
                SearchState::Failed(reason) => return Err(reason.into()),
            }
        }
    }
}

/// Find the load current at which the regulated voltage first drops into
/// `[vref - 2e, vref - e]`.
pub fn max_load_current(vref: f64, params: SearchParams, oracle: &mut dyn Oracle) -> Result<Convergence> {
    let _span = tracing::info_span!("max_load_search", vref).entered();
    BisectionSearch::new(vref, params)?.run(oracle)
}
