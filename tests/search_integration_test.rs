//! Max load search against synthetic regulators.

use approx::assert_relative_eq;
use ldosim::error::{LdoSimError, Result};
use ldosim::search::{self, BisectionSearch, Oracle, SearchParams, SearchState};
use ldosim::signals::{self, Measurement};

const VREF: f64 = 1.8;

/// Regulator with a fixed output resistance: the output sags as the load
/// resistance drops.
struct SaggingRegulator {
    output_resistance: f64,
    resistances: Vec<f64>,
}

impl SaggingRegulator {
    fn new(output_resistance: f64) -> Self {
        Self {
            output_resistance,
            resistances: Vec::new(),
        }
    }
}

impl Oracle for SaggingRegulator {
    fn measure(&mut self, resistance: f64) -> Result<Measurement> {
        self.resistances.push(resistance);
        let vreg = VREF * resistance / (resistance + self.output_resistance);
        Ok(Measurement {
            vreg,
            load_current: vreg / resistance,
        })
    }
}

#[test]
fn test_converges_on_sagging_regulator() {
    let mut oracle = SaggingRegulator::new(10.0);
    let result = search::max_load_current(VREF, SearchParams::default(), &mut oracle).unwrap();

    assert_eq!(result.iterations, 3);
    assert_eq!(oracle.resistances.len(), 3);
    assert_relative_eq!(oracle.resistances[0], 50_000.5, max_relative = 1e-12);
    assert_relative_eq!(oracle.resistances[1], 25_000.75, max_relative = 1e-12);
    assert_relative_eq!(result.resistance, 12_500.875, max_relative = 1e-12);
    assert!(result.vreg > VREF - 0.002 && result.vreg < VREF - 0.001);
    assert_relative_eq!(result.load_current, result.vreg / result.resistance, max_relative = 1e-12);
}

#[test]
fn test_tight_window_narrows_interval() {
    let params = SearchParams {
        max_error: 1e-6,
        ..SearchParams::default()
    };
    let mut oracle = SaggingRegulator::new(0.001);
    let mut search = BisectionSearch::new(VREF, params).unwrap();
    let mut width = params.r_max - params.r_min;

    let result = loop {
        match search.step(&mut oracle).unwrap() {
            SearchState::Searching { low, high } => {
                assert!(low < high);
                assert_relative_eq!(high - low, width / 2.0, max_relative = 1e-9);
                width = high - low;
            }
            SearchState::Converged(c) => break c,
            SearchState::Failed(reason) => panic!("search failed: {:?}", reason),
        }
    };

    assert_eq!(result.iterations, 6);
    assert_eq!(result.iterations, search.calls());
    let window = search.window();
    assert!(window.contains(result.vreg));
}

#[test]
fn test_unreachable_window_hits_budget() {
    // output stays above the window whatever the load
    let mut oracle = |r: f64| -> Result<Measurement> {
        Ok(Measurement {
            vreg: VREF - 0.0005,
            load_current: VREF / r,
        })
    };
    let params = SearchParams {
        max_iterations: 40,
        ..SearchParams::default()
    };
    let err = search::max_load_current(VREF, params, &mut oracle).unwrap_err();
    assert!(matches!(err, LdoSimError::NonConvergence { iterations: 39 }));
}

#[test]
fn test_oracle_reading_simulator_text() {
    let mut oracle = |r: f64| -> Result<Measurement> {
        let vreg = VREF * r / (r + 10.0);
        let text = format!(
            "Circuit: power array\n\nvreg = {:e}\nid(mpt) = {:e}\n",
            vreg,
            vreg / r
        );
        signals::parse_measurement(&text)
    };
    let result = search::max_load_current(VREF, SearchParams::default(), &mut oracle).unwrap();
    assert_eq!(result.iterations, 3);
    assert_relative_eq!(result.load_current, 1.798561e-3 / 12.500875, max_relative = 1e-3);
}

#[test]
fn test_missing_signal_aborts_search() {
    let mut calls = 0;
    let mut oracle = |_r: f64| -> Result<Measurement> {
        calls += 1;
        signals::parse_measurement("vreg = 1.7985\n")
    };
    let err = search::max_load_current(VREF, SearchParams::default(), &mut oracle).unwrap_err();
    assert!(matches!(err, LdoSimError::MissingSignal(_)));
    assert_eq!(calls, 1);
}
