//! Design and sweep configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! design_name = "ldo_sky130"
//! vin = 1.8                    # reference voltage (V)
//! imax = 0.01                  # maximum load current (A)
//! pdk_path = "/opt/pdk/sky130A"
//! model_corner = "tt"          # optional, default "tt"
//! arr_size = 50                # power array size
//! frequencies = [1e5, 1e6, 1e7]
//! capacitances = [1e-12, 5e-12]
//! simulator = "ngspice"        # optional, "ngspice" or "xyce"
//! ```

use std::path::{Path, PathBuf};

use serde_derive::Deserialize;

use crate::backend::Backend;
use crate::error::{LdoSimError, Result};

fn default_corner() -> String {
    "tt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub design_name: String,
    pub vin: f64,
    pub imax: f64,
    pub pdk_path: PathBuf,
    #[serde(default = "default_corner")]
    pub model_corner: String,
    pub arr_size: u32,
    pub frequencies: Vec<f64>,
    pub capacitances: Vec<f64>,
    #[serde(default)]
    pub simulator: Backend,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LdoSimError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.design_name.trim().is_empty() {
            return Err(LdoSimError::Config("design_name is empty".to_string()));
        }
        if !(self.vin > 0.0) {
            return Err(LdoSimError::Config(format!("vin must be positive, got {}", self.vin)));
        }
        if !(self.imax > 0.0) {
            return Err(LdoSimError::Config(format!(
                "imax must be positive, got {}",
                self.imax
            )));
        }
        if self.arr_size == 0 {
            return Err(LdoSimError::Config("arr_size must be positive".to_string()));
        }
        if self.frequencies.is_empty() || self.capacitances.is_empty() {
            return Err(LdoSimError::Config(
                "frequencies and capacitances must both be non-empty".to_string(),
            ));
        }
        if let Some(f) = self.frequencies.iter().find(|f| !(**f > 0.0)) {
            return Err(LdoSimError::Config(format!("frequency must be positive, got {}", f)));
        }
        Ok(())
    }

    pub fn user_spec(&self) -> UserSpec {
        UserSpec {
            design_name: self.design_name.clone(),
            vref: self.vin,
            imax: self.imax,
            pdk_path: self.pdk_path.clone(),
            model_corner: self.model_corner.clone(),
        }
    }

    pub fn sweep_spec(&self) -> SweepSpec {
        SweepSpec {
            frequencies: self.frequencies.clone(),
            capacitances: self.capacitances.clone(),
            array_size: self.arr_size,
        }
    }
}

/// Design-level inputs shared by every deck.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSpec {
    pub design_name: String,
    /// Reference voltage (V).
    pub vref: f64,
    /// Maximum load current (A).
    pub imax: f64,
    pub pdk_path: PathBuf,
    pub model_corner: String,
}

impl UserSpec {
    /// Output load resistor sized for 1.2x the maximum load current.
    pub fn load_resistance(&self) -> f64 {
        1.2 * self.vref / self.imax
    }

    /// Maximum load current in mA, as used in output file names.
    pub fn load_ma(&self) -> f64 {
        self.imax * 1000.0
    }

    pub fn model_file(&self) -> PathBuf {
        self.pdk_path.join("libs.tech/ngspice/sky130.lib.spice")
    }
}

/// Transient sweep: every frequency is simulated with every capacitance.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    /// Clock frequencies (Hz).
    pub frequencies: Vec<f64>,
    /// Load capacitances (F).
    pub capacitances: Vec<f64>,
    pub array_size: u32,
}
