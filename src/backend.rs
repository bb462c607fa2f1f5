//! Simulator backends.
//!
//! The two supported simulators differ only in template file names, command
//! line syntax and the in-line comment delimiter. Everything that varies is
//! collected in a `BackendDescriptor`, so the deck generator and the netlist
//! passes share one code path for both.

use std::fmt;
use std::str::FromStr;

use serde_derive::Deserialize;

use crate::error::LdoSimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Ngspice,
    Xyce,
}

impl Backend {
    pub fn descriptor(self) -> &'static BackendDescriptor {
        match self {
            Backend::Ngspice => &NGSPICE,
            Backend::Xyce => &XYCE,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Ngspice => write!(f, "ngspice"),
            Backend::Xyce => write!(f, "Xyce"),
        }
    }
}

impl FromStr for Backend {
    type Err = LdoSimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ngspice" => Ok(Backend::Ngspice),
            "xyce" => Ok(Backend::Xyce),
            other => Err(LdoSimError::Config(format!("unknown simulator '{}'", other))),
        }
    }
}

/// Deck template file names for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateNames {
    pub transient: &'static str,
    pub power_array: &'static str,
    pub load_step: &'static str,
}

/// Everything that differs between backends.
#[derive(Debug, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub templates: TemplateNames,
    /// Simulator executable.
    pub executable: &'static str,
    /// Command line with `{log}` and `{deck}` placeholders.
    pub invocation_template: &'static str,
    /// Extension of the simulator log named in each invocation.
    pub log_extension: &'static str,
    /// In-line comment delimiter expected by the simulator, and the one it
    /// replaces in extracted netlists (if any).
    pub inline_comment: char,
    pub foreign_inline_comment: Option<char>,
}

static NGSPICE: BackendDescriptor = BackendDescriptor {
    templates: TemplateNames {
        transient: "ldo_tran_ngspice.sp",
        power_array: "pwrarr_sweep_ngspice.sp",
        load_step: "ldo_load_change_ngspice.sp",
    },
    executable: "ngspice",
    invocation_template: "ngspice -b -o {log} -i {deck}",
    log_extension: "txt",
    inline_comment: '$',
    foreign_inline_comment: None,
};

static XYCE: BackendDescriptor = BackendDescriptor {
    templates: TemplateNames {
        transient: "ldo_tran_xyce.sp",
        power_array: "pwrarr_sweep_xyce.sp",
        load_step: "ldo_load_change_xyce.sp",
    },
    executable: "Xyce",
    invocation_template: "Xyce -o {log} -hspice-ext all {deck}",
    log_extension: "log",
    inline_comment: ';',
    foreign_inline_comment: Some('$'),
};

impl BackendDescriptor {
    /// Shell command that runs `deck` and writes the simulator log to
    /// `<log_stem>.<log_extension>`.
    pub fn invocation(&self, log_stem: &str, deck: &str) -> String {
        let log = format!("{}.{}", log_stem, self.log_extension);
        self.invocation_template
            .replace("{log}", &log)
            .replace("{deck}", deck)
    }

    /// Rewrite in-line comments written for the other simulator.
    pub fn escape_comments(&self, text: &str) -> String {
        match self.foreign_inline_comment {
            Some(foreign) => text.replace(foreign, &self.inline_comment.to_string()),
            None => text.to_string(),
        }
    }
}
