//! Simulation run directories.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{LdoSimError, Result};

const RUN_DIR: &str = "run";

/// Pre- and post-layout run directories for one power array size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDirs {
    pub pre_layout: PathBuf,
    pub post_layout: PathBuf,
}

impl SimDirs {
    pub fn new(sim_dir: &Path, arr_size: u32) -> Self {
        let run = sim_dir.join(RUN_DIR);
        Self {
            pre_layout: run.join(format!("prePEX_PT_cells_{}", arr_size)),
            post_layout: run.join(format!("postPEX_PT_cells_{}", arr_size)),
        }
    }
}

/// Create both run directories under `sim_dir/run`.
///
/// An existing directory is an error, so results from an earlier run are
/// never mixed in, unless `post_processing` is set, when reusing them is
/// the point. Each directory is claimed with a single `create_dir`, so of
/// two concurrent callers exactly one gets it.
pub fn create_sim_dirs(sim_dir: &Path, arr_size: u32, post_processing: bool) -> Result<SimDirs> {
    let dirs = SimDirs::new(sim_dir, arr_size);
    fs::create_dir_all(sim_dir.join(RUN_DIR))?;
    for dir in [&dirs.pre_layout, &dirs.post_layout] {
        match fs::create_dir(dir) {
            Ok(()) => tracing::info!(dir = %dir.display(), "created run directory"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !post_processing {
                    return Err(LdoSimError::DirectoryExists(dir.clone()));
                }
                tracing::warn!(dir = %dir.display(), "run directory exists, reusing it");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(dirs)
}
