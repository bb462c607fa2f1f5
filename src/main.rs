use clap::{Parser, Subcommand, ValueEnum};
use ldosim::backend::Backend;
use ldosim::config::Config;
use ldosim::deck::{self, PinOrdering, TemplateDir};
use ldosim::search::{self, SearchParams};
use ldosim::simulator::{self, PowerArrayOracle, RunnerConfig};
use ldosim::transform;
use ldosim::workspace;
use std::path::{Path, PathBuf};

/// Netlist preparation and characterization for LDO regulator designs
#[derive(Parser)]
#[command(name = "ldosim", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite a netlist for simulation
    Netlist {
        pass: Pass,

        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Design subcircuit name (required for `pex`)
        #[arg(long)]
        design: Option<String>,

        #[arg(long, default_value = "ngspice")]
        simulator: Backend,

        /// Write the derived pin ordering here (`pex` only)
        #[arg(long)]
        pin_order_out: Option<PathBuf>,
    },

    /// Generate simulation decks from templates
    Decks {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        templates: PathBuf,

        #[arg(long)]
        out: PathBuf,

        /// Pin ordering of an extracted netlist; pre-layout ordering otherwise
        #[arg(long)]
        pex_header: Option<PathBuf>,

        /// Run every generated deck
        #[arg(long)]
        run: bool,

        /// Per-simulation timeout in seconds
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
    },

    /// Search for the maximum load current of a power array
    MaxLoad {
        #[arg(long)]
        run_dir: PathBuf,

        /// Reference voltage (V)
        #[arg(long)]
        vref: f64,

        #[arg(long, default_value_t = 1000)]
        max_iterations: usize,

        /// Per-simulation timeout in seconds
        #[arg(long, default_value_t = 3600)]
        timeout: u64,
    },

    /// Create pre/post-layout run directories
    Dirs {
        #[arg(long)]
        sim_dir: PathBuf,

        #[arg(long)]
        arr_size: u32,

        /// Reuse existing directories for post-processing
        #[arg(long)]
        post: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Pass {
    /// Expose VREF on the trimmed reference generator
    Trim,
    /// Isolate the power array
    PowerArray,
    /// Prepare a parasitic-extracted netlist
    Pex,
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        std::process::exit(1);
    })
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap_or_else(|e| {
        eprintln!("Error writing {}: {}", path.display(), e);
        std::process::exit(1);
    });
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Netlist {
            pass,
            input,
            output,
            design,
            simulator,
            pin_order_out,
        } => {
            let text = read(&input);
            let result = match pass {
                Pass::Trim => transform::trim_reference(&text),
                Pass::PowerArray => transform::isolate_power_array(&text),
                Pass::Pex => {
                    let design = design.unwrap_or_else(|| {
                        eprintln!("Error: --design is required for the pex pass");
                        std::process::exit(1);
                    });
                    transform::prepare_extracted(&text, &design, simulator).map(|extracted| {
                        match &pin_order_out {
                            Some(path) => write(path, &extracted.pin_ordering),
                            None => println!("{}", extracted.pin_ordering),
                        }
                        extracted.netlist
                    })
                }
            };
            let netlist = result.unwrap_or_else(|e| {
                eprintln!("Netlist error: {}", e);
                std::process::exit(1);
            });
            write(&output, &netlist);
        }

        Command::Decks {
            config,
            templates,
            out,
            pex_header,
            run,
            timeout,
        } => {
            let config = Config::load(&config).unwrap_or_else(|e| {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            });
            let header = pex_header.as_deref().map(read);
            let pins = match &header {
                Some(text) => PinOrdering::PostLayout(text.trim_end()),
                None => PinOrdering::PreLayout,
            };
            let manifest = deck::generate(
                &TemplateDir::new(templates),
                &config.sweep_spec(),
                &config.user_spec(),
                pins,
                config.simulator,
                &out,
            )
            .unwrap_or_else(|e| {
                eprintln!("Deck error: {}", e);
                std::process::exit(1);
            });

            for invocation in &manifest.invocations {
                println!("{}", invocation);
            }
            for raw in &manifest.raw_outputs {
                println!("# raw: {}", raw);
            }

            if run {
                let runner = RunnerConfig {
                    timeout_secs: timeout,
                };
                simulator::run_all(&out, &manifest.invocations, &runner).unwrap_or_else(|e| {
                    eprintln!("Simulation error: {}", e);
                    std::process::exit(1);
                });
            }
        }

        Command::MaxLoad {
            run_dir,
            vref,
            max_iterations,
            timeout,
        } => {
            let runner = RunnerConfig {
                timeout_secs: timeout,
            };
            let mut oracle = PowerArrayOracle::new(run_dir, Backend::Ngspice, runner)
                .unwrap_or_else(|e| {
                    eprintln!("Simulator error: {}", e);
                    std::process::exit(1);
                });
            let params = SearchParams {
                max_iterations,
                ..SearchParams::default()
            };
            let result = search::max_load_current(vref, params, &mut oracle).unwrap_or_else(|e| {
                eprintln!("Search error: {}", e);
                std::process::exit(1);
            });
            println!(
                "max_load_current={:e} resistance={} vreg={} iterations={}",
                result.load_current, result.resistance, result.vreg, result.iterations
            );
        }

        Command::Dirs {
            sim_dir,
            arr_size,
            post,
        } => {
            let dirs = workspace::create_sim_dirs(&sim_dir, arr_size, post).unwrap_or_else(|e| {
                eprintln!("Directory error: {}", e);
                std::process::exit(1);
            });
            println!("{}", dirs.pre_layout.display());
            println!("{}", dirs.post_layout.display());
        }
    }
}
