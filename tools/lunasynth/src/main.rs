//! 合成 LUNA 风格的肺部 CT 数据集.
//!
//! ```text
//! lunasynth --root ~/dataset/luna --subsets 2 --scans 10 --shape 128,128,128
//! ```

use clap::Parser;
use luna_berry::prelude::*;
use std::path::PathBuf;
use std::process;

mod result;
mod runner;

/// 合成 LUNA 风格数据集: `subset*/*.mhd|raw` + `candidates.csv` + `annotations.csv`.
#[derive(Parser, Debug)]
#[command(name = "lunasynth")]
#[command(about = "Synthesize a LUNA-style lung CT dataset")]
#[command(version)]
struct Cli {
    /// Dataset root. Defaults to `$LUNA_ROOT`, then `$HOME/dataset/luna`.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Number of subsets.
    #[arg(long, default_value_t = 2)]
    subsets: usize,

    /// Number of scans per subset.
    #[arg(long, default_value_t = 10)]
    scans: usize,

    /// Volume shape as `index,row,col`.
    #[arg(long, value_parser = utils::parse_triple::<usize>, default_value = "128,128,128")]
    shape: Idx3d,

    /// Voxel spacing in millimeters as `x,y,z`.
    #[arg(long, value_parser = utils::parse_triple::<f64>, default_value = "1,1,1")]
    spacing: Xyz,

    /// Physical coordinate of voxel (0, 0, 0) as `x,y,z`.
    #[arg(
        long,
        value_parser = utils::parse_triple::<f64>,
        default_value = "0,0,0",
        allow_hyphen_values = true
    )]
    offset: Xyz,

    /// Base random seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Sample the tables independently of the injected nodules.
    #[arg(long)]
    decorrelated: bool,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> SynthConfig {
        SynthConfig {
            root: utils::loader::root_from_env_or_home(self.root),
            subsets: self.subsets,
            scans_per_subset: self.scans,
            shape: self.shape,
            spacing: self.spacing,
            offset: self.offset,
            mode: if self.decorrelated {
                TableMode::Decorrelated
            } else {
                TableMode::GroundTruth
            },
            seed: self.seed,
            ..Default::default()
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Logger already initialized: {e}");
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match runner::run(cli.into_config()) {
        Ok(summary) => {
            summary.analyze();
            if !summary.is_success() {
                process::exit(1);
            }
        }
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
