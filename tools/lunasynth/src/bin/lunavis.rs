//! 查看数据集中的候选结节.
//!
//! 载入候选点所在的体数据, 将物理坐标转换为体素坐标, 并把整体切片, 裁剪块中间切片,
//! 以及裁剪块内的若干水平切片拼成一张 5x3 的概览图.

use clap::Parser;
use luna_berry::consts::VISUALIZATION_FILE;
use luna_berry::dataset::table::read_table;
use luna_berry::prelude::*;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

/// Visualize a candidate nodule of a LUNA-style dataset.
#[derive(Parser, Debug)]
#[command(name = "lunavis")]
#[command(about = "Render the slices around a candidate nodule into one PNG")]
#[command(version)]
struct Cli {
    /// Dataset root. Defaults to `$LUNA_ROOT`, then `$HOME/dataset/luna`.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// List the first N positive candidates and exit.
    #[arg(long, value_name = "N")]
    list: Option<usize>,

    /// Show the first positive candidate of this series.
    #[arg(long)]
    series_uid: Option<String>,

    /// Show the candidate at this row of `candidates.csv` (0-based, header excluded).
    #[arg(long, conflicts_with = "series_uid")]
    candidate_ndx: Option<usize>,

    /// Output PNG.
    #[arg(short, long, default_value = VISUALIZATION_FILE)]
    output: PathBuf,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
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

/// 打印前 `n` 个结节候选点.
fn list_positives(cands: &[CandidateRow], n: usize) -> io::Result<()> {
    let mut out = io::stdout().lock();
    utils::sep_to(&mut out)?;
    for (k, c) in cands.iter().filter(|c| c.is_nodule).take(n).enumerate() {
        let (x, y, z) = c.coord;
        writeln!(out, "{k:>4}  {}  ({x:.2}, {y:.2}, {z:.2})", c.series_uid)?;
    }
    utils::sep_to(&mut out)
}

/// 按命令行参数选择一个候选点.
fn pick<'a>(cli: &Cli, cands: &'a [CandidateRow]) -> Result<&'a CandidateRow, Box<dyn Error>> {
    if let Some(ndx) = cli.candidate_ndx {
        let n = cands.len();
        return cands
            .get(ndx)
            .ok_or_else(|| format!("candidate index {ndx} is out of range ({n} rows)").into());
    }

    let pool: Vec<&CandidateRow> = match &cli.series_uid {
        Some(uid) => cands.iter().filter(|c| &c.series_uid == uid).collect(),
        None => cands.iter().collect(),
    };
    if let Some(c) = pool.iter().find(|c| c.is_nodule) {
        return Ok(*c);
    }
    let first = pool.first().ok_or("no candidate matches the request")?;
    log::warn!(
        "No positive candidate found, showing the first candidate of {}",
        first.series_uid
    );
    Ok(*first)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let layout = utils::loader::layout_from_env_or_home(cli.root.clone());
    layout.validate()?;
    let cands: Vec<CandidateRow> = read_table(layout.candidates_csv())?;

    if let Some(n) = cli.list {
        list_positives(&cands, n)?;
        return Ok(());
    }

    let cand = pick(&cli, &cands)?;
    let mut volume = read_volume(layout.find_series(&cand.series_uid)?)?;
    volume.clip(HU_MIN, HU_MAX);
    let center = volume.xyz_to_irc(cand.coord)?;
    log::info!(
        "Candidate {} at {:?} -> irc {center:?} (nodule: {})",
        cand.series_uid,
        cand.coord,
        cand.is_nodule
    );

    let (i, r, c) = volume.shape();
    let width = (CROP_WIDTH.0.min(i), CROP_WIDTH.1.min(r), CROP_WIDTH.2.min(c));
    let (crop, _) = volume.crop_around(center, width)?;
    let mid = (width.0 / 2, width.1 / 2, width.2 / 2);
    let extra: Vec<usize> = OVERVIEW_SLICES
        .iter()
        .flatten()
        .copied()
        .filter(|&k| k < width.0)
        .collect();

    let full = volume.extract_views(center, &[])?;
    let local = crop.extract_views(mid, &extra)?;

    let mut montage = Montage::new(3, utils::lung_window());
    montage.push(format!("index {}", center.0), full.axial.data(), false);
    montage.push(format!("row {}", center.1), full.coronal.data(), true);
    montage.push(format!("col {}", center.2), full.sagittal.data(), true);
    montage.push(format!("crop index {}", mid.0), local.axial.data(), false);
    montage.push(format!("crop row {}", mid.1), local.coronal.data(), true);
    montage.push(format!("crop col {}", mid.2), local.sagittal.data(), true);
    for (k, s) in &local.extra {
        montage.push(format!("crop slice {k}"), s.data(), false);
    }
    montage.save(&cli.output)?;
    println!("Saved {}", cli.output.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
