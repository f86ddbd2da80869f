//! 程序运行函数.

use crate::result::SynthSummary;
use luna_berry::prelude::*;

/// 实际运行.
pub fn run(config: SynthConfig) -> LunaResult<SynthSummary> {
    let synth = DatasetSynthesizer::new(config)?;
    log::info!("Running on {} cores", utils::cpus());
    log::info!("Dataset root: {}", synth.layout().root().display());

    let report = synth.run()?;
    Ok(SynthSummary::new(synth.layout().root().to_path_buf(), report))
}
