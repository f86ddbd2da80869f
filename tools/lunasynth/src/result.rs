//! 合成结果.

use luna_berry::prelude::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// 将 `report` 的结果写进 `w` 中.
fn describe_into<W: Write>(root: &Path, r: &SynthReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Dataset `{}`:", root.display())?;
    writeln!(w, "{S4}Scans written: {}", r.scans.len())?;
    writeln!(w, "{S4}Scans failed: {}", r.failures.len())?;
    let nodules: usize = r.scans.iter().map(|s| s.nodules).sum();
    writeln!(w, "{S4}Nodules injected: {nodules}")?;
    writeln!(w, "{S4}Candidates: {} ({} positive)", r.candidates, r.positives)?;
    writeln!(w, "{S4}Annotations: {}", r.annotations)?;
    writeln!(w, "{S4}Size: {:.1} MB", r.megabytes())?;
    write!(w, "{S4}Elapsed: {:.2} s", r.elapsed.as_secs_f64())?;
    Ok(())
}

/// 数据集合成最终结果.
pub struct SynthSummary {
    root: PathBuf,
    report: SynthReport,
}

impl SynthSummary {
    pub fn new(root: PathBuf, report: SynthReport) -> Self {
        Self { root, report }
    }

    /// 是否所有扫描都成功?
    #[inline]
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }

    /// 打印运行结果. 每个失败的扫描占一行.
    pub fn analyze(&self) {
        utils::sep();
        for f in &self.report.failures {
            println!("FAILED {}: {}", f.series_uid, f.error);
        }
        if !self.report.failures.is_empty() {
            utils::sep();
        }

        let mut buf = Vec::with_capacity(512);
        match describe_into(&self.root, &self.report, &mut buf) {
            Ok(()) => println!("{}", String::from_utf8_lossy(&buf)),
            Err(e) => log::error!("Cannot format summary: {e}"),
        }
        utils::sep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_empty_report() {
        let mut buf = vec![];
        let report = SynthReport::default();
        describe_into(Path::new("/data/luna"), &report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Dataset `/data/luna`:\n"));
        assert!(text.contains("    Scans failed: 0\n"));
        assert!(text.contains("    Size: 0.0 MB\n"));
    }
}
