//! `lunasynth` 与 `lunavis` 共用的组件.

use luna_berry::consts::LUNG_CLIM;
use luna_berry::CtWindow;
use std::str::FromStr;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    num_cpus::get()
}

/// 创建用于可视化肺部 CT 扫描的窗口. 显示范围为 [-1000, 300].
#[inline]
pub fn lung_window() -> CtWindow {
    // 常量本身合法.
    CtWindow::from_clim(LUNG_CLIM.0, LUNG_CLIM.1).unwrap()
}

/// 解析逗号分隔的三元组, 如 `128,128,128` 或 `0.7,0.7,2.5`.
pub fn parse_triple<T: FromStr>(s: &str) -> Result<(T, T, T), String>
where
    T::Err: std::fmt::Display,
{
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [a, b, c] = parts.as_slice() else {
        return Err(format!("expected 3 comma-separated values, got `{s}`"));
    };
    let p = |v: &str| v.parse::<T>().map_err(|e| format!("`{v}`: {e}"));
    Ok((p(*a)?, p(*b)?, p(*c)?))
}
