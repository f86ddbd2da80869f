use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use super::MhdHeader;
use crate::consts::header::{HEADER_EXT, RAW_EXT};
use crate::error::LunaResult;
use crate::CtVolume;

/// 一对已发布的 MetaImage 文件.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumePaths {
    /// `<uid>.mhd`.
    pub header: PathBuf,

    /// `<uid>.raw`.
    pub raw: PathBuf,
}

impl VolumePaths {
    /// 两个文件的总字节数.
    pub fn byte_size(&self) -> LunaResult<u64> {
        Ok(fs::metadata(&self.header)?.len() + fs::metadata(&self.raw)?.len())
    }
}

/// 在被 drop 时删除登记过的文件, 除非先调用了 `disarm`.
struct Cleanup(Vec<PathBuf>);

impl Cleanup {
    fn disarm(mut self) {
        self.0.clear();
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        for p in &self.0 {
            if p.exists() {
                if let Err(e) = fs::remove_file(p) {
                    log::warn!("Failed to remove {}: {e}", p.display());
                }
            }
        }
    }
}

/// 将 `volume` 写到 `out_dir/<series_uid>.mhd` 和 `out_dir/<series_uid>.raw`.
///
/// 数据文件为小端 `f32`, 按 `(index, row, col)` 标准布局. 两个文件先写到临时文件名,
/// 再依次重命名 (先数据, 后头文件). 任何一步失败时, 本次写出的所有文件都会被删除,
/// 因此要么两个文件都存在, 要么都不存在.
pub fn write_volume<P: AsRef<Path>>(
    volume: &CtVolume,
    series_uid: &str,
    out_dir: P,
) -> LunaResult<VolumePaths> {
    let out_dir = out_dir.as_ref();
    fs::create_dir_all(out_dir)?;

    let raw_name = format!("{series_uid}.{RAW_EXT}");
    let paths = VolumePaths {
        header: out_dir.join(format!("{series_uid}.{HEADER_EXT}")),
        raw: out_dir.join(&raw_name),
    };
    let raw_tmp = out_dir.join(format!(".{raw_name}.tmp"));
    let header_tmp = out_dir.join(format!(".{series_uid}.{HEADER_EXT}.tmp"));

    let mut guard = Cleanup(vec![raw_tmp.clone(), header_tmp.clone()]);

    let mut w = BufWriter::new(File::create(&raw_tmp)?);
    for &v in volume.as_slice() {
        w.write_f32::<LittleEndian>(v)?;
    }
    w.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    let header = MhdHeader::for_volume(volume, raw_name);
    fs::write(&header_tmp, header.to_string())?;

    fs::rename(&raw_tmp, &paths.raw)?;
    guard.0.push(paths.raw.clone());
    fs::rename(&header_tmp, &paths.header)?;

    guard.disarm();
    Ok(paths)
}
