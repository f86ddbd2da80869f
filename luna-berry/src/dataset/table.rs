//! 候选点与标注表格.
//!
//! 每一行都以物理坐标 (x, y, z) 给出位置, 并保证落在对应体数据的物理范围内:
//! 每一维满足 `offset <= coord < offset + extent * spacing`, 且转换为 IRC 坐标后不越界.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::nodule::NoduleSpec;
use crate::data::{GeometryAttr, VolumeGeometry};
use crate::error::{LunaError, LunaResult};
use crate::Xyz;

/// 生成负样本时, 为避开所有结节球体而重新采样的最大次数.
const MAX_REJECTIONS: usize = 64;

/// 可以与一行 CSV 文本互相转换的表格行.
pub trait CsvRow: Sized {
    /// 表头.
    const HEADER: &'static str;

    /// 所属序列.
    fn series_uid(&self) -> &str;

    /// 物理坐标 (x, y, z).
    fn coord(&self) -> Xyz;

    /// 转换为一行 CSV 文本 (不含换行符).
    fn to_csv(&self) -> String;

    /// 由一行 CSV 文本解析.
    fn from_csv(line: &str) -> Result<Self, String>;
}

/// `candidates.csv` 中的一行.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidateRow {
    /// 序列标识符.
    pub series_uid: String,

    /// 物理坐标 (x, y, z).
    pub coord: Xyz,

    /// 是否为结节 (`class` 列为 1).
    pub is_nodule: bool,
}

/// `annotations.csv` 中的一行.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnotationRow {
    /// 序列标识符.
    pub series_uid: String,

    /// 物理坐标 (x, y, z).
    pub coord: Xyz,

    /// 结节直径, 以毫米为单位. 总是为正.
    pub diameter_mm: f64,
}

/// 把一行按逗号切为恰好 `N` 个字段.
fn split_fields<const N: usize>(line: &str) -> Result<[&str; N], String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    fields
        .try_into()
        .map_err(|v: Vec<&str>| format!("expected {N} fields, got {}", v.len()))
}

fn parse_f64(name: &str, s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|e| format!("{name} `{s}`: {e}"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("{name} `{s}` is not finite"))
    }
}

fn parse_uid(s: &str) -> Result<String, String> {
    if s.is_empty() {
        Err("empty seriesuid".to_string())
    } else {
        Ok(s.to_string())
    }
}

impl CsvRow for CandidateRow {
    const HEADER: &'static str = "seriesuid,coordX,coordY,coordZ,class";

    #[inline]
    fn series_uid(&self) -> &str {
        &self.series_uid
    }

    #[inline]
    fn coord(&self) -> Xyz {
        self.coord
    }

    fn to_csv(&self) -> String {
        let (x, y, z) = self.coord;
        format!("{},{x},{y},{z},{}", self.series_uid, u8::from(self.is_nodule))
    }

    fn from_csv(line: &str) -> Result<Self, String> {
        let [uid, x, y, z, class] = split_fields::<5>(line)?;
        let is_nodule = match class {
            "0" => false,
            "1" => true,
            other => return Err(format!("class must be 0 or 1, got `{other}`")),
        };
        Ok(Self {
            series_uid: parse_uid(uid)?,
            coord: (parse_f64("coordX", x)?, parse_f64("coordY", y)?, parse_f64("coordZ", z)?),
            is_nodule,
        })
    }
}

impl CsvRow for AnnotationRow {
    const HEADER: &'static str = "seriesuid,coordX,coordY,coordZ,diameter_mm";

    #[inline]
    fn series_uid(&self) -> &str {
        &self.series_uid
    }

    #[inline]
    fn coord(&self) -> Xyz {
        self.coord
    }

    fn to_csv(&self) -> String {
        let (x, y, z) = self.coord;
        format!("{},{x},{y},{z},{}", self.series_uid, self.diameter_mm)
    }

    fn from_csv(line: &str) -> Result<Self, String> {
        let [uid, x, y, z, d] = split_fields::<5>(line)?;
        let diameter_mm = parse_f64("diameter_mm", d)?;
        if diameter_mm <= 0.0 {
            return Err(format!("diameter_mm must be positive, got {diameter_mm}"));
        }
        Ok(Self {
            series_uid: parse_uid(uid)?,
            coord: (parse_f64("coordX", x)?, parse_f64("coordY", y)?, parse_f64("coordZ", z)?),
            diameter_mm,
        })
    }
}

/// 将表头与所有行写到 `path`. 先写临时文件再重命名, 因此 `path` 要么是旧内容, 要么是完整的新内容.
pub fn write_table<R: CsvRow, P: AsRef<Path>>(path: P, rows: &[R]) -> LunaResult<()> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    let result = (|| -> LunaResult<()> {
        let mut w = BufWriter::new(File::create(&tmp)?);
        writeln!(w, "{}", R::HEADER)?;
        for row in rows {
            writeln!(w, "{}", row.to_csv())?;
        }
        w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() && tmp.exists() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// 读取 `path` 处的表格. 表头必须与 `R::HEADER` 一致, 空行被跳过.
///
/// # 错误
///
/// 1. 文件不存在时返回 [`LunaError::MissingPath`].
/// 2. 表头不符或某一行无法解析时返回 [`LunaError::MalformedRow`], 行号从 1 开始.
pub fn read_table<R: CsvRow, P: AsRef<Path>>(path: P) -> LunaResult<Vec<R>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LunaError::MissingPath(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);

    let mut header_seen = false;
    let mut ans = vec![];
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: String| LunaError::MalformedRow { line: n + 1, reason };
        if !header_seen {
            if line != R::HEADER {
                return Err(malformed(format!("expected header `{}`", R::HEADER)));
            }
            header_seen = true;
            continue;
        }
        ans.push(R::from_csv(line).map_err(malformed)?);
    }
    if !header_seen {
        return Err(LunaError::MalformedRow {
            line: 1,
            reason: "empty table".to_string(),
        });
    }
    Ok(ans)
}

/// 单个扫描的表格采样参数. 所有区间均为闭区间.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableSpec {
    /// 候选点个数. 真值关联模式下为负样本个数.
    pub candidates: (u32, u32),

    /// 独立采样模式下候选点为结节的概率.
    pub nodule_probability: f64,

    /// 独立采样模式下的标注个数.
    pub annotations: (u32, u32),

    /// 独立采样模式下的标注直径, 以毫米为单位.
    pub diameter_mm: (f64, f64),

    /// 坐标距离体数据各表面的最小体素数.
    pub margin_voxels: usize,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            candidates: (3, 7),
            nodule_probability: 0.3,
            annotations: (0, 3),
            diameter_mm: (5.0, 20.0),
            margin_voxels: 25,
        }
    }
}

impl TableSpec {
    /// 检查参数本身, 以及边距能否用于 `geometry`.
    pub fn validate(&self, geometry: &VolumeGeometry) -> LunaResult<()> {
        check_count("candidate", self.candidates)?;
        check_count("annotation", self.annotations)?;
        let p = self.nodule_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(LunaError::range(format!("nodule probability {p} is outside [0, 1]")));
        }
        let (d0, d1) = self.diameter_mm;
        if !(d0.is_finite() && d1.is_finite() && d0 > 0.0 && d0 <= d1) {
            return Err(LunaError::range(format!(
                "diameter range ({d0}, {d1}) must be positive and ordered"
            )));
        }
        self.intervals(geometry).map(|_| ())
    }

    /// 各轴 (x, y, z) 的采样区间 `[lo, hi)`.
    ///
    /// 即 `[offset + margin * spacing, offset + (extent - margin) * spacing)` 与
    /// `[offset, offset + (extent - 1/2) * spacing)` 的交集. 后者保证采样点四舍五入后不越界.
    pub fn intervals(&self, geometry: &VolumeGeometry) -> LunaResult<[(f64, f64); 3]> {
        let (ox, oy, oz) = geometry.offset();
        let (sx, sy, sz) = geometry.spacing();
        let [ex, ey, ez] = geometry.dim_size();
        let m = self.margin_voxels as f64;

        let axis = |o: f64, s: f64, e: usize| -> LunaResult<(f64, f64)> {
            let e = e as f64;
            let lo = o + m * s;
            let hi = (o + (e - m) * s).min(o + (e - 0.5) * s);
            if lo < hi {
                Ok((lo, hi))
            } else {
                Err(LunaError::range(format!(
                    "margin {} leaves no room in volume of shape {:?}",
                    self.margin_voxels,
                    geometry.shape()
                )))
            }
        };
        Ok([axis(ox, sx, ex)?, axis(oy, sy, ey)?, axis(oz, sz, ez)?])
    }
}

fn check_count(name: &str, (lo, hi): (u32, u32)) -> LunaResult<()> {
    if lo > hi {
        Err(LunaError::range(format!("{name} count range ({lo}, {hi}) is reversed")))
    } else {
        Ok(())
    }
}

/// 在 `[lo, hi)` 内均匀采样. `lo == hi` 时直接返回 `lo`.
fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if lo < hi {
        // 浮点舍入可能使 `random_range(lo..hi)` 恰好返回 `hi`.
        let v = rng.random_range(lo..hi);
        if v < hi {
            v
        } else {
            lo
        }
    } else {
        lo
    }
}

/// 在闭区间 `[lo, hi]` 内均匀采样. `lo == hi` 时直接返回 `lo`.
fn uniform_inclusive<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    if lo < hi {
        rng.random_range(lo..=hi)
    } else {
        lo
    }
}

fn sample_xyz<R: Rng + ?Sized>(rng: &mut R, intervals: &[(f64, f64); 3]) -> Xyz {
    let [(x0, x1), (y0, y1), (z0, z1)] = *intervals;
    (uniform(rng, x0, x1), uniform(rng, y0, y1), uniform(rng, z0, z1))
}

/// 独立采样模式: 候选点与标注均与体数据内容无关, 仅保证坐标在体数据范围内.
///
/// 候选点个数取自 `spec.candidates`, 每个以 `spec.nodule_probability` 的概率标记为结节;
/// 标注个数取自 `spec.annotations`, 直径取自 `spec.diameter_mm`. 按生成顺序返回.
pub fn build_tables<R: Rng + ?Sized>(
    series_uid: &str,
    geometry: &VolumeGeometry,
    spec: &TableSpec,
    rng: &mut R,
) -> LunaResult<(Vec<CandidateRow>, Vec<AnnotationRow>)> {
    spec.validate(geometry)?;
    let intervals = spec.intervals(geometry)?;

    let n = rng.random_range(spec.candidates.0..=spec.candidates.1);
    let candidates = (0..n)
        .map(|_| {
            let coord = sample_xyz(rng, &intervals);
            CandidateRow {
                series_uid: series_uid.to_string(),
                coord,
                is_nodule: rng.random_bool(spec.nodule_probability),
            }
        })
        .collect();

    let n = rng.random_range(spec.annotations.0..=spec.annotations.1);
    let (d0, d1) = spec.diameter_mm;
    let annotations = (0..n)
        .map(|_| {
            let coord = sample_xyz(rng, &intervals);
            AnnotationRow {
                series_uid: series_uid.to_string(),
                coord,
                diameter_mm: uniform_inclusive(rng, d0, d1),
            }
        })
        .collect();

    Ok((candidates, annotations))
}

/// 以体素为单位的距离判断: `xyz` 是否落在 `nodule` 球内.
fn inside_nodule(geometry: &VolumeGeometry, nodule: &NoduleSpec, (x, y, z): Xyz) -> bool {
    let (ox, oy, oz) = geometry.offset();
    let (sx, sy, sz) = geometry.spacing();
    let (ci, cr, cc) = nodule.center;
    let dc = (x - ox) / sx - cc as f64;
    let dr = (y - oy) / sy - cr as f64;
    let di = (z - oz) / sz - ci as f64;
    let rad = nodule.radius as f64;
    dc * dc + dr * dr + di * di <= rad * rad
}

/// 真值关联模式: 由实际注入的结节生成表格.
///
/// 1. 每个球心落在体数据内的结节生成一个结节候选点和一条标注, 坐标为球心体素中心,
///   直径为 `2 * radius * mean(spacing)`.
/// 2. 另外生成个数取自 `spec.candidates` 的非结节候选点, 每个最多重新采样若干次以避开所有结节球体.
///
/// `spec.nodule_probability`, `spec.annotations` 与 `spec.diameter_mm` 在此模式下不使用.
pub fn build_tables_from_nodules<R: Rng + ?Sized>(
    series_uid: &str,
    geometry: &VolumeGeometry,
    nodules: &[NoduleSpec],
    spec: &TableSpec,
    rng: &mut R,
) -> LunaResult<(Vec<CandidateRow>, Vec<AnnotationRow>)> {
    spec.validate(geometry)?;
    let intervals = spec.intervals(geometry)?;
    let (sx, sy, sz) = geometry.spacing();
    let mean_spacing = (sx + sy + sz) / 3.0;

    let mut candidates = vec![];
    let mut annotations = vec![];
    for nodule in nodules {
        let Some(center) = nodule.center_in(geometry.shape()) else {
            log::debug!(
                "{series_uid}: nodule centered at {:?} is outside the volume",
                nodule.center
            );
            continue;
        };
        let coord = geometry.irc_to_xyz(center);
        candidates.push(CandidateRow {
            series_uid: series_uid.to_string(),
            coord,
            is_nodule: true,
        });
        annotations.push(AnnotationRow {
            series_uid: series_uid.to_string(),
            coord,
            diameter_mm: 2.0 * nodule.radius as f64 * mean_spacing,
        });
    }

    let n = rng.random_range(spec.candidates.0..=spec.candidates.1);
    for _ in 0..n {
        let mut coord = sample_xyz(rng, &intervals);
        let mut attempts = 1;
        let hits = |xyz: Xyz| nodules.iter().any(|nd| inside_nodule(geometry, nd, xyz));
        while attempts < MAX_REJECTIONS && hits(coord) {
            coord = sample_xyz(rng, &intervals);
            attempts += 1;
        }
        candidates.push(CandidateRow {
            series_uid: series_uid.to_string(),
            coord,
            is_nodule: false,
        });
    }

    Ok((candidates, annotations))
}
