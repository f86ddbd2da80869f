//! 合成 LUNA 风格数据集.
//!
//! 每个扫描独立合成: 背景噪声, 球形结节, MetaImage 文件, 以及对应的候选/标注行.
//! 单个扫描失败只会记录在 [`SynthReport`] 中, 不影响其它扫描. 两个 CSV 表格在所有扫描
//! 结束后由调用线程一次性写出.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use itertools::iproduct;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::table::{
    build_tables, build_tables_from_nodules, write_table, AnnotationRow, CandidateRow, TableSpec,
};
use super::{home_dataset_dir_with, series_uid, DatasetLayout};
use crate::data::nodule::NoduleParams;
use crate::data::{CtVolume, Gaussian, GeometryAttr, VolumeGeometry};
use crate::error::{LunaError, LunaResult};
use crate::mhd::{write_volume, VolumePaths};
use crate::{Idx3d, Xyz};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 候选/标注表格与注入结节的关系.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TableMode {
    /// 每个注入的结节对应一个结节候选点和一条标注, 另加避开结节的非结节候选点.
    #[default]
    GroundTruth,

    /// 表格与体数据内容无关, 仅保证坐标落在体数据范围内.
    Decorrelated,
}

/// 数据集合成配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynthConfig {
    /// 数据集根目录.
    pub root: PathBuf,

    /// 子集个数.
    pub subsets: usize,

    /// 每个子集的扫描个数.
    pub scans_per_subset: usize,

    /// 体数据形状 (index, row, col).
    pub shape: Idx3d,

    /// 体素间距 (x, y, z).
    pub spacing: Xyz,

    /// 原点 (x, y, z).
    pub offset: Xyz,

    /// 背景噪声.
    pub noise: Gaussian,

    /// 结节采样参数.
    pub nodules: NoduleParams,

    /// 表格采样参数.
    pub tables: TableSpec,

    /// 表格生成模式.
    pub mode: TableMode,

    /// 基础随机种子.
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            root: home_dataset_dir_with(["luna"]).unwrap_or_else(|| PathBuf::from("luna")),
            subsets: 2,
            scans_per_subset: 10,
            shape: (128, 128, 128),
            spacing: (1.0, 1.0, 1.0),
            offset: (0.0, 0.0, 0.0),
            noise: Gaussian::new(0.0, 100.0),
            nodules: NoduleParams::default(),
            tables: TableSpec::default(),
            mode: TableMode::default(),
            seed: 42,
        }
    }
}

impl SynthConfig {
    /// 检查所有参数, 返回体数据几何信息. 不访问文件系统.
    pub fn validate(&self) -> LunaResult<VolumeGeometry> {
        let geometry = VolumeGeometry::new(self.shape, self.spacing, self.offset)?;
        self.noise.to_normal()?;
        self.nodules.validate(self.shape)?;
        self.tables.validate(&geometry)?;
        Ok(geometry)
    }

    /// 扫描总数.
    #[inline]
    pub fn total_scans(&self) -> usize {
        self.subsets * self.scans_per_subset
    }
}

/// 单个成功合成的扫描.
#[derive(Clone, Debug)]
pub struct ScanOutcome {
    /// 序列标识符.
    pub series_uid: String,

    /// 子集编号.
    pub subset: usize,

    /// 子集内编号.
    pub index: usize,

    /// 写出的文件.
    pub paths: VolumePaths,

    /// 注入的结节个数.
    pub nodules: usize,

    /// 写出的字节数.
    pub bytes: u64,
}

/// 单个失败的扫描.
#[derive(Debug)]
pub struct ScanFailure {
    /// 序列标识符.
    pub series_uid: String,

    /// 失败原因.
    pub error: LunaError,
}

/// 一次合成的汇总.
#[derive(Debug, Default)]
pub struct SynthReport {
    /// 成功的扫描, 按 (子集, 编号) 顺序.
    pub scans: Vec<ScanOutcome>,

    /// 失败的扫描, 按 (子集, 编号) 顺序.
    pub failures: Vec<ScanFailure>,

    /// 候选点行数.
    pub candidates: usize,

    /// 其中结节候选点的行数.
    pub positives: usize,

    /// 标注行数.
    pub annotations: usize,

    /// 写出的总字节数 (体数据与表格).
    pub bytes: u64,

    /// 总耗时.
    pub elapsed: Duration,
}

impl SynthReport {
    /// 是否所有扫描都成功?
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// 写出的总字节数, 以 MB 为单位.
    #[inline]
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// 一个扫描的全部产物: 结果摘要, 候选点行, 标注行.
pub type ScanProduct = (ScanOutcome, Vec<CandidateRow>, Vec<AnnotationRow>);

/// 数据集合成器. 构造时即完成全部参数检查.
#[derive(Clone, Debug)]
pub struct DatasetSynthesizer {
    config: SynthConfig,
    geometry: VolumeGeometry,
    layout: DatasetLayout,
}

impl DatasetSynthesizer {
    /// 检查配置并创建合成器. 参数非法时返回 [`LunaError::InvalidDimension`]
    /// 或 [`LunaError::InvalidRange`], 此时不会触碰文件系统.
    pub fn new(config: SynthConfig) -> LunaResult<Self> {
        let geometry = config.validate()?;
        let layout = DatasetLayout::new(&config.root);
        Ok(Self {
            config,
            geometry,
            layout,
        })
    }

    /// 合成配置.
    #[inline]
    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    /// 输出目录结构.
    #[inline]
    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// 体数据几何信息.
    #[inline]
    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// 扫描 `(subset, index)` 的随机种子. 与合成顺序和线程数无关.
    pub fn scan_seed(&self, subset: usize, index: usize) -> u64 {
        // splitmix64 式混合.
        let mut z = self.config.seed
            ^ (subset as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (index as u64).wrapping_add(1).wrapping_mul(0xD1B5_4A32_D192_ED03);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// 合成单个扫描: 生成体数据与结节, 采样表格行, 写出 MetaImage 文件.
    ///
    /// 表格行在写文件之前生成, 因此失败的扫描不会留下任何文件, 也不会产生任何行.
    pub fn synthesize_scan(&self, subset: usize, index: usize) -> LunaResult<ScanProduct> {
        let cfg = &self.config;
        let uid = series_uid(subset, index);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.scan_seed(subset, index));

        let mut volume = CtVolume::create(self.geometry, cfg.noise, &mut rng)?;
        let nodules = cfg.nodules.sample(volume.shape(), &mut rng)?;
        for n in &nodules {
            volume.inject_nodule(n, &mut rng)?;
        }

        let (candidates, annotations) = match cfg.mode {
            TableMode::GroundTruth => {
                build_tables_from_nodules(&uid, &self.geometry, &nodules, &cfg.tables, &mut rng)?
            }
            TableMode::Decorrelated => build_tables(&uid, &self.geometry, &cfg.tables, &mut rng)?,
        };

        let paths = write_volume(&volume, &uid, self.layout.subset_dir(subset))?;
        let bytes = paths.byte_size().unwrap_or_else(|e| {
            log::warn!("{uid}: cannot stat written files: {e}");
            0
        });
        log::debug!(
            "{uid}: {} nodules, {} candidates, {} annotations",
            nodules.len(),
            candidates.len(),
            annotations.len()
        );

        let outcome = ScanOutcome {
            series_uid: uid,
            subset,
            index,
            paths,
            nodules: nodules.len(),
            bytes,
        };
        Ok((outcome, candidates, annotations))
    }

    /// 合成全部扫描并写出两个表格.
    ///
    /// 单个扫描的失败记录在返回的 [`SynthReport`] 中. 只有根目录或表格无法写出时才返回 `Err`.
    pub fn run(&self) -> LunaResult<SynthReport> {
        let start = Instant::now();
        let cfg = &self.config;
        fs::create_dir_all(self.layout.root())?;
        log::info!(
            "Synthesizing {} scans ({} subsets x {}) of shape {:?} into {}",
            cfg.total_scans(),
            cfg.subsets,
            cfg.scans_per_subset,
            cfg.shape,
            self.layout.root().display()
        );

        let jobs: Vec<(usize, usize)> =
            iproduct!(0..cfg.subsets, 0..cfg.scans_per_subset).collect();
        let job = |(subset, index): (usize, usize)| {
            (subset, index, self.synthesize_scan(subset, index))
        };

        #[cfg(feature = "rayon")]
        let results: Vec<_> = jobs.into_par_iter().map(job).collect();
        #[cfg(not(feature = "rayon"))]
        let results: Vec<_> = jobs.into_iter().map(job).collect();

        let mut report = SynthReport::default();
        let mut candidates = vec![];
        let mut annotations = vec![];
        for (subset, index, result) in results {
            match result {
                Ok((outcome, c, a)) => {
                    report.bytes += outcome.bytes;
                    report.scans.push(outcome);
                    candidates.extend(c);
                    annotations.extend(a);
                }
                Err(error) => {
                    let uid = series_uid(subset, index);
                    log::warn!("{uid}: {error}");
                    report.failures.push(ScanFailure {
                        series_uid: uid,
                        error,
                    });
                }
            }
        }

        report.candidates = candidates.len();
        report.positives = candidates.iter().filter(|c| c.is_nodule).count();
        report.annotations = annotations.len();

        write_table(self.layout.candidates_csv(), &candidates)?;
        write_table(self.layout.annotations_csv(), &annotations)?;
        for p in [self.layout.candidates_csv(), self.layout.annotations_csv()] {
            report.bytes += fs::metadata(p)?.len();
        }

        report.elapsed = start.elapsed();
        log::info!(
            "Done: {} scans written, {} failed, {} candidates, {} annotations",
            report.scans.len(),
            report.failures.len(),
            report.candidates,
            report.annotations
        );
        Ok(report)
    }
}
