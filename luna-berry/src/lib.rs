#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 生成 LUNA 格式的合成肺部 CT 数据集 (MetaImage 体数据 + 候选/标注表格),
//! 并提供定位、切片与可视化候选结节所需的坐标变换和视图提取.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 生成与读取的数据按照 LUNA16 数据集的组织方式
//!   (`subset*/*.mhd` + `candidates.csv` + `annotations.csv`), 但只保证能读回自身
//!   生成的 MetaImage 文件, 不对其它来源的数据做完整适配.
//! 2. 所有随机过程都由调用方传入的 RNG 驱动. 给定种子, 合成结果完全确定.
//!
//! # 功能
//!
//! ### 合成体数据与结节 ✅
//!
//! 背景噪声体数据, 以及带有逐体素独立随机增量的球形结节.
//!
//! 实现位于 `luna-berry/src/data/mod.rs`, `luna-berry/src/data/nodule.rs`.
//!
//! ### MetaImage 读写 ✅
//!
//! `.mhd` 头文件 + `.raw` 小端 `f32` 数据文件. 写出为 "全有或全无".
//! 读取支持 zlib 压缩和 `MET_SHORT`.
//!
//! 实现位于 `luna-berry/src/mhd`.
//!
//! ### 候选/标注表格 ✅
//!
//! 与体数据物理范围一致的候选点和标注行. 支持 "真值关联" 与 "独立采样" 两种模式.
//!
//! 实现位于 `luna-berry/src/dataset/table.rs`.
//!
//! ### 数据集合成 ✅
//!
//! 多个 subset/扫描的批量合成, 单个扫描失败不影响其它扫描.
//!
//! 实现位于 `luna-berry/src/dataset/synth.rs`.
//!
//! ### 坐标变换与视图提取 ✅
//!
//! 1. 物理坐标 (XYZ) 与体素坐标 (IRC) 的互相转换.
//! 2. 水平 (axial), 冠状 (coronal), 矢状 (sagittal) 切片, 以及额外的水平切片.
//! 3. 候选结节周围的子体数据裁剪.
//! 4. 多视图拼图输出为单张 PNG.
//!
//! 实现位于 `luna-berry/src/data/coord.rs`, `luna-berry/src/data/slice`.

/// 二维索引 (row, col), 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维体素索引 (index, row, col), 即 IRC 坐标.
pub type Idx3d = (usize, usize, usize);

/// 有符号三维体素索引 (index, row, col). 用于可能落在体数据之外的坐标.
pub type Idx3dI = (i64, i64, i64);

/// 物理坐标 (x, y, z), 以毫米为单位.
pub type Xyz = (f64, f64, f64);

/// 3D CT 体数据基础数据结构.
mod data;

pub use data::{
    coord, nodule, CandidateViews, CtVolume, CtWindow, Gaussian, GeometryAttr, ImgWriteVis,
    Montage, OwnedScanSlice, ScanSlice, VolumeGeometry,
};

pub mod consts;

pub mod dataset;
pub mod error;
pub mod mhd;
pub mod prelude;

pub use error::{LunaError, LunaResult};
