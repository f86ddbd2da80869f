//! 数据集操作.
//!
//! 数据集目录结构与 LUNA16 一致:
//!
//! ```text
//! <root>/subset<i>/scan_<i>_<j>.mhd
//! <root>/subset<i>/scan_<i>_<j>.raw
//! <root>/candidates.csv
//! <root>/annotations.csv
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::header::HEADER_EXT;
use crate::error::{LunaError, LunaResult};

pub mod synth;
pub mod table;

/// 候选点表格文件名.
pub const CANDIDATES_CSV: &str = "candidates.csv";

/// 标注表格文件名.
pub const ANNOTATIONS_CSV: &str = "annotations.csv";

/// 子集目录名前缀.
pub const SUBSET_PREFIX: &str = "subset";

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 第 `subset` 个子集中第 `index` 个扫描的序列标识符.
#[inline]
pub fn series_uid(subset: usize, index: usize) -> String {
    format!("scan_{subset}_{index}")
}

/// 以 `root` 为根的 LUNA 风格数据集目录.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    /// 直接初始化. 不检查目录是否存在.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// 数据集根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/subset<subset>`.
    #[inline]
    pub fn subset_dir(&self, subset: usize) -> PathBuf {
        self.root.join(format!("{SUBSET_PREFIX}{subset}"))
    }

    /// `<root>/candidates.csv`.
    #[inline]
    pub fn candidates_csv(&self) -> PathBuf {
        self.root.join(CANDIDATES_CSV)
    }

    /// `<root>/annotations.csv`.
    #[inline]
    pub fn annotations_csv(&self) -> PathBuf {
        self.root.join(ANNOTATIONS_CSV)
    }

    /// 检查根目录, 两个表格文件, 以及至少一个 `subset*/*.mhd` 是否存在.
    ///
    /// 依次检查, 第一个缺失项以 [`LunaError::MissingPath`] 返回.
    pub fn validate(&self) -> LunaResult<()> {
        for p in [self.root.clone(), self.candidates_csv(), self.annotations_csv()] {
            if !p.exists() {
                return Err(LunaError::MissingPath(p));
            }
        }
        if self.headers()?.is_empty() {
            return Err(LunaError::MissingPath(
                self.root.join(format!("{SUBSET_PREFIX}*/*.{HEADER_EXT}")),
            ));
        }
        log::debug!("Dataset layout at {} validated", self.root.display());
        Ok(())
    }

    /// 所有 `subset*` 目录, 按名称排序.
    pub fn subset_dirs(&self) -> LunaResult<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(LunaError::MissingPath(self.root.clone()));
        }
        let mut ans = vec![];
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_subset = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(SUBSET_PREFIX));
            if is_subset && entry.file_type()?.is_dir() {
                ans.push(entry.path());
            }
        }
        ans.sort();
        Ok(ans)
    }

    /// 所有 `subset*/*.mhd` 头文件, 按路径排序.
    pub fn headers(&self) -> LunaResult<Vec<PathBuf>> {
        let mut ans = vec![];
        for dir in self.subset_dirs()? {
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() && path.extension().is_some_and(|e| e == HEADER_EXT) {
                    ans.push(path);
                }
            }
        }
        ans.sort();
        Ok(ans)
    }

    /// 在所有子集中查找 `<uid>.mhd`. 找不到时返回 [`LunaError::MissingPath`].
    pub fn find_series(&self, uid: &str) -> LunaResult<PathBuf> {
        let name = format!("{uid}.{HEADER_EXT}");
        for dir in self.subset_dirs()? {
            let p = dir.join(&name);
            if p.is_file() {
                return Ok(p);
            }
        }
        Err(LunaError::MissingPath(
            self.root.join(format!("{SUBSET_PREFIX}*")).join(name),
        ))
    }
}

/// 统计 `root` 目录下 (递归) 所有文件的总字节数.
pub fn dataset_size<P: AsRef<Path>>(root: P) -> LunaResult<u64> {
    let mut total = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            total += dataset_size(entry.path())?;
        } else if ty.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
