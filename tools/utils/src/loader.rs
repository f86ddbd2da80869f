//! 对 `luna-berry::dataset` 的更一层封装. 提供数据集根目录的解析.

use luna_berry::dataset::{self, DatasetLayout};
use std::env;
use std::path::PathBuf;

/// 指定数据集根目录的环境变量.
pub const ROOT_ENV: &str = "LUNA_ROOT";

/// 获取数据集根目录.
///
/// 1. 若 `explicit` 非空, 则返回其值;
/// 2. 否则, 若环境变量 `$LUNA_ROOT` 非空, 则返回其值;
/// 3. 否则, 返回 `$HOME/dataset/luna`;
/// 4. 无法确定用户主目录时返回相对路径 `luna`.
pub fn root_from_env_or_home(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(p) = explicit {
        return p;
    }
    match env::var(ROOT_ENV) {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => dataset::home_dataset_dir_with(["luna"]).unwrap_or_else(|| PathBuf::from("luna")),
    }
}

/// 以 [`root_from_env_or_home`] 的结果为根的数据集目录.
#[inline]
pub fn layout_from_env_or_home(explicit: Option<PathBuf>) -> DatasetLayout {
    DatasetLayout::new(root_from_env_or_home(explicit))
}
