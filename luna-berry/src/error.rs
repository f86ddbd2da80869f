//! 运行时错误.

use crate::Idx3d;
use std::path::PathBuf;
use thiserror::Error;

/// 本 crate 统一使用的 `Result` 类型.
pub type LunaResult<T> = Result<T, LunaError>;

/// 合成、读写与切片提取的运行时错误.
#[derive(Error, Debug)]
pub enum LunaError {
    /// 体数据某一维长度为 0, 或体素间距非正/非有限.
    #[error("invalid volume dimension: {0}")]
    InvalidDimension(String),

    /// 取值区间 (计数, 直径, 边距, 概率, 标准差等) 非法或为空.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// 物理坐标转换后的 IRC 坐标落在体数据之外.
    ///
    /// `irc` 为未经检查的 (index, row, col) 结果.
    #[error("coordinate {irc:?} is out of bounds for volume shape {shape:?}")]
    OutOfBounds {
        /// 转换得到的有符号 IRC 坐标.
        irc: (i64, i64, i64),
        /// 体数据形状 (index, row, col).
        shape: Idx3d,
    },

    /// 切片索引越界. `axis` 为 0 (index), 1 (row) 或 2 (col).
    #[error("slice index {index} on axis {axis} is out of range (len {len})")]
    IndexOutOfRange {
        /// 轴编号.
        axis: usize,
        /// 请求的索引.
        index: usize,
        /// 该轴长度.
        len: usize,
    },

    /// 引用的数据集根目录, CSV 或 `subset*` 文件不存在.
    #[error("missing path: {}", .0.display())]
    MissingPath(PathBuf),

    /// MetaImage 头文件格式错误.
    #[error("malformed header {}: {reason}", .path.display())]
    MalformedHeader {
        /// 头文件路径.
        path: PathBuf,
        /// 原因.
        reason: String,
    },

    /// CSV 表格的某一行无法解析. `line` 从 1 开始计数.
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow {
        /// 行号.
        line: usize,
        /// 原因.
        reason: String,
    },

    /// 底层文件系统错误.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 图像编码错误.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl LunaError {
    /// 构造 [`LunaError::InvalidRange`] 的便捷方法.
    #[inline]
    pub(crate) fn range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    /// 构造 [`LunaError::InvalidDimension`] 的便捷方法.
    #[inline]
    pub(crate) fn dimension(msg: impl Into<String>) -> Self {
        Self::InvalidDimension(msg.into())
    }
}
