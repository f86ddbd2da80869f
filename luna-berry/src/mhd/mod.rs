//! MetaImage (`.mhd` + `.raw`) 体数据读写.
//!
//! 头文件为 `Key = Value` 文本, 数据文件为无头部的平铺体素数组, 按 `(index, row, col)`
//! 标准布局排列 (`col` 变化最快). 头文件中的向量字段按物理 `(x, y, z)` 顺序书写.

use std::fmt;
use std::path::Path;

use crate::consts::header::*;
use crate::data::{GeometryAttr, VolumeGeometry};
use crate::error::{LunaError, LunaResult};
use crate::{CtVolume, Xyz};

mod reader;
mod writer;

pub use reader::read_volume;
pub use writer::{write_volume, VolumePaths};

/// 体素的存储类型.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementType {
    /// 32 位浮点数 (`MET_FLOAT`).
    MetFloat,

    /// 16 位有符号整数 (`MET_SHORT`).
    MetShort,
}

impl ElementType {
    /// 头文件中的名称.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MetFloat => "MET_FLOAT",
            Self::MetShort => "MET_SHORT",
        }
    }

    /// 单个体素的字节数.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::MetFloat => 4,
            Self::MetShort => 2,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "MET_FLOAT" => Some(Self::MetFloat),
            "MET_SHORT" => Some(Self::MetShort),
            _ => None,
        }
    }
}

/// MetaImage 头文件中本 crate 关心的字段.
#[derive(Clone, Debug, PartialEq)]
pub struct MhdHeader {
    /// `DimSize`, 按 `(x, y, z)` 即 `[col, row, index]` 排列.
    pub dim_size: [usize; 3],

    /// `ElementSpacing` (x, y, z).
    pub spacing: Xyz,

    /// `Offset` (x, y, z).
    pub offset: Xyz,

    /// `ElementType`.
    pub element_type: ElementType,

    /// `BinaryDataByteOrderMSB`.
    pub msb: bool,

    /// `CompressedData` (zlib).
    pub compressed: bool,

    /// `ElementDataFile`, 相对于头文件所在目录.
    pub data_file: String,
}

impl MhdHeader {
    /// 为 `volume` 生成头文件: 小端, 不压缩, `MET_FLOAT`.
    pub fn for_volume(volume: &CtVolume, data_file: impl Into<String>) -> Self {
        Self {
            dim_size: volume.geometry().dim_size(),
            spacing: volume.spacing(),
            offset: volume.offset(),
            element_type: ElementType::MetFloat,
            msb: false,
            compressed: false,
            data_file: data_file.into(),
        }
    }

    /// 体素个数. 溢出 `usize` 时返回 `None`.
    #[inline]
    pub fn voxel_count(&self) -> Option<usize> {
        self.dim_size.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
    }

    /// 数据文件 (解压后) 的字节数. 溢出 `usize` 时返回 `None`.
    #[inline]
    pub fn byte_len(&self) -> Option<usize> {
        self.voxel_count()?.checked_mul(self.element_type.byte_size())
    }

    /// 由头文件描述的几何信息.
    pub fn geometry(&self) -> LunaResult<VolumeGeometry> {
        let [c, r, i] = self.dim_size;
        VolumeGeometry::new((i, r, c), self.spacing, self.offset)
    }

    /// 解析头文件文本. `path` 仅用于报错.
    ///
    /// 必须包含 `NDims = 3`, `DimSize`, `ElementType` 和 `ElementDataFile`;
    /// 缺省 `ElementSpacing` 为 `1 1 1`, 缺省 `Offset` 为 `0 0 0`.
    pub fn parse(text: &str, path: &Path) -> LunaResult<Self> {
        let malformed = |reason: String| LunaError::MalformedHeader {
            path: path.to_path_buf(),
            reason,
        };

        let mut ndims = None;
        let mut dim_size = None;
        let mut spacing = (1.0, 1.0, 1.0);
        let mut offset = (0.0, 0.0, 0.0);
        let mut element_type = None;
        let mut msb = false;
        let mut compressed = false;
        let mut data_file = None;

        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(malformed(format!("line {}: expected `Key = Value`", n + 1)));
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "NDims" => {
                    let n = value
                        .parse::<usize>()
                        .map_err(|e| malformed(format!("NDims: {e}")))?;
                    ndims = Some(n);
                }
                "DimSize" => {
                    let xyz = parse_triple::<usize>(value)
                        .map_err(|e| malformed(format!("DimSize: {e}")))?;
                    dim_size = Some(xyz);
                }
                "ElementSpacing" | "ElementSize" => {
                    let [x, y, z] = parse_triple::<f64>(value)
                        .map_err(|e| malformed(format!("{key}: {e}")))?;
                    spacing = (x, y, z);
                }
                "Offset" | "Origin" | "Position" => {
                    let [x, y, z] = parse_triple::<f64>(value)
                        .map_err(|e| malformed(format!("{key}: {e}")))?;
                    offset = (x, y, z);
                }
                "ElementType" => {
                    let ty = ElementType::parse(value)
                        .ok_or_else(|| malformed(format!("unsupported ElementType `{value}`")))?;
                    element_type = Some(ty);
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                    msb = parse_bool(value)
                        .ok_or_else(|| malformed(format!("{key}: `{value}`")))?;
                }
                "CompressedData" => {
                    compressed = parse_bool(value)
                        .ok_or_else(|| malformed(format!("{key}: `{value}`")))?;
                }
                "ElementDataFile" => data_file = Some(value.to_string()),
                // 其余字段 (TransformMatrix 等) 只写不读.
                _ => {}
            }
        }

        match ndims {
            Some(3) => {}
            Some(n) => return Err(malformed(format!("NDims = {n}, only 3 is supported"))),
            None => return Err(malformed("missing NDims".to_string())),
        }
        let dim_size = dim_size.ok_or_else(|| malformed("missing DimSize".to_string()))?;
        let element_type =
            element_type.ok_or_else(|| malformed("missing ElementType".to_string()))?;
        let data_file =
            data_file.ok_or_else(|| malformed("missing ElementDataFile".to_string()))?;
        if data_file == "LOCAL" || data_file.starts_with("LIST") || data_file.contains('%') {
            return Err(malformed(format!("unsupported ElementDataFile `{data_file}`")));
        }

        let header = Self {
            dim_size,
            spacing,
            offset,
            element_type,
            msb,
            compressed,
            data_file,
        };
        if header.byte_len().is_none() {
            return Err(malformed(format!("DimSize {dim_size:?} is too large")));
        }
        Ok(header)
    }
}

/// 解析空格分隔的三元组.
fn parse_triple<T: std::str::FromStr>(value: &str) -> Result<[T; 3], String>
where
    T::Err: fmt::Display,
{
    let parts: Vec<&str> = value.split_whitespace().collect();
    let [a, b, c] = parts.as_slice() else {
        return Err(format!("expected 3 values, got `{value}`"));
    };
    let p = |s: &str| s.parse::<T>().map_err(|e| format!("`{s}`: {e}"));
    Ok([p(*a)?, p(*b)?, p(*c)?])
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "True" | "true" | "1" => Some(true),
        "False" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn mhd_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

/// 按固定字段顺序输出头文件文本.
impl fmt::Display for MhdHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ox, oy, oz) = self.offset;
        let (sx, sy, sz) = self.spacing;
        let [dx, dy, dz] = self.dim_size;
        writeln!(f, "ObjectType = {OBJECT_TYPE}")?;
        writeln!(f, "NDims = 3")?;
        writeln!(f, "BinaryData = True")?;
        writeln!(f, "BinaryDataByteOrderMSB = {}", mhd_bool(self.msb))?;
        writeln!(f, "CompressedData = {}", mhd_bool(self.compressed))?;
        writeln!(f, "TransformMatrix = {TRANSFORM_IDENTITY}")?;
        writeln!(f, "Offset = {ox} {oy} {oz}")?;
        writeln!(f, "CenterOfRotation = {CENTER_OF_ROTATION}")?;
        writeln!(f, "AnatomicalOrientation = {ANATOMICAL_ORIENTATION}")?;
        writeln!(f, "ElementSpacing = {sx} {sy} {sz}")?;
        writeln!(f, "DimSize = {dx} {dy} {dz}")?;
        writeln!(f, "ElementType = {}", self.element_type.as_str())?;
        writeln!(f, "ElementDataFile = {}", self.data_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_header_text_field_order() {
        let g = VolumeGeometry::new((3, 4, 5), (0.5, 0.75, 2.0), (-10.0, 0.0, 3.5)).unwrap();
        let v = CtVolume::from_raw(g, Array3::zeros((3, 4, 5))).unwrap();
        let text = MhdHeader::for_volume(&v, "scan_0_0.raw").to_string();
        let expected = "\
ObjectType = Image
NDims = 3
BinaryData = True
BinaryDataByteOrderMSB = False
CompressedData = False
TransformMatrix = 1 0 0 0 1 0 0 0 1
Offset = -10 0 3.5
CenterOfRotation = 0 0 0
AnatomicalOrientation = RAI
ElementSpacing = 0.5 0.75 2
DimSize = 5 4 3
ElementType = MET_FLOAT
ElementDataFile = scan_0_0.raw
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_parse_own_output() {
        let g = VolumeGeometry::new((7, 8, 9), (1.25, 1.25, 2.5), (-100.5, 20.0, 0.0)).unwrap();
        let v = CtVolume::from_raw(g, Array3::zeros((7, 8, 9))).unwrap();
        let header = MhdHeader::for_volume(&v, "a.raw");
        let parsed = MhdHeader::parse(&header.to_string(), Path::new("a.mhd")).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.geometry().unwrap(), g);
        assert_eq!(parsed.voxel_count(), Some(7 * 8 * 9));
        assert_eq!(parsed.byte_len(), Some(7 * 8 * 9 * 4));
    }

    #[test]
    fn test_parse_errors() {
        let p = Path::new("bad.mhd");
        let cases = [
            "NDims = 2\nDimSize = 1 1\nElementType = MET_FLOAT\nElementDataFile = a.raw",
            "NDims = 3\nElementType = MET_FLOAT\nElementDataFile = a.raw",
            "NDims = 3\nDimSize = 1 1 x\nElementType = MET_FLOAT\nElementDataFile = a.raw",
            "NDims = 3\nDimSize = 1 1 1\nElementType = MET_UCHAR\nElementDataFile = a.raw",
            "NDims = 3\nDimSize = 1 1 1\nElementType = MET_FLOAT\nElementDataFile = LOCAL",
            "NDims = 3\nDimSize = 1 1 1\nElementType = MET_FLOAT",
            "NDims = 3\nDimSize = 4294967296 4294967296 2\n\
             ElementType = MET_FLOAT\nElementDataFile = a.raw",
            "NDims = 3\nDimSize = 18446744073709551615 1 1\n\
             ElementType = MET_SHORT\nElementDataFile = a.raw",
            "garbage",
        ];
        for text in cases {
            assert!(
                matches!(MhdHeader::parse(text, p), Err(LunaError::MalformedHeader { .. })),
                "{text}"
            );
        }
    }
}
