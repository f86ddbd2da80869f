use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use ndarray::Array3;

use super::{ElementType, MhdHeader};
use crate::error::{LunaError, LunaResult};
use crate::CtVolume;

/// 读取 `header_path` 指向的 MetaImage 体数据.
///
/// 支持 `MET_FLOAT` 与 `MET_SHORT`, 大小端, 以及 zlib 压缩的数据文件.
/// 数据文件路径相对于头文件所在目录.
///
/// # 错误
///
/// 1. 头文件或数据文件不存在时返回 [`LunaError::MissingPath`].
/// 2. 头文件字段非法, 或数据文件长度与 `DimSize` 不符时返回 [`LunaError::MalformedHeader`].
pub fn read_volume<P: AsRef<Path>>(header_path: P) -> LunaResult<CtVolume> {
    let header_path = header_path.as_ref();
    if !header_path.is_file() {
        return Err(LunaError::MissingPath(header_path.to_path_buf()));
    }
    let header = MhdHeader::parse(&fs::read_to_string(header_path)?, header_path)?;
    let malformed = |reason: String| LunaError::MalformedHeader {
        path: header_path.to_path_buf(),
        reason,
    };
    let geometry = header.geometry().map_err(|e| malformed(e.to_string()))?;

    let data_path = header_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&header.data_file);
    if !data_path.is_file() {
        return Err(LunaError::MissingPath(data_path));
    }
    let expected = header
        .byte_len()
        .ok_or_else(|| malformed(format!("DimSize {:?} is too large", header.dim_size)))?;
    let mut bytes = fs::read(&data_path)?;
    if header.compressed {
        // 最多多解压一个字节, 足以发现长度不符.
        let mut buf = vec![];
        ZlibDecoder::new(&bytes[..])
            .take(expected as u64 + 1)
            .read_to_end(&mut buf)?;
        bytes = buf;
    }

    if bytes.len() != expected {
        return Err(malformed(format!(
            "{} holds {} bytes, expected {expected}",
            data_path.display(),
            bytes.len()
        )));
    }

    let len = expected / header.element_type.byte_size();
    let samples = decode(&bytes, header.element_type, header.msb, len)?;
    let data = Array3::from_shape_vec(geometry.shape(), samples)
        .map_err(|e| malformed(e.to_string()))?;
    log::debug!(
        "Loaded {} ({:?}, {})",
        header_path.display(),
        geometry.shape(),
        header.element_type.as_str()
    );
    CtVolume::from_raw(geometry, data)
}

/// 将裸字节解码为 `f32` 样本.
fn decode(bytes: &[u8], ty: ElementType, msb: bool, len: usize) -> LunaResult<Vec<f32>> {
    let mut rdr = Cursor::new(bytes);
    let ans = match ty {
        ElementType::MetFloat => {
            let mut buf = vec![0f32; len];
            if msb {
                rdr.read_f32_into::<BigEndian>(&mut buf)?;
            } else {
                rdr.read_f32_into::<LittleEndian>(&mut buf)?;
            }
            buf
        }
        ElementType::MetShort => {
            let mut buf = vec![0i16; len];
            if msb {
                rdr.read_i16_into::<BigEndian>(&mut buf)?;
            } else {
                rdr.read_i16_into::<LittleEndian>(&mut buf)?;
            }
            buf.into_iter().map(f32::from).collect()
        }
    };
    Ok(ans)
}
