//! 物理坐标 (XYZ) 与体素坐标 (IRC) 的相互转换.
//!
//! # 坐标约定
//!
//! 1. 物理坐标 [`Xyz`] 按 `(x, y, z)` 排列, 单位为毫米. 体素间距 `spacing`
//!   与原点 `offset` 也按此顺序存储, 与 MetaImage 头文件一致.
//! 2. 体素坐标 [`Idx3d`] 按 `(index, row, col)` 排列, 分别对应 `(z, y, x)`.
//! 3. `offset` 是体素 `(0, 0, 0)` 中心的物理坐标.
//!
//! XYZ -> IRC 按轴做 `round((coord - offset) / spacing)`, 四舍五入规则为
//! "远离零" ([`f64::round`]). IRC -> XYZ 是精确的代数逆运算, 不做取整.

use super::VolumeGeometry;
use crate::error::{LunaError, LunaResult};
use crate::{Idx3d, Idx3dI, Xyz};

/// 不做越界检查地将物理坐标转换为有符号 IRC 坐标.
///
/// 输入含有 NaN 或无穷时, 对应分量为 `i64::MIN`, 必然被后续越界检查拒绝.
#[inline]
pub fn xyz_to_irc_unchecked((x, y, z): Xyz, offset: Xyz, spacing: Xyz) -> Idx3dI {
    #[inline]
    fn axis(coord: f64, offset: f64, spacing: f64) -> i64 {
        let v = ((coord - offset) / spacing).round();
        if v.is_finite() {
            v as i64
        } else {
            i64::MIN
        }
    }
    (
        axis(z, offset.2, spacing.2),
        axis(y, offset.1, spacing.1),
        axis(x, offset.0, spacing.0),
    )
}

/// 将物理坐标转换为 `geometry` 下的 IRC 坐标.
///
/// 若结果在任一轴上落在 `[0, extent)` 之外, 返回 [`LunaError::OutOfBounds`].
/// 该函数从不做截断处理: 越界坐标通常意味着上游元数据不一致.
pub fn xyz_to_irc(xyz: Xyz, geometry: &VolumeGeometry) -> LunaResult<Idx3d> {
    let irc = xyz_to_irc_unchecked(xyz, geometry.offset(), geometry.spacing());
    checked_irc(irc, geometry.shape()).ok_or(LunaError::OutOfBounds {
        irc,
        shape: geometry.shape(),
    })
}

/// 将 IRC 坐标转换为物理坐标 (体素中心). 不检查越界.
#[inline]
pub fn irc_to_xyz((i, r, c): Idx3d, geometry: &VolumeGeometry) -> Xyz {
    let (ox, oy, oz) = geometry.offset();
    let (sx, sy, sz) = geometry.spacing();
    (
        c as f64 * sx + ox,
        r as f64 * sy + oy,
        i as f64 * sz + oz,
    )
}

/// 有符号 IRC 坐标若落在 `shape` 内, 则转换为无符号索引.
#[inline]
pub(crate) fn checked_irc((i, r, c): Idx3dI, (len_i, len_r, len_c): Idx3d) -> Option<Idx3d> {
    let conv = |v: i64, len: usize| usize::try_from(v).ok().filter(|v| *v < len);
    Some((conv(i, len_i)?, conv(r, len_r)?, conv(c, len_c)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;
    use rstest::rstest;

    fn geometry(shape: Idx3d, spacing: Xyz, offset: Xyz) -> VolumeGeometry {
        VolumeGeometry::new(shape, spacing, offset).unwrap()
    }

    #[test]
    fn test_axis_order() {
        let g = geometry((10, 20, 30), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0));
        // x -> col, y -> row, z -> index.
        assert_eq!(xyz_to_irc((3.0, 2.0, 1.0), &g).unwrap(), (1, 2, 3));
        assert_eq!(irc_to_xyz((1, 2, 3), &g), (3.0, 2.0, 1.0));
    }

    #[test]
    fn test_offset_and_spacing() {
        let g = geometry((64, 64, 64), (0.7, 0.7, 2.5), (-195.5, -195.5, -300.0));
        let irc = xyz_to_irc((-195.5 + 0.7 * 10.0, -195.5 + 0.7 * 20.0, -300.0 + 2.5 * 5.0), &g);
        assert_eq!(irc.unwrap(), (5, 20, 10));
    }

    #[rstest]
    #[case((-0.6, 0.0, 0.0))]
    #[case((0.0, 9.6, 0.0))]
    #[case((0.0, 0.0, 100.0))]
    #[case((f64::NAN, 0.0, 0.0))]
    #[case((0.0, f64::INFINITY, 0.0))]
    fn test_out_of_bounds_is_surfaced(#[case] xyz: Xyz) {
        let g = geometry((10, 10, 10), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0));
        assert!(matches!(
            xyz_to_irc(xyz, &g),
            Err(LunaError::OutOfBounds { shape: (10, 10, 10), .. })
        ));
    }

    /// IRC -> XYZ -> IRC 在体素网格上精确往返.
    #[rstest]
    #[case((8, 9, 10), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0))]
    #[case((5, 17, 3), (0.68, 0.68, 2.5), (-180.3, -170.0, -340.25))]
    #[case((33, 2, 7), (1.3, 0.9, 0.45), (12.0, -7.5, 0.1))]
    fn test_irc_round_trip(#[case] shape: Idx3d, #[case] spacing: Xyz, #[case] offset: Xyz) {
        let g = geometry(shape, spacing, offset);
        for i in 0..shape.0 {
            for r in 0..shape.1 {
                for c in 0..shape.2 {
                    let xyz = irc_to_xyz((i, r, c), &g);
                    assert_eq!(xyz_to_irc(xyz, &g).unwrap(), (i, r, c));
                }
            }
        }
    }

    /// XYZ -> IRC -> XYZ 在每个轴上误差不超过半个体素.
    #[test]
    fn test_xyz_round_trip_within_half_voxel() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let g = geometry((40, 50, 60), (0.8, 1.2, 2.0), (-20.0, 5.0, -100.0));
        let (ox, oy, oz) = g.offset();
        let (sx, sy, sz) = g.spacing();
        for _ in 0..10_000 {
            let p = (
                rng.random_range(ox..ox + (60.0 - 0.5) * sx),
                rng.random_range(oy..oy + (50.0 - 0.5) * sy),
                rng.random_range(oz..oz + (40.0 - 0.5) * sz),
            );
            let q = irc_to_xyz(xyz_to_irc(p, &g).unwrap(), &g);
            assert!((p.0 - q.0).abs() <= sx / 2.0 + 1e-9);
            assert!((p.1 - q.1).abs() <= sy / 2.0 + 1e-9);
            assert!((p.2 - q.2).abs() <= sz / 2.0 + 1e-9);
        }
    }

    #[test]
    fn test_checked_irc() {
        assert_eq!(checked_irc((0, 0, 0), (1, 1, 1)), Some((0, 0, 0)));
        assert_eq!(checked_irc((-1, 0, 0), (1, 1, 1)), None);
        assert_eq!(checked_irc((0, 1, 0), (1, 1, 1)), None);
        assert_eq!(checked_irc((0, 0, i64::MIN), (1, 1, 1)), None);
    }
}
