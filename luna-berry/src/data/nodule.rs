//! 球形结节的采样与注入.
//!
//! 结节内部的每个体素都独立地叠加一个正态分布增量, 因此注入后得到的是
//! "内部有纹理" 的粗糙球体, 而不是均匀填充的几何球.

use std::ops::Range;

use itertools::iproduct;
use rand::Rng;
use rand_distr::Distribution;

use super::{coord::checked_irc, CtVolume, Gaussian, GeometryAttr};
use crate::error::{LunaError, LunaResult};
use crate::{Idx3d, Idx3dI};

/// 一个待注入的球形结节.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoduleSpec {
    /// 球心 (index, row, col). 允许落在体数据之外.
    pub center: Idx3dI,

    /// 半径, 以体素为单位. 必须为正.
    pub radius: u32,

    /// 球内每个体素的强度增量分布.
    pub boost: Gaussian,
}

impl NoduleSpec {
    /// 直接初始化.
    #[inline]
    pub const fn new(center: Idx3dI, radius: u32, boost: Gaussian) -> Self {
        Self {
            center,
            radius,
            boost,
        }
    }

    /// 判断 `pos` 是否在球内 (`dx² + dy² + dz² <= r²`). 任意坐标都不会溢出.
    #[inline]
    pub fn contains(&self, (i, r, c): Idx3dI) -> bool {
        let (ci, cr, cc) = self.center;
        let sq = |a: i64, b: i64| {
            let d = (a as i128 - b as i128).unsigned_abs();
            d.checked_mul(d)
        };
        let rad = self.radius as u128;
        sq(i, ci)
            .zip(sq(r, cr))
            .zip(sq(c, cc))
            .and_then(|((a, b), c)| a.checked_add(b)?.checked_add(c))
            .is_some_and(|d2| d2 <= rad * rad)
    }

    /// 球心的无符号索引. 球心越界时返回 `None`.
    #[inline]
    pub fn center_in(&self, shape: Idx3d) -> Option<Idx3d> {
        checked_irc(self.center, shape)
    }

    /// 形状为 `shape` 的体数据中落在球内的所有体素, 按 (index, row, col) 字典序.
    ///
    /// 只遍历球的外接立方体与体数据的交集.
    pub fn voxels_in(&self, shape: Idx3d) -> impl Iterator<Item = Idx3d> {
        let nodule = *self;
        let (ci, cr, cc) = self.center;
        let (i, r, c) = shape;
        iproduct!(self.span(ci, i), self.span(cr, r), self.span(cc, c))
            .filter(move |&(i, r, c)| nodule.contains((i as i64, r as i64, c as i64)))
    }

    /// 某一轴上 `[center - radius, center + radius]` 与 `[0, len)` 的交集.
    fn span(&self, center: i64, len: usize) -> Range<usize> {
        let (center, rad) = (center as i128, self.radius as i128);
        let lo = (center - rad).max(0);
        let hi = (center + rad + 1).min(len as i128);
        if lo < hi {
            lo as usize..hi as usize
        } else {
            0..0
        }
    }
}

/// 单个扫描的结节采样参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoduleParams {
    /// 结节个数 (闭区间).
    pub count: (u32, u32),

    /// 半径 (闭区间), 以体素为单位.
    pub radius: (u32, u32),

    /// 球心距离体数据各表面的最小体素数.
    pub margin: usize,

    /// 强度增量分布.
    pub boost: Gaussian,
}

impl Default for NoduleParams {
    fn default() -> Self {
        Self {
            count: (0, 4),
            radius: (5, 11),
            margin: 25,
            boost: Gaussian::new(300.0, 100.0),
        }
    }
}

impl NoduleParams {
    /// 检查参数能否用于形状为 `shape` 的体数据.
    pub fn validate(&self, shape: Idx3d) -> LunaResult<()> {
        let (c0, c1) = self.count;
        if c0 > c1 {
            return Err(LunaError::range(format!("nodule count {c0} > {c1}")));
        }
        let (r0, r1) = self.radius;
        if r0 == 0 || r0 > r1 {
            return Err(LunaError::range(format!(
                "nodule radius range ({r0}, {r1}) must be positive and ordered"
            )));
        }
        let (i, r, c) = shape;
        if c1 > 0 && [i, r, c].iter().any(|len| 2 * self.margin >= *len) {
            return Err(LunaError::range(format!(
                "nodule margin {} leaves no room in shape {shape:?}",
                self.margin
            )));
        }
        self.boost.to_normal().map(|_| ())
    }

    /// 为形状为 `shape` 的体数据采样一组结节.
    ///
    /// 每个球心在各轴上均匀取自 `[margin, len - margin)`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        shape: Idx3d,
        rng: &mut R,
    ) -> LunaResult<Vec<NoduleSpec>> {
        self.validate(shape)?;
        let n = rng.random_range(self.count.0..=self.count.1);
        let m = self.margin;
        let (i, r, c) = shape;
        let ans = (0..n)
            .map(|_| {
                let center = (
                    rng.random_range(m..i - m) as i64,
                    rng.random_range(m..r - m) as i64,
                    rng.random_range(m..c - m) as i64,
                );
                let radius = rng.random_range(self.radius.0..=self.radius.1);
                NoduleSpec::new(center, radius, self.boost)
            })
            .collect();
        Ok(ans)
    }
}

/// 结节注入实现块
impl CtVolume {
    /// 将 `nodule` 注入体数据.
    ///
    /// 球内每个体素独立叠加一个来自 `nodule.boost` 的样本. 落在体数据之外的体素被跳过
    /// (截断, 不回绕也不报错). 一次调用中每个体素至多被修改一次; 多个结节重叠时增量累加.
    ///
    /// 返回实际被修改的体素个数.
    pub fn inject_nodule<R: Rng + ?Sized>(
        &mut self,
        nodule: &NoduleSpec,
        rng: &mut R,
    ) -> LunaResult<usize> {
        if nodule.radius == 0 {
            return Err(LunaError::range("nodule radius must be positive"));
        }
        let normal = nodule.boost.to_normal()?;
        let mut touched = 0usize;
        for pos in nodule.voxels_in(self.shape()) {
            self[pos] += normal.sample(rng);
            touched += 1;
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VolumeGeometry;
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use rstest::rstest;

    fn zeros(shape: Idx3d) -> CtVolume {
        let g = VolumeGeometry::new(shape, (1.0, 1.0, 1.0), (0.0, 0.0, 0.0)).unwrap();
        CtVolume::from_raw(g, Array3::zeros(shape)).unwrap()
    }

    /// 整数球内的格点个数.
    fn lattice_ball(radius: i64) -> usize {
        iproduct!(-radius..=radius, -radius..=radius, -radius..=radius)
            .filter(|&(a, b, c)| a * a + b * b + c * c <= radius * radius)
            .count()
    }

    #[test]
    fn test_inject_counts_inner_sphere() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let mut v = zeros((32, 32, 32));
        let n = NoduleSpec::new((16, 16, 16), 5, Gaussian::new(300.0, 100.0));
        let touched = v.inject_nodule(&n, &mut rng).unwrap();
        assert_eq!(touched, lattice_ball(5));
        assert_eq!(v.data().iter().filter(|x| **x != 0.0).count(), touched);
    }

    /// 纹理: 球内强度不是常数.
    #[test]
    fn test_inject_is_textured() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let mut v = zeros((16, 16, 16));
        let n = NoduleSpec::new((8, 8, 8), 3, Gaussian::new(300.0, 100.0));
        v.inject_nodule(&n, &mut rng).unwrap();
        let inside: Vec<f32> = v.data().iter().copied().filter(|x| *x != 0.0).collect();
        let min = inside.iter().copied().fold(f32::INFINITY, f32::min);
        let max = inside.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(max - min > 1.0);
    }

    /// 球外体素与体数据之外的体素永远不会被修改.
    #[rstest]
    #[case((0, 0, 0), 4)]
    #[case((-3, 5, 5), 5)]
    #[case((9, 9, 9), 6)]
    #[case((12, -2, 4), 3)]
    #[case((40, 40, 40), 7)]
    #[case((-20, 3, 3), 2)]
    fn test_inject_clips_at_boundary(#[case] center: Idx3dI, #[case] radius: u32) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let mut v = zeros((10, 10, 10));
        let n = NoduleSpec::new(center, radius, Gaussian::new(300.0, 1.0));
        let touched = v.inject_nodule(&n, &mut rng).unwrap();

        let mut changed = 0;
        for ((i, r, c), x) in v.data().indexed_iter() {
            let inside = n.contains((i as i64, r as i64, c as i64));
            if *x != 0.0 {
                assert!(inside, "voxel ({i}, {r}, {c}) outside the sphere was modified");
                changed += 1;
            }
        }
        assert_eq!(changed, touched);
    }

    /// 巨大半径或极端球心都不会溢出, 且只遍历体数据内的部分.
    #[test]
    fn test_inject_huge_radius() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let mut v = zeros((4, 4, 4));
        let n = NoduleSpec::new((2, 2, 2), 3_100_000_000, Gaussian::new(1.0, 0.0));
        assert_eq!(v.inject_nodule(&n, &mut rng).unwrap(), 64);
        assert!(v.data().iter().all(|x| *x == 1.0));

        let far = NoduleSpec::new((-5_000_000_000, 0, 0), 3_000_000_000, Gaussian::new(1.0, 0.0));
        assert_eq!(v.inject_nodule(&far, &mut rng).unwrap(), 0);
        let extreme = NoduleSpec::new((i64::MIN, i64::MAX, 0), u32::MAX, Gaussian::new(1.0, 0.0));
        assert_eq!(v.inject_nodule(&extreme, &mut rng).unwrap(), 0);
        assert!(v.data().iter().all(|x| *x == 1.0));

        assert!(extreme.contains((i64::MIN, i64::MAX, 0)));
        assert!(!extreme.contains((i64::MAX, i64::MIN, 0)));
    }

    #[test]
    fn test_overlapping_nodules_accumulate() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let mut v = zeros((8, 8, 8));
        let n = NoduleSpec::new((4, 4, 4), 1, Gaussian::new(100.0, 0.0));
        v.inject_nodule(&n, &mut rng).unwrap();
        v.inject_nodule(&n, &mut rng).unwrap();
        assert_eq!(v[(4, 4, 4)], 200.0);
        assert_eq!(v[(4, 4, 5)], 200.0);
        assert_eq!(v[(4, 5, 5)], 0.0);
    }

    #[test]
    fn test_inject_invalid() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut v = zeros((4, 4, 4));
        let zero = NoduleSpec::new((1, 1, 1), 0, Gaussian::new(1.0, 1.0));
        assert!(matches!(
            v.inject_nodule(&zero, &mut rng),
            Err(LunaError::InvalidRange(_))
        ));
        let bad = NoduleSpec::new((1, 1, 1), 1, Gaussian::new(1.0, f32::NAN));
        assert!(matches!(
            v.inject_nodule(&bad, &mut rng),
            Err(LunaError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_sample_respects_margin() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        let params = NoduleParams {
            count: (3, 3),
            radius: (2, 4),
            margin: 10,
            boost: Gaussian::new(300.0, 100.0),
        };
        for _ in 0..100 {
            let nodules = params.sample((30, 40, 50), &mut rng).unwrap();
            assert_eq!(nodules.len(), 3);
            for n in nodules {
                let (i, r, c) = n.center;
                assert!((10..20).contains(&i));
                assert!((10..30).contains(&r));
                assert!((10..40).contains(&c));
                assert!((2..=4).contains(&n.radius));
            }
        }
    }

    #[rstest]
    #[case((3, 2), (5, 11), 25)]
    #[case((0, 4), (0, 11), 25)]
    #[case((0, 4), (6, 5), 25)]
    #[case((0, 4), (5, 11), 32)]
    fn test_sample_invalid(
        #[case] count: (u32, u32),
        #[case] radius: (u32, u32),
        #[case] margin: usize,
    ) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let params = NoduleParams {
            count,
            radius,
            margin,
            ..Default::default()
        };
        assert!(matches!(
            params.sample((64, 64, 64), &mut rng),
            Err(LunaError::InvalidRange(_))
        ));
    }
}
