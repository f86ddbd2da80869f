//! 候选结节周围的多平面视图.

use super::core::ScanSlice;
use crate::data::{check_axis, CtVolume, GeometryAttr};
use crate::error::LunaResult;
use crate::Idx3d;

/// 以某个体素为中心的一组借用切片. 不复制数据, 也不修改体数据.
pub struct CandidateViews<'a> {
    /// 中心体素 (index, row, col).
    pub center: Idx3d,

    /// 水平切片, 固定 index, 形状 (row, col).
    pub axial: ScanSlice<'a>,

    /// 冠状切片, 固定 row, 形状 (index, col).
    pub coronal: ScanSlice<'a>,

    /// 矢状切片, 固定 col, 形状 (index, row).
    pub sagittal: ScanSlice<'a>,

    /// 额外请求的水平切片, 与请求顺序一致.
    pub extra: Vec<(usize, ScanSlice<'a>)>,
}

impl CandidateViews<'_> {
    /// 所有切片的个数.
    #[inline]
    pub fn len(&self) -> usize {
        3 + self.extra.len()
    }

    /// 永远为 `false`, 三个主平面总是存在.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl CtVolume {
    /// 提取以 `center` 为中心的水平/冠状/矢状切片, 以及 `extra` 中每个 index 对应的水平切片.
    ///
    /// `center` 任意一维越界, 或 `extra` 中存在越界 index 时,
    /// 返回 [`crate::LunaError::IndexOutOfRange`].
    pub fn extract_views(&self, center: Idx3d, extra: &[usize]) -> LunaResult<CandidateViews<'_>> {
        let (i, r, c) = self.shape();
        check_axis(0, center.0, i)?;
        check_axis(1, center.1, r)?;
        check_axis(2, center.2, c)?;
        for &index in extra {
            check_axis(0, index, i)?;
        }

        Ok(CandidateViews {
            center,
            axial: self.slice_at(center.0),
            coronal: self.row_at(center.1),
            sagittal: self.col_at(center.2),
            extra: extra.iter().map(|&k| (k, self.slice_at(k))).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::data::nodule::NoduleSpec;
    use crate::{CtVolume, Gaussian, LunaError, VolumeGeometry};
    use ndarray::Array3;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_views_shapes_and_values() {
        let g = VolumeGeometry::new((4, 5, 6), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0)).unwrap();
        let data = Array3::from_shape_fn((4, 5, 6), |(i, r, c)| (i * 100 + r * 10 + c) as f32);
        let v = CtVolume::from_raw(g, data).unwrap();

        let views = v.extract_views((2, 3, 4), &[0, 3]).unwrap();
        assert_eq!(views.len(), 5);
        assert_eq!(views.axial.shape(), (5, 6));
        assert_eq!(views.coronal.shape(), (4, 6));
        assert_eq!(views.sagittal.shape(), (4, 5));

        assert_eq!(views.axial[(3, 4)], 234.0);
        assert_eq!(views.coronal[(1, 5)], 135.0);
        assert_eq!(views.sagittal[(3, 0)], 304.0);
        let (k, s) = &views.extra[1];
        assert_eq!(*k, 3);
        assert_eq!(s[(1, 1)], 311.0);
    }

    #[test]
    fn test_views_out_of_range() {
        let g = VolumeGeometry::new((4, 5, 6), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0)).unwrap();
        let v = CtVolume::from_raw(g, Array3::zeros((4, 5, 6))).unwrap();
        assert!(matches!(
            v.extract_views((0, 5, 0), &[]),
            Err(LunaError::IndexOutOfRange { axis: 1, index: 5, len: 5 })
        ));
        assert!(matches!(
            v.extract_views((0, 0, 6), &[]),
            Err(LunaError::IndexOutOfRange { axis: 2, .. })
        ));
        assert!(matches!(
            v.extract_views((1, 1, 1), &[1, 4]),
            Err(LunaError::IndexOutOfRange { axis: 0, index: 4, len: 4 })
        ));
    }

    /// 结节中心所在水平切片上, 球内圆盘的平均值高于紧邻的环带.
    #[test]
    fn test_nodule_visible_in_axial_view() {
        for seed in 0..8 {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
            let g = VolumeGeometry::cube(64).unwrap();
            let mut v = CtVolume::create(g, Gaussian::new(0.0, 100.0), &mut rng).unwrap();
            let n = NoduleSpec::new((32, 32, 32), 5, Gaussian::new(300.0, 100.0));
            v.inject_nodule(&n, &mut rng).unwrap();

            let views = v.extract_views((32, 32, 32), &[]).unwrap();
            let inside = views.axial.ring_mean((32, 32), 0.0, 5.0).unwrap();
            let annulus = views.axial.ring_mean((32, 32), 5.5, 8.0).unwrap();
            assert!(inside > annulus + 100.0, "seed {seed}: {inside} vs {annulus}");
        }
    }
}
