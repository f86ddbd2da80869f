use std::ops::{Index, IndexMut};

use ndarray::{s, Array3, ArrayView, Axis, Ix3};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{LunaError, LunaResult};
use crate::{Idx2d, Idx3d, Xyz};

pub mod coord;
pub mod nodule;
pub mod slice;
pub mod window;

pub use slice::{CandidateViews, ImgWriteVis, Montage, OwnedScanSlice, ScanSlice};

pub use window::CtWindow;

/// 3D CT 体数据的几何信息: 形状, 体素间距和原点.
///
/// 形状按 `(index, row, col)` 排列; 间距与原点按物理 `(x, y, z)` 排列.
/// 构造时保证各维长度非零, 间距为正的有限值, 原点为有限值.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeGeometry {
    shape: Idx3d,
    spacing: Xyz,
    offset: Xyz,
}

impl VolumeGeometry {
    /// 构建几何信息. 参数不合法时返回 [`LunaError::InvalidDimension`].
    pub fn new(shape: Idx3d, spacing: Xyz, offset: Xyz) -> LunaResult<Self> {
        let (i, r, c) = shape;
        if i == 0 || r == 0 || c == 0 {
            return Err(LunaError::dimension(format!(
                "every extent must be positive, got {shape:?}"
            )));
        }
        let (sx, sy, sz) = spacing;
        if [sx, sy, sz].iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(LunaError::dimension(format!(
                "spacing must be positive and finite, got {spacing:?}"
            )));
        }
        let (ox, oy, oz) = offset;
        if [ox, oy, oz].iter().any(|o| !o.is_finite()) {
            return Err(LunaError::dimension(format!(
                "offset must be finite, got {offset:?}"
            )));
        }
        Ok(Self {
            shape,
            spacing,
            offset,
        })
    }

    /// 立方体形状, 各向同性间距为 1 mm, 原点为 `(0, 0, 0)`.
    #[inline]
    pub fn cube(dim: usize) -> LunaResult<Self> {
        Self::new((dim, dim, dim), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0))
    }

    /// 体数据形状 (index, row, col).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 体素间距 (x, y, z), 以毫米为单位.
    #[inline]
    pub fn spacing(&self) -> Xyz {
        self.spacing
    }

    /// 体素 `(0, 0, 0)` 的物理坐标 (x, y, z).
    #[inline]
    pub fn offset(&self) -> Xyz {
        self.offset
    }

    /// 以物理 `(x, y, z)` 顺序给出的各轴体素个数, 即头文件中的 `DimSize`.
    #[inline]
    pub fn dim_size(&self) -> [usize; 3] {
        let (i, r, c) = self.shape;
        [c, r, i]
    }
}

/// 3D CT 体数据几何信息的共用属性和部分通用操作.
pub trait GeometryAttr {
    /// 获取几何信息.
    fn geometry(&self) -> &VolumeGeometry;

    /// 获取数据形状大小 (index, row, col).
    #[inline]
    fn shape(&self) -> Idx3d {
        self.geometry().shape()
    }

    /// 获取数据水平 (axial) 切片形状大小 (row, col).
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, r, c) = self.shape();
        (r, c)
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (i, r, c) = self.shape();
        i * r * c
    }

    /// 获取体素间距 (x, y, z), 以毫米为单位.
    #[inline]
    fn spacing(&self) -> Xyz {
        self.geometry().spacing()
    }

    /// 获取原点 (x, y, z).
    #[inline]
    fn offset(&self) -> Xyz {
        self.geometry().offset()
    }

    /// 物理坐标转换为 IRC 坐标. 越界时返回 [`LunaError::OutOfBounds`].
    #[inline]
    fn xyz_to_irc(&self, xyz: Xyz) -> LunaResult<Idx3d> {
        coord::xyz_to_irc(xyz, self.geometry())
    }

    /// IRC 坐标转换为物理坐标 (体素中心). 不检查越界.
    #[inline]
    fn irc_to_xyz(&self, irc: Idx3d) -> Xyz {
        coord::irc_to_xyz(irc, self.geometry())
    }
}

impl GeometryAttr for VolumeGeometry {
    #[inline]
    fn geometry(&self) -> &VolumeGeometry {
        self
    }
}

/// 正态分布参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gaussian {
    /// 均值.
    pub mean: f32,

    /// 标准差. 必须为非负有限值.
    pub std_dev: f32,
}

impl Gaussian {
    /// 直接初始化. 不检查参数, 检查推迟到 [`Gaussian::to_normal`].
    #[inline]
    pub const fn new(mean: f32, std_dev: f32) -> Self {
        Self { mean, std_dev }
    }

    /// 转换为可采样的分布. 参数不合法时返回 [`LunaError::InvalidRange`].
    pub fn to_normal(self) -> LunaResult<Normal<f32>> {
        if !self.mean.is_finite() || !self.std_dev.is_finite() {
            return Err(LunaError::range(format!("non-finite gaussian {self:?}")));
        }
        // `Normal::new` 不拒绝负的标准差.
        if self.std_dev < 0.0 {
            return Err(LunaError::range(format!("negative std dev in {self:?}")));
        }
        Normal::new(self.mean, self.std_dev)
            .map_err(|e| LunaError::range(format!("gaussian {self:?}: {e}")))
    }
}

/// 3D CT 扫描, 包括几何信息和体素强度 (HU). 强度以 `f32` 保存.
///
/// 数据按 `(index, row, col)` 标准布局存储, `col` 变化最快.
#[derive(Debug, Clone)]
pub struct CtVolume {
    geometry: VolumeGeometry,
    data: Array3<f32>,
}

impl GeometryAttr for CtVolume {
    #[inline]
    fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }
}

impl Index<Idx3d> for CtVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for CtVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl CtVolume {
    /// 分配体数据, 并从 `noise` 给出的正态分布中独立采样每个体素 (背景组织噪声).
    pub fn create<R: Rng + ?Sized>(
        geometry: VolumeGeometry,
        noise: Gaussian,
        rng: &mut R,
    ) -> LunaResult<Self> {
        let normal = noise.to_normal()?;
        let data = Array3::from_shape_simple_fn(geometry.shape(), || normal.sample(&mut *rng));
        Ok(Self { geometry, data })
    }

    /// 由已有数据直接创建. `data` 的形状必须与 `geometry` 一致,
    /// 否则返回 [`LunaError::InvalidDimension`].
    pub fn from_raw(geometry: VolumeGeometry, data: Array3<f32>) -> LunaResult<Self> {
        if data.dim() != geometry.shape() {
            return Err(LunaError::dimension(format!(
                "data shape {:?} does not match geometry {:?}",
                data.dim(),
                geometry.shape()
            )));
        }
        // 统一为标准布局, 写出时即可按内存顺序直接序列化.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        Ok(Self { geometry, data })
    }

    /// 计算由 `it` 给出的所有索引对应的 HU 值的平均值. `it` 为空时返回 `None`.
    ///
    /// 如果存在越界索引, 则程序 panic.
    pub fn mean_hu<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> Option<f64> {
        let mut count = 0u64;
        let mut hu = 0.0;
        for pos in it.into_iter() {
            count += 1;
            hu += self[pos] as f64;
        }
        (count > 0).then(|| hu / (count as f64))
    }

    /// 将所有体素值裁剪到 `[lo, hi]`.
    pub fn clip(&mut self, lo: f32, hi: f32) {
        debug_assert!(lo <= hi);
        self.data.mapv_inplace(|v| v.clamp(lo, hi));
    }

    /// 获取 index 方向第 `index` 层水平 (axial) 切片视图, 形状为 (row, col).
    ///
    /// 当 `index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, index: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(0), index))
    }

    /// 获取第 `row` 行的冠状 (coronal) 切片视图, 形状为 (index, col).
    ///
    /// 当 `row` 越界时 panic.
    #[inline]
    pub fn row_at(&self, row: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(1), row))
    }

    /// 获取第 `col` 列的矢状 (sagittal) 切片视图, 形状为 (index, row).
    ///
    /// 当 `col` 越界时 panic.
    #[inline]
    pub fn col_at(&self, col: usize) -> ScanSlice<'_> {
        ScanSlice::new(self.data.index_axis(Axis(2), col))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 以标准布局 (`col` 最快) 获取底层连续数据.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        // `create` 与 `from_raw` 都保证了标准布局.
        self.data
            .as_slice()
            .expect("CtVolume data is always in standard layout")
    }

    /// 获取以 `center` 为中心, 大小为 `width` 的子体数据.
    ///
    /// 裁剪窗口会整体平移以保持在体数据内部 (不做填充).
    /// 返回子体数据以及 `center` 在其中的位置. 子体数据的原点已相应调整,
    /// 因此同一体素在两者中的物理坐标一致.
    ///
    /// # 错误
    ///
    /// 1. `center` 越界时返回 [`LunaError::IndexOutOfRange`].
    /// 2. `width` 某一维为 0 或大于体数据时返回 [`LunaError::InvalidRange`].
    pub fn crop_around(&self, center: Idx3d, width: Idx3d) -> LunaResult<(CtVolume, Idx3d)> {
        let shape = self.shape();
        check_axis(0, center.0, shape.0)?;
        check_axis(1, center.1, shape.1)?;
        check_axis(2, center.2, shape.2)?;

        let window = |c: usize, w: usize, len: usize| -> LunaResult<usize> {
            if w == 0 || w > len {
                return Err(LunaError::range(format!(
                    "crop width {width:?} does not fit volume {shape:?}"
                )));
            }
            // 先居中, 再平移回体数据内.
            Ok(c.saturating_sub(w / 2).min(len - w))
        };
        let start = (
            window(center.0, width.0, shape.0)?,
            window(center.1, width.1, shape.1)?,
            window(center.2, width.2, shape.2)?,
        );

        let chunk = self
            .data
            .slice(s![
                start.0..start.0 + width.0,
                start.1..start.1 + width.1,
                start.2..start.2 + width.2
            ])
            .to_owned();
        let geometry = VolumeGeometry::new(width, self.spacing(), self.irc_to_xyz(start))?;
        let local = (center.0 - start.0, center.1 - start.1, center.2 - start.2);
        Ok((Self::from_raw(geometry, chunk)?, local))
    }
}

/// 检查 `axis` 上的索引 `index` 是否小于 `len`.
#[inline]
pub(crate) fn check_axis(axis: usize, index: usize, len: usize) -> LunaResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(LunaError::IndexOutOfRange { axis, index, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng() -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(42)
    }

    #[test]
    fn test_geometry_invalid() {
        let one = (1.0, 1.0, 1.0);
        let zero = (0.0, 0.0, 0.0);
        for shape in [(0, 1, 1), (1, 0, 1), (1, 1, 0)] {
            let e = VolumeGeometry::new(shape, one, zero).unwrap_err();
            assert!(matches!(e, LunaError::InvalidDimension(_)));
        }
        for spacing in [(0.0, 1.0, 1.0), (1.0, -1.0, 1.0), (1.0, 1.0, f64::NAN)] {
            let e = VolumeGeometry::new((1, 1, 1), spacing, zero).unwrap_err();
            assert!(matches!(e, LunaError::InvalidDimension(_)));
        }
        let e = VolumeGeometry::new((1, 1, 1), one, (f64::INFINITY, 0.0, 0.0)).unwrap_err();
        assert!(matches!(e, LunaError::InvalidDimension(_)));
    }

    #[test]
    fn test_dim_size_is_xyz() {
        let g = VolumeGeometry::new((3, 4, 5), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0)).unwrap();
        assert_eq!(g.dim_size(), [5, 4, 3]);
        assert_eq!(g.size(), 60);
        assert_eq!(g.slice_shape(), (4, 5));
    }

    #[test]
    fn test_create_noise_statistics() {
        let g = VolumeGeometry::new((16, 24, 32), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0)).unwrap();
        let v = CtVolume::create(g, Gaussian::new(0.0, 100.0), &mut rng()).unwrap();
        assert_eq!(v.shape(), (16, 24, 32));
        let n = v.size() as f64;
        let mean = v.data().iter().map(|x| *x as f64).sum::<f64>() / n;
        let var = v.data().iter().map(|x| (*x as f64 - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 5.0, "mean = {mean}");
        assert!((var.sqrt() - 100.0).abs() < 5.0, "std = {}", var.sqrt());
    }

    #[test]
    fn test_create_is_deterministic() {
        let g = VolumeGeometry::cube(8).unwrap();
        let a = CtVolume::create(g, Gaussian::new(0.0, 1.0), &mut rng()).unwrap();
        let b = CtVolume::create(g, Gaussian::new(0.0, 1.0), &mut rng()).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_create_invalid_noise() {
        let g = VolumeGeometry::cube(2).unwrap();
        for noise in [
            Gaussian::new(0.0, -1.0),
            Gaussian::new(0.0, -0.0001),
            Gaussian::new(0.0, f32::NAN),
            Gaussian::new(f32::INFINITY, 1.0),
        ] {
            let e = CtVolume::create(g, noise, &mut rng()).unwrap_err();
            assert!(matches!(e, LunaError::InvalidRange(_)), "{noise:?}");
        }
        // 标准差为 0 时退化为常数.
        let v = CtVolume::create(g, Gaussian::new(7.0, 0.0), &mut rng()).unwrap();
        assert!(v.as_slice().iter().all(|x| *x == 7.0));
    }

    #[test]
    fn test_from_raw_shape_mismatch() {
        let g = VolumeGeometry::cube(2).unwrap();
        let e = CtVolume::from_raw(g, Array3::zeros((2, 2, 3))).unwrap_err();
        assert!(matches!(e, LunaError::InvalidDimension(_)));
    }

    #[test]
    fn test_planes_shapes() {
        let g = VolumeGeometry::new((3, 4, 5), (1.0, 1.0, 1.0), (0.0, 0.0, 0.0)).unwrap();
        let v = CtVolume::from_raw(g, Array3::zeros((3, 4, 5))).unwrap();
        assert_eq!(v.slice_at(0).shape(), (4, 5));
        assert_eq!(v.row_at(0).shape(), (3, 5));
        assert_eq!(v.col_at(0).shape(), (3, 4));
    }

    #[test]
    fn test_clip() {
        let g = VolumeGeometry::cube(2).unwrap();
        let data = Array3::from_shape_vec((2, 2, 2), vec![-3000., -5., 0., 5., 10., 2000., 1., 1.])
            .unwrap();
        let mut v = CtVolume::from_raw(g, data).unwrap();
        v.clip(-1000.0, 1000.0);
        assert_eq!(v[(0, 0, 0)], -1000.0);
        assert_eq!(v[(1, 0, 1)], 1000.0);
        assert_eq!(v[(0, 1, 1)], 5.0);
    }

    #[test]
    fn test_crop_around_keeps_physical_coordinates() {
        let g = VolumeGeometry::new((10, 12, 14), (0.5, 0.75, 2.0), (-3.0, 4.0, 10.0)).unwrap();
        let data =
            Array3::from_shape_fn((10, 12, 14), |(i, r, c)| (i * 10_000 + r * 100 + c) as f32);
        let v = CtVolume::from_raw(g, data).unwrap();

        // 靠近边缘时窗口被平移回体数据内.
        let (chunk, local) = v.crop_around((1, 11, 7), (4, 6, 6)).unwrap();
        assert_eq!(chunk.shape(), (4, 6, 6));
        assert_eq!(local, (1, 5, 3));
        assert_eq!(chunk[local], v[(1, 11, 7)]);
        assert_eq!(chunk.irc_to_xyz(local), v.irc_to_xyz((1, 11, 7)));
        assert_eq!(chunk.xyz_to_irc(v.irc_to_xyz((1, 11, 7))).unwrap(), local);
    }

    #[test]
    fn test_crop_around_errors() {
        let v = CtVolume::from_raw(VolumeGeometry::cube(4).unwrap(), Array3::zeros((4, 4, 4)))
            .unwrap();
        assert!(matches!(
            v.crop_around((4, 0, 0), (2, 2, 2)),
            Err(LunaError::IndexOutOfRange { axis: 0, index: 4, len: 4 })
        ));
        assert!(matches!(
            v.crop_around((0, 0, 0), (5, 2, 2)),
            Err(LunaError::InvalidRange(_))
        ));
        assert!(matches!(
            v.crop_around((0, 0, 0), (2, 0, 2)),
            Err(LunaError::InvalidRange(_))
        ));
    }
}
