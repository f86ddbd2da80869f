use crate::Idx2d;
use itertools::iproduct;
use ndarray::iter::Iter;
use ndarray::{Array2, ArrayView2, Ix2};
use std::ops::Index;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 不可变、借用的二维 CT 扫描切片.
///
/// 水平切片的形状为 (row, col); 冠状切片为 (index, col); 矢状切片为 (index, row).
pub struct ScanSlice<'a> {
    /// 底层数据的轻量级视图, 借用于 [`crate::CtVolume`].
    ///
    /// 这里有意把代码写死为 `ArrayView` 降低灵活性, 但使结构的意图更加明确.
    data: ArrayView2<'a, f32>,
}

impl Index<Idx2d> for ScanSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

/// scan 不可变方法集合.
macro_rules! impl_scan_slice_immut {
    ($life: lifetime, $scan: ty, $array: ty) => {
        /// 不可变方法集合.
        impl<$life> $scan {
            /// 直接初始化.
            #[inline]
            pub(crate) fn new(data: $array) -> Self {
                Self { data }
            }

            /// 获得数据的一份不可变 shallow copy.
            #[inline]
            pub fn data(&self) -> ArrayView2<f32> {
                self.data.view()
            }

            /// 获取可以迭代图像像素的迭代器.
            #[inline]
            pub fn iter(&self) -> Iter<'_, f32, Ix2> {
                self.data.iter()
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&f32> {
                self.data.get(pos)
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                let &[h, w] = self.data.shape() else {
                    unreachable!()
                };
                (h, w)
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                let (h, w) = self.shape();
                h * w
            }

            /// 克隆自己, 获得一个拥有所有权的切片对象.
            pub fn to_owned(&self) -> OwnedScanSlice {
                OwnedScanSlice {
                    data: self.data.to_owned(),
                }
            }

            /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
            #[inline]
            pub fn pos_iter(&self) -> impl Iterator<Item = Idx2d> {
                let (h, w) = self.shape();
                iproduct!(0..h, 0..w)
            }

            /// 以行优先规则, 获取能迭代图像所有 `(索引, CT HU 值)` 的迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &f32)> {
                self.data.indexed_iter()
            }

            /// 计算由 `it` 给出的所有索引对应的 HU 值的平均值. `it` 为空时返回 `None`.
            ///
            /// 如果存在越界索引, 则程序 panic.
            pub fn mean_hu<I: IntoIterator<Item = Idx2d>>(&self, it: I) -> Option<f64> {
                let mut count = 0u64;
                let mut hu = 0.0;
                for pos in it.into_iter() {
                    count += 1;
                    hu += self[pos] as f64;
                }
                (count > 0).then(|| hu / (count as f64))
            }

            /// 计算到 `center` 的欧氏距离 (像素单位) 落在 `[inner, outer)`
            /// 内的所有像素的平均 HU 值. 没有这样的像素时返回 `None`.
            ///
            /// `inner = 0` 时即为圆盘均值, 否则为环带均值.
            pub fn ring_mean(&self, (ch, cw): Idx2d, inner: f64, outer: f64) -> Option<f64> {
                let (i2, o2) = (inner * inner, outer * outer);
                self.mean_hu(self.pos_iter().filter(|&(h, w)| {
                    let d2 = (h.abs_diff(ch).pow(2) + w.abs_diff(cw).pow(2)) as f64;
                    i2 <= d2 && d2 < o2
                }))
            }
        }
    };
}

impl_scan_slice_immut!('a, ScanSlice<'a>, ArrayView2<'a, f32>);

/// 拥有所有权的二维 CT 扫描切片.
///
/// `OwnedScanSlice` 仅提供到 `ScanSlice` 的轻量转换和底层数据移动, 不提供任何其它方法.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OwnedScanSlice {
    data: Array2<f32>,
}

impl OwnedScanSlice {
    /// 由裸数据直接创建.
    #[inline]
    pub fn from_raw(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// 获得不可变切片引用.
    #[inline]
    pub fn as_immutable(&self) -> ScanSlice<'_> {
        ScanSlice::new(self.data.view())
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<f32> {
        self.data
    }
}
