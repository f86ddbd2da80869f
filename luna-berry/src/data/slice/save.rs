//! 图像的持久化存储.

use crate::consts::gray::{BLACK, DARK_GRAY};
use crate::error::{LunaError, LunaResult};
use crate::{CtWindow, ScanSlice};
use image::{imageops, GrayImage, ImageResult, Luma};
use ndarray::ArrayView2;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于 `ScanSlice` 这类以 CT HU 值存储的扫描,
/// 在保存时会用肺部显示窗口 ([`CtWindow::from_lung_visual`]) 规范化.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 把二维 HU 数据按 `window` 转换为灰度图. `flip_vertical` 时第 0 行位于图像底部.
fn to_gray(data: ArrayView2<f32>, window: &CtWindow, flip_vertical: bool) -> GrayImage {
    let (height, width) = data.dim();
    let mut buf = GrayImage::new(width as u32, height as u32);
    for ((h, w), &hu) in data.indexed_iter() {
        let y = if flip_vertical { height - 1 - h } else { h };
        buf.put_pixel(w as u32, y as u32, Luma([window.eval_or_black(hu)]));
    }
    buf
}

macro_rules! impl_scan_vis {
    ($($scan: ty),+) => {
        $(
            /// 显示范围 [-1000, 300].
            impl ImgWriteVis for $scan {
                fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
                    to_gray(self.data(), &CtWindow::from_lung_visual(), false).save(path)
                }
            }
        )+
    };
}

impl_scan_vis!(ScanSlice<'_>);

/// 面板之间的间隔像素数.
const GAP: u32 = 4;

/// 带标题的多面板拼图.
///
/// 面板按加入顺序从左到右, 从上到下排列, 每行 `columns` 个. 每个单元格的大小取所有面板中
/// 最大的宽和高, 较小的面板在单元格内居中. `image` 不能绘制文字, 因此标题在保存时
/// 写入日志, 并另存为同名 `.txt` 图例文件.
pub struct Montage {
    columns: usize,
    window: CtWindow,
    panels: Vec<(String, GrayImage)>,
}

impl Montage {
    /// 创建空拼图. `columns` 为 0 时按 1 处理.
    pub fn new(columns: usize, window: CtWindow) -> Self {
        Self {
            columns: columns.max(1),
            window,
            panels: vec![],
        }
    }

    /// 加入一个面板. `flip_vertical` 用于冠状/矢状面板, 使 index 轴朝上.
    pub fn push(&mut self, title: impl Into<String>, data: ArrayView2<f32>, flip_vertical: bool) {
        let img = to_gray(data, &self.window, flip_vertical);
        self.panels.push((title.into(), img));
    }

    /// 已加入的面板个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// 是否还没有任何面板?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// 按加入顺序获取所有面板标题.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.panels.iter().map(|(t, _)| t.as_str())
    }

    /// 网格的 (行数, 列数).
    pub fn grid(&self) -> (usize, usize) {
        let n = self.panels.len();
        let cols = self.columns.min(n.max(1));
        (n.div_ceil(self.columns), cols)
    }

    /// 单元格大小 (宽, 高).
    fn cell(&self) -> (u32, u32) {
        self.panels.iter().fold((0, 0), |(w, h), (_, img)| {
            (w.max(img.width()), h.max(img.height()))
        })
    }

    /// 合成拼图. 单元格之间用暗灰色分隔, 空白处为黑色.
    pub fn render(&self) -> GrayImage {
        let (rows, cols) = self.grid();
        let (cw, ch) = self.cell();
        let width = cols as u32 * (cw + GAP) + GAP;
        let height = rows as u32 * (ch + GAP) + GAP;
        let mut canvas = GrayImage::from_pixel(width, height, Luma([DARK_GRAY]));

        for k in 0..rows * cols {
            let (r, c) = ((k / cols) as u32, (k % cols) as u32);
            let x0 = GAP + c * (cw + GAP);
            let y0 = GAP + r * (ch + GAP);
            let blank = GrayImage::from_pixel(cw, ch, Luma([BLACK]));
            imageops::replace(&mut canvas, &blank, x0 as i64, y0 as i64);

            if let Some((_, img)) = self.panels.get(k) {
                let x = x0 + (cw - img.width()) / 2;
                let y = y0 + (ch - img.height()) / 2;
                imageops::replace(&mut canvas, img, x as i64, y as i64);
            }
        }
        canvas
    }

    /// 生成图例文本, 每行一个面板: `row,col<TAB>title`.
    pub fn legend(&self) -> String {
        let cols = self.columns;
        let mut s = String::new();
        for (k, title) in self.titles().enumerate() {
            // 写入 `String` 不会失败.
            let _ = writeln!(s, "{},{}\t{}", k / cols, k % cols, title);
        }
        s
    }

    /// 保存拼图到 `path` (PNG), 并把图例写到同名 `.txt` 文件.
    ///
    /// 拼图为空时返回 [`LunaError::InvalidRange`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> LunaResult<()> {
        if self.is_empty() {
            return Err(LunaError::range("montage has no panels"));
        }
        let path = path.as_ref();
        self.render().save(path)?;
        fs::write(path.with_extension("txt"), self.legend())?;

        let (rows, cols) = self.grid();
        log::info!("Montage {rows}x{cols} saved to {}", path.display());
        for (k, title) in self.titles().enumerate() {
            log::info!("  [{}, {}] {title}", k / self.columns, k % self.columns);
        }
        Ok(())
    }
}
