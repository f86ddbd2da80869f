/// CT 显示窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl Default for CtWindow {
    #[inline]
    fn default() -> Self {
        Self::from_lung_visual()
    }
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 由显示范围 `[lo, hi]` 构建 CT 窗. 要求 `lo < hi`.
    #[inline]
    pub fn from_clim(lo: f32, hi: f32) -> Option<CtWindow> {
        Self::new((lo + hi) / 2.0, hi - lo)
    }

    /// 肺部显示窗口, 显示范围为 `[-1000, 300]` (窗位 -350, 窗宽 1300).
    #[inline]
    pub const fn from_lung_visual() -> CtWindow {
        Self {
            level: -350.0,
            width: 1300.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, ct: f32) -> Option<u8> {
        self.eval_f32(ct).map(|g| g as u8)
    }

    /// 同 [`CtWindow::eval`], 但 NaN 显示为黑色, 无穷值饱和到两端.
    #[inline]
    pub fn eval_or_black(&self, ct: f32) -> u8 {
        match ct {
            x if x.is_nan() => u8::MIN,
            x if x == f32::INFINITY => u8::MAX,
            x if x == f32::NEG_INFINITY => u8::MIN,
            x => self.eval(x).unwrap_or(u8::MIN),
        }
    }

    /// 求在当前 CT 窗设置下, `ct` HU 值对应的灰度图像素分布点 (0.0 <= value <= 255.0).
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_f32(&self, ct: f32) -> Option<f32> {
        if !ct.is_finite() {
            return None;
        }
        let lb = self.lower_bound();
        if ct <= lb {
            Some(0.0)
        } else if ct >= self.upper_bound() {
            Some(255.0)
        } else {
            // 255, not 256.
            Some((ct - lb) / self.width() * 255.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::CtWindow;

    fn is_valid_init(level: f32, width: f32) -> bool {
        CtWindow::new(level, width).is_some()
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(CtWindow::from_clim(300.0, -1000.0).is_none());
    }

    #[test]
    fn test_lung_window_bounds() {
        let w = CtWindow::from_lung_visual();
        assert_eq!(w, CtWindow::from_clim(-1000.0, 300.0).unwrap());
        assert_eq!(w.lower_bound(), -1000.0);
        assert_eq!(w.upper_bound(), 300.0);
        assert_eq!(w.eval(-2000.0), Some(0));
        assert_eq!(w.eval(-350.0), Some(127));
        assert_eq!(w.eval(1000.0), Some(255));
    }

    #[test]
    fn test_eval_or_black() {
        let w = CtWindow::default();
        assert_eq!(w.eval_or_black(f32::NAN), 0);
        assert_eq!(w.eval_or_black(f32::INFINITY), 255);
        assert_eq!(w.eval_or_black(f32::NEG_INFINITY), 0);
        assert_eq!(w.eval_or_black(300.0), 255);
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_ct_window_generic() {
        // [60, 100]
        let ct = CtWindow::new(80.0, 40.0).unwrap();
        assert_eq!(ct.eval(f32::NAN), None);
        assert_eq!(ct.eval(f32::MIN), Some(0));
        assert_eq!(ct.eval(f32::MAX), Some(255));

        assert_eq!(ct.eval(60.0), Some(0));
        assert!(ct.eval_f32(60.1).unwrap() > 0.0);
        assert!(ct.eval_f32(60.1).unwrap() < 1.0);

        assert!(float_eq(ct.eval_f32(70.0).unwrap(), 255.0 * 0.25));
        assert!(float_eq(ct.eval_f32(90.0).unwrap(), 255.0 * 0.75));

        assert_eq!(ct.eval(99.999), Some(254));
        assert_eq!(ct.eval(100.0), Some(u8::MAX));
    }
}
