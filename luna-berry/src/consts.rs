//! 通用常量.

use crate::Idx3d;

/// 单通道颜色.
pub mod gray {
    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道暗灰色.
    pub const DARK_GRAY: u8 = 0b_0100_0000;
}

/// MetaImage (`.mhd`) 头文件中的固定字段.
pub mod header {
    /// `ObjectType` 字段.
    pub const OBJECT_TYPE: &str = "Image";

    /// `TransformMatrix` 字段, 3x3 单位阵按行展开.
    pub const TRANSFORM_IDENTITY: &str = "1 0 0 0 1 0 0 0 1";

    /// `CenterOfRotation` 字段.
    pub const CENTER_OF_ROTATION: &str = "0 0 0";

    /// `AnatomicalOrientation` 字段.
    pub const ANATOMICAL_ORIENTATION: &str = "RAI";

    /// 头文件扩展名.
    pub const HEADER_EXT: &str = "mhd";

    /// 数据文件扩展名.
    pub const RAW_EXT: &str = "raw";
}

/// 载入扫描后裁剪到的 HU 下限. 低于该值的体素视为空气.
pub const HU_MIN: f32 = -1000.0;

/// 载入扫描后裁剪到的 HU 上限.
pub const HU_MAX: f32 = 1000.0;

/// 可视化肺部结构时的显示范围 (下限, 上限).
pub const LUNG_CLIM: (f32, f32) = (-1000.0, 300.0);

/// 候选结节裁剪块的默认大小 (index, row, col).
pub const CROP_WIDTH: Idx3d = (32, 48, 48);

/// 候选结节概览图中, 裁剪块内额外展示的水平切片索引 (按行分组).
pub const OVERVIEW_SLICES: [[usize; 3]; 3] = [[9, 11, 13], [15, 16, 17], [19, 21, 23]];

/// 候选结节概览图的默认文件名.
pub const VISUALIZATION_FILE: &str = "candidate_visualization.png";
