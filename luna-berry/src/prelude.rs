//! 🫁欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Idx3dI, Xyz};

pub use crate::data::nodule::{NoduleParams, NoduleSpec};
pub use crate::data::slice::{CandidateViews, ImgWriteVis, Montage, OwnedScanSlice, ScanSlice};
pub use crate::data::window::CtWindow;
pub use crate::data::{CtVolume, Gaussian, GeometryAttr, VolumeGeometry};

pub use crate::consts::{CROP_WIDTH, HU_MAX, HU_MIN, LUNG_CLIM, OVERVIEW_SLICES};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::synth::{DatasetSynthesizer, SynthConfig, SynthReport, TableMode};
pub use crate::dataset::table::{AnnotationRow, CandidateRow, TableSpec};
pub use crate::dataset::{self, series_uid, DatasetLayout};

pub use crate::error::{LunaError, LunaResult};
pub use crate::mhd::{self, read_volume, write_volume};
