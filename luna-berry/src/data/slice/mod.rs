//! CT 扫描切片对象的操作.

mod core;
mod save;
mod views;

pub use core::{OwnedScanSlice, ScanSlice};

pub use save::{ImgWriteVis, Montage};

pub use views::CandidateViews;
