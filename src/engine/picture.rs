//! ### English
//! Frame metadata and the reference-counted render picture handle.
//!
//! The pool on the output worker is the only long-lived owner of a picture's GPU resources.
//! Other threads see a `RenderPicture`: an index into a shared slot table plus the refcount
//! discipline (`acquire` / `release` / `return_unused`).
//!
//! ### 中文
//! 帧元数据与带引用计数的渲染图片句柄。
//!
//! 输出工作线程上的缓冲池是图片 GPU 资源唯一的长期持有者。
//! 其他线程看到的是 `RenderPicture`：共享槽位表中的一个索引，以及引用计数约定
//! （`acquire` / `release` / `return_unused`）。

mod handle;
mod table;

use std::time::Duration;

use dpi::PhysicalSize;

use super::backend::SurfaceId;

pub use handle::{PictureGuard, RenderPicture};
pub(crate) use table::PictureTable;

/// ### English
/// Pixel layout of a frame.
///
/// ### 中文
/// 帧的像素布局。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrameFormat {
    /// ### English
    /// Raw data in a hardware decode surface.
    ///
    /// ### 中文
    /// 位于硬件解码 surface 中的原始数据。
    #[default]
    Surface,
    /// ### English
    /// Converted BGRA data in a render texture.
    ///
    /// ### 中文
    /// 已转换到渲染纹理中的 BGRA 数据。
    Texture,
}

/// ### English
/// Per-frame metadata carried from the codec to presentation.
///
/// ### 中文
/// 从 codec 传递到呈现层的逐帧元数据。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    pub size: PhysicalSize<u32>,
    /// ### English
    /// `PICTURE_FLAG_*` bits.
    ///
    /// ### 中文
    /// `PICTURE_FLAG_*` 位。
    pub flags: u32,
    pub color_matrix: u32,
    pub full_range: bool,
    pub pts: Option<Duration>,
    pub format: FrameFormat,
}

/// ### English
/// A decode surface plus its frame metadata, produced by the decoder facade.
///
/// ### 中文
/// 由解码器外观层产生的解码 surface 及其帧元数据。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedPicture {
    pub surface: SurfaceId,
    pub frame: FrameInfo,
}

/// ### English
/// Crop rectangle in texture pixels (`x1`/`y1` exclusive).
///
/// ### 中文
/// 以纹理像素计的裁剪矩形（`x1`/`y1` 不含）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl CropRect {
    pub fn full(size: PhysicalSize<u32>) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: size.width,
            y1: size.height,
        }
    }
}

/// ### English
/// Output metadata stamped on a render picture by a processing cycle.
///
/// ### 中文
/// 处理周期写入渲染图片的输出元数据。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PictureInfo {
    pub frame: FrameInfo,
    pub crop: CropRect,
    pub texture_size: PhysicalSize<u32>,
}
