//! ### English
//! Hardware seams: the shared video device and the per-worker GL context.
//!
//! The video device is shared (`Arc`) between the decoder facade and the output worker.
//! The GL backend lives on the output worker only; it is created there by a `GlFactory`
//! and dropping it releases the context.
//!
//! ### 中文
//! 硬件接缝：共享的视频设备与每个工作线程独享的 GL 上下文。
//!
//! 视频设备通过 `Arc` 在解码器外观层与输出工作线程之间共享。
//! GL 后端只存在于输出工作线程；它由 `GlFactory` 在该线程上创建，drop 时释放上下文。

mod gl;

use std::sync::Arc;

use dpi::PhysicalSize;

use super::error::BackendError;

pub use gl::GlowBackend;

/// ### English
/// Opaque handle of a hardware decode surface.
///
/// ### 中文
/// 硬件解码 surface 的不透明句柄。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

/// ### English
/// Opaque handle of an interop surface bound to a render texture.
///
/// ### 中文
/// 绑定到渲染纹理的互操作 surface 的不透明句柄。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderSurfaceId(pub u64);

/// ### English
/// A GL texture name together with its binding target.
///
/// ### 中文
/// GL 纹理名及其绑定目标。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTexture {
    pub id: u32,
    pub target: u32,
}

/// ### English
/// Shared hardware display context.
///
/// Every call may come from either the decoder thread or the output worker.
///
/// ### 中文
/// 共享的硬件显示上下文。
///
/// 每个调用都可能来自解码线程或输出工作线程。
pub trait VideoDevice: Send + Sync {
    /// ### English
    /// Allocates `count` decode surfaces of `size`.
    ///
    /// ### 中文
    /// 分配 `count` 个尺寸为 `size` 的解码 surface。
    fn create_surfaces(
        &self,
        size: PhysicalSize<u32>,
        count: u32,
    ) -> Result<Vec<SurfaceId>, BackendError>;

    fn destroy_surface(&self, surface: SurfaceId);

    /// ### English
    /// Creates an interop surface that writes into `texture`.
    ///
    /// ### 中文
    /// 创建一个写入 `texture` 的互操作 surface。
    fn create_render_surface(
        &self,
        texture: RenderTexture,
    ) -> Result<RenderSurfaceId, BackendError>;

    /// ### English
    /// Copies/converts a decode surface into a render surface.
    ///
    /// ### 中文
    /// 将解码 surface 拷贝/转换到渲染 surface。
    fn copy_surface(&self, source: SurfaceId, target: RenderSurfaceId) -> Result<(), BackendError>;

    fn destroy_render_surface(&self, surface: RenderSurfaceId);
}

/// ### English
/// GL context owned by the output worker.
///
/// Fences are raw `GLsync` values carried as `u64`; `0` means "no fence".
///
/// ### 中文
/// 由输出工作线程持有的 GL 上下文。
///
/// fence 是以 `u64` 承载的原始 `GLsync` 值；`0` 表示“无 fence”。
pub trait GlBackend {
    fn supports_fences(&self) -> bool;

    fn create_texture(&mut self, size: PhysicalSize<u32>) -> Result<RenderTexture, BackendError>;

    fn delete_texture(&mut self, texture: RenderTexture);

    /// ### English
    /// Non-blocking fence poll.
    ///
    /// ### 中文
    /// 非阻塞的 fence 轮询。
    fn fence_signaled(&mut self, fence: u64) -> bool;

    fn delete_fence(&mut self, fence: u64);

    fn flush(&mut self);
}

/// ### English
/// Creates the GL backend on the calling (worker) thread.
///
/// ### 中文
/// 在调用方（工作线程）上创建 GL 后端。
pub type GlFactory = Arc<dyn Fn() -> Result<Box<dyn GlBackend>, BackendError> + Send + Sync>;
