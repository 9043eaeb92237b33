//! ### English
//! In-memory `VideoDevice` / `GlBackend` doubles for unit tests.
//!
//! ### 中文
//! 单元测试使用的内存版 `VideoDevice` / `GlBackend` 替身。

use std::collections::HashSet;
use std::sync::Arc;

use dpi::PhysicalSize;
use parking_lot::Mutex;

use super::backend::{GlBackend, GlFactory, RenderSurfaceId, RenderTexture, SurfaceId, VideoDevice};
use super::error::BackendError;

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct DeviceState {
    next_surface: u32,
    next_render: u64,
    live_surfaces: HashSet<SurfaceId>,
    live_render: HashSet<RenderSurfaceId>,
    copies: Vec<(SurfaceId, RenderSurfaceId)>,
    fail_create_surfaces: bool,
    fail_render_surface: bool,
    fail_copy: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_copy(&self, fail: bool) {
        self.state.lock().fail_copy = fail;
    }

    pub(crate) fn fail_render_surface(&self, fail: bool) {
        self.state.lock().fail_render_surface = fail;
    }

    pub(crate) fn fail_create_surfaces(&self, fail: bool) {
        self.state.lock().fail_create_surfaces = fail;
    }

    pub(crate) fn live_surfaces(&self) -> usize {
        self.state.lock().live_surfaces.len()
    }

    pub(crate) fn live_render_surfaces(&self) -> usize {
        self.state.lock().live_render.len()
    }

    pub(crate) fn copies(&self) -> Vec<SurfaceId> {
        self.state.lock().copies.iter().map(|&(s, _)| s).collect()
    }
}

impl VideoDevice for MockDevice {
    fn create_surfaces(
        &self,
        _size: PhysicalSize<u32>,
        count: u32,
    ) -> Result<Vec<SurfaceId>, BackendError> {
        let mut state = self.state.lock();
        if state.fail_create_surfaces {
            return Err(BackendError::new("vaCreateSurfaces", "mock failure"));
        }
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            state.next_surface += 1;
            let surface = SurfaceId(state.next_surface);
            state.live_surfaces.insert(surface);
            out.push(surface);
        }
        Ok(out)
    }

    fn destroy_surface(&self, surface: SurfaceId) {
        self.state.lock().live_surfaces.remove(&surface);
    }

    fn create_render_surface(
        &self,
        _texture: RenderTexture,
    ) -> Result<RenderSurfaceId, BackendError> {
        let mut state = self.state.lock();
        if state.fail_render_surface {
            return Err(BackendError::new("vaCreateSurfaceGLX", "mock failure"));
        }
        state.next_render += 1;
        let surface = RenderSurfaceId(state.next_render);
        state.live_render.insert(surface);
        Ok(surface)
    }

    fn copy_surface(&self, source: SurfaceId, target: RenderSurfaceId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.fail_copy {
            return Err(BackendError::new("vaCopySurfaceGLX", "mock failure"));
        }
        state.copies.push((source, target));
        Ok(())
    }

    fn destroy_render_surface(&self, surface: RenderSurfaceId) {
        self.state.lock().live_render.remove(&surface);
    }
}

#[derive(Default)]
struct GlState {
    next_texture: u32,
    live_textures: HashSet<u32>,
    texture_sizes: Vec<PhysicalSize<u32>>,
    held_fences: HashSet<u64>,
    deleted_fences: Vec<u64>,
    fail_texture: bool,
    flushes: usize,
}

#[derive(Clone)]
pub(crate) struct MockGl {
    fences: bool,
    state: Arc<Mutex<GlState>>,
}

impl MockGl {
    pub(crate) fn new(fences: bool) -> Self {
        Self {
            fences,
            state: Arc::default(),
        }
    }

    pub(crate) fn hold_fence(&self, fence: u64) {
        self.state.lock().held_fences.insert(fence);
    }

    pub(crate) fn signal_fence(&self, fence: u64) {
        self.state.lock().held_fences.remove(&fence);
    }

    pub(crate) fn fail_texture(&self, fail: bool) {
        self.state.lock().fail_texture = fail;
    }

    pub(crate) fn deleted_fences(&self) -> Vec<u64> {
        self.state.lock().deleted_fences.clone()
    }

    pub(crate) fn live_textures(&self) -> usize {
        self.state.lock().live_textures.len()
    }

    pub(crate) fn texture_sizes(&self) -> Vec<PhysicalSize<u32>> {
        self.state.lock().texture_sizes.clone()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.state.lock().flushes
    }

    /// ### English
    /// Factory handing out clones that share this mock's state.
    ///
    /// ### 中文
    /// 返回共享本 mock 状态的克隆的工厂。
    pub(crate) fn factory(&self) -> GlFactory {
        let gl = self.clone();
        Arc::new(move || Ok(Box::new(gl.clone()) as Box<dyn GlBackend>))
    }

    pub(crate) fn failing_factory() -> GlFactory {
        Arc::new(|| Err(BackendError::new("glXCreateContext", "mock failure")))
    }
}

impl GlBackend for MockGl {
    fn supports_fences(&self) -> bool {
        self.fences
    }

    fn create_texture(&mut self, size: PhysicalSize<u32>) -> Result<RenderTexture, BackendError> {
        let mut state = self.state.lock();
        if state.fail_texture {
            return Err(BackendError::new("glTexImage2D", "mock failure"));
        }
        state.texture_sizes.push(size);
        state.next_texture += 1;
        let id = state.next_texture;
        state.live_textures.insert(id);
        Ok(RenderTexture {
            id,
            target: glow::TEXTURE_2D,
        })
    }

    fn delete_texture(&mut self, texture: RenderTexture) {
        self.state.lock().live_textures.remove(&texture.id);
    }

    fn fence_signaled(&mut self, fence: u64) -> bool {
        !self.state.lock().held_fences.contains(&fence)
    }

    fn delete_fence(&mut self, fence: u64) {
        self.state.lock().deleted_fences.push(fence);
    }

    fn flush(&mut self) {
        self.state.lock().flushes += 1;
    }
}
