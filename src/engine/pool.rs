//! ### English
//! Render-picture pool owned by the output worker.
//!
//! Every picture index is in exactly one of `free` / `used` at any time; `sync_pending`
//! holds `used` members that were returned and wait for their consumer fence.
//!
//! ### 中文
//! 由输出工作线程持有的渲染图片池。
//!
//! 每个图片索引任一时刻都恰好位于 `free` / `used` 之一；`sync_pending` 保存已归还、
//! 正在等待 consumer fence 的 `used` 成员。

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dpi::PhysicalSize;

use super::backend::{GlBackend, RenderSurfaceId, RenderTexture, VideoDevice};
use super::error::BackendError;
use super::picture::{DecodedPicture, PictureTable, RenderPicture};
use super::surfaces::SurfaceRegistry;

/// ### English
/// Worker-side GPU resources of one picture.
///
/// ### 中文
/// 单个图片在工作线程一侧的 GPU 资源。
#[derive(Debug, Default)]
struct PictureResources {
    texture: Option<RenderTexture>,
    surface: Option<RenderSurfaceId>,
}

pub(crate) struct BufferPool {
    table: Arc<PictureTable>,
    resources: Vec<PictureResources>,
    free: VecDeque<usize>,
    used: VecDeque<usize>,
    sync_pending: VecDeque<usize>,
    decoded: VecDeque<DecodedPicture>,
}

impl BufferPool {
    #[cfg(test)]
    pub(crate) fn new(
        size: usize,
        returns: crossbeam_channel::Sender<crate::engine::protocol::DataMessage>,
    ) -> Self {
        Self::from_table(Arc::new(PictureTable::new(size, returns)))
    }

    /// ### English
    /// Builds the pool around a slot table created on another thread.
    ///
    /// ### 中文
    /// 围绕在其他线程创建的槽位表构建缓冲池。
    pub(crate) fn from_table(table: Arc<PictureTable>) -> Self {
        let size = table.len();
        Self {
            table,
            resources: (0..size).map(|_| PictureResources::default()).collect(),
            free: (0..size).collect(),
            used: VecDeque::with_capacity(size),
            sync_pending: VecDeque::with_capacity(size),
            decoded: VecDeque::new(),
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.resources.len()
    }

    pub(crate) fn table(&self) -> &Arc<PictureTable> {
        &self.table
    }

    /// ### English
    /// Handle to the current hand-out of `index`.
    ///
    /// ### 中文
    /// 指向 `index` 当前这一次发出的句柄。
    pub(crate) fn picture(&self, index: usize) -> RenderPicture {
        let generation = self.table.slot(index).generation;
        RenderPicture::new(index, generation, self.table.clone())
    }

    #[cfg(test)]
    pub(crate) fn free_len(&self) -> usize {
        self.free.len()
    }

    #[cfg(test)]
    pub(crate) fn used_len(&self) -> usize {
        self.used.len()
    }

    pub(crate) fn sync_pending_len(&self) -> usize {
        self.sync_pending.len()
    }

    #[cfg(test)]
    pub(crate) fn decoded_len(&self) -> usize {
        self.decoded.len()
    }

    pub(crate) fn push_decoded(&mut self, picture: DecodedPicture) {
        self.decoded.push_back(picture);
    }

    pub(crate) fn pop_decoded(&mut self) -> Option<DecodedPicture> {
        self.decoded.pop_front()
    }

    /// ### English
    /// A decoded frame is waiting and a free picture exists to hold it.
    ///
    /// ### 中文
    /// 有解码帧在等待，且存在可容纳它的空闲图片。
    pub(crate) fn has_work(&self) -> bool {
        !self.decoded.is_empty() && !self.free.is_empty()
    }

    /// ### English
    /// Drops every queued decoded frame, clearing RENDER on its surface.
    ///
    /// ### 中文
    /// 丢弃所有排队的解码帧，并清除其 surface 的 RENDER。
    pub(crate) fn flush_decoded(&mut self, surfaces: Option<&SurfaceRegistry>) -> usize {
        let flushed = self.decoded.len();
        for picture in self.decoded.drain(..) {
            if let Some(surfaces) = surfaces {
                surfaces.clear_render(picture.surface);
            }
        }
        flushed
    }

    /// ### English
    /// Takes the front of `free` for a processing cycle.
    ///
    /// ### 中文
    /// 为处理周期取出 `free` 队首。
    pub(crate) fn take_free(&mut self) -> Option<usize> {
        self.free.pop_front()
    }

    /// ### English
    /// Puts a picture taken by `take_free` back when the cycle did not complete.
    ///
    /// ### 中文
    /// 当处理周期未完成时，把 `take_free` 取出的图片放回。
    pub(crate) fn restore_free(&mut self, index: usize) {
        self.free.push_front(index);
    }

    /// ### English
    /// Moves a filled picture to `used` and starts a new hand-out of its slot.
    ///
    /// ### 中文
    /// 把已填充的图片移入 `used`，并开始其槽位的新一次发出。
    pub(crate) fn mark_used(&mut self, index: usize) {
        self.table.slot(index).generation += 1;
        self.used.push_back(index);
    }

    /// ### English
    /// Makes sure the picture has a texture and a render surface.
    ///
    /// ### 中文
    /// 确保图片拥有纹理与渲染 surface。
    pub(crate) fn ensure_resources(
        &mut self,
        index: usize,
        size: PhysicalSize<u32>,
        gl: &mut dyn GlBackend,
        device: &dyn VideoDevice,
    ) -> Result<(RenderTexture, RenderSurfaceId), BackendError> {
        let res = &mut self.resources[index];

        let texture = match res.texture {
            Some(texture) => texture,
            None => {
                let texture = gl.create_texture(size)?;
                res.texture = Some(texture);
                self.table.slot(index).texture = Some(texture);
                texture
            }
        };

        let surface = match res.surface {
            Some(surface) => surface,
            None => {
                let surface = device.create_render_surface(texture)?;
                res.surface = Some(surface);
                surface
            }
        };

        Ok((texture, surface))
    }

    /// ### English
    /// Allocates GPU resources for every picture.
    ///
    /// ### 中文
    /// 为每个图片分配 GPU 资源。
    pub(crate) fn allocate(
        &mut self,
        size: PhysicalSize<u32>,
        gl: &mut dyn GlBackend,
        device: &dyn VideoDevice,
    ) -> Result<(), BackendError> {
        for index in 0..self.size() {
            self.ensure_resources(index, size, gl, device)?;
        }
        log::debug!("BufferPool: allocated {} pictures at {size:?}", self.size());
        Ok(())
    }

    fn release_resources(&mut self, index: usize, gl: &mut dyn GlBackend, device: &dyn VideoDevice) {
        let res = &mut self.resources[index];
        if let Some(surface) = res.surface.take() {
            device.destroy_render_surface(surface);
        }
        if let Some(texture) = res.texture.take() {
            gl.delete_texture(texture);
        }
        self.table.slot(index).texture = None;
    }

    /// ### English
    /// Releases resources of pictures nobody references; they are re-created on next use.
    ///
    /// ### 中文
    /// 释放无人引用的图片的资源；下次使用时重新创建。
    pub(crate) fn release_unused(&mut self, gl: &mut dyn GlBackend, device: &dyn VideoDevice) -> usize {
        let free: Vec<usize> = self.free.iter().copied().collect();
        let mut released = 0;
        for index in free {
            if self.resources[index].texture.is_some() || self.resources[index].surface.is_some() {
                self.release_resources(index, gl, device);
                released += 1;
            }
        }
        released
    }

    /// ### English
    /// Queues a returned picture for fence-gated recycling.
    ///
    /// ### 中文
    /// 将归还的图片加入等待 fence 的回收队列。
    pub(crate) fn queue_return(&mut self, picture: &RenderPicture) {
        if !picture.belongs_to(&self.table) {
            log::warn!("BufferPool: picture {} from another pool dropped", picture.index());
            return;
        }
        let index = picture.index();
        if picture.generation() != self.table.slot(index).generation {
            log::debug!("BufferPool: stale return of picture {index} ignored");
            return;
        }
        if !self.used.contains(&index) {
            log::warn!("BufferPool: returned picture {index} not in use");
            return;
        }
        if !self.sync_pending.contains(&index) {
            self.sync_pending.push_back(index);
        }
    }

    /// ### English
    /// Moves returned pictures whose fence has signaled back to `free`.
    ///
    /// Returns `true` while some fence is still pending. Never blocks.
    ///
    /// #### Parameters
    /// - `use_fence`: Whether recorded fences are polled at all.
    ///
    /// ### 中文
    /// 把 fence 已完成的归还图片移回 `free`。
    ///
    /// 仍有 fence 未完成时返回 `true`。不会阻塞。
    ///
    /// #### 参数
    /// - `use_fence`：是否轮询已记录的 fence。
    pub(crate) fn process_sync(
        &mut self,
        mut gl: Option<&mut (dyn GlBackend + 'static)>,
        use_fence: bool,
    ) -> bool {
        let mut busy = false;
        let mut pending = std::mem::take(&mut self.sync_pending);

        pending.retain(|&index| {
            if use_fence && let Some(gl) = gl.as_deref_mut() {
                let fence = self.table.slot(index).fence;
                if fence != 0 {
                    if !gl.fence_signaled(fence) {
                        busy = true;
                        return true;
                    }
                    gl.delete_fence(fence);
                    self.table.slot(index).fence = 0;
                }
            }

            let Some(pos) = self.used.iter().position(|&i| i == index) else {
                log::error!("BufferPool: picture {index} not found in used queue");
                return false;
            };
            self.used.remove(pos);
            self.free.push_back(index);
            self.table.slot(index).valid = false;
            false
        });

        self.sync_pending = pending;
        busy
    }

    /// ### English
    /// Tears the pool down: waits (bounded) for consumer fences, recycles, invalidates pictures
    /// still in use and destroys every GPU resource.
    ///
    /// Fences still pending at the deadline are deleted anyway and an error is logged.
    ///
    /// ### 中文
    /// 销毁缓冲池：有界等待 consumer fence、执行回收、使仍在使用的图片失效，
    /// 并销毁所有 GPU 资源。
    ///
    /// 截止时间到达时仍未完成的 fence 也会被删除，并记录错误日志。
    pub(crate) fn release(
        &mut self,
        gl: &mut dyn GlBackend,
        device: &dyn VideoDevice,
        use_fence: bool,
        deadline: Duration,
        poll: Duration,
    ) {
        let end = Instant::now() + deadline;
        let mut timed_out = false;

        if use_fence {
            for index in 0..self.size() {
                let fence = std::mem::take(&mut self.table.slot(index).fence);
                if fence == 0 {
                    continue;
                }
                while !gl.fence_signaled(fence) {
                    if Instant::now() >= end {
                        timed_out = true;
                        break;
                    }
                    thread::sleep(poll);
                }
                gl.delete_fence(fence);
            }
        }
        if timed_out {
            log::error!("BufferPool: timeout waiting for consumer fences");
        }

        self.process_sync(None, false);

        for &index in &self.used {
            self.table.slot(index).valid = false;
        }

        for index in 0..self.size() {
            self.release_resources(index, gl, device);
        }
        log::debug!("BufferPool: released {} pictures", self.size());
    }
}

#[cfg(test)]
impl BufferPool {
    pub(crate) fn is_conserved(&self) -> bool {
        let mut seen = vec![0u8; self.size()];
        for &i in self.free.iter().chain(self.used.iter()) {
            seen[i] += 1;
        }
        seen.iter().all(|&n| n == 1) && self.sync_pending.iter().all(|i| self.used.contains(i))
    }

    pub(crate) fn has_resources(&self, index: usize) -> bool {
        self.resources[index].texture.is_some() && self.resources[index].surface.is_some()
    }
}
