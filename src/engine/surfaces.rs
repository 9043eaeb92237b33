//! ### English
//! Decode-surface registry: usage flags per hardware surface plus an ordered free list.
//!
//! A surface is free only when neither `REFERENCE` (held by the codec) nor `RENDER` (held by
//! the output stage) is set. The free list is ordered by release time so `get_free` hands out
//! the least-recently-freed surface.
//!
//! ### 中文
//! 解码 surface 登记表：记录每个硬件 surface 的使用标志，并维护有序的空闲列表。
//!
//! 只有当 `REFERENCE`（codec 持有）和 `RENDER`（输出阶段持有）都未置位时 surface 才空闲。
//! 空闲列表按释放时间排序，因此 `get_free` 会返回最早释放的 surface。

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use super::backend::SurfaceId;

/// ### English
/// Surface is referenced by the codec (reference frame or being decoded into).
///
/// ### 中文
/// surface 被 codec 引用（参考帧或正在解码写入）。
pub const SURFACE_USED_FOR_REFERENCE: u8 = 0x01;

/// ### English
/// Surface is queued for, or held by, the output stage.
///
/// ### 中文
/// surface 正在排队等待输出阶段处理，或被输出阶段持有。
pub const SURFACE_USED_FOR_RENDER: u8 = 0x02;

#[derive(Debug, Default)]
struct Surfaces {
    state: BTreeMap<SurfaceId, u8>,
    free: VecDeque<SurfaceId>,
}

impl Surfaces {
    fn remove_from_free(&mut self, surface: SurfaceId) -> bool {
        match self.free.iter().position(|&s| s == surface) {
            Some(pos) => {
                self.free.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Clears `mask`; a surface whose flags drop to zero goes to the back of the free list.
    fn clear_flag(&mut self, surface: SurfaceId, mask: u8, op: &str) {
        let Some(flags) = self.state.get_mut(&surface) else {
            log::warn!("SurfaceRegistry::{op} - surface {surface:?} invalid");
            return;
        };
        let before = *flags;
        *flags &= !mask;
        if before != 0 && *flags == 0 {
            self.free.push_back(surface);
        }
    }
}

/// ### English
/// Thread-safe registry of decode surfaces and their usage flags.
///
/// Each method is atomic on its own; sequences of calls are not.
///
/// ### 中文
/// 线程安全的解码 surface 登记表及其使用标志。
///
/// 单个方法是原子的；多次调用组成的序列则不是。
#[derive(Debug, Default)]
pub struct SurfaceRegistry {
    inner: Mutex<Surfaces>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ### English
    /// Registers a freshly allocated surface as free with cleared flags.
    ///
    /// Registering the same surface twice is a programming error; it is logged and ignored.
    ///
    /// ### 中文
    /// 将新分配的 surface 登记为空闲，标志清零。
    ///
    /// 重复登记同一 surface 属于编程错误；会记录日志并忽略。
    pub fn add_surface(&self, surface: SurfaceId) {
        let mut inner = self.inner.lock();
        if inner.state.contains_key(&surface) {
            log::error!("SurfaceRegistry::add_surface - surface {surface:?} already registered");
            debug_assert!(false, "surface {surface:?} registered twice");
            return;
        }
        inner.state.insert(surface, 0);
        inner.free.push_back(surface);
    }

    /// ### English
    /// Clears `REFERENCE`; the surface becomes free if no flag remains.
    ///
    /// ### 中文
    /// 清除 `REFERENCE`；若不再有任何标志则 surface 变为空闲。
    pub fn clear_reference(&self, surface: SurfaceId) {
        self.inner
            .lock()
            .clear_flag(surface, SURFACE_USED_FOR_REFERENCE, "clear_reference");
    }

    /// ### English
    /// Sets `RENDER` and takes the surface off the free list.
    ///
    /// Returns `false` for unknown surfaces.
    ///
    /// ### 中文
    /// 设置 `RENDER` 并把 surface 从空闲列表移除。
    ///
    /// 未知 surface 返回 `false`。
    pub fn mark_render(&self, surface: SurfaceId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.contains_key(&surface) {
            log::warn!("SurfaceRegistry::mark_render - surface {surface:?} invalid");
            return false;
        }
        inner.remove_from_free(surface);
        if let Some(flags) = inner.state.get_mut(&surface) {
            *flags |= SURFACE_USED_FOR_RENDER;
        }
        true
    }

    /// ### English
    /// Clears `RENDER`; the surface becomes free if no flag remains.
    ///
    /// ### 中文
    /// 清除 `RENDER`；若不再有任何标志则 surface 变为空闲。
    pub fn clear_render(&self, surface: SurfaceId) {
        self.inner
            .lock()
            .clear_flag(surface, SURFACE_USED_FOR_RENDER, "clear_render");
    }

    pub fn is_valid(&self, surface: SurfaceId) -> bool {
        self.inner.lock().state.contains_key(&surface)
    }

    /// ### English
    /// Current flags of a surface, `None` if unknown.
    ///
    /// ### 中文
    /// surface 当前的标志；未知时返回 `None`。
    pub fn flags(&self, surface: SurfaceId) -> Option<u8> {
        self.inner.lock().state.get(&surface).copied()
    }

    /// ### English
    /// Hands out a free surface and marks it `REFERENCE`.
    ///
    /// `preferred` wins if it is currently free; otherwise the front of the free list is used.
    /// `None` means every surface is busy, which callers treat as backpressure.
    ///
    /// #### Parameters
    /// - `preferred`: Surface the codec would like to reuse.
    ///
    /// ### 中文
    /// 取出一个空闲 surface 并标记为 `REFERENCE`。
    ///
    /// 若 `preferred` 当前空闲则优先返回它；否则使用空闲列表队首。
    /// 返回 `None` 表示所有 surface 都在使用中，调用方应视为背压。
    ///
    /// #### 参数
    /// - `preferred`：codec 希望复用的 surface。
    pub fn get_free(&self, preferred: Option<SurfaceId>) -> Option<SurfaceId> {
        let mut inner = self.inner.lock();

        if let Some(surface) = preferred
            && inner.state.contains_key(&surface)
        {
            if inner.remove_from_free(surface) {
                inner.state.insert(surface, SURFACE_USED_FOR_REFERENCE);
                return Some(surface);
            }
            log::warn!("SurfaceRegistry::get_free - surface {surface:?} not free");
        }

        let surface = inner.free.pop_front()?;
        inner.state.insert(surface, SURFACE_USED_FOR_REFERENCE);
        Some(surface)
    }

    /// ### English
    /// Removes and forgets one surface so the caller can destroy it.
    ///
    /// With `skip_render`, surfaces still flagged `RENDER` are left alone.
    ///
    /// ### 中文
    /// 移除并遗忘一个 surface，供调用方销毁。
    ///
    /// 当 `skip_render` 为真时，仍带有 `RENDER` 标志的 surface 会被跳过。
    pub fn remove_next(&self, skip_render: bool) -> Option<SurfaceId> {
        let mut inner = self.inner.lock();
        let surface = inner
            .state
            .iter()
            .find(|&(_, &flags)| !(skip_render && flags & SURFACE_USED_FOR_RENDER != 0))
            .map(|(&surface, _)| surface)?;
        inner.state.remove(&surface);
        inner.remove_from_free(surface);
        Some(surface)
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.free.clear();
        inner.state.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().state.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ids: &[u32]) -> SurfaceRegistry {
        let registry = SurfaceRegistry::new();
        for &id in ids {
            registry.add_surface(SurfaceId(id));
        }
        registry
    }

    #[test]
    fn get_free_prefers_requested_surface() {
        let registry = registry(&[1, 2, 3]);
        assert_eq!(registry.get_free(Some(SurfaceId(3))), Some(SurfaceId(3)));
        assert_eq!(registry.flags(SurfaceId(3)), Some(SURFACE_USED_FOR_REFERENCE));
        assert_eq!(registry.get_free(None), Some(SurfaceId(1)));
    }

    #[test]
    fn get_free_falls_back_when_preferred_busy() {
        let registry = registry(&[1, 2]);
        assert_eq!(registry.get_free(None), Some(SurfaceId(1)));
        assert_eq!(registry.get_free(Some(SurfaceId(1))), Some(SurfaceId(2)));
        assert_eq!(registry.get_free(None), None);
    }

    #[test]
    fn surface_not_handed_out_twice_until_fully_freed() {
        let registry = registry(&[1]);
        let surface = registry.get_free(None).unwrap();
        assert!(registry.mark_render(surface));
        assert_eq!(registry.get_free(None), None);

        registry.clear_reference(surface);
        assert_eq!(registry.get_free(None), None);

        registry.clear_render(surface);
        assert_eq!(registry.get_free(None), Some(surface));
    }

    #[test]
    fn least_recently_freed_comes_first() {
        let registry = registry(&[1, 2]);
        let a = registry.get_free(None).unwrap();
        let b = registry.get_free(None).unwrap();
        registry.clear_reference(b);
        registry.clear_reference(a);
        assert_eq!(registry.get_free(None), Some(b));
        assert_eq!(registry.get_free(None), Some(a));
    }

    #[test]
    fn clear_reference_on_free_surface_is_noop() {
        let registry = registry(&[1, 2]);
        registry.clear_reference(SurfaceId(1));
        registry.clear_reference(SurfaceId(1));
        assert_eq!(registry.free_count(), 2);
        assert_eq!(registry.flags(SurfaceId(1)), Some(0));
    }

    #[test]
    fn mark_then_clear_render_restores_membership() {
        let registry = registry(&[1, 2]);
        let held = registry.get_free(None).unwrap();

        assert!(registry.mark_render(SurfaceId(2)));
        assert_eq!(registry.free_count(), 0);
        registry.clear_render(SurfaceId(2));
        assert_eq!(registry.free_count(), 1);
        assert_eq!(registry.flags(SurfaceId(2)), Some(0));

        assert!(registry.mark_render(held));
        registry.clear_render(held);
        assert_eq!(registry.flags(held), Some(SURFACE_USED_FOR_REFERENCE));
        assert_eq!(registry.free_count(), 1);
    }

    #[test]
    fn unknown_surface_is_ignored() {
        let registry = registry(&[1]);
        assert!(!registry.mark_render(SurfaceId(9)));
        registry.clear_render(SurfaceId(9));
        registry.clear_reference(SurfaceId(9));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.free_count(), 1);
    }

    #[test]
    fn remove_next_skips_render_flagged() {
        let registry = registry(&[1, 2, 3]);
        registry.mark_render(SurfaceId(1));
        registry.mark_render(SurfaceId(3));

        assert_eq!(registry.remove_next(true), Some(SurfaceId(2)));
        assert_eq!(registry.remove_next(true), None);
        assert_eq!(registry.remove_next(false), Some(SurfaceId(1)));
        assert_eq!(registry.remove_next(false), Some(SurfaceId(3)));
        assert!(registry.is_empty());
        assert_eq!(registry.free_count(), 0);
    }
}
