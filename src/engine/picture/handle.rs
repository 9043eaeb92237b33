//! ### English
//! `RenderPicture` handle and its RAII guard.
//!
//! ### 中文
//! `RenderPicture` 句柄及其 RAII guard。

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::MutexGuard;

use super::table::PictureSlot;
use super::{PictureInfo, PictureTable};
use crate::engine::backend::RenderTexture;
use crate::engine::protocol::DataMessage;

/// ### English
/// Borrowed handle to one pooled render picture.
///
/// Receiving a picture from the output does not take a reference. Presentation code calls
/// `acquire` before using the texture and exactly one `release` per `acquire`; the last
/// release hands the picture back to the output worker for fence-gated recycling. A picture
/// that was received but never acquired goes back through `return_unused`.
///
/// A handle is tied to one hand-out of its slot. Once the slot has been recycled and handed
/// out again, the old handle is stale: reference operations on it are logged and ignored.
///
/// ### 中文
/// 指向一个池化渲染图片的借用句柄。
///
/// 从输出端收到图片并不会持有引用。呈现代码在使用纹理前调用 `acquire`，
/// 并且每次 `acquire` 对应恰好一次 `release`；最后一次 release 会把图片交还输出工作线程，
/// 由 fence 决定何时回收。收到但从未 acquire 的图片通过 `return_unused` 归还。
///
/// 句柄绑定到其槽位的某一次发出。槽位被回收并再次发出后，旧句柄即失效：
/// 对其进行的引用操作会被记录并忽略。
#[derive(Clone)]
pub struct RenderPicture {
    pub(crate) index: usize,
    pub(crate) generation: u64,
    pub(crate) table: Arc<PictureTable>,
}

impl RenderPicture {
    pub(crate) fn new(index: usize, generation: u64, table: Arc<PictureTable>) -> Self {
        Self {
            index,
            generation,
            table,
        }
    }

    /// ### English
    /// Locks the slot if this handle still refers to its current occupant.
    ///
    /// ### 中文
    /// 若该句柄仍指向槽位的当前占用者，则锁定该槽位。
    fn current_slot(&self, operation: &str) -> Option<MutexGuard<'_, PictureSlot>> {
        let slot = self.table.slot(self.index);
        if slot.generation != self.generation {
            log::debug!(
                "RenderPicture::{operation} - stale handle for picture {} (generation {}, now {})",
                self.index,
                self.generation,
                slot.generation
            );
            return None;
        }
        Some(slot)
    }

    /// ### English
    /// Index of this picture in its pool.
    ///
    /// ### 中文
    /// 该图片在缓冲池中的索引。
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// ### English
    /// Takes one reference. The first reference pins the owning pipeline.
    ///
    /// ### 中文
    /// 增加一个引用。第一个引用会 pin 住所属管线。
    pub fn acquire(&self) {
        let Some(mut slot) = self.current_slot("acquire") else {
            return;
        };
        slot.ref_count += 1;
        if slot.ref_count == 1 {
            self.table.pin();
        }
    }

    /// ### English
    /// Drops one reference; returns the remaining count.
    ///
    /// Extra releases and releases through a stale handle are logged and ignored; the count
    /// never goes below zero.
    ///
    /// ### 中文
    /// 释放一个引用；返回剩余计数。
    ///
    /// 多余的 release 以及通过失效句柄的 release 会被记录并忽略；计数永远不会小于零。
    pub fn release(&self) -> u32 {
        let remaining = {
            let Some(mut slot) = self.current_slot("release") else {
                return 0;
            };
            if slot.ref_count == 0 {
                log::warn!("RenderPicture::release - picture {} not acquired", self.index);
                return 0;
            }
            slot.ref_count -= 1;
            slot.ref_count
        };

        if remaining == 0 {
            self.post_return();
            self.table.unpin();
        }
        remaining
    }

    /// ### English
    /// Sends the picture back if nobody holds a reference.
    ///
    /// ### 中文
    /// 若没有任何引用则把图片送回。
    pub fn return_unused(&self) {
        let unused = self
            .current_slot("return_unused")
            .is_some_and(|slot| slot.ref_count == 0);
        if unused {
            self.post_return();
        }
    }

    /// ### English
    /// Records the consumer fence issued after sampling the texture.
    ///
    /// A previously recorded fence that the worker has not consumed yet is handed back, so the
    /// caller can delete it on its own GL context. A stale handle records nothing and hands
    /// `fence` straight back.
    ///
    /// ### 中文
    /// 记录在采样纹理之后发出的 consumer fence。
    ///
    /// 若之前记录的 fence 尚未被工作线程处理，则将其交还给调用方，
    /// 以便调用方在自己的 GL 上下文中删除。失效句柄不会记录任何 fence，而是直接交还 `fence`。
    pub fn sync(&self, fence: u64) -> Option<u64> {
        let Some(mut slot) = self.current_slot("sync") else {
            return (fence != 0).then_some(fence);
        };
        let previous = std::mem::replace(&mut slot.fence, fence);
        (previous != 0).then_some(previous)
    }

    pub fn ref_count(&self) -> u32 {
        self.table.slot(self.index).ref_count
    }

    pub fn is_valid(&self) -> bool {
        self.table.slot(self.index).valid
    }

    pub fn info(&self) -> PictureInfo {
        self.table.slot(self.index).info
    }

    pub fn texture(&self) -> Option<RenderTexture> {
        self.table.slot(self.index).texture
    }

    /// ### English
    /// Acquires and wraps the picture in a guard that releases on drop.
    ///
    /// ### 中文
    /// acquire 并用 guard 包装，guard 在 drop 时 release。
    pub fn guard(&self) -> PictureGuard {
        self.acquire();
        PictureGuard {
            picture: self.clone(),
        }
    }

    /// ### English
    /// Whether the slot still holds the hand-out this handle was created for.
    ///
    /// ### 中文
    /// 槽位是否仍是创建该句柄时的那一次发出。
    pub fn is_current(&self) -> bool {
        self.table.slot(self.index).generation == self.generation
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub(crate) fn belongs_to(&self, table: &Arc<PictureTable>) -> bool {
        Arc::ptr_eq(&self.table, table)
    }

    fn post_return(&self) {
        if !self
            .table
            .post_return(DataMessage::ReturnPic(self.clone()))
        {
            log::warn!(
                "RenderPicture - output gone, picture {} not returned",
                self.index
            );
        }
    }
}

impl PartialEq for RenderPicture {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.generation == other.generation
            && Arc::ptr_eq(&self.table, &other.table)
    }
}

impl Eq for RenderPicture {}

impl fmt::Debug for RenderPicture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPicture")
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// ### English
/// Holds one reference to a `RenderPicture` and releases it on drop.
///
/// ### 中文
/// 持有 `RenderPicture` 的一个引用，并在 drop 时释放。
pub struct PictureGuard {
    picture: RenderPicture,
}

impl Deref for PictureGuard {
    type Target = RenderPicture;

    fn deref(&self) -> &RenderPicture {
        &self.picture
    }
}

impl Drop for PictureGuard {
    fn drop(&mut self) {
        self.picture.release();
    }
}
