//! ### English
//! Fixed-size slot table shared by the output worker and picture holders.
//!
//! The table is sized once when the pool is created and never resized, so a slot is addressed
//! by index; each slot has its own short lock. A slot's `generation` changes every time the
//! worker hands its picture out again, so a handle left over from an earlier hand-out can be
//! told apart from the current one.
//!
//! ### 中文
//! 由输出工作线程与图片持有者共享的定长槽位表。
//!
//! 表在缓冲池创建时定长且不会再调整大小，因此槽位按索引寻址；每个槽位有自己的短锁。
//! 工作线程每次重新发出某个槽位的图片时都会改变其 `generation`，
//! 从而能把上一次发出时遗留的句柄与当前句柄区分开。

use crossbeam_channel as channel;
use parking_lot::{Mutex, MutexGuard};

use super::PictureInfo;
use crate::engine::backend::RenderTexture;
use crate::engine::protocol::DataMessage;

#[derive(Debug, Default)]
pub(crate) struct PictureSlot {
    pub(crate) ref_count: u32,
    pub(crate) generation: u64,
    /// ### English
    /// Consumer fence recorded by `RenderPicture::sync` (`0` = none).
    ///
    /// ### 中文
    /// 由 `RenderPicture::sync` 记录的 consumer fence（`0` = 无）。
    pub(crate) fence: u64,
    pub(crate) valid: bool,
    pub(crate) info: PictureInfo,
    pub(crate) texture: Option<RenderTexture>,
}

pub(crate) struct PictureTable {
    slots: Box<[Mutex<PictureSlot>]>,
    /// ### English
    /// Outbound data port; `release` posts RETURNPIC here.
    ///
    /// ### 中文
    /// 出站数据端口；`release` 会在这里投递 RETURNPIC。
    returns: channel::Sender<DataMessage>,
    pins: Mutex<Pins>,
}

/// ### English
/// Pictures currently held externally (refcount > 0) and the teardown waiting for them.
///
/// ### 中文
/// 当前被外部持有（refcount > 0）的图片数，以及等待它们的销毁动作。
#[derive(Default)]
struct Pins {
    count: usize,
    deferred: Option<Box<dyn FnOnce() + Send>>,
}

impl PictureTable {
    pub(crate) fn new(len: usize, returns: channel::Sender<DataMessage>) -> Self {
        Self {
            slots: (0..len).map(|_| Mutex::new(PictureSlot::default())).collect(),
            returns,
            pins: Mutex::new(Pins::default()),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> MutexGuard<'_, PictureSlot> {
        self.slots[index].lock()
    }

    pub(crate) fn pin(&self) {
        self.pins.lock().count += 1;
    }

    /// ### English
    /// Drops one pin. The last one runs the deferred teardown, if any, outside the lock.
    ///
    /// ### 中文
    /// 释放一个 pin。最后一个 pin 释放时在锁外执行被推迟的销毁动作（如有）。
    pub(crate) fn unpin(&self) {
        let deferred = {
            let mut pins = self.pins.lock();
            let Some(count) = pins.count.checked_sub(1) else {
                return;
            };
            pins.count = count;
            if count > 0 {
                return;
            }
            pins.deferred.take()
        };
        if let Some(teardown) = deferred {
            log::debug!("PictureTable: last picture released, running deferred teardown");
            teardown();
        }
    }

    pub(crate) fn pinned(&self) -> usize {
        self.pins.lock().count
    }

    /// ### English
    /// Runs `teardown` now if nothing is pinned, otherwise when the last pin is dropped.
    ///
    /// Returns `true` if it ran immediately.
    ///
    /// ### 中文
    /// 若没有任何 pin 则立即执行 `teardown`，否则在最后一个 pin 释放时执行。
    ///
    /// 立即执行时返回 `true`。
    pub(crate) fn defer_until_unpinned(&self, teardown: Box<dyn FnOnce() + Send>) -> bool {
        {
            let mut pins = self.pins.lock();
            if pins.count > 0 {
                pins.deferred = Some(teardown);
                return false;
            }
        }
        teardown();
        true
    }

    /// ### English
    /// Posts a RETURNPIC. Returns `false` if the worker side is gone.
    ///
    /// ### 中文
    /// 投递 RETURNPIC。若工作线程一侧已不存在则返回 `false`。
    pub(crate) fn post_return(&self, message: DataMessage) -> bool {
        self.returns.send(message).is_ok()
    }
}
