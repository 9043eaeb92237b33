//! ### English
//! Buffer statistics shared between the decoder facade and the output thread.
//!
//! Both sides read the counters to throttle submission; every access goes through one short
//! critical section.
//!
//! ### 中文
//! 解码器外观层与输出线程共享的缓冲统计。
//!
//! 双方都会读取计数器来节流提交；所有访问都走同一个很短的临界区。

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Counters {
    decoded: u16,
    processed: u16,
    render: u16,
    latency: u64,
    codec_flags: u32,
    can_skip_deint: bool,
}

/// ### English
/// Snapshot of the three in-flight counters.
///
/// ### 中文
/// 三个在途计数器的快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferCounts {
    /// ### English
    /// Frames submitted by the decoder and not yet picked up by a processing cycle.
    ///
    /// ### 中文
    /// 解码器已提交、尚未被处理周期取走的帧数。
    pub decoded: u16,
    /// ### English
    /// Frames inside a processing cycle.
    ///
    /// ### 中文
    /// 处于处理周期中的帧数。
    pub processed: u16,
    /// ### English
    /// Finished pictures sent to the facade and not yet taken.
    ///
    /// ### 中文
    /// 已发往外观层、尚未被取走的成品图片数。
    pub render: u16,
}

/// ### English
/// Lock-guarded counter block (`decoded` / `processed` / `render`, latency and codec flags).
///
/// ### 中文
/// 由锁保护的计数器块（`decoded` / `processed` / `render`、延迟与 codec 标志）。
#[derive(Debug, Default)]
pub struct BufferStats {
    counters: Mutex<Counters>,
}

impl BufferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_decoded(&self) {
        let mut c = self.counters.lock();
        c.decoded = c.decoded.wrapping_add(1);
    }

    pub fn dec_decoded(&self) {
        let mut c = self.counters.lock();
        c.decoded = c.decoded.saturating_sub(1);
    }

    pub fn inc_processed(&self) {
        let mut c = self.counters.lock();
        c.processed = c.processed.wrapping_add(1);
    }

    pub fn dec_processed(&self) {
        let mut c = self.counters.lock();
        c.processed = c.processed.saturating_sub(1);
    }

    pub fn inc_render(&self) {
        let mut c = self.counters.lock();
        c.render = c.render.wrapping_add(1);
    }

    pub fn dec_render(&self) {
        let mut c = self.counters.lock();
        c.render = c.render.saturating_sub(1);
    }

    /// ### English
    /// Clears the in-flight counters and latency (codec flags and commands are kept).
    ///
    /// ### 中文
    /// 清零在途计数器与延迟（保留 codec 标志与命令）。
    pub fn reset(&self) {
        let mut c = self.counters.lock();
        c.decoded = 0;
        c.processed = 0;
        c.render = 0;
        c.latency = 0;
    }

    pub fn get(&self) -> BufferCounts {
        let c = self.counters.lock();
        BufferCounts {
            decoded: c.decoded,
            processed: c.processed,
            render: c.render,
        }
    }

    pub fn set_params(&self, latency: u64, codec_flags: u32) {
        let mut c = self.counters.lock();
        c.latency = latency;
        c.codec_flags = codec_flags;
    }

    /// ### English
    /// Returns `(latency, codec_flags)`.
    ///
    /// ### 中文
    /// 返回 `(latency, codec_flags)`。
    pub fn params(&self) -> (u64, u32) {
        let c = self.counters.lock();
        (c.latency, c.codec_flags)
    }

    pub fn set_can_skip_deint(&self, can_skip: bool) {
        self.counters.lock().can_skip_deint = can_skip;
    }

    pub fn can_skip_deint(&self) -> bool {
        self.counters.lock().can_skip_deint
    }
}
