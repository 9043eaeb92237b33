//! ### English
//! Configuration bundles for the output actor and the decoder facade.
//!
//! ### 中文
//! 输出 actor 与解码器外观层的配置包。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dpi::PhysicalSize;

use super::backend::GlFactory;
use super::stats::BufferStats;
use super::surfaces::SurfaceRegistry;

/// ### English
/// Number of render pictures in the pool.
///
/// ### 中文
/// 缓冲池中渲染图片的数量。
pub const DEFAULT_POOL_SIZE: usize = 7;

/// ### English
/// Extra decode surfaces allocated on top of the codec's reference frames.
///
/// ### 中文
/// 在 codec 参考帧数量之外额外分配的解码 surface 数。
pub const EXTRA_DECODE_SURFACES: u32 = 5;

/// ### English
/// Worker and request timeouts.
///
/// ### 中文
/// 工作线程与请求的超时设置。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    /// ### English
    /// Event-wait timeout right after the worker starts (before INIT).
    ///
    /// ### 中文
    /// 工作线程启动后（INIT 之前）的事件等待超时。
    pub initial: Duration,
    /// ### English
    /// Idle tick when nothing is pending.
    ///
    /// ### 中文
    /// 无待处理内容时的空闲 tick。
    pub idle: Duration,
    /// ### English
    /// Tick while returned pictures are still waiting on their fences.
    ///
    /// ### 中文
    /// 归还的图片仍在等待 fence 时的 tick。
    pub busy: Duration,
    /// ### English
    /// Overall deadline for fence polling during teardown.
    ///
    /// ### 中文
    /// 销毁期间 fence 轮询的总截止时间。
    pub fence_deadline: Duration,
    /// ### English
    /// Sleep between fence polls during teardown.
    ///
    /// ### 中文
    /// 销毁期间两次 fence 轮询之间的休眠。
    pub fence_poll: Duration,
    /// ### English
    /// Bound for synchronous control requests and for the facade's inbound wait.
    ///
    /// ### 中文
    /// 同步控制请求以及外观层入站等待的上限。
    pub request: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            idle: Duration::from_millis(100),
            busy: Duration::from_millis(10),
            fence_deadline: Duration::from_millis(1000),
            fence_poll: Duration::from_millis(5),
            request: Duration::from_millis(2000),
        }
    }
}

/// ### English
/// Settings used when spawning an output actor.
///
/// ### 中文
/// 启动输出 actor 时使用的设置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSettings {
    pub pool_size: usize,
    pub timings: Timings,
    pub thread_name: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            timings: Timings::default(),
            thread_name: "hwdec-output".to_string(),
        }
    }
}

/// ### English
/// Settings for the decoder facade.
///
/// ### 中文
/// 解码器外观层的设置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderSettings {
    pub output: OutputSettings,
    /// ### English
    /// How long `check()` waits for a display reset after the device was lost.
    ///
    /// ### 中文
    /// 设备丢失后 `check()` 等待显示重置的时长。
    pub reset_wait: Duration,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            output: OutputSettings::default(),
            reset_wait: Duration::from_millis(4000),
        }
    }
}

/// ### English
/// Immutable snapshot installed by INIT.
///
/// Replaced only by a full re-initialisation of the output actor.
///
/// ### 中文
/// 由 INIT 安装的不可变快照。
///
/// 只有完整重新初始化输出 actor 时才会被替换。
#[derive(Clone)]
pub struct PipelineConfig {
    /// ### English
    /// Coded video size; processed frames report this size.
    ///
    /// ### 中文
    /// 编码视频尺寸；处理后的帧报告此尺寸。
    pub video_size: PhysicalSize<u32>,
    /// ### English
    /// Size of the render textures and default crop rectangle.
    ///
    /// ### 中文
    /// 渲染纹理尺寸，以及默认裁剪矩形。
    pub output_size: PhysicalSize<u32>,
    /// ### English
    /// Size of the hardware decode surfaces.
    ///
    /// ### 中文
    /// 硬件解码 surface 的尺寸。
    pub surface_size: PhysicalSize<u32>,
    pub max_references: u32,
    pub surfaces: Arc<SurfaceRegistry>,
    pub stats: Arc<BufferStats>,
    /// ### English
    /// Creates the GL context on the worker thread.
    ///
    /// ### 中文
    /// 在工作线程上创建 GL 上下文。
    pub gl_factory: GlFactory,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("video_size", &self.video_size)
            .field("output_size", &self.output_size)
            .field("surface_size", &self.surface_size)
            .field("max_references", &self.max_references)
            .field("surfaces", &self.surfaces.len())
            .finish_non_exhaustive()
    }
}
