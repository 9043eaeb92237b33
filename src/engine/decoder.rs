//! ### English
//! Decoder facade: owns the decode surfaces and the output actor, and drives both from the
//! codec thread.
//!
//! The codec asks for surfaces with `get_buffer`, hands finished frames to `decode`, and shows
//! whatever `picture` returns after a `PICTURE` status.
//!
//! ### 中文
//! 解码器外观层：持有解码 surface 与输出 actor，并在 codec 线程上驱动二者。
//!
//! codec 通过 `get_buffer` 申请 surface，把完成的帧交给 `decode`，
//! 并在得到 `PICTURE` 状态后显示 `picture` 返回的内容。

mod display;


use std::sync::Arc;

use dpi::PhysicalSize;

use super::backend::{GlFactory, SurfaceId, VideoDevice};
use super::config::{DecoderSettings, EXTRA_DECODE_SURFACES, PipelineConfig};
use super::error::{BackendError, OutputError};
use super::flags::{DecodeStatus, PICTURE_FLAG_DRAIN, PICTURE_FLAG_NO_POSTPROC};
use super::output::Output;
use super::picture::{DecodedPicture, RenderPicture};
use super::protocol::ControlReply;
use super::stats::{BufferCounts, BufferStats};
use super::surfaces::SurfaceRegistry;

use display::Display;
pub use display::{DisplayNotifier, DisplayState};

/// ### English
/// Reference frames the codec may keep besides the frame being decoded.
///
/// ### 中文
/// 除正在解码的帧外，codec 可保留的参考帧数量。
const ALLOWED_REFERENCES: u32 = 5;

/// ### English
/// Frames kept in flight before `decode` starts waiting for output.
///
/// ### 中文
/// `decode` 开始等待输出之前保持在途的帧数。
const IN_FLIGHT_FRAMES: u16 = 3;

/// ### English
/// Consecutive backend failures tolerated before the display is declared broken.
///
/// ### 中文
/// 判定显示损坏之前可容忍的连续后端失败次数。
const MAX_BACKEND_ERRORS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    Mpeg2,
    Mpeg4,
    H263,
    Vc1,
    Wmv3,
}

/// ### English
/// Stream parameters the decoder is opened with.
///
/// ### 中文
/// 打开解码器时使用的码流参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub size: PhysicalSize<u32>,
    pub codec: Codec,
    /// ### English
    /// Reference frames announced by the stream (only meaningful for H.264).
    ///
    /// ### 中文
    /// 码流声明的参考帧数（仅对 H.264 有意义）。
    pub refs: u32,
}

impl StreamInfo {
    fn max_references(&self) -> u32 {
        match self.codec {
            Codec::H264 => self.refs.clamp(5, 16),
            _ => 2,
        }
    }
}

/// ### English
/// Hardware decoder front end.
///
/// ### 中文
/// 硬件解码器前端。
pub struct Decoder {
    device: Arc<dyn VideoDevice>,
    gl_factory: GlFactory,
    settings: DecoderSettings,
    surfaces: Arc<SurfaceRegistry>,
    stats: Arc<BufferStats>,
    display: Arc<Display>,
    output: Option<Output>,
    stream: Option<StreamInfo>,
    max_references: u32,
    present: Option<RenderPicture>,
    codec_control: u32,
    error_count: u32,
}

impl Decoder {
    /// ### English
    /// Creates an idle decoder. Nothing is allocated before `open`.
    ///
    /// #### Parameters
    /// - `device`: Hardware video display context.
    /// - `gl_factory`: Creates the GL context on the output thread.
    /// - `settings`: Output settings and the display reset wait.
    ///
    /// ### 中文
    /// 创建一个空闲的解码器。`open` 之前不会分配任何资源。
    ///
    /// #### 参数
    /// - `device`：硬件视频显示上下文。
    /// - `gl_factory`：在输出线程上创建 GL 上下文。
    /// - `settings`：输出设置与显示重置等待时长。
    pub fn new(
        device: Arc<dyn VideoDevice>,
        gl_factory: GlFactory,
        settings: DecoderSettings,
    ) -> Self {
        Self {
            device,
            gl_factory,
            settings,
            surfaces: Arc::new(SurfaceRegistry::new()),
            stats: Arc::new(BufferStats::new()),
            display: Arc::new(Display::default()),
            output: None,
            stream: None,
            max_references: 0,
            present: None,
            codec_control: 0,
            error_count: 0,
        }
    }

    pub fn notifier(&self) -> DisplayNotifier {
        DisplayNotifier {
            display: self.display.clone(),
        }
    }

    pub fn display_state(&self) -> DisplayState {
        self.display.state()
    }

    /// ### English
    /// Allocates decode surfaces for `stream` and brings the output pipeline up.
    ///
    /// ### 中文
    /// 为 `stream` 分配解码 surface 并启动输出管线。
    pub fn open(&mut self, stream: StreamInfo) -> Result<(), OutputError> {
        log::debug!("Decoder: open {stream:?}");
        self.close();

        self.max_references = stream.max_references();
        self.stream = Some(stream);
        self.present = None;
        self.display.set(DisplayState::Open);
        self.configure()
    }

    fn configure(&mut self) -> Result<(), OutputError> {
        let Some(stream) = self.stream else {
            return Err(OutputError::NotConfigured);
        };

        let count = self.max_references + EXTRA_DECODE_SURFACES;
        let created = self.device.create_surfaces(stream.size, count);
        let surfaces = self.check_success(created)?;
        for surface in surfaces {
            self.surfaces.add_surface(surface);
        }

        self.stats.reset();
        let started = Output::start(self.device.clone(), self.settings.output.clone())
            .and_then(|output| {
                output.init(PipelineConfig {
                    video_size: stream.size,
                    output_size: stream.size,
                    surface_size: stream.size,
                    max_references: self.max_references,
                    surfaces: self.surfaces.clone(),
                    stats: self.stats.clone(),
                    gl_factory: self.gl_factory.clone(),
                })?;
                Ok(output)
            });

        match started {
            Ok(output) => {
                log::info!(
                    "Decoder: configured {}x{} with {count} surfaces",
                    stream.size.width,
                    stream.size.height
                );
                self.output = Some(output);
                self.error_count = 0;
                Ok(())
            }
            Err(err) => {
                log::error!("Decoder: failed to init output: {err}");
                self.destroy_surfaces();
                Err(err)
            }
        }
    }

    fn check_success<T>(&mut self, result: Result<T, BackendError>) -> Result<T, BackendError> {
        match result {
            Ok(value) => {
                self.error_count = 0;
                Ok(value)
            }
            Err(err) => {
                log::error!("Decoder: {err}");
                self.error_count += 1;
                if self.error_count > MAX_BACKEND_ERRORS
                    && self.display.state() == DisplayState::Open
                {
                    self.display.set(DisplayState::Error);
                }
                Err(err)
            }
        }
    }

    fn destroy_surfaces(&mut self) {
        let mut destroyed = 0usize;
        while let Some(surface) = self.surfaces.remove_next(false) {
            self.device.destroy_surface(surface);
            destroyed += 1;
        }
        self.surfaces.reset();
        log::debug!("Decoder: destroyed {destroyed} decode surfaces");
    }

    /// ### English
    /// Drops the output and the decode surfaces. Render pictures still held by presentation
    /// keep their textures until released; they never reference a decode surface.
    ///
    /// ### 中文
    /// 释放输出与解码 surface。呈现层仍持有的渲染图片在 release 之前保留其纹理；
    /// 它们从不引用解码 surface。
    fn fini_output(&mut self) {
        if let Some(present) = self.present.take() {
            present.return_unused();
        }
        let Some(mut output) = self.output.take() else {
            return;
        };
        output.dispose();
        self.destroy_surfaces();
    }

    /// ### English
    /// Codec buffer request. Refused while the display is recovering or nothing is free.
    ///
    /// #### Parameters
    /// - `preferred`: Surface the codec would like to reuse.
    ///
    /// ### 中文
    /// codec 申请缓冲。显示恢复期间或没有空闲 surface 时拒绝。
    ///
    /// #### 参数
    /// - `preferred`：codec 希望复用的 surface。
    pub fn get_buffer(&self, preferred: Option<SurfaceId>) -> Option<SurfaceId> {
        if self.display.state() != DisplayState::Open {
            log::warn!("Decoder::get_buffer - awaiting recovery");
            return None;
        }
        let surface = self.surfaces.get_free(preferred);
        if surface.is_none() {
            log::error!("Decoder::get_buffer - no surface available");
        }
        surface
    }

    pub fn release_buffer(&self, surface: SurfaceId) {
        self.surfaces.clear_reference(surface);
    }

    /// ### English
    /// Keeps the codec flags relevant to output (`DRAIN`, `NO_POSTPROC`).
    ///
    /// ### 中文
    /// 保留与输出相关的 codec 标志（`DRAIN`、`NO_POSTPROC`）。
    pub fn set_codec_control(&mut self, flags: u32) {
        self.codec_control = flags & (PICTURE_FLAG_DRAIN | PICTURE_FLAG_NO_POSTPROC);
    }

    /// ### English
    /// Submits a decoded frame (if any) and reports what the codec should do next.
    ///
    /// `BUFFER` asks for more input, `PICTURE` means `picture` has something new. A pipeline
    /// that stays silent for the request timeout is treated as broken.
    ///
    /// ### 中文
    /// 提交一个解码帧（若有），并告知 codec 接下来该做什么。
    ///
    /// `BUFFER` 表示需要更多输入，`PICTURE` 表示 `picture` 有新内容。
    /// 管线在请求超时内毫无响应则视为损坏。
    pub fn decode(&mut self, frame: Option<DecodedPicture>) -> DecodeStatus {
        let checked = self.check();
        if !checked.is_empty() {
            return checked;
        }
        let Some(output) = self.output.as_ref() else {
            return DecodeStatus::ERROR;
        };

        if let Some(frame) = frame {
            // codecs that never flush may hand back a surface from before a reconfigure
            if !self.surfaces.mark_render(frame.surface) {
                log::warn!("Decoder::decode - ignoring invalid surface {:?}", frame.surface);
                return DecodeStatus::BUFFER;
            }
            self.stats.inc_decoded();
            output.submit_frame(frame);
        }

        let mut status = DecodeStatus::empty();
        while let Some(reply) = output.try_receive_control() {
            if reply == ControlReply::Error {
                self.display.set(DisplayState::Error);
                status |= DecodeStatus::ERROR;
            }
        }

        let wants_input = |counts: BufferCounts| {
            counts.decoded < IN_FLIGHT_FRAMES && counts.processed < IN_FLIGHT_FRAMES
        };
        let mut counts = self.stats.get();

        while status.is_empty() {
            if wants_input(counts) {
                status |= DecodeStatus::BUFFER;
            } else if let Some(picture) = output.try_receive_picture() {
                if let Some(previous) = self.present.replace(picture) {
                    previous.return_unused();
                }
                self.stats.dec_render();
                status |= DecodeStatus::PICTURE;
                break;
            } else if let Some(reply) = output.try_receive_control() {
                if reply == ControlReply::Stats {
                    counts = self.stats.get();
                } else {
                    self.display.set(DisplayState::Error);
                    status |= DecodeStatus::ERROR;
                }
            }

            if wants_input(counts) {
                status |= DecodeStatus::BUFFER;
            }

            if status.is_empty() && !output.wait_for_message(output.request_timeout()) {
                break;
            }
        }

        if status.contains(DecodeStatus::PICTURE) {
            self.stats.set_params(0, self.codec_control);
        }

        if status.is_empty() {
            log::error!("Decoder::decode - timed out waiting for output message");
            self.display.set(DisplayState::Error);
            status |= DecodeStatus::ERROR;
        }
        status
    }

    /// ### English
    /// Recovers from a lost, reset or failed display by rebuilding the output pipeline.
    ///
    /// Returns `FLUSHED` after a reset, `ERROR` after a failure, empty when nothing was wrong.
    ///
    /// ### 中文
    /// 通过重建输出管线，从显示丢失、重置或失败中恢复。
    ///
    /// 重置后返回 `FLUSHED`，失败后返回 `ERROR`，一切正常时返回空。
    pub fn check(&mut self) -> DecodeStatus {
        let mut state = self.display.state();

        if state == DisplayState::Lost {
            log::info!("Decoder::check - waiting for display reset");
            state = match self.display.wait_while_lost(self.settings.reset_wait) {
                Some(state) => state,
                None => {
                    log::error!("Decoder::check - display did not reset in time");
                    DisplayState::Reset
                }
            };
        }

        if !matches!(state, DisplayState::Reset | DisplayState::Error) {
            return DecodeStatus::empty();
        }

        self.fini_output();
        match self.configure() {
            Ok(()) => self.display.set(DisplayState::Open),
            Err(err) => log::error!("Decoder::check - reconfigure failed: {err}"),
        }

        if state == DisplayState::Reset {
            DecodeStatus::FLUSHED
        } else {
            DecodeStatus::ERROR
        }
    }

    /// ### English
    /// The picture to present after a `PICTURE` status. Acquire it before keeping it.
    ///
    /// ### 中文
    /// 得到 `PICTURE` 状态后要呈现的图片。长期持有前需先 acquire。
    pub fn picture(&self) -> Option<RenderPicture> {
        if self.display.state() != DisplayState::Open {
            return None;
        }
        self.present.clone()
    }

    /// ### English
    /// Seek / discontinuity: drops everything queued in the output pipeline.
    ///
    /// ### 中文
    /// seek / 不连续：丢弃输出管线中排队的所有内容。
    pub fn reset(&mut self) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        match output.flush() {
            Ok(()) => self.stats.reset(),
            Err(err) => {
                log::error!("Decoder::reset - flush failed: {err}");
                self.display.set(DisplayState::Error);
            }
        }
    }

    /// ### English
    /// Gives resources back early so another decoder can start while pictures are still shown.
    ///
    /// Surfaces still flagged `RENDER` survive until `close`.
    ///
    /// ### 中文
    /// 提前归还资源，使另一个解码器可以在图片仍在显示时启动。
    ///
    /// 仍带有 `RENDER` 标志的 surface 会保留到 `close`。
    pub fn release(&mut self) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        log::info!("Decoder::release - pre-cleanup");
        if let Err(err) = output.pre_cleanup() {
            log::error!("Decoder::release - pre-cleanup failed: {err}");
            self.display.set(DisplayState::Error);
        }

        while let Some(surface) = self.surfaces.remove_next(true) {
            self.device.destroy_surface(surface);
        }
    }

    pub fn close(&mut self) {
        if self.output.is_some() {
            log::info!("Decoder: close");
        }
        self.fini_output();
    }

    pub fn allowed_references() -> u32 {
        ALLOWED_REFERENCES
    }

    /// ### English
    /// Decode surfaces allocated for the current stream.
    ///
    /// ### 中文
    /// 为当前码流分配的解码 surface 数量。
    pub fn surfaces_needed(&self) -> u32 {
        self.max_references + EXTRA_DECODE_SURFACES
    }

    pub fn can_skip_deint(&self) -> bool {
        self.stats.can_skip_deint()
    }

    pub fn stats(&self) -> BufferCounts {
        self.stats.get()
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.close();
    }
}
