//! ### English
//! Work performed by the output machine: configuration, processing cycles, flush and teardown.
//!
//! ### 中文
//! 输出状态机执行的工作：配置、处理周期、flush 与销毁。

use std::thread;
use std::time::Instant;

use super::machine::OutputMachine;
use crate::engine::config::PipelineConfig;
use crate::engine::error::BackendError;
use crate::engine::flags::PICTURE_FLAGS_INTERLACE_MASK;
use crate::engine::picture::{CropRect, DecodedPicture, FrameFormat, PictureInfo, RenderPicture};
use crate::engine::protocol::{DataEvent, DataMessage};

impl OutputMachine {
    /// ### English
    /// Installs `config`, creates the GL context on this thread and allocates pool resources.
    ///
    /// ### 中文
    /// 安装 `config`，在当前线程创建 GL 上下文并分配缓冲池资源。
    pub(super) fn init(&mut self, config: PipelineConfig) -> bool {
        log::debug!("OutputMachine: init {config:?}");
        self.gpu_error = false;

        let mut gl = match (config.gl_factory)() {
            Ok(gl) => gl,
            Err(err) => {
                log::error!("OutputMachine: failed to create GL context: {err}");
                return false;
            }
        };
        self.use_fence = gl.supports_fences();

        if let Err(err) = self
            .pool
            .allocate(config.surface_size, gl.as_mut(), &*self.device)
        {
            log::error!("OutputMachine: failed to allocate buffer pool: {err}");
            self.pool.release(
                gl.as_mut(),
                &*self.device,
                false,
                self.timings.fence_deadline,
                self.timings.fence_poll,
            );
            return false;
        }

        log::info!(
            "OutputMachine: configured {}x{} textures, {} pictures, fences {}",
            config.surface_size.width,
            config.surface_size.height,
            self.pool.size(),
            self.use_fence
        );
        self.gl = Some(gl);
        self.config = Some(config);
        true
    }

    /// ### English
    /// One processing cycle: take a decoded frame, copy it into a free picture, emit PICTURE.
    ///
    /// The decode surface goes back to the codec as soon as its copy is done; the render
    /// picture owns the converted content from then on.
    ///
    /// ### 中文
    /// 一个处理周期：取一个解码帧，拷贝到空闲图片中，并发出 PICTURE。
    ///
    /// 拷贝完成后解码 surface 立即交还 codec；此后转换后的内容由渲染图片持有。
    pub(super) fn run_cycle(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };
        let Some(decoded) = self.init_cycle(&config) else {
            return;
        };

        match self.process_picture(&config, decoded) {
            Ok(Some(picture)) => {
                config.stats.dec_processed();
                config.stats.inc_render();
                log::trace!("OutputMachine: picture {} ready", picture.index());
                self.data.send_in(DataEvent::Picture(picture));
            }
            Ok(None) => config.stats.dec_processed(),
            Err(err) => {
                log::error!("OutputMachine: processing failed: {err}");
                config.stats.dec_processed();
                self.gpu_error = true;
            }
        }
    }

    fn init_cycle(&mut self, config: &PipelineConfig) -> Option<DecodedPicture> {
        config.stats.set_can_skip_deint(false);
        let mut decoded = self.pool.pop_decoded()?;
        config.stats.inc_processed();
        config.stats.dec_decoded();

        decoded.frame.format = FrameFormat::Texture;
        decoded.frame.flags &= !PICTURE_FLAGS_INTERLACE_MASK;
        decoded.frame.size = config.video_size;
        Some(decoded)
    }

    fn process_picture(
        &mut self,
        config: &PipelineConfig,
        decoded: DecodedPicture,
    ) -> Result<Option<RenderPicture>, BackendError> {
        let Some(gl) = self.gl.as_deref_mut() else {
            config.surfaces.clear_render(decoded.surface);
            return Ok(None);
        };
        let Some(index) = self.pool.take_free() else {
            log::error!("OutputMachine: no free picture for a ready frame");
            config.surfaces.clear_render(decoded.surface);
            return Ok(None);
        };

        let copied = self
            .pool
            .ensure_resources(index, config.surface_size, gl, &*self.device)
            .and_then(|(_, target)| self.device.copy_surface(decoded.surface, target));
        config.surfaces.clear_render(decoded.surface);
        if let Err(err) = copied {
            self.pool.restore_free(index);
            return Err(err);
        }

        {
            let mut slot = self.pool.table().slot(index);
            slot.info = PictureInfo {
                frame: decoded.frame,
                crop: CropRect::full(config.output_size),
                texture_size: config.surface_size,
            };
            slot.valid = true;
        }
        self.pool.mark_used(index);
        Ok(Some(self.pool.picture(index)))
    }

    /// ### English
    /// Drops queued frames and pulls back every picture that has not reached the caller.
    ///
    /// ### 中文
    /// 丢弃排队的帧，并收回所有尚未到达调用方的图片。
    pub(super) fn flush(&mut self) {
        let surfaces = self.config.as_ref().map(|config| config.surfaces.clone());
        let stats = self.config.as_ref().map(|config| config.stats.clone());

        while let Some(message) = self.data.try_recv_out() {
            match message {
                DataMessage::NewFrame(frame) => {
                    if let Some(surfaces) = &surfaces {
                        surfaces.clear_render(frame.surface);
                    }
                }
                DataMessage::ReturnPic(picture) => self.pool.queue_return(&picture),
            }
        }

        while let Some(DataEvent::Picture(picture)) = self.data.try_recv_in() {
            if let Some(stats) = &stats {
                stats.dec_render();
            }
            self.pool.queue_return(&picture);
        }

        let flushed = self.pool.flush_decoded(surfaces.as_deref());
        self.process_sync();
        log::debug!("OutputMachine: flushed {flushed} decoded frames");
    }

    /// ### English
    /// Flush, then release GPU resources of pictures nobody references.
    ///
    /// ### 中文
    /// 先 flush，再释放无人引用的图片的 GPU 资源。
    pub(super) fn pre_cleanup(&mut self) {
        self.flush();
        let Some(gl) = self.gl.as_deref_mut() else {
            return;
        };
        let released = self.pool.release_unused(gl, &*self.device);
        log::info!("OutputMachine: pre-cleanup released {released} pictures");
    }

    /// ### English
    /// Tears down the configured pipeline. Safe to call when never configured.
    ///
    /// ### 中文
    /// 销毁已配置的管线。从未配置时调用也是安全的。
    pub(crate) fn uninit(&mut self) {
        let Some(mut gl) = self.gl.take() else {
            return;
        };
        gl.flush();

        let deadline = Instant::now() + self.timings.fence_deadline;
        while self.pool.sync_pending_len() > 0 {
            if !self.pool.process_sync(Some(gl.as_mut()), self.use_fence) {
                break;
            }
            if Instant::now() >= deadline {
                log::error!("OutputMachine: returned pictures still pending at teardown");
                break;
            }
            thread::sleep(self.timings.fence_poll);
        }

        self.pool.release(
            gl.as_mut(),
            &*self.device,
            self.use_fence,
            self.timings.fence_deadline,
            self.timings.fence_poll,
        );
        self.config = None;
        log::info!("OutputMachine: uninitialized");
    }
}
