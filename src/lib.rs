/// ### English
/// `xian_hwdec_output` crate root.
/// Hardware video decode output: decode surfaces are copied into GL textures on a dedicated
/// worker thread and handed to presentation code as reference-counted render pictures.
/// The implementation lives under `engine`; the public surface is re-exported here.
///
/// ### 中文
/// `xian_hwdec_output` 的 crate 根。
/// 硬件视频解码输出：解码 surface 在独立工作线程上被拷贝进 GL 纹理，
/// 并以引用计数的渲染图片交给呈现代码。
/// 实现位于 `engine` 模块；公共接口在此重新导出。
mod engine;

pub use engine::backend::{
    GlBackend, GlFactory, GlowBackend, RenderSurfaceId, RenderTexture, SurfaceId, VideoDevice,
};
pub use engine::config::{
    DEFAULT_POOL_SIZE, DecoderSettings, EXTRA_DECODE_SURFACES, OutputSettings, PipelineConfig,
    Timings,
};
pub use engine::decoder::{Codec, Decoder, DisplayNotifier, DisplayState, StreamInfo};
pub use engine::error::{BackendError, OutputError};
pub use engine::flags::{
    DecodeStatus, PICTURE_FLAG_DRAIN, PICTURE_FLAG_INTERLACED, PICTURE_FLAG_NO_POSTPROC,
    PICTURE_FLAG_REPEAT_TOP_FIELD, PICTURE_FLAG_TOP_FIELD_FIRST, PICTURE_FLAGS_INTERLACE_MASK,
};
pub use engine::output::{Output, OutputState};
pub use engine::picture::{
    CropRect, DecodedPicture, FrameFormat, FrameInfo, PictureGuard, PictureInfo, RenderPicture,
};
pub use engine::protocol::ControlReply;
pub use engine::stats::{BufferCounts, BufferStats};
pub use engine::surfaces::{SURFACE_USED_FOR_REFERENCE, SURFACE_USED_FOR_RENDER, SurfaceRegistry};
