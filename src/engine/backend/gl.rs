//! ### English
//! `GlBackend` over `glow`.
//!
//! ### 中文
//! 基于 `glow` 的 `GlBackend`。

use std::any::Any;
use std::num::NonZeroU32;

use dpi::PhysicalSize;
use glow::HasContext as _;

use super::{GlBackend, RenderTexture};
use crate::engine::error::BackendError;

fn parse_gl_version(version: &str) -> (u32, u32) {
    /*
    ### English
    Expected forms: `"4.6.0 ..."` or `"OpenGL ES 3.2 ..."`.

    ### 中文
    期望的版本字符串形式：`"4.6.0 ..."` 或 `"OpenGL ES 3.2 ..."`。
    */
    let Some(token) = version
        .split_whitespace()
        .find(|t| t.starts_with(|c: char| c.is_ascii_digit()))
    else {
        return (0, 0);
    };
    let mut parts = token.split('.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts
        .next()
        .and_then(|s| {
            let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .unwrap_or(0);
    (major, minor)
}

fn fences_available(version: &str, extensions: &[&str]) -> bool {
    let is_gles = version.starts_with("OpenGL ES");
    let (major, minor) = parse_gl_version(version);
    if is_gles {
        return major >= 3;
    }
    extensions.contains(&"GL_ARB_sync") || major > 3 || (major == 3 && minor >= 2)
}

fn pick_texture_target(extensions: &[&str]) -> u32 {
    if !extensions.contains(&"GL_ARB_texture_non_power_of_two")
        && extensions.contains(&"GL_ARB_texture_rectangle")
    {
        glow::TEXTURE_RECTANGLE
    } else {
        glow::TEXTURE_2D
    }
}

/// ### English
/// GL backend for the output worker.
///
/// The context must already be current on the worker thread. An optional owner object
/// (window, surface, context wrapper) is kept alive until the backend is dropped.
///
/// ### 中文
/// 输出工作线程使用的 GL 后端。
///
/// 上下文必须已在工作线程上设为 current。可选的持有者对象（窗口、surface、上下文封装）
/// 会一直存活到后端被 drop。
pub struct GlowBackend {
    glow: glow::Context,
    texture_target: u32,
    use_fences: bool,
    _owner: Option<Box<dyn Any>>,
}

impl GlowBackend {
    /// ### English
    /// Wraps a current `glow` context and probes fence/texture capabilities.
    ///
    /// #### Parameters
    /// - `glow`: Context current on the calling thread.
    /// - `owner`: Object that keeps the native context alive.
    ///
    /// ### 中文
    /// 封装一个已设为 current 的 `glow` 上下文，并探测 fence / 纹理能力。
    ///
    /// #### 参数
    /// - `glow`：在调用线程上为 current 的上下文。
    /// - `owner`：保持原生上下文存活的对象。
    pub fn new(glow: glow::Context, owner: Option<Box<dyn Any>>) -> Self {
        let version = unsafe { glow.get_parameter_string(glow::VERSION) };
        let extensions: Vec<&str> = glow
            .supported_extensions()
            .iter()
            .map(String::as_str)
            .collect();

        let texture_target = pick_texture_target(&extensions);
        let use_fences = fences_available(&version, &extensions);
        log::debug!("GlowBackend: GL `{version}`, fences {use_fences}, target {texture_target:#x}");

        Self {
            glow,
            texture_target,
            use_fences,
            _owner: owner,
        }
    }

    fn native_texture(texture: RenderTexture) -> Option<glow::NativeTexture> {
        NonZeroU32::new(texture.id).map(glow::NativeTexture)
    }
}

impl GlBackend for GlowBackend {
    fn supports_fences(&self) -> bool {
        self.use_fences
    }

    fn create_texture(&mut self, size: PhysicalSize<u32>) -> Result<RenderTexture, BackendError> {
        let target = self.texture_target;
        let texture = unsafe { self.glow.create_texture() }
            .map_err(|err| BackendError::new("glGenTextures", err))?;

        unsafe {
            self.glow.bind_texture(target, Some(texture));
            self.glow
                .tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            self.glow
                .tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            self.glow
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            self.glow
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            self.glow.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
            self.glow.tex_image_2d(
                target,
                0,
                glow::RGBA as i32,
                size.width as i32,
                size.height as i32,
                0,
                glow::BGRA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(None),
            );
            self.glow.bind_texture(target, None);
        }

        let error = unsafe { self.glow.get_error() };
        if error != glow::NO_ERROR {
            unsafe { self.glow.delete_texture(texture) };
            return Err(BackendError::new(
                "glTexImage2D",
                format!("GL error {error:#x} for {}x{}", size.width, size.height),
            ));
        }

        Ok(RenderTexture {
            id: texture.0.get(),
            target,
        })
    }

    fn delete_texture(&mut self, texture: RenderTexture) {
        let Some(native) = Self::native_texture(texture) else {
            return;
        };
        unsafe { self.glow.delete_texture(native) };
    }

    fn fence_signaled(&mut self, fence: u64) -> bool {
        if fence == 0 {
            return true;
        }
        let sync = glow::NativeFence(fence as usize as *mut _);
        let status = unsafe { self.glow.client_wait_sync(sync, 0, 0) };
        status == glow::ALREADY_SIGNALED || status == glow::CONDITION_SATISFIED
    }

    fn delete_fence(&mut self, fence: u64) {
        if fence == 0 {
            return;
        }
        let sync = glow::NativeFence(fence as usize as *mut _);
        unsafe { self.glow.delete_sync(sync) };
    }

    fn flush(&mut self) {
        unsafe { self.glow.flush() };
    }
}
