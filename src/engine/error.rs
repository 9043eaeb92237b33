//! ### English
//! Error types for the output pipeline.
//!
//! ### 中文
//! 输出管线的错误类型。

use std::time::Duration;

use thiserror::Error;

/// ### English
/// A failed call into the hardware video or GL API.
///
/// ### 中文
/// 一次失败的硬件视频 / GL API 调用。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{call} failed: {reason}")]
pub struct BackendError {
    /// ### English
    /// Name of the failed call (e.g. `vaCopySurfaceGLX`).
    ///
    /// ### 中文
    /// 失败调用的名称（例如 `vaCopySurfaceGLX`）。
    pub call: &'static str,
    /// ### English
    /// Driver-provided reason.
    ///
    /// ### 中文
    /// 驱动给出的原因。
    pub reason: String,
}

impl BackendError {
    pub fn new(call: &'static str, reason: impl Into<String>) -> Self {
        Self {
            call,
            reason: reason.into(),
        }
    }
}

/// ### English
/// Errors surfaced to callers of the output pipeline.
///
/// ### 中文
/// 暴露给输出管线调用方的错误。
#[derive(Error, Debug)]
pub enum OutputError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to spawn output thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{request} timed out after {timeout:?}")]
    Timeout {
        request: &'static str,
        timeout: Duration,
    },
    #[error("output thread dropped the {0} request")]
    Disconnected(&'static str),
    #[error("output rejected the {0} request")]
    Rejected(&'static str),
    #[error("pipeline is not configured")]
    NotConfigured,
}
