/// ### English
/// Engine internal modules (surface bookkeeping, the output worker, and the decoder facade).
///
/// ### 中文
/// 引擎内部模块（surface 记账、输出工作线程、解码器外观层等）。
pub mod backend;
pub mod config;
pub mod decoder;
pub mod error;
pub mod flags;
pub mod output;
pub mod picture;
pub(crate) mod pool;
pub mod protocol;
pub mod stats;
pub mod surfaces;

#[cfg(test)]
pub(crate) mod test_support;
