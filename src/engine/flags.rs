//! ### English
//! Bitflags describing decoded frames and decode results.
//!
//! These are plain `u32` masks, the same way they travel between the codec loop and the
//! presentation layer.
//!
//! ### 中文
//! 描述解码帧与解码结果的位标志。
//!
//! 与在 codec 循环和呈现层之间传递时一样，使用普通的 `u32` 掩码。

/// ### English
/// The frame is interlaced.
///
/// ### 中文
/// 该帧为隔行扫描。
pub const PICTURE_FLAG_INTERLACED: u32 = 1 << 0;

/// ### English
/// Top field is displayed first.
///
/// ### 中文
/// 顶场先显示。
pub const PICTURE_FLAG_TOP_FIELD_FIRST: u32 = 1 << 1;

/// ### English
/// Top field is repeated (3:2 pulldown).
///
/// ### 中文
/// 重复顶场（3:2 pulldown）。
pub const PICTURE_FLAG_REPEAT_TOP_FIELD: u32 = 1 << 2;

/// ### English
/// Codec is draining; no more input follows.
///
/// ### 中文
/// codec 正在 drain，后续不再有输入。
pub const PICTURE_FLAG_DRAIN: u32 = 1 << 3;

/// ### English
/// Skip post-processing for this frame.
///
/// ### 中文
/// 该帧跳过后处理。
pub const PICTURE_FLAG_NO_POSTPROC: u32 = 1 << 4;

/// ### English
/// Flags stripped by the output stage: the copy into the render texture produces a progressive frame.
///
/// ### 中文
/// 输出阶段会清除的标志：拷贝到渲染纹理后得到的是逐行帧。
pub const PICTURE_FLAGS_INTERLACE_MASK: u32 =
    PICTURE_FLAG_INTERLACED | PICTURE_FLAG_TOP_FIELD_FIRST | PICTURE_FLAG_REPEAT_TOP_FIELD;

/// ### English
/// Result bits returned by `Decoder::decode`.
///
/// ### 中文
/// `Decoder::decode` 返回的结果位。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DecodeStatus(u32);

impl DecodeStatus {
    pub const ERROR: Self = Self(1 << 0);
    pub const BUFFER: Self = Self(1 << 1);
    pub const PICTURE: Self = Self(1 << 2);
    pub const FLUSHED: Self = Self(1 << 3);

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for DecodeStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DecodeStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
