//! ### English
//! Output state hierarchy.
//!
//! ### 中文
//! 输出状态层级。

/// ### English
/// States of the output machine. Unhandled events move from a state to its parent.
///
/// ```text
/// Top
///  ├─ Error
///  ├─ Unconfigured          (initial)
///  └─ Configured
///      ├─ ConfiguredIdle
///      └─ ConfiguredStep1
/// ```
///
/// ### 中文
/// 输出状态机的状态。未处理的事件会从某状态交给其父状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputState {
    Top,
    Error,
    Unconfigured,
    Configured,
    ConfiguredIdle,
    ConfiguredStep1,
}

impl OutputState {
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Top => None,
            Self::Error | Self::Unconfigured | Self::Configured => Some(Self::Top),
            Self::ConfiguredIdle | Self::ConfiguredStep1 => Some(Self::Configured),
        }
    }

    /// ### English
    /// `true` for `Configured` and its children.
    ///
    /// ### 中文
    /// 对 `Configured` 及其子状态返回 `true`。
    pub const fn is_configured(self) -> bool {
        matches!(
            self,
            Self::Configured | Self::ConfiguredIdle | Self::ConfiguredStep1
        )
    }
}
