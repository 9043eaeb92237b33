//! ### English
//! Display state shared between the decoder and whoever watches the graphics device.
//!
//! ### 中文
//! 解码器与图形设备监视方共享的显示状态。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// ### English
/// Health of the display the decoder renders through.
///
/// ### 中文
/// 解码器所依赖显示设备的健康状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DisplayState {
    #[default]
    Open,
    /// ### English
    /// Device came back after a loss; the pipeline must be rebuilt.
    ///
    /// ### 中文
    /// 设备在丢失后恢复；管线需要重建。
    Reset,
    Lost,
    Error,
}

#[derive(Debug, Default)]
pub(super) struct Display {
    state: Mutex<DisplayState>,
    changed: Condvar,
}

impl Display {
    pub(super) fn state(&self) -> DisplayState {
        *self.state.lock()
    }

    pub(super) fn set(&self, state: DisplayState) {
        *self.state.lock() = state;
        self.changed.notify_all();
    }

    /// ### English
    /// Waits while the display is `Lost`. `None` means the deadline passed first.
    ///
    /// ### 中文
    /// 在显示处于 `Lost` 时等待。返回 `None` 表示先到达了截止时间。
    pub(super) fn wait_while_lost(&self, timeout: Duration) -> Option<DisplayState> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state == DisplayState::Lost {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return (*state != DisplayState::Lost).then_some(*state);
            }
        }
        Some(*state)
    }
}

/// ### English
/// Cloneable handle for reporting device loss and recovery from other threads.
///
/// ### 中文
/// 可克隆的句柄，用于从其他线程报告设备丢失与恢复。
#[derive(Clone, Debug)]
pub struct DisplayNotifier {
    pub(super) display: Arc<Display>,
}

impl DisplayNotifier {
    /// ### English
    /// The graphics device is gone; decoding stalls until `reset`.
    ///
    /// ### 中文
    /// 图形设备已丢失；解码会停滞直到 `reset`。
    pub fn lost(&self) {
        log::info!("DisplayNotifier: display lost");
        self.display.set(DisplayState::Lost);
    }

    /// ### English
    /// The device is usable again. Only a `Lost` display moves to `Reset`.
    ///
    /// ### 中文
    /// 设备重新可用。只有处于 `Lost` 的显示会转为 `Reset`。
    pub fn reset(&self) {
        let mut state = self.display.state.lock();
        if *state == DisplayState::Lost {
            log::info!("DisplayNotifier: display reset");
            *state = DisplayState::Reset;
            self.display.changed.notify_all();
        }
    }

    pub fn state(&self) -> DisplayState {
        self.display.state()
    }
}
