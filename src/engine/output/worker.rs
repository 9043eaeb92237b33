//! ### English
//! Output worker thread loop.
//!
//! ### 中文
//! 输出工作线程循环。

use crossbeam_channel as channel;

use super::machine::{Event, OutputMachine};
use crate::engine::protocol::{ControlPort, ControlSignal, DataPort};

/// ### English
/// Output thread entry function. Returns after `Shutdown`, once the pipeline is torn down.
///
/// Control messages are taken before data messages; with nothing queued the thread waits on
/// both ports for at most the machine's current timeout.
///
/// ### 中文
/// 输出线程入口函数。收到 `Shutdown` 并销毁管线后返回。
///
/// 控制消息优先于数据消息；队列为空时线程会在两个端口上最多等待状态机当前的超时时长。
pub(super) fn run_output_thread(mut machine: OutputMachine, control: ControlPort, data: DataPort) {
    log::debug!("output thread started");

    loop {
        if let Some(event) = machine.take_self_trigger() {
            machine.dispatch(event);
            continue;
        }

        if let Some(message) = control.try_recv_out() {
            if matches!(message.signal, ControlSignal::Shutdown) {
                break;
            }
            machine.dispatch(Event::Control(message));
            continue;
        }

        if let Some(message) = data.try_recv_out() {
            machine.dispatch(Event::Data(message));
            continue;
        }

        let mut select = channel::Select::new();
        select.recv(control.out_receiver());
        select.recv(data.out_receiver());
        if select.ready_timeout(machine.timeout()).is_err() {
            machine.dispatch(Event::Timeout);
        }
    }

    if machine.state().is_configured() {
        machine.flush();
    }
    machine.uninit();
    log::debug!("output thread exited");
}
