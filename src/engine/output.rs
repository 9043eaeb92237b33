//! ### English
//! Output actor: a dedicated worker thread that turns decoded frames into render pictures.
//!
//! `Output` is the caller-side handle. It owns the worker thread and both ports; dropping it
//! shuts the worker down and tears the pipeline down on the worker thread. While presentation
//! code still holds acquired pictures the teardown waits, and the last release runs it.
//!
//! ### 中文
//! 输出 actor：把解码帧转换为渲染图片的独立工作线程。
//!
//! `Output` 是调用方一侧的句柄。它持有工作线程和两个端口；drop 时会关闭工作线程，
//! 并在工作线程上销毁管线。若呈现代码仍持有已 acquire 的图片，销毁会等待，
//! 由最后一次 release 执行。

mod cycle;
mod machine;
mod state;
mod worker;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel as channel;

use super::backend::VideoDevice;
use super::config::{OutputSettings, PipelineConfig};
use super::error::OutputError;
use super::picture::{DecodedPicture, PictureTable, RenderPicture};
use super::protocol::{
    ControlMessage, ControlPort, ControlReply, ControlSignal, DataEvent, DataMessage, DataPort,
};

pub use state::OutputState;

/// ### English
/// Handle to a running output actor.
///
/// ### 中文
/// 运行中的输出 actor 的句柄。
pub struct Output {
    control: ControlPort,
    data: DataPort,
    table: Arc<PictureTable>,
    request_timeout: Duration,
    thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// ### English
    /// Spawns the worker thread. The actor starts unconfigured; call `init` next.
    ///
    /// #### Parameters
    /// - `device`: Shared hardware display context.
    /// - `settings`: Pool size, timings and thread name.
    ///
    /// ### 中文
    /// 启动工作线程。actor 以未配置状态启动；接下来调用 `init`。
    ///
    /// #### 参数
    /// - `device`：共享的硬件显示上下文。
    /// - `settings`：缓冲池大小、时序与线程名。
    pub fn start(device: Arc<dyn VideoDevice>, settings: OutputSettings) -> Result<Self, OutputError> {
        let control = ControlPort::new();
        let data = DataPort::new();
        let table = Arc::new(PictureTable::new(settings.pool_size, data.out_sender()));

        let thread = {
            let control = control.clone();
            let data = data.clone();
            let table = table.clone();
            let timings = settings.timings;
            thread::Builder::new()
                .name(settings.thread_name.clone())
                .spawn(move || {
                    let machine = machine::OutputMachine::new(
                        device,
                        table,
                        control.clone(),
                        data.clone(),
                        timings,
                    );
                    worker::run_output_thread(machine, control, data);
                })
                .map_err(OutputError::Spawn)?
        };

        Ok(Self {
            control,
            data,
            table,
            request_timeout: settings.timings.request,
            thread: Some(thread),
        })
    }

    fn request(&self, signal: ControlSignal) -> Result<(), OutputError> {
        let name = signal.name();
        let (message, reply) = ControlMessage::request(signal);
        self.control.send_out(message);

        match reply.recv_timeout(self.request_timeout) {
            Ok(ControlReply::Acc) => Ok(()),
            Ok(_) => Err(OutputError::Rejected(name)),
            Err(channel::RecvTimeoutError::Timeout) => {
                log::error!("Output: {name} timed out");
                Err(OutputError::Timeout {
                    request: name,
                    timeout: self.request_timeout,
                })
            }
            Err(channel::RecvTimeoutError::Disconnected) => Err(OutputError::Disconnected(name)),
        }
    }

    /// ### English
    /// Configures the pipeline (GL context + pool resources) and waits for the answer.
    ///
    /// ### 中文
    /// 配置管线（GL 上下文 + 缓冲池资源）并等待结果。
    pub fn init(&self, config: PipelineConfig) -> Result<(), OutputError> {
        self.request(ControlSignal::Init(Box::new(config)))
    }

    pub fn flush(&self) -> Result<(), OutputError> {
        self.request(ControlSignal::Flush)
    }

    pub fn pre_cleanup(&self) -> Result<(), OutputError> {
        self.request(ControlSignal::PreCleanup)
    }

    /// ### English
    /// Queues a decoded frame. The caller must already have marked its surface RENDER.
    ///
    /// ### 中文
    /// 提交一个解码帧。调用方必须已将其 surface 标记为 RENDER。
    pub fn submit_frame(&self, picture: DecodedPicture) {
        self.data.send_out(DataMessage::NewFrame(picture));
    }

    pub fn return_picture(&self, picture: RenderPicture) {
        self.data.send_out(DataMessage::ReturnPic(picture));
    }

    pub fn try_receive_picture(&self) -> Option<RenderPicture> {
        self.data.try_recv_in().map(|DataEvent::Picture(picture)| picture)
    }

    /// ### English
    /// Next asynchronous control notification (`Error` / `Stats`).
    ///
    /// ### 中文
    /// 下一个异步控制通知（`Error` / `Stats`）。
    pub fn try_receive_control(&self) -> Option<ControlReply> {
        self.control.try_recv_in()
    }

    /// ### English
    /// Blocks until either inbound port has a message or `timeout` elapses.
    ///
    /// ### 中文
    /// 阻塞直到任一入站端口有消息或 `timeout` 到期。
    pub fn wait_for_message(&self, timeout: Duration) -> bool {
        let mut select = channel::Select::new();
        select.recv(self.control.in_receiver());
        select.recv(self.data.in_receiver());
        select.ready_timeout(timeout).is_ok()
    }

    /// ### English
    /// Pictures currently acquired by presentation code.
    ///
    /// ### 中文
    /// 当前被呈现代码 acquire 的图片数。
    pub fn outstanding_pictures(&self) -> usize {
        self.table.pinned()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// ### English
    /// Stops the worker (flush + teardown on its thread), joins it and purges both ports.
    ///
    /// If pictures are still acquired, queued frames are flushed right away and the rest is
    /// handed to the last `release`; textures stay valid until then.
    ///
    /// ### 中文
    /// 停止工作线程（在其线程上 flush 并销毁），join 该线程并清空两个端口。
    ///
    /// 若仍有图片处于 acquire 状态，则立即 flush 排队的帧，其余工作交给最后一次 `release`；
    /// 在此之前纹理保持有效。
    pub fn dispose(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let held = self.table.pinned();
        if held > 0 {
            log::info!("Output: {held} pictures still held, teardown deferred");
            if let Err(err) = self.flush() {
                log::warn!("Output: flush before deferred teardown failed: {err}");
            }
        }

        let control = self.control.clone();
        let data = self.data.clone();
        let teardown = move || {
            control.send_out(ControlMessage::post(ControlSignal::Shutdown));
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                log::error!("Output: worker thread panicked");
            }
            control.purge();
            data.purge();
        };
        self.table.defer_until_unpinned(Box::new(teardown));
    }

    /// ### English
    /// Whether the worker has been stopped and joined.
    ///
    /// ### 中文
    /// 工作线程是否已停止并被 join。
    pub fn is_disposed(&self) -> bool {
        self.thread.is_none() && self.table.pinned() == 0
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.dispose();
    }
}
