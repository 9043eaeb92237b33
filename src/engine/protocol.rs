//! ### English
//! Message protocol between the decoder facade and the output worker.
//!
//! Two ports, each a pair of FIFO channels: `out` carries caller → worker messages, `in`
//! carries worker → caller messages. Synchronous requests bring their own one-slot reply
//! channel; dropping it unanswered makes the caller fail immediately.
//!
//! ### 中文
//! 解码器外观层与输出工作线程之间的消息协议。
//!
//! 两个端口，每个端口是一对 FIFO 通道：`out` 承载调用方 → 工作线程的消息，
//! `in` 承载工作线程 → 调用方的消息。同步请求自带一个单槽回复通道；
//! 未回复就丢弃它会让调用方立即失败。

use crossbeam_channel as channel;

use super::config::PipelineConfig;
use super::picture::{DecodedPicture, RenderPicture};

/// ### English
/// Control signals sent to the worker.
///
/// ### 中文
/// 发送给工作线程的控制信号。
#[derive(Debug)]
pub enum ControlSignal {
    Init(Box<PipelineConfig>),
    Flush,
    PreCleanup,
    /// ### English
    /// Ends the worker loop (sent by `Output` on dispose).
    ///
    /// ### 中文
    /// 结束工作线程循环（由 `Output` 在 dispose 时发送）。
    Shutdown,
}

impl ControlSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "INIT",
            Self::Flush => "FLUSH",
            Self::PreCleanup => "PRECLEANUP",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// ### English
/// Control replies and asynchronous control notifications from the worker.
///
/// ### 中文
/// 来自工作线程的控制回复与异步控制通知。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlReply {
    Acc,
    Error,
    /// ### English
    /// Statistics changed; the facade should re-read `BufferStats`.
    ///
    /// ### 中文
    /// 统计已变化；外观层应重新读取 `BufferStats`。
    Stats,
}

#[derive(Debug)]
pub struct ControlMessage {
    pub signal: ControlSignal,
    reply: Option<channel::Sender<ControlReply>>,
}

impl ControlMessage {
    /// ### English
    /// Fire-and-forget message.
    ///
    /// ### 中文
    /// 无需回复的消息。
    pub fn post(signal: ControlSignal) -> Self {
        Self {
            signal,
            reply: None,
        }
    }

    /// ### English
    /// Message with a one-slot reply channel; returns the receiving end.
    ///
    /// ### 中文
    /// 带单槽回复通道的消息；返回接收端。
    pub fn request(signal: ControlSignal) -> (Self, channel::Receiver<ControlReply>) {
        let (tx, rx) = channel::bounded(1);
        (
            Self {
                signal,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// ### English
    /// Answers a synchronous request; no-op for posted messages.
    ///
    /// ### 中文
    /// 回复同步请求；对无需回复的消息无操作。
    pub fn reply(&mut self, reply: ControlReply) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(reply);
        }
    }

    pub fn is_sync(&self) -> bool {
        self.reply.is_some()
    }
}

/// ### English
/// Data messages sent to the worker.
///
/// ### 中文
/// 发送给工作线程的数据消息。
#[derive(Debug)]
pub enum DataMessage {
    NewFrame(DecodedPicture),
    ReturnPic(RenderPicture),
}

/// ### English
/// Data messages sent by the worker.
///
/// ### 中文
/// 工作线程发出的数据消息。
#[derive(Debug)]
pub enum DataEvent {
    Picture(RenderPicture),
}

/// ### English
/// Bidirectional port: an `out` channel to the worker and an `in` channel back.
///
/// Both sides hold clones of the same port, so the channels stay connected until the last
/// clone is dropped.
///
/// ### 中文
/// 双向端口：发往工作线程的 `out` 通道和返回的 `in` 通道。
///
/// 双方持有同一端口的克隆，因此直到最后一个克隆被 drop 之前通道都保持连接。
pub struct Port<Out, In> {
    out_tx: channel::Sender<Out>,
    out_rx: channel::Receiver<Out>,
    in_tx: channel::Sender<In>,
    in_rx: channel::Receiver<In>,
}

impl<Out, In> Clone for Port<Out, In> {
    fn clone(&self) -> Self {
        Self {
            out_tx: self.out_tx.clone(),
            out_rx: self.out_rx.clone(),
            in_tx: self.in_tx.clone(),
            in_rx: self.in_rx.clone(),
        }
    }
}

impl<Out, In> Default for Port<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> Port<Out, In> {
    pub fn new() -> Self {
        let (out_tx, out_rx) = channel::unbounded();
        let (in_tx, in_rx) = channel::unbounded();
        Self {
            out_tx,
            out_rx,
            in_tx,
            in_rx,
        }
    }

    pub fn send_out(&self, message: Out) {
        let _ = self.out_tx.send(message);
    }

    pub fn send_in(&self, message: In) {
        let _ = self.in_tx.send(message);
    }

    pub fn try_recv_out(&self) -> Option<Out> {
        self.out_rx.try_recv().ok()
    }

    pub fn try_recv_in(&self) -> Option<In> {
        self.in_rx.try_recv().ok()
    }

    pub fn out_sender(&self) -> channel::Sender<Out> {
        self.out_tx.clone()
    }

    pub fn out_receiver(&self) -> &channel::Receiver<Out> {
        &self.out_rx
    }

    pub fn in_receiver(&self) -> &channel::Receiver<In> {
        &self.in_rx
    }

    /// ### English
    /// Drops every queued message in both directions.
    ///
    /// ### 中文
    /// 丢弃两个方向上所有排队的消息。
    pub fn purge(&self) {
        while self.out_rx.try_recv().is_ok() {}
        while self.in_rx.try_recv().is_ok() {}
    }
}

/// ### English
/// Control port: `ControlMessage` out, `ControlReply` in.
///
/// ### 中文
/// 控制端口：出站 `ControlMessage`，入站 `ControlReply`。
pub type ControlPort = Port<ControlMessage, ControlReply>;

/// ### English
/// Data port: `DataMessage` out, `DataEvent` in.
///
/// ### 中文
/// 数据端口：出站 `DataMessage`，入站 `DataEvent`。
pub type DataPort = Port<DataMessage, DataEvent>;
