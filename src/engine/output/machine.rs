//! ### English
//! Hierarchical state machine of the output worker.
//!
//! Each state has one handler. A handler either consumes the event or passes it back, in
//! which case the dispatch loop offers it to the parent state, up to `Top`.
//!
//! ### 中文
//! 输出工作线程的层级状态机。
//!
//! 每个状态有一个处理函数。处理函数要么消费事件，要么把事件交回，
//! 此时分发循环会把事件交给父状态，直到 `Top`。

use std::sync::Arc;
use std::time::Duration;

use super::state::OutputState;
use crate::engine::backend::{GlBackend, VideoDevice};
use crate::engine::config::{PipelineConfig, Timings};
use crate::engine::picture::PictureTable;
use crate::engine::pool::BufferPool;
use crate::engine::protocol::{
    ControlMessage, ControlPort, ControlReply, ControlSignal, DataMessage, DataPort,
};

/// ### English
/// Input to the state machine.
///
/// ### 中文
/// 状态机的输入。
#[derive(Debug)]
pub(crate) enum Event {
    Control(ControlMessage),
    Data(DataMessage),
    /// ### English
    /// The event wait elapsed.
    ///
    /// ### 中文
    /// 事件等待超时。
    Timeout,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::Control(msg) => msg.signal.name(),
            Self::Data(DataMessage::NewFrame(_)) => "NEWFRAME",
            Self::Data(DataMessage::ReturnPic(_)) => "RETURNPIC",
            Self::Timeout => "TIMEOUT",
        }
    }
}

enum Handled {
    Done,
    Pass(Event),
}

pub(crate) struct OutputMachine {
    pub(super) state: OutputState,
    /// ### English
    /// One-shot re-dispatch: the worker loop feeds this event back before waiting again.
    ///
    /// ### 中文
    /// 一次性重新分发：工作线程循环在再次等待前会先把该事件送回状态机。
    pub(super) self_trigger: Option<Event>,
    pub(super) timeout: Duration,
    pub(super) gpu_error: bool,
    pub(super) config: Option<PipelineConfig>,
    pub(super) pool: BufferPool,
    pub(super) device: Arc<dyn VideoDevice>,
    pub(super) gl: Option<Box<dyn GlBackend>>,
    pub(super) use_fence: bool,
    pub(super) control: ControlPort,
    pub(super) data: DataPort,
    pub(super) timings: Timings,
}

impl OutputMachine {
    pub(crate) fn new(
        device: Arc<dyn VideoDevice>,
        table: Arc<PictureTable>,
        control: ControlPort,
        data: DataPort,
        timings: Timings,
    ) -> Self {
        Self {
            state: OutputState::Unconfigured,
            self_trigger: None,
            timeout: timings.initial,
            gpu_error: false,
            config: None,
            pool: BufferPool::from_table(table),
            device,
            gl: None,
            use_fence: false,
            control,
            data,
            timings,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> OutputState {
        self.state
    }

    #[inline]
    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn take_self_trigger(&mut self) -> Option<Event> {
        self.self_trigger.take()
    }

    /// ### English
    /// Offers `event` to the current state, then to each ancestor until one consumes it.
    ///
    /// Events nobody handles are logged and dropped; a dropped synchronous request drops its
    /// reply slot, so the caller fails without waiting out its timeout.
    ///
    /// ### 中文
    /// 把 `event` 交给当前状态，然后依次交给各祖先状态，直到有状态消费它。
    ///
    /// 无人处理的事件会被记录并丢弃；被丢弃的同步请求会一并丢弃其回复槽，
    /// 因此调用方无需等到超时即可失败。
    pub(crate) fn dispatch(&mut self, event: Event) {
        let mut state = self.state;
        let mut event = event;
        loop {
            event = match self.handle(state, event) {
                Handled::Done => return,
                Handled::Pass(event) => event,
            };
            let Some(parent) = state.parent() else {
                log::warn!(
                    "OutputMachine: unhandled {} in state {:?}",
                    event.name(),
                    self.state
                );
                return;
            };
            state = parent;
        }
    }

    fn handle(&mut self, state: OutputState, event: Event) -> Handled {
        match state {
            OutputState::Top => self.on_top(event),
            OutputState::Error => self.on_error(event),
            OutputState::Unconfigured => self.on_unconfigured(event),
            OutputState::Configured => self.on_configured(event),
            OutputState::ConfiguredIdle => self.on_idle(event),
            OutputState::ConfiguredStep1 => self.on_step1(event),
        }
    }

    fn on_top(&mut self, event: Event) -> Handled {
        match event {
            Event::Control(mut msg) => match msg.signal {
                ControlSignal::Flush | ControlSignal::PreCleanup => {
                    msg.reply(ControlReply::Acc);
                    Handled::Done
                }
                _ => Handled::Pass(Event::Control(msg)),
            },
            Event::Data(DataMessage::NewFrame(frame)) => {
                self.pool.push_decoded(frame);
                Handled::Done
            }
            Event::Data(DataMessage::ReturnPic(picture)) => {
                self.pool.queue_return(&picture);
                Handled::Done
            }
            Event::Timeout => Handled::Done,
        }
    }

    fn on_error(&mut self, event: Event) -> Handled {
        match event {
            Event::Control(mut msg) if msg.is_sync() => {
                msg.reply(ControlReply::Error);
                Handled::Done
            }
            event => Handled::Pass(event),
        }
    }

    fn on_unconfigured(&mut self, event: Event) -> Handled {
        let Event::Control(mut msg) = event else {
            return Handled::Pass(event);
        };
        let ControlSignal::Init(config) = &msg.signal else {
            return Handled::Pass(Event::Control(msg));
        };

        let config = PipelineConfig::clone(config);
        if self.init(config) {
            self.state = OutputState::ConfiguredIdle;
            self.timeout = Duration::ZERO;
            msg.reply(ControlReply::Acc);
        } else {
            self.state = OutputState::Error;
            msg.reply(ControlReply::Error);
        }
        Handled::Done
    }

    fn on_configured(&mut self, event: Event) -> Handled {
        match event {
            Event::Control(mut msg) => match msg.signal {
                ControlSignal::Flush => {
                    self.flush();
                    msg.reply(ControlReply::Acc);
                    Handled::Done
                }
                ControlSignal::PreCleanup => {
                    self.pre_cleanup();
                    msg.reply(ControlReply::Acc);
                    Handled::Done
                }
                _ => Handled::Pass(Event::Control(msg)),
            },
            Event::Data(DataMessage::NewFrame(frame)) => {
                self.pool.push_decoded(frame);
                self.timeout = Duration::ZERO;
                Handled::Done
            }
            Event::Data(DataMessage::ReturnPic(picture)) => {
                self.pool.queue_return(&picture);
                self.control.send_in(ControlReply::Stats);
                self.state = OutputState::ConfiguredIdle;
                self.timeout = Duration::ZERO;
                Handled::Done
            }
            event => Handled::Pass(event),
        }
    }

    fn on_idle(&mut self, event: Event) -> Handled {
        let Event::Timeout = event else {
            return Handled::Pass(event);
        };

        let busy = self.process_sync();
        self.timeout = if busy {
            self.timings.busy
        } else {
            self.timings.idle
        };

        if self.pool.has_work() {
            self.state = OutputState::ConfiguredStep1;
            self.timeout = Duration::ZERO;
            self.self_trigger = Some(Event::Timeout);
        }
        Handled::Done
    }

    fn on_step1(&mut self, event: Event) -> Handled {
        let Event::Timeout = event else {
            return Handled::Pass(event);
        };

        self.run_cycle();

        if self.gpu_error {
            log::error!("OutputMachine: GPU error, output disabled until re-init");
            self.state = OutputState::Error;
            self.control.send_in(ControlReply::Error);
            return Handled::Done;
        }

        self.state = OutputState::ConfiguredIdle;
        self.timeout = Duration::ZERO;
        Handled::Done
    }

    /// ### English
    /// Runs one recycling scan against the GL context, if one exists.
    ///
    /// ### 中文
    /// 使用 GL 上下文（如有）执行一次回收扫描。
    pub(super) fn process_sync(&mut self) -> bool {
        self.pool.process_sync(self.gl.as_deref_mut(), self.use_fence)
    }
}
