//! 单所有者执行体：一个 tokio 任务独占 [`Runtime`]，其余调用方通过命令通道访问.
//!
//! ```text
//! caller A ──┐
//!            ├──► mpsc::Sender<Command> ──► RuntimeActor ──► mpsc::Sender<Event> ──► consumer
//! caller B ──┘                                  │
//!                                   Runtime (route + cascade, sequential)
//! ```
//!
//! 每条命令先通过 oneshot 应答，再把产生的事件推入输出通道。
//! 输出通道有界：通道满时执行体等待，慢消费者会阻塞所有调用方。
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::net::structure::MarkingSnapshot;
use crate::runtime::dispatcher::{Runtime, RuntimeError};
use crate::runtime::event::{Context, Event, Getter, Handler};

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

pub enum Command {
    Handle {
        event: Event,
        reply: Reply<usize>,
    },
    Settle {
        reply: Reply<usize>,
    },
    AddHandler {
        event: String,
        transition: String,
        handler: Handler,
        reply: Reply<()>,
    },
    AddNotification {
        name: String,
        transition: String,
        getter: Getter,
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<MarkingSnapshot>,
    },
    Shutdown,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Handle { event, .. } => write!(f, "Handle({})", event.name),
            Command::Settle { .. } => write!(f, "Settle"),
            Command::AddHandler {
                event, transition, ..
            } => write!(f, "AddHandler({} -> {})", event, transition),
            Command::AddNotification {
                name, transition, ..
            } => write!(f, "AddNotification({} after {})", name, transition),
            Command::Snapshot { .. } => write!(f, "Snapshot"),
            Command::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// 已启动运行时的可克隆句柄
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    pub async fn handle(&self, event: Event) -> Result<usize, RuntimeError> {
        self.request(|reply| Command::Handle { event, reply }).await?
    }

    pub async fn settle(&self) -> Result<usize, RuntimeError> {
        self.request(|reply| Command::Settle { reply }).await?
    }

    pub async fn add_handler<F>(
        &self,
        event: impl Into<String>,
        transition: impl Into<String>,
        handler: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnMut(&Context, Event) -> anyhow::Result<Event> + Send + 'static,
    {
        let (event, transition) = (event.into(), transition.into());
        self.request(|reply| Command::AddHandler {
            event,
            transition,
            handler: Box::new(handler),
            reply,
        })
        .await?
    }

    pub async fn add_notification<F>(
        &self,
        name: impl Into<String>,
        transition: impl Into<String>,
        getter: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnMut(&Context) -> anyhow::Result<Value> + Send + 'static,
    {
        let (name, transition) = (name.into(), transition.into());
        self.request(|reply| Command::AddNotification {
            name,
            transition,
            getter: Box::new(getter),
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<MarkingSnapshot, RuntimeError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// 处理完已排队的命令后停止执行体
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| RuntimeError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| RuntimeError::Closed)?;
        response.await.map_err(|_| RuntimeError::Closed)
    }
}

pub struct RuntimeActor {
    runtime: Runtime,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Event>,
    consumer_gone: bool,
}

impl RuntimeActor {
    pub fn new(runtime: Runtime, config: &Config) -> (Self, RuntimeHandle, mpsc::Receiver<Event>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let actor = Self {
            runtime,
            commands: command_rx,
            events: event_tx,
            consumer_gone: false,
        };
        (
            actor,
            RuntimeHandle {
                commands: command_tx,
            },
            event_rx,
        )
    }

    /// 处理命令直到收到 `Shutdown` 或全部句柄被丢弃，然后交还运行时
    pub async fn run(mut self) -> Runtime {
        info!("runtime actor started");
        while let Some(command) = self.commands.recv().await {
            debug!("runtime command: {:?}", command);
            if matches!(command, Command::Shutdown) {
                info!("runtime actor received shutdown");
                break;
            }
            self.apply(command);
            self.publish().await;
        }
        self.publish().await;
        info!("runtime actor stopped");
        self.runtime
    }

    fn apply(&mut self, command: Command) {
        // a caller that stopped waiting for its reply is not an error
        match command {
            Command::Handle { event, reply } => {
                let _ = reply.send(self.runtime.handle(event));
            }
            Command::Settle { reply } => {
                let _ = reply.send(self.runtime.settle());
            }
            Command::AddHandler {
                event,
                transition,
                handler,
                reply,
            } => {
                let result = self
                    .runtime
                    .add_boxed_handler(event, &transition, handler);
                let _ = reply.send(result);
            }
            Command::AddNotification {
                name,
                transition,
                getter,
                reply,
            } => {
                let result = self
                    .runtime
                    .add_boxed_notification(name, &transition, getter);
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.runtime.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    async fn publish(&mut self) {
        for event in self.runtime.take_events() {
            if self.consumer_gone {
                continue;
            }
            if self.events.send(event).await.is_err() {
                warn!("event receiver dropped, discarding further events");
                self.consumer_gone = true;
            }
        }
    }
}

/// 把 `runtime` 移入独立任务；执行体停止后 join handle 返回运行时
pub fn spawn(
    runtime: Runtime,
    config: &Config,
) -> (RuntimeHandle, mpsc::Receiver<Event>, JoinHandle<Runtime>) {
    let (actor, handle, events) = RuntimeActor::new(runtime, config);
    let task = tokio::spawn(actor.run());
    (handle, events, task)
}
