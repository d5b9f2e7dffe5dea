//! 事件驱动执行层.
//!
//! [`Runtime`] 把具名事件路由到绑定了处理器的“冷”变迁，其余“热”变迁自动级联。
//! [`actor`] 模块把运行时移入 tokio 任务，供多个调用方并发驱动。
pub mod actor;
pub mod dispatcher;
pub mod event;

pub use actor::{Command, RuntimeActor, RuntimeHandle, spawn};
pub use dispatcher::{CascadePolicy, Runtime, RuntimeError};
pub use event::{Context, Event, Getter, Handler};
