//! 跨越运行时边界的事件，以及绑定到迁移上的回调。
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::net::engine::Engine;
use crate::net::ids::TransitionId;
use crate::net::structure::MarkingSnapshot;

/// 带名称的不透明载荷，传输适配层负责与线上消息互相转换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// 载荷为 `null` 的事件
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// 处理器与取值函数看到的上下文：刚发生的迁移及其后的标识
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub transition: String,
    pub marking: MarkingSnapshot,
}

impl Context {
    pub(crate) fn after_firing(engine: &Engine, transition: TransitionId) -> Self {
        Self {
            transition: engine.transition_name(transition).to_string(),
            marking: engine.snapshot(),
        }
    }
}

/// 把路由到的事件转换为响应事件
pub type Handler = Box<dyn FnMut(&Context, Event) -> anyhow::Result<Event> + Send>;

/// 生成通知事件的载荷
pub type Getter = Box<dyn FnMut(&Context) -> anyhow::Result<Value> + Send>;
