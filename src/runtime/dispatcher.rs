//! 同步调度核心：事件路由、冷/热变迁分类与自动级联.
//!
//! 变迁默认为“热”（使能即自动发生）；为其绑定处理器后变为“冷”，
//! 只在收到同名事件时发生。每次冷变迁发生后进入级联循环。
use indexmap::IndexMap;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::config::Config;
use crate::net::core::FireError;
use crate::net::engine::Engine;
use crate::net::ids::TransitionId;
use crate::net::index_vec::IndexVec;
use crate::net::structure::MarkingSnapshot;
use crate::runtime::event::{Context, Event, Getter, Handler};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no handler bound to event `{0}`")]
    NoHandler(String),
    #[error("unknown transition `{0}`")]
    UnknownTransition(String),
    #[error(transparent)]
    Fire(#[from] FireError),
    #[error("handler for `{event}` failed: {source}")]
    Handler {
        event: String,
        #[source]
        source: BoxError,
    },
    #[error("notification `{name}` failed: {source}")]
    Notification {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("cascade exceeded {0} automatic firings")]
    CascadeLimit(usize),
    #[error("runtime is no longer running")]
    Closed,
}

/// 级联循环何时继续发生热变迁
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadePolicy {
    /// 可发生的迁移数多于冷变迁数时继续
    #[default]
    CountGuard,
    /// 只要有热变迁可发生就继续
    DrainHot,
}

struct Binding {
    transition: TransitionId,
    handler: Handler,
}

struct Notification {
    name: String,
    getter: Getter,
}

/// 独占 [`Engine`] 的运行时，不可共享；并发调用方请使用
/// [`spawn`](crate::runtime::actor::spawn)
pub struct Runtime {
    engine: Engine,
    bindings: IndexMap<String, Binding>,
    cold: IndexVec<TransitionId, bool>,
    notifications: IndexMap<TransitionId, SmallVec<[Notification; 2]>>,
    outbox: Vec<Event>,
    policy: CascadePolicy,
    cascade_limit: usize,
}

impl Runtime {
    pub fn new(engine: Engine) -> Self {
        Self::with_config(engine, &Config::default())
    }

    pub fn with_config(engine: Engine, config: &Config) -> Self {
        let cold = IndexVec::from_elem(false, engine.net().transitions_len());
        Self {
            engine,
            bindings: IndexMap::new(),
            cold,
            notifications: IndexMap::new(),
            outbox: Vec::new(),
            policy: config.cascade_policy,
            cascade_limit: config.cascade_limit,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn policy(&self) -> CascadePolicy {
        self.policy
    }

    /// 把 `event` 绑定到 `transition` 并将其标为冷变迁；
    /// 重复绑定同名事件会替换旧绑定
    pub fn add_handler<F>(
        &mut self,
        event: impl Into<String>,
        transition: &str,
        handler: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnMut(&Context, Event) -> anyhow::Result<Event> + Send + 'static,
    {
        self.add_boxed_handler(event.into(), transition, Box::new(handler))
    }

    pub(crate) fn add_boxed_handler(
        &mut self,
        event: String,
        transition: &str,
        handler: Handler,
    ) -> Result<(), RuntimeError> {
        let transition = self.resolve(transition)?;
        let binding = Binding {
            transition,
            handler,
        };
        if let Some(previous) = self.bindings.insert(event.clone(), binding) {
            warn!(
                "event `{}` rebound from `{}` to `{}`",
                event,
                self.engine.transition_name(previous.transition),
                self.engine.transition_name(transition)
            );
        }
        self.recompute_cold();
        debug!(
            "handler for `{}` bound to `{}`",
            event,
            self.engine.transition_name(transition)
        );
        Ok(())
    }

    /// 注册取值函数，`transition` 每次发生后其结果作为事件 `name` 发布
    pub fn add_notification<F>(
        &mut self,
        name: impl Into<String>,
        transition: &str,
        getter: F,
    ) -> Result<(), RuntimeError>
    where
        F: FnMut(&Context) -> anyhow::Result<serde_json::Value> + Send + 'static,
    {
        self.add_boxed_notification(name.into(), transition, Box::new(getter))
    }

    pub(crate) fn add_boxed_notification(
        &mut self,
        name: String,
        transition: &str,
        getter: Getter,
    ) -> Result<(), RuntimeError> {
        let transition = self.resolve(transition)?;
        self.notifications
            .entry(transition)
            .or_default()
            .push(Notification { name, getter });
        Ok(())
    }

    /// 路由 `event`：发生绑定的迁移，执行处理器，缓存响应，再级联热变迁。
    ///
    /// 中途失败时已发生的迁移不会回滚，可通过 [`Runtime::snapshot`] 重新读取状态
    pub fn handle(&mut self, event: Event) -> Result<usize, RuntimeError> {
        let binding = self
            .bindings
            .get_mut(&event.name)
            .ok_or_else(|| RuntimeError::NoHandler(event.name.clone()))?;
        let transition = binding.transition;
        self.engine.fire(transition)?;

        let ctx = Context::after_firing(&self.engine, transition);
        let name = event.name.clone();
        let response = (binding.handler)(&ctx, event).map_err(|err| RuntimeError::Handler {
            event: name,
            source: err.into(),
        })?;
        self.outbox.push(response);

        self.notify(transition)?;
        self.cascade()
    }

    /// 不路由事件，直接运行级联循环，例如初始化后热变迁已使能时
    pub fn settle(&mut self) -> Result<usize, RuntimeError> {
        self.cascade()
    }

    pub fn is_hot(&self, transition: &str) -> Result<bool, RuntimeError> {
        let id = self.resolve(transition)?;
        Ok(!self.cold[id])
    }

    pub fn hot_transitions(&self) -> Vec<String> {
        self.transitions_where(false)
    }

    pub fn cold_transitions(&self) -> Vec<String> {
        self.transitions_where(true)
    }

    pub fn snapshot(&self) -> MarkingSnapshot {
        self.engine.snapshot()
    }

    /// 取出上次调用以来产生的事件，先产生的在前
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn cascade(&mut self) -> Result<usize, RuntimeError> {
        let cold_count = self.cold.iter().filter(|cold| **cold).count();
        let mut fired = 0;
        loop {
            let available = self.engine.available();
            let hot: Vec<TransitionId> = available
                .iter()
                .copied()
                .filter(|t| !self.cold[*t])
                .collect();
            let proceed = match self.policy {
                CascadePolicy::CountGuard => available.len() > cold_count,
                CascadePolicy::DrainHot => true,
            };
            if !proceed || hot.is_empty() {
                break;
            }
            for transition in hot {
                // an earlier firing in this pass may have consumed its input
                if !self.engine.enabled(transition) {
                    trace!(
                        "skipping `{}`, no longer enabled",
                        self.engine.transition_name(transition)
                    );
                    continue;
                }
                if fired >= self.cascade_limit {
                    return Err(RuntimeError::CascadeLimit(self.cascade_limit));
                }
                self.engine.fire(transition)?;
                fired += 1;
                self.notify(transition)?;
            }
        }
        if fired > 0 {
            debug!("cascade fired {} hot transitions", fired);
        }
        Ok(fired)
    }

    fn notify(&mut self, transition: TransitionId) -> Result<(), RuntimeError> {
        let Some(notifications) = self.notifications.get_mut(&transition) else {
            return Ok(());
        };
        let ctx = Context::after_firing(&self.engine, transition);
        for notification in notifications.iter_mut() {
            let data = (notification.getter)(&ctx).map_err(|err| RuntimeError::Notification {
                name: notification.name.clone(),
                source: err.into(),
            })?;
            self.outbox.push(Event::new(notification.name.clone(), data));
        }
        Ok(())
    }

    fn recompute_cold(&mut self) {
        for cold in self.cold.iter_mut() {
            *cold = false;
        }
        for binding in self.bindings.values() {
            self.cold[binding.transition] = true;
        }
    }

    fn transitions_where(&self, cold: bool) -> Vec<String> {
        self.cold
            .iter_enumerated()
            .filter(|(_, is_cold)| **is_cold == cold)
            .map(|(id, _)| self.engine.transition_name(id).to_string())
            .collect()
    }

    fn resolve(&self, transition: &str) -> Result<TransitionId, RuntimeError> {
        self.engine
            .net()
            .transition_id(transition)
            .ok_or_else(|| RuntimeError::UnknownTransition(transition.to_string()))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("marking", self.engine.marking())
            .field("events", &self.bindings.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("pending", &self.outbox.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::core::{Net, NetBuilder};
    use crate::net::structure::Place;
    use serde_json::json;
    use std::sync::Arc;

    fn light_switch() -> Arc<Net> {
        Arc::new(
            NetBuilder::new()
                .place(Place::new_with_tokens_and_capacity("off", 1, 1))
                .place(Place::new_with_tokens_and_capacity("shining", 0, 1))
                .transition("illuminate")
                .transition("extinguish")
                .arc("off", "illuminate")
                .arc("illuminate", "shining")
                .arc("shining", "extinguish")
                .arc("extinguish", "off")
                .build()
                .unwrap(),
        )
    }

    /// `request` 是 `ready` 上的自环并向 `queue` 放令牌，`process` 自动把 `queue` 移入 `done`
    fn pipeline() -> Arc<Net> {
        Arc::new(
            NetBuilder::new()
                .place(Place::new_with_tokens_and_capacity("ready", 1, 0))
                .place(Place::new("queue"))
                .place(Place::new("done"))
                .transition("request")
                .transition("process")
                .arc("ready", "request")
                .arc("request", "ready")
                .arc("request", "queue")
                .arc("queue", "process")
                .arc("process", "done")
                .build()
                .unwrap(),
        )
    }

    fn echo(_: &Context, event: Event) -> anyhow::Result<Event> {
        Ok(Event::new(format!("{}_done", event.name), event.data))
    }

    #[test]
    fn binding_demotes_to_cold() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        assert_eq!(runtime.hot_transitions(), vec!["illuminate", "extinguish"]);

        runtime.add_handler("switch_on", "illuminate", echo).unwrap();
        assert!(!runtime.is_hot("illuminate").unwrap());
        assert!(runtime.is_hot("extinguish").unwrap());
        assert_eq!(runtime.cold_transitions(), vec!["illuminate"]);
    }

    #[test]
    fn unknown_transition_binding_fails() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        assert!(matches!(
            runtime.add_handler("x", "nope", echo),
            Err(RuntimeError::UnknownTransition(name)) if name == "nope"
        ));
    }

    #[test]
    fn routed_event_fires_and_responds() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        runtime.add_handler("switch_on", "illuminate", echo).unwrap();
        runtime.add_handler("switch_off", "extinguish", echo).unwrap();

        runtime
            .handle(Event::new("switch_on", json!({"lux": 300})))
            .unwrap();
        assert_eq!(runtime.snapshot().get("shining"), Some(&1));
        assert_eq!(
            runtime.take_events(),
            vec![Event::new("switch_on_done", json!({"lux": 300}))]
        );

        assert!(matches!(
            runtime.handle(Event::named("switch_on")),
            Err(RuntimeError::Fire(FireError::NotEnabled(_)))
        ));
        assert!(runtime.take_events().is_empty());
    }

    #[test]
    fn missing_handler_is_reported() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        assert!(matches!(
            runtime.handle(Event::named("switch_on")),
            Err(RuntimeError::NoHandler(name)) if name == "switch_on"
        ));
        assert_eq!(runtime.snapshot().get("off"), Some(&1));
    }

    #[test]
    fn handler_sees_post_fire_marking() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        runtime
            .add_handler("switch_on", "illuminate", |ctx: &Context, event: Event| {
                assert_eq!(ctx.transition, "illuminate");
                assert_eq!(ctx.marking.get("shining"), Some(&1));
                Ok(event)
            })
            .unwrap();
        runtime.handle(Event::named("switch_on")).unwrap();
    }

    #[test]
    fn handler_failure_keeps_firing() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        runtime
            .add_handler("switch_on", "illuminate", |_: &Context, _: Event| {
                Err(anyhow::anyhow!("relay stuck"))
            })
            .unwrap();
        let err = runtime.handle(Event::named("switch_on")).unwrap_err();
        assert!(matches!(err, RuntimeError::Handler { ref event, .. } if event == "switch_on"));
        assert!(err.to_string().contains("relay stuck"));
        assert_eq!(runtime.snapshot().get("shining"), Some(&1));
    }

    #[test]
    fn count_guard_cascades_hot_transitions() {
        let mut runtime = Runtime::new(Engine::new(pipeline()));
        runtime.add_handler("request", "request", echo).unwrap();

        let fired = runtime.handle(Event::named("request")).unwrap();
        assert_eq!(fired, 1);
        let snapshot = runtime.snapshot();
        assert_eq!(snapshot.get("queue"), Some(&0));
        assert_eq!(snapshot.get("done"), Some(&1));
    }

    #[test]
    fn count_guard_stops_at_cold_count() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("off", 1, 0))
            .place(Place::new("shining"))
            .transition("illuminate")
            .transition("auto_off")
            .arc("off", "illuminate")
            .arc("illuminate", "shining")
            .arc("shining", "auto_off")
            .arc("auto_off", "off")
            .build()
            .map(Arc::new)
            .unwrap();

        let mut guarded = Runtime::new(Engine::new(net.clone()));
        guarded.add_handler("on", "illuminate", echo).unwrap();
        assert_eq!(guarded.handle(Event::named("on")).unwrap(), 0);
        assert_eq!(guarded.snapshot().get("shining"), Some(&1));

        let config = Config {
            cascade_policy: CascadePolicy::DrainHot,
            ..Config::default()
        };
        let mut draining = Runtime::with_config(Engine::new(net), &config);
        draining.add_handler("on", "illuminate", echo).unwrap();
        assert_eq!(draining.handle(Event::named("on")).unwrap(), 1);
        assert_eq!(draining.snapshot().get("off"), Some(&1));
    }

    #[test]
    fn cascade_limit_stops_runaway_generator() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("seed", 1, 0))
            .place(Place::new("sink"))
            .transition("spin")
            .arc("seed", "spin")
            .arc("spin", "seed")
            .arc("spin", "sink")
            .build()
            .map(Arc::new)
            .unwrap();
        let config = Config {
            cascade_limit: 25,
            ..Config::default()
        };
        let mut runtime = Runtime::with_config(Engine::new(net), &config);

        assert!(matches!(
            runtime.settle(),
            Err(RuntimeError::CascadeLimit(25))
        ));
        assert_eq!(runtime.snapshot().get("sink"), Some(&25));
    }

    #[test]
    fn notifications_follow_each_firing() {
        let mut runtime = Runtime::new(Engine::new(pipeline()));
        runtime.add_handler("request", "request", echo).unwrap();
        runtime
            .add_notification("processed", "process", |ctx: &Context| {
                Ok(json!(ctx.marking.get("done").copied().unwrap_or(0)))
            })
            .unwrap();

        runtime.handle(Event::named("request")).unwrap();
        runtime.handle(Event::named("request")).unwrap();
        let names: Vec<_> = runtime
            .take_events()
            .into_iter()
            .map(|event| (event.name, event.data))
            .collect();
        assert_eq!(
            names,
            vec![
                ("request_done".to_string(), json!(null)),
                ("processed".to_string(), json!(1)),
                ("request_done".to_string(), json!(null)),
                ("processed".to_string(), json!(2)),
            ]
        );
    }

    #[test]
    fn failing_notification_aborts_cascade() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("a", 1, 0))
            .place(Place::new("b"))
            .place(Place::new("c"))
            .transition("ab")
            .transition("bc")
            .arc("a", "ab")
            .arc("ab", "b")
            .arc("b", "bc")
            .arc("bc", "c")
            .build()
            .map(Arc::new)
            .unwrap();
        let mut runtime = Runtime::new(Engine::new(net));
        runtime
            .add_notification("sensor", "ab", |_: &Context| {
                Err(anyhow::anyhow!("sensor offline"))
            })
            .unwrap();

        let err = runtime.settle().unwrap_err();
        assert!(matches!(err, RuntimeError::Notification { ref name, .. } if name == "sensor"));
        assert!(err.to_string().contains("sensor offline"));

        let snapshot = runtime.snapshot();
        assert_eq!(snapshot.get("a"), Some(&0));
        assert_eq!(snapshot.get("b"), Some(&1));
        assert_eq!(snapshot.get("c"), Some(&0));
        assert!(runtime.take_events().is_empty());

        assert_eq!(runtime.settle().unwrap(), 1);
        assert_eq!(runtime.snapshot().get("c"), Some(&1));
    }

    #[test]
    fn failing_notification_after_routed_firing() {
        let mut runtime = Runtime::new(Engine::new(pipeline()));
        runtime.add_handler("request", "request", echo).unwrap();
        runtime
            .add_notification("queued", "request", |_: &Context| {
                Err(anyhow::anyhow!("no listener"))
            })
            .unwrap();

        assert!(matches!(
            runtime.handle(Event::named("request")),
            Err(RuntimeError::Notification { .. })
        ));
        let snapshot = runtime.snapshot();
        assert_eq!(snapshot.get("queue"), Some(&1));
        assert_eq!(snapshot.get("done"), Some(&0));
        assert_eq!(runtime.take_events(), vec![Event::named("request_done")]);
    }

    #[test]
    fn rebinding_moves_cold_flag() {
        let mut runtime = Runtime::new(Engine::new(light_switch()));
        runtime.add_handler("toggle", "illuminate", echo).unwrap();
        runtime.add_handler("toggle", "extinguish", echo).unwrap();
        assert!(runtime.is_hot("illuminate").unwrap());
        assert!(!runtime.is_hot("extinguish").unwrap());
    }
}
