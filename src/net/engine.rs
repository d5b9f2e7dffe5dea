//! 运行时标识：一个网结构上的可变标识与按名发生.
use std::sync::Arc;

use crate::net::core::{FireError, Net};
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::structure::{Marking, MarkingSnapshot, Weight};

/// 绑定到共享 [`Net`] 的标识。每次 [`Engine::fire`] 要么完整生效，
/// 要么不改变标识
#[derive(Debug, Clone)]
pub struct Engine {
    net: Arc<Net>,
    marking: Marking,
}

impl Engine {
    pub fn new(net: Arc<Net>) -> Self {
        let marking = net.initial_marking();
        Self { net, marking }
    }

    pub fn with_marking(net: Arc<Net>, marking: Marking) -> Result<Self, FireError> {
        net.check_marking(&marking)?;
        Ok(Self { net, marking })
    }

    pub fn net(&self) -> &Arc<Net> {
        &self.net
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn tokens(&self, place: &str) -> Option<Weight> {
        self.net
            .place_id(place)
            .map(|place| self.marking.tokens(place))
    }

    pub fn place_tokens(&self, place: PlaceId) -> Weight {
        self.marking.tokens(place)
    }

    pub fn enabled(&self, transition: TransitionId) -> bool {
        self.net.is_enabled(&self.marking, transition)
    }

    pub fn enabled_named(&self, transition: &str) -> Result<bool, FireError> {
        Ok(self.enabled(self.resolve(transition)?))
    }

    /// 按网中顺序列出使能迁移
    pub fn available(&self) -> Vec<TransitionId> {
        self.net.enabled_transitions(&self.marking)
    }

    pub fn fire(&mut self, transition: TransitionId) -> Result<(), FireError> {
        let next = self.net.fire(&self.marking, transition)?;
        log::debug!(
            "fired `{}`: {:?} -> {:?}",
            self.transition_name(transition),
            self.marking,
            next
        );
        self.marking = next;
        Ok(())
    }

    pub fn fire_named(&mut self, transition: &str) -> Result<(), FireError> {
        let id = self.resolve(transition)?;
        self.fire(id)
    }

    pub fn resolve(&self, transition: &str) -> Result<TransitionId, FireError> {
        self.net
            .transition_id(transition)
            .ok_or_else(|| FireError::UnknownTransition(transition.to_string()))
    }

    pub fn transition_name(&self, transition: TransitionId) -> &str {
        self.net
            .transition(transition)
            .map(|t| t.name.as_str())
            .unwrap_or("<unknown>")
    }

    /// 以库所名为键的只读标识快照
    pub fn snapshot(&self) -> MarkingSnapshot {
        self.net
            .places()
            .iter_enumerated()
            .map(|(id, place)| (place.name.clone(), self.marking.tokens(id)))
            .collect()
    }

    pub fn reset(&mut self) {
        self.marking = self.net.initial_marking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::core::NetBuilder;
    use crate::net::structure::Place;

    fn queue(capacity: Weight) -> Arc<Net> {
        Arc::new(
            NetBuilder::new()
                .place(Place::new_with_tokens_and_capacity("Q", 0, capacity))
                .transition("enqueue")
                .transition("dequeue")
                .arc("enqueue", "Q")
                .arc("Q", "dequeue")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn failed_fire_keeps_marking() {
        let mut engine = Engine::new(queue(1));
        engine.fire_named("enqueue").unwrap();
        let before = engine.marking().clone();

        assert!(matches!(
            engine.fire_named("enqueue"),
            Err(FireError::PlaceFull { .. })
        ));
        assert_eq!(engine.marking(), &before);
    }

    #[test]
    fn unknown_transition_is_reported() {
        let mut engine = Engine::new(queue(1));
        assert_eq!(
            engine.fire_named("nope"),
            Err(FireError::UnknownTransition("nope".into()))
        );
    }

    #[test]
    fn snapshot_and_reset() {
        let mut engine = Engine::new(queue(0));
        engine.fire_named("enqueue").unwrap();
        engine.fire_named("enqueue").unwrap();
        assert_eq!(engine.snapshot().get("Q"), Some(&2));
        assert_eq!(engine.tokens("Q"), Some(2));

        engine.reset();
        assert_eq!(engine.tokens("Q"), Some(0));
    }

    #[test]
    fn with_marking_validates_bounds() {
        let net = queue(2);
        assert!(Engine::with_marking(net.clone(), Marking::from(vec![3])).is_err());
        assert!(Engine::with_marking(net.clone(), Marking::from(vec![1, 1])).is_err());
        let engine = Engine::with_marking(net, Marking::from(vec![2])).unwrap();
        assert!(engine.enabled_named("dequeue").unwrap());
    }
}
