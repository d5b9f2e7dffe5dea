//! 网结构与发生代数：构造期校验、可发生判定与原子发生.
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use indexmap::map::Entry;
use smallvec::SmallVec;
use thiserror::Error;

use crate::net::ids::{ArcId, PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Arc, Marking, Node, Place, Transition, Weight};

type ArcList = SmallVec<[ArcId; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("duplicate place name `{0}`")]
    DuplicatePlace(String),
    #[error("duplicate transition name `{0}`")]
    DuplicateTransition(String),
    #[error("unknown node `{0}`")]
    UnknownNode(String),
    #[error("`{0}` names both a place and a transition")]
    AmbiguousNode(String),
    #[error("arc {head} -> {tail} connects two places")]
    TwoPlaceArc { head: String, tail: String },
    #[error("arc {head} -> {tail} connects two transitions")]
    TwoTransitionArc { head: String, tail: String },
    #[error("duplicate arc {head} -> {tail}")]
    DuplicateArc { head: String, tail: String },
    #[error("place `{place}` starts with {tokens} tokens, above its capacity {capacity}")]
    InitialExceedsCapacity {
        place: String,
        tokens: Weight,
        capacity: Weight,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FireError {
    #[error("unknown transition `{0}`")]
    UnknownTransition(String),
    #[error("transition {0} is out of bounds")]
    OutOfBounds(TransitionId),
    #[error("transition `{0}` is not enabled under the current marking")]
    NotEnabled(String),
    #[error("place `{place}` is full: {after} > {capacity}")]
    PlaceFull {
        place: String,
        after: Weight,
        capacity: Weight,
    },
    #[error("marking does not fit the net: {0}")]
    InvalidMarking(String),
    #[error("place `{0}` would overflow its token count")]
    Overflow(String),
}

/// 网的连通性诊断。均不是错误，但通常意味着建模失误
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub isolated_places: Vec<(PlaceId, String)>,
    pub isolated_transitions: Vec<(TransitionId, String)>,
    /// 无输入库所的迁移，总是使能
    pub source_transitions: Vec<(TransitionId, String)>,
    /// 无输出库所的迁移
    pub sink_transitions: Vec<(TransitionId, String)>,
    pub total_places: usize,
    pub total_transitions: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.source_transitions.is_empty()
    }
}

/// 不可变的库所/迁移网。每条弧连接一个库所和一个迁移，
/// 在 [`Net::new`] 中统一检查
#[derive(Clone)]
pub struct Net {
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    arcs: IndexVec<ArcId, Arc>,
    inputs: IndexVec<TransitionId, ArcList>,
    outputs: IndexVec<TransitionId, ArcList>,
    place_index: IndexMap<String, PlaceId>,
    transition_index: IndexMap<String, TransitionId>,
    arc_index: HashMap<(Node, Node), ArcId>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("arcs", &self.arcs)
            .finish()
    }
}

impl Net {
    pub fn new(
        places: Vec<Place>,
        transitions: Vec<Transition>,
        arcs: Vec<Arc>,
    ) -> Result<Self, NetError> {
        let places: IndexVec<PlaceId, Place> = IndexVec::from(places);
        let transitions: IndexVec<TransitionId, Transition> = IndexVec::from(transitions);

        let mut place_index = IndexMap::with_capacity(places.len());
        for (id, place) in places.iter_enumerated() {
            if !place.admits(place.tokens) {
                return Err(NetError::InitialExceedsCapacity {
                    place: place.name.clone(),
                    tokens: place.tokens,
                    capacity: place.capacity,
                });
            }
            match place_index.entry(place.name.clone()) {
                Entry::Occupied(_) => return Err(NetError::DuplicatePlace(place.name.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }

        let mut transition_index = IndexMap::with_capacity(transitions.len());
        for (id, transition) in transitions.iter_enumerated() {
            match transition_index.entry(transition.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(NetError::DuplicateTransition(transition.name.clone()));
                }
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
        }

        let mut net = Self {
            inputs: IndexVec::from_elem(ArcList::new(), transitions.len()),
            outputs: IndexVec::from_elem(ArcList::new(), transitions.len()),
            places,
            transitions,
            arcs: IndexVec::new(),
            place_index,
            transition_index,
            arc_index: HashMap::new(),
        };
        for arc in arcs {
            net.push_arc(arc)?;
        }
        Ok(net)
    }

    fn push_arc(&mut self, arc: Arc) -> Result<ArcId, NetError> {
        let head = self.node_name(arc.head)?;
        let tail = self.node_name(arc.tail)?;
        let transition = match (arc.head, arc.tail) {
            (Node::Place(_), Node::Place(_)) => return Err(NetError::TwoPlaceArc { head, tail }),
            (Node::Transition(_), Node::Transition(_)) => {
                return Err(NetError::TwoTransitionArc { head, tail });
            }
            (Node::Place(_), Node::Transition(t)) | (Node::Transition(t), Node::Place(_)) => t,
        };
        if self.arc_index.contains_key(&(arc.head, arc.tail)) {
            return Err(NetError::DuplicateArc { head, tail });
        }

        let id = self.arcs.push(arc);
        self.arc_index.insert((arc.head, arc.tail), id);
        if arc.tail == Node::Transition(transition) {
            self.inputs[transition].push(id);
        } else {
            self.outputs[transition].push(id);
        }
        Ok(id)
    }

    fn node_name(&self, node: Node) -> Result<String, NetError> {
        let name = match node {
            Node::Place(place) => self.places.get(place).map(|p| p.name.clone()),
            Node::Transition(transition) => {
                self.transitions.get(transition).map(|t| t.name.clone())
            }
        };
        name.ok_or_else(|| NetError::UnknownNode(node.to_string()))
    }

    pub fn places(&self) -> &IndexVec<PlaceId, Place> {
        &self.places
    }

    pub fn transitions(&self) -> &IndexVec<TransitionId, Transition> {
        &self.transitions
    }

    pub fn arcs(&self) -> &IndexVec<ArcId, Arc> {
        &self.arcs
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn place_id(&self, name: &str) -> Option<PlaceId> {
        self.place_index.get(name).copied()
    }

    pub fn transition_id(&self, name: &str) -> Option<TransitionId> {
        self.transition_index.get(name).copied()
    }

    /// 以 `transition` 为尾的弧，按插入顺序
    pub fn input_arcs(&self, transition: TransitionId) -> impl Iterator<Item = &Arc> + '_ {
        self.arc_list(&self.inputs, transition)
    }

    /// 以 `transition` 为头的弧，按插入顺序
    pub fn output_arcs(&self, transition: TransitionId) -> impl Iterator<Item = &Arc> + '_ {
        self.arc_list(&self.outputs, transition)
    }

    fn arc_list<'a>(
        &'a self,
        lists: &'a IndexVec<TransitionId, ArcList>,
        transition: TransitionId,
    ) -> impl Iterator<Item = &'a Arc> + 'a {
        lists
            .get(transition)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .map(move |id| &self.arcs[*id])
    }

    pub fn input_places(&self, transition: TransitionId) -> impl Iterator<Item = PlaceId> + '_ {
        self.input_arcs(transition).filter_map(|arc| arc.head.as_place())
    }

    pub fn output_places(&self, transition: TransitionId) -> impl Iterator<Item = PlaceId> + '_ {
        self.output_arcs(transition).filter_map(|arc| arc.tail.as_place())
    }

    /// 弧 `head -> tail`（若存在）
    pub fn arc_between(&self, head: Node, tail: Node) -> Option<&Arc> {
        self.arc_index.get(&(head, tail)).map(|id| &self.arcs[*id])
    }

    pub fn initial_marking(&self) -> Marking {
        Marking::new(self.places.iter().map(|p| p.tokens).collect())
    }

    /// 检查外部标识的长度与容量
    pub fn check_marking(&self, marking: &Marking) -> Result<(), FireError> {
        if marking.len() != self.places_len() {
            return Err(FireError::InvalidMarking(format!(
                "expected {} places, found {}",
                self.places_len(),
                marking.len()
            )));
        }
        for (place, tokens) in marking.iter() {
            let spec = &self.places[place];
            if !spec.admits(*tokens) {
                return Err(FireError::InvalidMarking(format!(
                    "place `{}` holds {} tokens, above its capacity {}",
                    spec.name, tokens, spec.capacity
                )));
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self, marking: &Marking, transition: TransitionId) -> bool {
        if transition.index() >= self.transitions_len() {
            return false;
        }
        self.input_places(transition)
            .all(|place| marking.0.get(place).is_some_and(|tokens| *tokens >= 1))
    }

    pub fn enabled_transitions(&self, marking: &Marking) -> Vec<TransitionId> {
        self.transitions
            .indices()
            .filter(|transition| self.is_enabled(marking, *transition))
            .collect()
    }

    /// 在 `marking` 的副本上发生 `transition`。
    /// 所有检查完成后才返回副本，失败不会留下半更新的标识
    pub fn fire(&self, marking: &Marking, transition: TransitionId) -> Result<Marking, FireError> {
        let Some(spec) = self.transitions.get(transition) else {
            return Err(FireError::OutOfBounds(transition));
        };
        if marking.len() != self.places_len() {
            return Err(FireError::InvalidMarking(format!(
                "expected {} places, found {}",
                self.places_len(),
                marking.len()
            )));
        }
        if !self.is_enabled(marking, transition) {
            return Err(FireError::NotEnabled(spec.name.clone()));
        }

        let mut next = marking.clone();
        for place in self.input_places(transition) {
            *next.tokens_mut(place) -= 1;
        }
        for place in self.output_places(transition) {
            let tokens = next.tokens_mut(place);
            let target = &self.places[place];
            let after = tokens
                .checked_add(1)
                .ok_or_else(|| FireError::Overflow(target.name.clone()))?;
            if !target.admits(after) {
                return Err(FireError::PlaceFull {
                    place: target.name.clone(),
                    after,
                    capacity: target.capacity,
                });
            }
            *tokens = after;
        }
        Ok(next)
    }

    pub fn diagnose(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            total_places: self.places_len(),
            total_transitions: self.transitions_len(),
            ..DiagnosticReport::default()
        };

        let mut touched = IndexVec::<PlaceId, bool>::from_elem(false, self.places_len());
        for arc in self.arcs.iter() {
            if let Some(place) = arc.place() {
                touched[place] = true;
            }
        }
        for (place, seen) in touched.iter_enumerated() {
            if !*seen {
                report
                    .isolated_places
                    .push((place, self.places[place].name.clone()));
            }
        }

        for (id, transition) in self.transitions.iter_enumerated() {
            let has_preset = !self.inputs[id].is_empty();
            let has_postset = !self.outputs[id].is_empty();
            let entry = (id, transition.name.clone());
            match (has_preset, has_postset) {
                (false, false) => report.isolated_transitions.push(entry),
                (false, true) => report.source_transitions.push(entry),
                (true, false) => report.sink_transitions.push(entry),
                (true, true) => {}
            }
        }
        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose();
        if !report.has_issues() {
            log::debug!(
                "net connectivity ok: {} places, {} transitions",
                report.total_places,
                report.total_transitions
            );
            return;
        }
        for (id, name) in &report.isolated_places {
            log::warn!("isolated place `{}` ({})", name, id);
        }
        for (id, name) in &report.isolated_transitions {
            log::warn!("isolated transition `{}` ({})", name, id);
        }
        for (id, name) in &report.source_transitions {
            log::warn!("transition `{}` ({}) has no input place and is always enabled", name, id);
        }
    }
}

/// 按名称构建 [`Net`]
#[derive(Debug, Default, Clone)]
pub struct NetBuilder {
    places: Vec<Place>,
    transitions: Vec<Transition>,
    arcs: Vec<(String, String)>,
}

impl NetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(mut self, place: Place) -> Self {
        self.places.push(place);
        self
    }

    pub fn transition(mut self, name: impl Into<String>) -> Self {
        self.transitions.push(Transition::new(name));
        self
    }

    /// 添加 `head -> tail`，名称在 [`NetBuilder::build`] 中解析
    pub fn arc(mut self, head: impl Into<String>, tail: impl Into<String>) -> Self {
        self.arcs.push((head.into(), tail.into()));
        self
    }

    pub fn build(self) -> Result<Net, NetError> {
        let lookup = |name: &str| -> Result<Node, NetError> {
            let place = self.places.iter().position(|p| p.name == name);
            let transition = self.transitions.iter().position(|t| t.name == name);
            match (place, transition) {
                (Some(_), Some(_)) => Err(NetError::AmbiguousNode(name.to_string())),
                (Some(idx), None) => Ok(Node::Place(PlaceId::from_usize(idx))),
                (None, Some(idx)) => Ok(Node::Transition(TransitionId::from_usize(idx))),
                (None, None) => Err(NetError::UnknownNode(name.to_string())),
            }
        };
        let arcs = self
            .arcs
            .iter()
            .map(|(head, tail)| Ok(Arc::new(lookup(head)?, lookup(tail)?)))
            .collect::<Result<Vec<_>, NetError>>()?;
        Net::new(self.places, self.transitions, arcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_switch() -> Net {
        NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("off", 1, 0))
            .place(Place::new("shining"))
            .transition("illuminate")
            .transition("extinguish")
            .arc("off", "illuminate")
            .arc("illuminate", "shining")
            .arc("shining", "extinguish")
            .arc("extinguish", "off")
            .build()
            .unwrap()
    }

    #[test]
    fn input_and_output_arcs_follow_arc_direction() {
        let net = light_switch();
        let illuminate = net.transition_id("illuminate").unwrap();
        let off = net.place_id("off").unwrap();
        let shining = net.place_id("shining").unwrap();

        assert_eq!(net.input_places(illuminate).collect::<Vec<_>>(), vec![off]);
        assert_eq!(net.output_places(illuminate).collect::<Vec<_>>(), vec![shining]);
        assert!(
            net.arc_between(Node::Place(off), Node::Transition(illuminate))
                .is_some()
        );
        assert!(
            net.arc_between(Node::Transition(illuminate), Node::Place(off))
                .is_none()
        );
    }

    #[test]
    fn rejects_two_transition_arc() {
        let err = NetBuilder::new()
            .transition("a")
            .transition("b")
            .arc("a", "b")
            .build()
            .unwrap_err();
        assert!(matches!(err, NetError::TwoTransitionArc { .. }));
    }

    #[test]
    fn rejects_two_place_arc() {
        let err = NetBuilder::new()
            .place(Place::new("a"))
            .place(Place::new("b"))
            .arc("a", "b")
            .build()
            .unwrap_err();
        assert!(matches!(err, NetError::TwoPlaceArc { .. }));
    }

    #[test]
    fn rejects_duplicates_and_unknown_names() {
        let dup = NetBuilder::new()
            .place(Place::new("p"))
            .place(Place::new("p"))
            .build();
        assert_eq!(dup.unwrap_err(), NetError::DuplicatePlace("p".into()));

        let unknown = NetBuilder::new()
            .place(Place::new("p"))
            .arc("p", "missing")
            .build();
        assert_eq!(unknown.unwrap_err(), NetError::UnknownNode("missing".into()));

        let ambiguous = NetBuilder::new()
            .place(Place::new("x"))
            .transition("x")
            .arc("x", "x")
            .build();
        assert_eq!(ambiguous.unwrap_err(), NetError::AmbiguousNode("x".into()));

        let twice = NetBuilder::new()
            .place(Place::new("p"))
            .transition("t")
            .arc("p", "t")
            .arc("p", "t")
            .build();
        assert!(matches!(twice.unwrap_err(), NetError::DuplicateArc { .. }));
    }

    #[test]
    fn rejects_arc_to_missing_id() {
        let err = Net::new(
            vec![Place::new("p")],
            vec![Transition::new("t")],
            vec![Arc::input(PlaceId::new(7), TransitionId::new(0))],
        )
        .unwrap_err();
        assert_eq!(err, NetError::UnknownNode("p7".into()));
    }

    #[test]
    fn fire_is_all_or_nothing() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("in", 1, 0))
            .place(Place::new("free"))
            .place(Place::new_with_tokens_and_capacity("full", 1, 1))
            .transition("t")
            .arc("in", "t")
            .arc("t", "free")
            .arc("t", "full")
            .build()
            .unwrap();
        let t = net.transition_id("t").unwrap();
        let marking = net.initial_marking();

        let err = net.fire(&marking, t).unwrap_err();
        assert!(matches!(err, FireError::PlaceFull { ref place, .. } if place == "full"));
        assert_eq!(marking, net.initial_marking());
    }

    #[test]
    fn self_loop_at_capacity_can_fire() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("p", 1, 1))
            .transition("t")
            .arc("p", "t")
            .arc("t", "p")
            .build()
            .unwrap();
        let t = net.transition_id("t").unwrap();
        let next = net.fire(&net.initial_marking(), t).unwrap();
        assert_eq!(next, net.initial_marking());
    }

    #[test]
    fn unbounded_place_overflow_is_an_error() {
        let net = NetBuilder::new()
            .place(Place::new("sink"))
            .transition("emit")
            .arc("emit", "sink")
            .build()
            .unwrap();
        let emit = net.transition_id("emit").unwrap();
        let marking = Marking::from(vec![u64::MAX]);
        assert_eq!(
            net.fire(&marking, emit).unwrap_err(),
            FireError::Overflow("sink".into())
        );
    }

    #[test]
    fn disabled_transition_reports_not_enabled() {
        let net = light_switch();
        let extinguish = net.transition_id("extinguish").unwrap();
        assert_eq!(
            net.fire(&net.initial_marking(), extinguish).unwrap_err(),
            FireError::NotEnabled("extinguish".into())
        );
    }

    #[test]
    fn initial_tokens_must_fit_capacity() {
        let err = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("q", 3, 2))
            .build()
            .unwrap_err();
        assert!(matches!(err, NetError::InitialExceedsCapacity { .. }));
    }

    #[test]
    fn diagnose_flags_sources_and_isolated_nodes() {
        let net = NetBuilder::new()
            .place(Place::new("alone"))
            .place(Place::new("out"))
            .transition("spawn")
            .transition("idle")
            .arc("spawn", "out")
            .build()
            .unwrap();
        let report = net.diagnose();
        assert_eq!(report.isolated_places.len(), 1);
        assert_eq!(report.isolated_transitions.len(), 1);
        assert_eq!(report.source_transitions[0].1, "spawn");
        assert!(report.has_issues());
    }
}
