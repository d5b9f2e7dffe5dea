//! P/T 网静态结构元素：库所、迁移、节点、弧与标识。
use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::IndexVec;

pub type Weight = u64;

/// 库所名 → 令牌数，按网中库所顺序
pub type MarkingSnapshot = IndexMap<String, Weight>;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    pub name: String,
    /// 初始令牌数
    pub tokens: Weight,
    /// `0` 表示无界
    pub capacity: Weight,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: 0,
            capacity: 0,
        }
    }

    pub fn new_with_tokens_and_capacity(
        name: impl Into<String>,
        tokens: Weight,
        capacity: Weight,
    ) -> Self {
        Self {
            name: name.into(),
            tokens,
            capacity,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity > 0
    }

    /// `tokens` 是否不超过容量
    pub fn admits(&self, tokens: Weight) -> bool {
        !self.is_bounded() || tokens <= self.capacity
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    pub name: String,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

/// 弧的端点
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Place(PlaceId),
    Transition(TransitionId),
}

impl Node {
    pub fn as_place(self) -> Option<PlaceId> {
        match self {
            Node::Place(place) => Some(place),
            Node::Transition(_) => None,
        }
    }

    pub fn as_transition(self) -> Option<TransitionId> {
        match self {
            Node::Transition(transition) => Some(transition),
            Node::Place(_) => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Place(place) => write!(f, "{place}"),
            Node::Transition(transition) => write!(f, "{transition}"),
        }
    }
}

/// 有向弧 `head -> tail`，恰有一端是库所，否则 [`Net`] 构建失败
///
/// [`Net`]: crate::net::Net
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Arc {
    pub head: Node,
    pub tail: Node,
}

impl Arc {
    pub fn new(head: Node, tail: Node) -> Self {
        Self { head, tail }
    }

    /// `place -> transition`，输入弧
    pub fn input(place: PlaceId, transition: TransitionId) -> Self {
        Self::new(Node::Place(place), Node::Transition(transition))
    }

    /// `transition -> place`，输出弧
    pub fn output(transition: TransitionId, place: PlaceId) -> Self {
        Self::new(Node::Transition(transition), Node::Place(place))
    }

    /// 库所端点，不论在哪一侧
    pub fn place(&self) -> Option<PlaceId> {
        self.head.as_place().or_else(|| self.tail.as_place())
    }

    /// 迁移端点，不论在哪一侧
    pub fn transition(&self) -> Option<TransitionId> {
        self.head
            .as_transition()
            .or_else(|| self.tail.as_transition())
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Arc({} -> {})", self.head, self.tail)
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Marking(pub IndexVec<PlaceId, Weight>);

impl Marking {
    pub fn new(initial: IndexVec<PlaceId, Weight>) -> Self {
        Self(initial)
    }

    pub fn zeros(places: usize) -> Self {
        Self(IndexVec::from_elem(0, places))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, &Weight)> {
        self.0.iter_enumerated()
    }

    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0[place]
    }

    pub fn tokens_mut(&mut self, place: PlaceId) -> &mut Weight {
        &mut self.0[place]
    }

    pub fn total(&self) -> Weight {
        self.0.iter().sum()
    }

    pub fn as_slice(&self) -> &[Weight] {
        self.0.as_slice()
    }

    /// 逐分量 `self ≥ other` 且至少一处严格大于
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Greater))
    }
}

impl From<Vec<Weight>> for Marking {
    fn from(value: Vec<Weight>) -> Self {
        Self(IndexVec::from(value))
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter() {
            map.entry(&place, tokens);
        }
        map.finish()
    }
}

impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.len() != other.len() {
            return None;
        }
        let mut less = false;
        let mut greater = false;
        for (left, right) in self.0.iter().zip(other.0.iter()) {
            match left.cmp(right) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (true, true) => None,
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => Some(Ordering::Equal),
        }
    }
}
