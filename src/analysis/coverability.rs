//! Karp-Miller 覆盖树与有界性分析
//!
//! 从初始标识出发展开可激发迁移。新标识若与某祖先相同则标记为 `Duplicate`
//! 并停止展开；否则对其严格支配的每个祖先，把严格增长的库所加速为 ω。
//! 没有任何可激发迁移的节点标记为 `Terminal`。
//!
//! 有容量上限的库所永远不会被加速为 ω；超过容量的后继不会生成。
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::iter;

use itertools::Itertools;
use serde::Serialize;

use crate::analysis::invariants::structurally_bounded_places;
use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::{Marking, Weight};

/// 可能无界的令牌数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Tokens {
    Finite(Weight),
    Omega,
}

impl Tokens {
    pub fn is_omega(self) -> bool {
        matches!(self, Tokens::Omega)
    }

    fn increment(self) -> Option<Self> {
        match self {
            Tokens::Finite(n) => n.checked_add(1).map(Tokens::Finite),
            Tokens::Omega => Some(Tokens::Omega),
        }
    }

    fn decrement(self) -> Option<Self> {
        match self {
            Tokens::Finite(n) => n.checked_sub(1).map(Tokens::Finite),
            Tokens::Omega => Some(Tokens::Omega),
        }
    }
}

impl PartialOrd for Tokens {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tokens {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Tokens::Finite(a), Tokens::Finite(b)) => a.cmp(b),
            (Tokens::Finite(_), Tokens::Omega) => Ordering::Less,
            (Tokens::Omega, Tokens::Finite(_)) => Ordering::Greater,
            (Tokens::Omega, Tokens::Omega) => Ordering::Equal,
        }
    }
}

impl fmt::Display for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tokens::Finite(n) => write!(f, "{n}"),
            Tokens::Omega => write!(f, "ω"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OmegaMarking(pub IndexVec<PlaceId, Tokens>);

impl OmegaMarking {
    pub fn tokens(&self, place: PlaceId) -> Tokens {
        self.0[place]
    }

    pub fn has_omega(&self) -> bool {
        self.0.iter().any(|tokens| tokens.is_omega())
    }

    /// 各库所 `≥` 且至少一处 `>`
    pub fn dominates(&self, other: &Self) -> bool {
        let mut strict = false;
        for (left, right) in self.0.iter().zip(other.0.iter()) {
            match left.cmp(right) {
                Ordering::Less => return false,
                Ordering::Greater => strict = true,
                Ordering::Equal => {}
            }
        }
        strict && self.0.len() == other.0.len()
    }

    /// 该标识是否在每个库所都不少于 `marking`
    pub fn covers(&self, marking: &Marking) -> bool {
        self.0.len() == marking.len()
            && self
                .0
                .iter()
                .zip(marking.as_slice())
                .all(|(tokens, wanted)| *tokens >= Tokens::Finite(*wanted))
    }
}

impl From<&Marking> for OmegaMarking {
    fn from(marking: &Marking) -> Self {
        Self(marking.as_slice().iter().copied().map(Tokens::Finite).collect())
    }
}

impl fmt::Display for OmegaMarking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeMark {
    Unmarked,
    Terminal,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub marking: OmegaMarking,
    pub mark: NodeMark,
    pub parent: Option<NodeId>,
    /// 从父节点到达本节点所发生的迁移
    pub transition: Option<TransitionId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverabilityTree {
    nodes: Vec<TreeNode>,
    truncated: bool,
}

impl CoverabilityTree {
    pub fn build(net: &Net, initial: &Marking) -> Self {
        Self::build_with_limit(net, initial, None)
    }

    /// 同 [`CoverabilityTree::build`]，节点数达到 `limit` 后停止扩展并标记为截断
    pub fn build_with_limit(net: &Net, initial: &Marking, limit: Option<usize>) -> Self {
        let mut tree = Self {
            nodes: vec![TreeNode {
                marking: OmegaMarking::from(initial),
                mark: NodeMark::Unmarked,
                parent: None,
                transition: None,
                children: Vec::new(),
            }],
            truncated: false,
        };
        let mut queue = VecDeque::from([NodeId(0)]);

        'expand: while let Some(current) = queue.pop_front() {
            let marking = tree.nodes[current.0].marking.clone();
            let enabled: Vec<TransitionId> = net
                .transitions()
                .indices()
                .filter(|transition| is_enabled(net, &marking, *transition))
                .collect();
            if enabled.is_empty() {
                tree.nodes[current.0].mark = NodeMark::Terminal;
                continue;
            }

            for transition in enabled {
                let Some(mut next) = successor(net, &marking, transition) else {
                    log::debug!(
                        "coverability: {} blocked by capacity at {}",
                        transition,
                        marking
                    );
                    continue;
                };
                if limit.is_some_and(|limit| tree.nodes.len() >= limit) {
                    tree.truncated = true;
                    break 'expand;
                }

                let mut duplicate = tree.repeats_ancestor(current, &next);
                if !duplicate {
                    tree.accelerate(net, current, &mut next);
                    duplicate = tree.repeats_ancestor(current, &next);
                }
                let mark = if duplicate {
                    NodeMark::Duplicate
                } else {
                    NodeMark::Unmarked
                };
                let child = tree.attach(current, transition, next, mark);
                if !duplicate {
                    queue.push_back(child);
                }
            }
        }

        log::debug!(
            "coverability tree: {} nodes{}",
            tree.nodes.len(),
            if tree.truncated { " (truncated)" } else { "" }
        );
        tree
    }

    fn attach(
        &mut self,
        parent: NodeId,
        transition: TransitionId,
        marking: OmegaMarking,
        mark: NodeMark,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            marking,
            mark,
            parent: Some(parent),
            transition: Some(transition),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// `from` 及其直到根的全部祖先
    pub fn ancestors(&self, from: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        iter::successors(Some(from), |node| self.nodes[node.0].parent)
    }

    fn repeats_ancestor(&self, parent: NodeId, marking: &OmegaMarking) -> bool {
        self.ancestors(parent)
            .any(|ancestor| self.nodes[ancestor.0].marking == *marking)
    }

    /// 若 `next` 严格支配某祖先，则把增长的无界库所置为 ω。
    /// 增长涉及有容量库所时，该序列无法无限重复，跳过此祖先。
    fn accelerate(&self, net: &Net, parent: NodeId, next: &mut OmegaMarking) {
        for ancestor in self.ancestors(parent) {
            let prior = &self.nodes[ancestor.0].marking;
            if !next.dominates(prior) {
                continue;
            }
            let grew = |place: PlaceId| next.tokens(place) > prior.tokens(place);
            if net
                .places()
                .iter_enumerated()
                .any(|(place, spec)| spec.is_bounded() && grew(place))
            {
                continue;
            }
            let pumped: Vec<PlaceId> = net.places().indices().filter(|p| grew(*p)).collect();
            for place in pumped {
                next.0[place] = Tokens::Omega;
            }
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 是否因节点上限而提前停止
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn unbounded_places(&self) -> Vec<PlaceId> {
        let Some(first) = self.nodes.first() else {
            return Vec::new();
        };
        first
            .marking
            .0
            .indices()
            .filter(|place| self.nodes.iter().any(|n| n.marking.tokens(*place).is_omega()))
            .collect()
    }

    /// 没有库所达到 ω；截断的树可能漏报
    pub fn is_bounded(&self) -> bool {
        !self.nodes.iter().any(|node| node.marking.has_omega())
    }

    /// `place` 在整棵树中的最大令牌数
    pub fn place_bound(&self, place: PlaceId) -> Tokens {
        self.nodes
            .iter()
            .map(|node| node.marking.tokens(place))
            .max()
            .unwrap_or(Tokens::Finite(0))
    }

    pub fn covers(&self, marking: &Marking) -> bool {
        self.nodes.iter().any(|node| node.marking.covers(marking))
    }

    pub fn terminals(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.mark == NodeMark::Terminal)
            .map(|(idx, _)| NodeId(idx))
            .collect()
    }

    /// 从根到 `node` 的迁移序列
    pub fn witness(&self, node: NodeId) -> Vec<TransitionId> {
        let mut sequence: Vec<TransitionId> = self
            .ancestors(node)
            .filter_map(|id| self.nodes[id.0].transition)
            .collect();
        sequence.reverse();
        sequence
    }
}

fn is_enabled(net: &Net, marking: &OmegaMarking, transition: TransitionId) -> bool {
    net.input_places(transition)
        .all(|place| marking.tokens(place) >= Tokens::Finite(1))
}

fn successor(net: &Net, marking: &OmegaMarking, transition: TransitionId) -> Option<OmegaMarking> {
    let mut next = marking.clone();
    for place in net.input_places(transition) {
        next.0[place] = next.tokens(place).decrement()?;
    }
    for place in net.output_places(transition) {
        let after = next.tokens(place).increment()?;
        let capacity = net.places()[place].capacity;
        if let Tokens::Finite(count) = after {
            if capacity > 0 && count > capacity {
                return None;
            }
        }
        next.0[place] = after;
    }
    Some(next)
}

/// 有界性检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BoundednessResult {
    Bounded,
    Unbounded {
        places: Vec<PlaceId>,
        /// 到达第一个 ω 节点的发生序列
        witness: Vec<TransitionId>,
    },
    Unknown {
        reason: String,
    },
}

impl fmt::Display for BoundednessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundednessResult::Bounded => write!(f, "bounded"),
            BoundednessResult::Unbounded { places, witness } => {
                write!(f, "unbounded at {:?} (witness {:?})", places, witness)
            }
            BoundednessResult::Unknown { reason } => write!(f, "unknown: {}", reason),
        }
    }
}

impl CoverabilityTree {
    /// 基于树本身的有界性判定：出现 ω 即无界，截断则未知。
    pub fn boundedness(&self) -> BoundednessResult {
        if let Some(idx) = self.nodes.iter().position(|node| node.marking.has_omega()) {
            return BoundednessResult::Unbounded {
                places: self.unbounded_places(),
                witness: self.witness(NodeId(idx)),
            };
        }
        if self.truncated {
            return BoundednessResult::Unknown {
                reason: format!("coverability tree truncated at {} nodes", self.len()),
            };
        }
        BoundednessResult::Bounded
    }
}

/// 每个库所都受容量或半正 P-不变量约束
pub fn is_structurally_bounded(net: &Net) -> bool {
    let mut bounded = vec![false; net.places_len()];
    for (place, spec) in net.places().iter_enumerated() {
        bounded[place.index()] = spec.is_bounded();
    }
    for place in structurally_bounded_places(net) {
        bounded[place.index()] = true;
    }
    bounded.iter().all(|b| *b)
}

/// 先做结构检查，再从初始标识构建覆盖树
pub fn check_boundedness(net: &Net, limit: Option<usize>) -> BoundednessResult {
    if is_structurally_bounded(net) {
        return BoundednessResult::Bounded;
    }
    CoverabilityTree::build_with_limit(net, &net.initial_marking(), limit).boundedness()
}
