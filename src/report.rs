//! 分析报告：`pn` 的输出，按名称而非下标描述位置与变迁.
use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use num::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

use crate::analysis::{
    self, AnalysisError, BoundednessResult, CoverabilityTree, is_structurally_bounded,
};
use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::incidence::IncidenceMatrix;
use crate::net::index_vec::Idx;
use crate::net::structure::{Marking, MarkingSnapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    pub isolated_places: Vec<String>,
    pub isolated_transitions: Vec<String>,
    pub source_transitions: Vec<String>,
    pub sink_transitions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityReport {
    pub target: MarkingSnapshot,
    /// 状态方程有非负解；必要条件，不充分
    pub reachable: bool,
    /// 每个迁移的发生次数（精确分数）
    pub firing_counts: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundedness {
    Bounded,
    Unbounded,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverabilityReport {
    pub boundedness: Boundedness,
    pub unbounded_places: Vec<String>,
    /// 从初始标识到第一个 ω 节点的发生序列
    pub witness: Vec<String>,
    /// 每个库所在树中的上界，无界时为 `ω`
    pub place_bounds: IndexMap<String, String>,
    pub tree_nodes: usize,
    pub truncated: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub source: String,
    pub places: Vec<String>,
    pub transitions: Vec<String>,
    pub initial_marking: MarkingSnapshot,
    pub connectivity: Connectivity,
    /// 行为迁移，列为库所
    pub incidence: Option<Vec<Vec<i64>>>,
    pub place_invariants: Option<Vec<IndexMap<String, i64>>>,
    pub transition_invariants: Option<Vec<IndexMap<String, i64>>>,
    pub reachability: Option<ReachabilityReport>,
    pub coverability: Option<CoverabilityReport>,
}

impl AnalysisReport {
    pub fn new(source: impl Into<String>, net: &Net) -> Self {
        let diagnostics = net.diagnose();
        AnalysisReport {
            source: source.into(),
            places: net.places().iter().map(|p| p.name.clone()).collect(),
            transitions: net.transitions().iter().map(|t| t.name.clone()).collect(),
            initial_marking: snapshot(net, &net.initial_marking()),
            connectivity: Connectivity {
                isolated_places: names(diagnostics.isolated_places),
                isolated_transitions: names(diagnostics.isolated_transitions),
                source_transitions: names(diagnostics.source_transitions),
                sink_transitions: names(diagnostics.sink_transitions),
            },
            ..Default::default()
        }
    }

    pub fn add_incidence(&mut self, net: &Net) {
        let matrix = IncidenceMatrix::from_net(net);
        debug!("incidence matrix:\n{}", matrix);
        self.incidence = Some(matrix.rows().map(|row| row.to_vec()).collect());
    }

    pub fn add_invariants(&mut self, net: &Net) {
        let place_names = &self.places;
        let transition_names = &self.transitions;
        self.place_invariants = Some(
            analysis::place_invariants(net)
                .iter()
                .filter_map(|inv| weighted(place_names, inv))
                .collect(),
        );
        self.transition_invariants = Some(
            analysis::transition_invariants(net)
                .iter()
                .filter_map(|inv| weighted(transition_names, inv))
                .collect(),
        );
    }

    /// `target` 按库所名给出令牌数，未列出的为 0
    pub fn add_reachability(
        &mut self,
        net: &Net,
        target: &[(String, u64)],
    ) -> Result<(), AnalysisError> {
        let target = marking_from_names(net, target)?;
        let counts = analysis::firing_counts(net, &net.initial_marking(), &target)?;
        self.reachability = Some(ReachabilityReport {
            target: snapshot(net, &target),
            reachable: counts.is_some(),
            firing_counts: counts.map(|counts| {
                self.transitions
                    .iter()
                    .cloned()
                    .zip(counts.iter().map(|c| c.to_string()))
                    .collect()
            }),
        });
        Ok(())
    }

    pub fn add_coverability(&mut self, net: &Net, limit: Option<usize>) {
        let tree = CoverabilityTree::build_with_limit(net, &net.initial_marking(), limit);
        let place_bounds = net
            .places()
            .iter_enumerated()
            .map(|(id, place)| (place.name.clone(), tree.place_bound(id).to_string()))
            .collect();
        let place_name = |id: PlaceId| self.places[id.index()].clone();
        let transition_name = |id: TransitionId| self.transitions[id.index()].clone();

        let mut report = CoverabilityReport {
            boundedness: Boundedness::Bounded,
            unbounded_places: Vec::new(),
            witness: Vec::new(),
            place_bounds,
            tree_nodes: tree.len(),
            truncated: tree.truncated(),
            reason: None,
        };
        let verdict = if is_structurally_bounded(net) {
            BoundednessResult::Bounded
        } else {
            tree.boundedness()
        };
        match verdict {
            BoundednessResult::Bounded => {}
            BoundednessResult::Unbounded { places, witness } => {
                report.boundedness = Boundedness::Unbounded;
                report.unbounded_places = places.into_iter().map(place_name).collect();
                report.witness = witness.into_iter().map(transition_name).collect();
            }
            BoundednessResult::Unknown { reason } => {
                report.boundedness = Boundedness::Unknown;
                report.reason = Some(reason);
            }
        }
        self.coverability = Some(report);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 将报告保存到文件中
    pub fn save_to_file(&self, file_path: &str) -> std::io::Result<()> {
        let mut file = std::fs::File::create(file_path)?;
        let report = self.to_json().map_err(std::io::Error::other)?;
        writeln!(file, "{}", report)
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Net {}: {} places, {} transitions",
            self.source,
            self.places.len(),
            self.transitions.len()
        )?;
        writeln!(f, "Initial marking: {:?}", self.initial_marking)?;
        if let Some(rows) = &self.incidence {
            writeln!(f, "Incidence (transition x place):")?;
            for (name, row) in self.transitions.iter().zip(rows) {
                writeln!(f, "  {:>12} {:?}", name, row)?;
            }
        }
        if let Some(invariants) = &self.place_invariants {
            writeln!(f, "P-invariants: {}", invariants.len())?;
            for inv in invariants {
                writeln!(f, "  {:?}", inv)?;
            }
        }
        if let Some(invariants) = &self.transition_invariants {
            writeln!(f, "T-invariants: {}", invariants.len())?;
            for inv in invariants {
                writeln!(f, "  {:?}", inv)?;
            }
        }
        if let Some(reach) = &self.reachability {
            writeln!(
                f,
                "Target {:?}: {}",
                reach.target,
                if reach.reachable {
                    "state equation solvable"
                } else {
                    "unreachable"
                }
            )?;
        }
        if let Some(cover) = &self.coverability {
            writeln!(
                f,
                "Coverability: {:?} ({} nodes{})",
                cover.boundedness,
                cover.tree_nodes,
                if cover.truncated { ", truncated" } else { "" }
            )?;
            if !cover.unbounded_places.is_empty() {
                writeln!(f, "  unbounded: {}", cover.unbounded_places.iter().join(", "))?;
                writeln!(f, "  witness: {}", cover.witness.iter().join(" -> "))?;
            }
        }
        Ok(())
    }
}

fn names<I>(items: Vec<(I, String)>) -> Vec<String> {
    items.into_iter().map(|(_, name)| name).collect()
}

fn snapshot(net: &Net, marking: &Marking) -> MarkingSnapshot {
    net.places()
        .iter_enumerated()
        .map(|(id, place)| (place.name.clone(), marking.tokens(id)))
        .collect()
}

fn marking_from_names(net: &Net, tokens: &[(String, u64)]) -> Result<Marking, AnalysisError> {
    let mut marking = Marking::zeros(net.places_len());
    for (name, count) in tokens {
        let place = net
            .place_id(name)
            .ok_or_else(|| AnalysisError::UnknownPlace(name.clone()))?;
        *marking.tokens_mut(place) = *count;
    }
    Ok(marking)
}

/// 以名称为键的非零权重；系数超出 `i64` 的不变量被丢弃
fn weighted(names: &[String], invariant: &[num::BigInt]) -> Option<IndexMap<String, i64>> {
    let mut weights = IndexMap::new();
    for (name, value) in names.iter().zip(invariant) {
        let value = value.to_i64()?;
        if value != 0 {
            weights.insert(name.clone(), value);
        }
    }
    Some(weights)
}
