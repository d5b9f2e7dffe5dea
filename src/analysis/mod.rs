//! 离线分析：状态方程可达性、P/T 不变量与覆盖树。
//!
//! 所有分析只读取 [`Net`](crate::net::Net)，从不修改它。
pub mod coverability;
pub mod invariants;
pub mod reachability;

use thiserror::Error;

pub use coverability::{
    BoundednessResult, CoverabilityTree, NodeId, NodeMark, OmegaMarking, Tokens, TreeNode,
    check_boundedness, is_structurally_bounded,
};
pub use invariants::{place_invariants, structurally_bounded_places, transition_invariants};
pub use reachability::{firing_counts, reachable};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("marking has {found} places, net has {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("unknown place `{0}`")]
    UnknownPlace(String),
}
