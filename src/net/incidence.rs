//! 迁移 × 库所 关联矩阵 `C`：`C[t, p] = [t→p] − [p→t]`.
//!
//! 从 `M` 发生 `t` 得到 `M' = M + e_t · C`，其中 `e_t` 为 `t` 的发生向量。
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::core::Net;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::Marking;

type SmallRow<T> = SmallVec<[T; 8]>;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidenceMatrix {
    rows: IndexVec<TransitionId, SmallRow<i64>>,
    cols: usize,
}

impl IncidenceMatrix {
    pub fn new(transitions: usize, places: usize) -> Self {
        Self {
            rows: IndexVec::from_elem(SmallRow::from_elem(0, places), transitions),
            cols: places,
        }
    }

    pub fn from_net(net: &Net) -> Self {
        let mut matrix = Self::new(net.transitions_len(), net.places_len());
        for transition in net.transitions().indices() {
            for place in net.output_places(transition) {
                matrix.add(transition, place, 1);
            }
            for place in net.input_places(transition) {
                matrix.add(transition, place, -1);
            }
        }
        matrix
    }

    fn add(&mut self, transition: TransitionId, place: PlaceId, delta: i64) {
        self.rows[transition][place.index()] += delta;
    }

    pub fn transitions(&self) -> usize {
        self.rows.len()
    }

    pub fn places(&self) -> usize {
        self.cols
    }

    pub fn get(&self, transition: TransitionId, place: PlaceId) -> i64 {
        self.rows[transition][place.index()]
    }

    pub fn row(&self, transition: TransitionId) -> &[i64] {
        &self.rows[transition]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i64]> {
        self.rows.iter().map(|row| row.as_slice())
    }

    /// 选中 `transition` 的单位向量
    pub fn firing_vector(&self, transition: TransitionId) -> Vec<i64> {
        let mut vector = vec![0; self.transitions()];
        vector[transition.index()] = 1;
        vector
    }

    /// 计算 `marking + counts · C`；长度不符、出现负数或溢出时返回 `None`
    pub fn apply(&self, marking: &Marking, counts: &[i64]) -> Option<Marking> {
        if marking.len() != self.cols || counts.len() != self.transitions() {
            return None;
        }
        let mut next = Vec::with_capacity(self.cols);
        for (place, tokens) in marking.iter() {
            let delta = counts
                .iter()
                .zip(self.rows.iter())
                .try_fold(0i64, |sum, (count, row)| {
                    sum.checked_add(count.checked_mul(row[place.index()])?)
                })?;
            let after = i64::try_from(*tokens).ok()?.checked_add(delta)?;
            next.push(u64::try_from(after).ok()?);
        }
        Some(Marking::from(next))
    }

    /// 库所 × 迁移，即 `Cᵀ`
    pub fn transpose(&self) -> Vec<Vec<i64>> {
        (0..self.cols)
            .map(|place| self.rows.iter().map(|row| row[place]).collect())
            .collect()
    }
}

impl fmt::Debug for IncidenceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidenceMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl fmt::Display for IncidenceMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows.iter() {
            writeln!(f, "[{}]", row.iter().map(|v| format!("{v:>3}")).join(""))?;
        }
        Ok(())
    }
}
