//! P/T 不变量：关联矩阵零空间的整数基.
//!
//! * P-不变量 `y`：`C · y = 0`，加权 token 和在任意发生下守恒；
//! * T-不变量 `x`：`x · C = 0`，按 `x` 次数发生后标识复原。
use num::bigint::BigInt;
use num::integer::Integer;
use num::rational::BigRational;
use num::traits::{One, Signed, Zero};

use crate::net::core::Net;
use crate::net::ids::PlaceId;
use crate::net::incidence::IncidenceMatrix;
use crate::net::index_vec::Idx;

/// `{ y | C · y = 0 }` 的基，每个分量对应一个库所
pub fn place_invariants(net: &Net) -> Vec<Vec<BigInt>> {
    let matrix = IncidenceMatrix::from_net(net);
    let rows: Vec<Vec<i64>> = matrix.rows().map(|row| row.to_vec()).collect();
    compute_nullspace(&rows, matrix.places())
}

/// `{ x | x · C = 0 }` 的基，每个分量对应一个迁移
pub fn transition_invariants(net: &Net) -> Vec<Vec<BigInt>> {
    let matrix = IncidenceMatrix::from_net(net);
    compute_nullspace(&matrix.transpose(), matrix.transitions())
}

/// 被基中某个半正 P-不变量覆盖的库所；从任意初始标识出发均有界
pub fn structurally_bounded_places(net: &Net) -> Vec<PlaceId> {
    let mut covered = vec![false; net.places_len()];
    for invariant in place_invariants(net) {
        let invariant = if invariant.iter().all(|v| !v.is_positive()) {
            invariant.into_iter().map(|v| -v).collect::<Vec<_>>()
        } else {
            invariant
        };
        if invariant.iter().any(|v| v.is_negative()) {
            continue;
        }
        for (slot, weight) in covered.iter_mut().zip(&invariant) {
            if weight.is_positive() {
                *slot = true;
            }
        }
    }
    covered
        .into_iter()
        .enumerate()
        .filter(|(_, covered)| *covered)
        .map(|(idx, _)| PlaceId::from_usize(idx))
        .collect()
}

fn compute_nullspace(matrix: &[Vec<i64>], cols: usize) -> Vec<Vec<BigInt>> {
    if cols == 0 {
        return Vec::new();
    }

    let rows = matrix.len();
    let mut rref: Vec<Vec<BigRational>> = matrix
        .iter()
        .map(|row| {
            (0..cols)
                .map(|idx| {
                    BigRational::from_integer(BigInt::from(row.get(idx).copied().unwrap_or(0)))
                })
                .collect()
        })
        .collect();

    let mut pivot_cols = Vec::new();
    let mut pivot_row = 0usize;

    for col in 0..cols {
        if pivot_row >= rows {
            break;
        }
        let Some(row_idx) = (pivot_row..rows).find(|&row| !rref[row][col].is_zero()) else {
            continue;
        };
        rref.swap(row_idx, pivot_row);

        let pivot_value = rref[pivot_row][col].clone();
        for value in rref[pivot_row].iter_mut() {
            *value = &*value / &pivot_value;
        }

        for row in 0..rows {
            if row == pivot_row {
                continue;
            }
            let factor = rref[row][col].clone();
            if factor.is_zero() {
                continue;
            }
            for inner_col in col..cols {
                let adjustment = &rref[pivot_row][inner_col] * &factor;
                rref[row][inner_col] = &rref[row][inner_col] - adjustment;
            }
        }

        pivot_cols.push(col);
        pivot_row += 1;
    }

    let mut is_pivot = vec![false; cols];
    for &col in &pivot_cols {
        is_pivot[col] = true;
    }

    (0..cols)
        .filter(|&col| !is_pivot[col])
        .map(|free_col| {
            let mut vector = vec![BigRational::zero(); cols];
            vector[free_col] = BigRational::one();
            for (pivot_index, &pivot_col) in pivot_cols.iter().enumerate() {
                let coeff = &rref[pivot_index][free_col];
                if !coeff.is_zero() {
                    vector[pivot_col] = -coeff.clone();
                }
            }
            normalize_integer_vector(rational_vector_to_integer(vector))
        })
        .collect()
}

fn rational_vector_to_integer(vector: Vec<BigRational>) -> Vec<BigInt> {
    let lcm = vector
        .iter()
        .fold(BigInt::one(), |acc, value| acc.lcm(value.denom()));
    vector
        .into_iter()
        .map(|value| value.numer() * (&lcm / value.denom()))
        .collect()
}

fn normalize_integer_vector(mut vector: Vec<BigInt>) -> Vec<BigInt> {
    let gcd = vector
        .iter()
        .filter(|value| !value.is_zero())
        .fold(BigInt::zero(), |acc, value| acc.gcd(value));
    if !gcd.is_zero() && !gcd.is_one() {
        for value in &mut vector {
            *value = &*value / &gcd;
        }
    }
    vector
}
