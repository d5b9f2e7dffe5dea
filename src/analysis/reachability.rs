//! 基于状态方程的可达性判定.
//!
//! `target` 可达的必要条件是存在非负发生计数向量 `x` 使
//! `target − initial = x · C`。此处以精确有理数单纯形（第一阶段，Bland 规则）
//! 判定该线性系统的可行性；结果为 `true` 并不保证存在合法的发生序列，
//! 因为状态方程忽略了发生次序与中间标识的可激发性。
use num::bigint::BigInt;
use num::rational::BigRational;
use num::traits::{One, Signed, Zero};

use crate::analysis::AnalysisError;
use crate::net::core::Net;
use crate::net::incidence::IncidenceMatrix;
use crate::net::structure::Marking;

/// 满足 `target − initial = x · C` 的非负发生次数 `x`；无解时返回 `None`
pub fn firing_counts(
    net: &Net,
    initial: &Marking,
    target: &Marking,
) -> Result<Option<Vec<BigRational>>, AnalysisError> {
    for marking in [initial, target] {
        if marking.len() != net.places_len() {
            return Err(AnalysisError::DimensionMismatch {
                expected: net.places_len(),
                found: marking.len(),
            });
        }
    }

    let incidence = IncidenceMatrix::from_net(net);
    let delta: Vec<BigInt> = initial
        .iter()
        .map(|(place, before)| BigInt::from(target.tokens(place)) - BigInt::from(*before))
        .collect();

    let solution = solve_nonnegative(&incidence.transpose(), &delta, incidence.transitions());
    if let Some(counts) = &solution {
        debug_assert!(counts.iter().all(|count| !count.is_negative()));
        log::debug!("state equation solvable with firing counts {:?}", counts);
    }
    Ok(solution)
}

/// 可达性的必要（非充分）条件
pub fn reachable(net: &Net, initial: &Marking, target: &Marking) -> Result<bool, AnalysisError> {
    Ok(firing_counts(net, initial, target)?.is_some())
}

/// `A x = b, x ≥ 0` 的第一阶段单纯形，每行一个人工变量。
/// 人工变量之和可降为零即可行
fn solve_nonnegative(a: &[Vec<i64>], b: &[BigInt], vars: usize) -> Option<Vec<BigRational>> {
    let rows = a.len();
    let width = vars + rows + 1;
    let rhs = width - 1;

    let mut tableau: Vec<Vec<BigRational>> = Vec::with_capacity(rows);
    for (i, (coefficients, b_i)) in a.iter().zip(b).enumerate() {
        let sign = if b_i.is_negative() { -1 } else { 1 };
        let mut line = vec![BigRational::zero(); width];
        for (slot, value) in line.iter_mut().zip(coefficients) {
            *slot = BigRational::from_integer(BigInt::from(value * sign));
        }
        line[vars + i] = BigRational::one();
        line[rhs] = BigRational::from_integer(b_i.abs());
        tableau.push(line);
    }
    let mut basis: Vec<usize> = (vars..vars + rows).collect();

    // Reduced costs of the phase-one objective; `objective[rhs]` holds −w.
    let mut objective = vec![BigRational::zero(); width];
    for line in &tableau {
        for col in (0..vars).chain(std::iter::once(rhs)) {
            objective[col] = &objective[col] - &line[col];
        }
    }

    while let Some(col) = (0..vars + rows).find(|&col| objective[col].is_negative()) {
        let mut leaving: Option<(usize, BigRational)> = None;
        for (row, line) in tableau.iter().enumerate() {
            if !line[col].is_positive() {
                continue;
            }
            let ratio = &line[rhs] / &line[col];
            let better = match &leaving {
                None => true,
                Some((best_row, best)) => {
                    ratio < *best || (ratio == *best && basis[row] < basis[*best_row])
                }
            };
            if better {
                leaving = Some((row, ratio));
            }
        }
        // Phase one is bounded below by zero, so this only guards the loop.
        let Some((row, _)) = leaving else {
            break;
        };
        pivot(&mut tableau, &mut objective, row, col);
        basis[row] = col;
    }

    if !objective[rhs].is_zero() {
        return None;
    }
    let mut solution = vec![BigRational::zero(); vars];
    for (row, var) in basis.iter().enumerate() {
        if *var < vars {
            solution[*var] = tableau[row][rhs].clone();
        }
    }
    Some(solution)
}

fn pivot(
    tableau: &mut [Vec<BigRational>],
    objective: &mut [BigRational],
    row: usize,
    col: usize,
) {
    let factor = tableau[row][col].clone();
    for value in tableau[row].iter_mut() {
        *value = &*value / &factor;
    }
    let pivot_row = tableau[row].clone();

    let eliminate = |line: &mut [BigRational]| {
        let scale = line[col].clone();
        if scale.is_zero() {
            return;
        }
        for (value, pivot_value) in line.iter_mut().zip(&pivot_row) {
            *value = &*value - &scale * pivot_value;
        }
    };
    for (idx, line) in tableau.iter_mut().enumerate() {
        if idx != row {
            eliminate(line.as_mut_slice());
        }
    }
    eliminate(objective);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::core::NetBuilder;
    use crate::net::structure::Place;

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
    fn switch_states_are_mutually_reachable() {
        let net = light_switch();
        let off = Marking::from(vec![1, 0]);
        let on = Marking::from(vec![0, 1]);

        assert!(reachable(&net, &off, &on).unwrap());
        assert!(reachable(&net, &on, &off).unwrap());
        assert!(reachable(&net, &off, &off).unwrap());
    }

    #[test]
    fn token_creation_is_infeasible_in_conservative_net() {
        let net = light_switch();
        let off = Marking::from(vec![1, 0]);
        assert!(!reachable(&net, &off, &Marking::from(vec![1, 1])).unwrap());
        assert!(!reachable(&net, &off, &Marking::from(vec![0, 0])).unwrap());
    }

    #[test]
    fn counts_are_nonnegative_and_consistent() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("src", 3, 0))
            .place(Place::new("mid"))
            .place(Place::new("dst"))
            .transition("a")
            .transition("b")
            .arc("src", "a")
            .arc("a", "mid")
            .arc("mid", "b")
            .arc("b", "dst")
            .build()
            .unwrap();
        let initial = net.initial_marking();
        let target = Marking::from(vec![0, 1, 2]);

        let counts = firing_counts(&net, &initial, &target).unwrap().unwrap();
        assert_eq!(
            counts,
            vec![
                BigRational::from_integer(BigInt::from(3)),
                BigRational::from_integer(BigInt::from(2)),
            ]
        );
    }

    #[test]
    fn backwards_flow_needs_negative_counts() {
        let net = NetBuilder::new()
            .place(Place::new_with_tokens_and_capacity("a", 1, 0))
            .place(Place::new("b"))
            .transition("t")
            .arc("a", "t")
            .arc("t", "b")
            .build()
            .unwrap();
        let forward = Marking::from(vec![0, 1]);
        assert!(!reachable(&net, &forward, &net.initial_marking()).unwrap());
    }

    #[test]
    fn wrong_length_is_an_error() {
        let net = light_switch();
        let err = reachable(&net, &Marking::from(vec![1]), &Marking::from(vec![1, 0]));
        assert_eq!(
            err,
            Err(AnalysisError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }
}
