// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Permutation cycle decomposition for the intra-lane phase.
//!
//! The lane whose `case_id` equals `c` must rotate its register file by `c`
//! slots: `new[d] = old[(d - c) mod lanes]`. This module turns that rotation
//! into disjoint cycles of `(dst, src)` moves so the emitter can realize each
//! cycle in place with a single temporary.

use serde::Serialize;

use crate::error::{config, Result};

/// One in-place move inside a cycle: `register[dst] <- register[src]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CycleStep {
    pub dst: usize,
    pub src: usize,
}

/// True when `lanes` is 1 or a power of two.
pub fn valid_group(lanes: usize) -> bool {
    lanes != 0 && lanes.count_ones() == 1
}

pub(crate) fn check_group(lanes: usize) -> Result<()> {
    if valid_group(lanes) {
        Ok(())
    } else {
        Err(config(&format!(
            "group size {lanes} is not 1 or a power of two"
        )))
    }
}

/// Cycle decomposition of the register rotation for one transpose case.
///
/// Pairs are listed in value-flow order: the source of each pair is the
/// destination of the one before it, wrapping at the cycle start. Case 0 is
/// the identity and decomposes into `lanes` singleton cycles, which the
/// emitter skips. Invalid inputs fail before any cycle is produced.
pub fn rotation_cycles(lanes: usize, case: usize) -> Result<Vec<Vec<CycleStep>>> {
    check_group(lanes)?;
    if case >= lanes {
        return Err(config(&format!(
            "case index {case} out of range for group size {lanes}"
        )));
    }
    if case == 0 {
        return Ok((0..lanes)
            .map(|d| vec![CycleStep { dst: d, src: d }])
            .collect());
    }
    let mut seen = vec![false; lanes];
    let mut cycles = Vec::new();
    for leader in 0..lanes {
        if seen[leader] {
            continue;
        }
        let mut cycle = Vec::new();
        let mut src = leader;
        loop {
            let dst = (src + case) % lanes;
            cycle.push(CycleStep { dst, src });
            seen[src] = true;
            src = dst;
            if src == leader {
                break;
            }
        }
        cycles.push(cycle);
    }
    Ok(cycles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destinations_form_a_permutation() {
        for lanes in [1usize, 2, 4, 8, 16, 32] {
            for case in 0..lanes {
                let cycles = rotation_cycles(lanes, case).unwrap();
                let mut dst_hits = vec![0usize; lanes];
                let mut src_hits = vec![0usize; lanes];
                for cycle in &cycles {
                    for step in cycle {
                        dst_hits[step.dst] += 1;
                        src_hits[step.src] += 1;
                    }
                }
                assert!(dst_hits.iter().all(|&h| h == 1), "lanes={lanes} case={case}");
                assert!(src_hits.iter().all(|&h| h == 1), "lanes={lanes} case={case}");
            }
        }
    }

    #[test]
    fn pairs_chain_in_value_flow_order() {
        for lanes in [2usize, 4, 8, 16, 32] {
            for case in 1..lanes {
                for cycle in rotation_cycles(lanes, case).unwrap() {
                    for pair in cycle.windows(2) {
                        assert_eq!(pair[1].src, pair[0].dst);
                    }
                    let first = cycle.first().unwrap();
                    let last = cycle.last().unwrap();
                    assert_eq!(first.src, last.dst);
                }
            }
        }
    }

    #[test]
    fn case_zero_is_all_singletons() {
        let cycles = rotation_cycles(8, 0).unwrap();
        assert_eq!(cycles.len(), 8);
        for (d, cycle) in cycles.iter().enumerate() {
            assert_eq!(cycle.as_slice(), &[CycleStep { dst: d, src: d }]);
        }
    }

    #[test]
    fn rotation_by_one_is_a_single_cycle() {
        let cycles = rotation_cycles(4, 1).unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0],
            vec![
                CycleStep { dst: 1, src: 0 },
                CycleStep { dst: 2, src: 1 },
                CycleStep { dst: 3, src: 2 },
                CycleStep { dst: 0, src: 3 },
            ]
        );
    }

    #[test]
    fn rotation_by_two_splits_into_swaps() {
        let cycles = rotation_cycles(4, 2).unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(
            cycles[0],
            vec![CycleStep { dst: 2, src: 0 }, CycleStep { dst: 0, src: 2 }]
        );
        assert_eq!(
            cycles[1],
            vec![CycleStep { dst: 3, src: 1 }, CycleStep { dst: 1, src: 3 }]
        );
    }

    #[test]
    fn cycle_lengths_match_the_orbit_size() {
        // gcd(16, 12) = 4 cycles of length 4.
        let cycles = rotation_cycles(16, 12).unwrap();
        assert_eq!(cycles.len(), 4);
        assert!(cycles.iter().all(|c| c.len() == 4));
    }

    #[test]
    fn invalid_groups_and_cases_are_rejected() {
        assert!(rotation_cycles(0, 0).is_err());
        assert!(rotation_cycles(3, 0).is_err());
        assert!(rotation_cycles(5, 1).is_err());
        assert!(rotation_cycles(4, 4).is_err());
    }
}
