// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Branch-free in-register transpose across a lane group.
//!
//! With `L` lanes each holding `L` registers of `array`, the emitted sequence
//! ends with lane `c` register `k` holding what lane `k` register `c` held on
//! entry. Three phases, all uniform across lanes:
//!
//! 1. skew every register row left by its row index, using a chased dynamic
//!    address that every lane starts at its own `case_id`;
//! 2. rotate each lane's registers down by its `case_id`, as predicated
//!    register moves through a single temporary;
//! 3. un-skew with the mirrored address chase.
//!
//! The sequence is an involution, so running it twice restores the input.

use crate::cycles::{check_group, rotation_cycles};
use crate::error::Result;
use crate::ir::{IndexInit, LaneSrc, LaneStmt};

fn addr_name(array: &str) -> String {
    format!("{array}_addr")
}

/// Build the full transpose statement stream for `array` over `lanes` lanes.
///
/// `lanes` must be a power of two. A single-lane group is already transposed,
/// so the stream is empty.
pub fn lane_transpose(array: &str, lanes: usize) -> Result<Vec<LaneStmt>> {
    check_group(lanes)?;
    if lanes == 1 {
        return Ok(Vec::new());
    }
    let addr = addr_name(array);
    let mut stmts = Vec::new();

    // Phase 1: row k picks up column (j + k) % L. The address register walks
    // one step around the group after every row, including the last; the
    // final value feeds nothing but keeps the stream uniform.
    stmts.push(LaneStmt::DeclIndex {
        name: addr.clone(),
        init: IndexInit::CaseId,
    });
    for slot in 0..lanes {
        stmts.push(LaneStmt::ShuffleValue {
            array: array.to_string(),
            slot,
            src: LaneSrc::Register(addr.clone()),
        });
        stmts.push(LaneStmt::ShuffleIndex {
            name: addr.clone(),
            src: LaneSrc::NextCase,
        });
    }

    // Phase 2: lane c rotates its registers down by c. Every lane executes
    // every case's moves; the predicate keeps foreign cases inert. Case 0 is
    // the identity and decomposes to singletons, which emit nothing.
    stmts.push(LaneStmt::DeclTemp {
        array: array.to_string(),
    });
    for case in 0..lanes {
        for cycle in rotation_cycles(lanes, case)? {
            if cycle.len() < 2 {
                continue;
            }
            stmts.push(LaneStmt::LoadTemp {
                array: array.to_string(),
                slot: cycle[0].src,
            });
            for step in cycle.iter().skip(1).rev() {
                stmts.push(LaneStmt::SelectMove {
                    array: array.to_string(),
                    dst: step.dst,
                    src: step.src,
                    case,
                });
            }
            stmts.push(LaneStmt::SelectTemp {
                array: array.to_string(),
                dst: cycle[0].dst,
                case,
            });
        }
    }

    // Phase 3: mirror of phase 1. The address starts at (L - c) % L and is
    // chased backwards, so row k gives column c the value it fetched for
    // column (k - c) % L in phase 1.
    stmts.push(LaneStmt::AssignIndex {
        name: addr.clone(),
        init: IndexInit::MirrorCase,
    });
    for slot in 0..lanes {
        stmts.push(LaneStmt::ShuffleValue {
            array: array.to_string(),
            slot,
            src: LaneSrc::Register(addr.clone()),
        });
        stmts.push(LaneStmt::ShuffleIndex {
            name: addr.clone(),
            src: LaneSrc::PrevCase,
        });
    }

    Ok(stmts)
}
