// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Software execution of lane statement streams.
//!
//! The simulator runs the exact `LaneStmt` sequences the emitters print, so
//! the transpose algebra is testable without a device. One [`LaneGroup`]
//! models a single lane group (lane rank equals `case_id`); values are `f64`
//! regardless of the declared element type, since only data movement is under
//! test. Broadcasts are all-or-nothing across the active set: reading from an
//! inactive lane is an error here, mirroring undefined behavior on hardware.

use std::collections::BTreeMap;

use crate::cycles::check_group;
use crate::error::{sim, Result};
use crate::ir::{IndexInit, LaneSrc, LaneStmt};
use crate::kernel::KernelPlan;
use crate::layout::RecordLayout;
use crate::transpose::lane_transpose;

/// One cooperating group of lanes and its active mask.
#[derive(Clone, Copy, Debug)]
pub struct LaneGroup {
    lanes: usize,
    active: u64,
}

impl LaneGroup {
    /// A fully active group. Simulation is capped at 64 lanes so the mask
    /// fits one word, matching the widest real subgroup.
    pub fn new(lanes: usize) -> Result<Self> {
        check_group(lanes)?;
        if lanes > 64 {
            return Err(sim("lane groups wider than 64 cannot be simulated"));
        }
        Ok(Self {
            lanes,
            active: Self::full_mask(lanes),
        })
    }

    pub fn full_mask(lanes: usize) -> u64 {
        if lanes >= 64 {
            u64::MAX
        } else {
            (1u64 << lanes) - 1
        }
    }

    pub fn with_mask(mut self, mask: u64) -> Self {
        self.active = mask;
        self
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    fn is_active(&self, lane: usize) -> bool {
        self.active >> lane & 1 == 1
    }
}

struct ArrayState {
    width: usize,
    data: Vec<f64>,
}

impl ArrayState {
    fn offset(&self, lanes: usize, lane: usize, slot: usize, comp: usize) -> usize {
        (lane * lanes + slot) * self.width + comp
    }
}

/// Per-group register state: named register arrays (lane × slot × component),
/// per-lane index registers, and the cycle temporaries.
pub struct RegFile {
    lanes: usize,
    arrays: BTreeMap<String, ArrayState>,
    index: BTreeMap<String, Vec<u32>>,
    temps: BTreeMap<String, ArrayState>,
}

impl RegFile {
    pub fn new(lanes: usize) -> Result<Self> {
        check_group(lanes)?;
        Ok(Self {
            lanes,
            arrays: BTreeMap::new(),
            index: BTreeMap::new(),
            temps: BTreeMap::new(),
        })
    }

    /// Register a named array of `lanes` slots per lane, zero-filled.
    pub fn add_array(&mut self, name: &str, width: u32) -> Result<()> {
        if !(1..=4).contains(&width) {
            return Err(sim(&format!("component width {width} outside 1..=4")));
        }
        let width = width as usize;
        self.arrays.insert(
            name.to_string(),
            ArrayState {
                width,
                data: vec![0.0; self.lanes * self.lanes * width],
            },
        );
        Ok(())
    }

    fn array(&self, name: &str) -> Result<&ArrayState> {
        self.arrays
            .get(name)
            .ok_or_else(|| sim(&format!("unknown register array {name:?}")))
    }

    fn array_mut(&mut self, name: &str) -> Result<&mut ArrayState> {
        self.arrays
            .get_mut(name)
            .ok_or_else(|| sim(&format!("unknown register array {name:?}")))
    }

    fn check_access(&self, state: &ArrayState, lane: usize, slot: usize, comp: usize) -> Result<()> {
        if lane >= self.lanes || slot >= self.lanes || comp >= state.width {
            return Err(sim(&format!(
                "register access (lane {lane}, slot {slot}, comp {comp}) outside {}x{}x{}",
                self.lanes, self.lanes, state.width
            )));
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, lane: usize, slot: usize, comp: usize, value: f64) -> Result<()> {
        let lanes = self.lanes;
        let state = self.array(name)?;
        self.check_access(state, lane, slot, comp)?;
        let at = state.offset(lanes, lane, slot, comp);
        self.array_mut(name)?.data[at] = value;
        Ok(())
    }

    pub fn get(&self, name: &str, lane: usize, slot: usize, comp: usize) -> Result<f64> {
        let state = self.array(name)?;
        self.check_access(state, lane, slot, comp)?;
        Ok(state.data[state.offset(self.lanes, lane, slot, comp)])
    }

    fn temp(&self, array: &str) -> Result<&ArrayState> {
        self.temps
            .get(array)
            .ok_or_else(|| sim(&format!("temporary for {array:?} used before declaration")))
    }
}

fn init_value(init: IndexInit, lane: usize, lanes: usize) -> u32 {
    match init {
        IndexInit::CaseId => lane as u32,
        IndexInit::MirrorCase => ((lanes - lane) % lanes) as u32,
    }
}

fn resolve_src(src: &LaneSrc, lane: usize, group: &LaneGroup, file: &RegFile) -> Result<usize> {
    let lanes = group.lanes();
    let target = match src {
        LaneSrc::NextCase => (lane + 1) % lanes,
        LaneSrc::PrevCase => (lane + lanes - 1) % lanes,
        LaneSrc::Register(name) => {
            let regs = file
                .index
                .get(name)
                .ok_or_else(|| sim(&format!("unknown index register {name:?}")))?;
            regs[lane] as usize
        }
    };
    if target >= lanes {
        return Err(sim(&format!(
            "broadcast source {target} outside the {lanes}-lane group"
        )));
    }
    if !group.is_active(target) {
        return Err(sim(&format!("broadcast reads inactive lane {target}")));
    }
    Ok(target)
}

fn step(stmt: &LaneStmt, group: &LaneGroup, file: &mut RegFile) -> Result<()> {
    let lanes = group.lanes();
    match stmt {
        LaneStmt::DeclIndex { name, init } | LaneStmt::AssignIndex { name, init } => {
            let regs = file
                .index
                .entry(name.clone())
                .or_insert_with(|| vec![0; lanes]);
            for lane in 0..lanes {
                if group.is_active(lane) {
                    regs[lane] = init_value(*init, lane, lanes);
                }
            }
        }
        LaneStmt::ShuffleIndex { name, src } => {
            let old = file
                .index
                .get(name)
                .cloned()
                .ok_or_else(|| sim(&format!("unknown index register {name:?}")))?;
            let mut moves = Vec::with_capacity(lanes);
            for lane in 0..lanes {
                if group.is_active(lane) {
                    moves.push((lane, resolve_src(src, lane, group, file)?));
                }
            }
            let regs = file
                .index
                .get_mut(name)
                .ok_or_else(|| sim(&format!("unknown index register {name:?}")))?;
            for (lane, from) in moves {
                regs[lane] = old[from];
            }
        }
        LaneStmt::ShuffleValue { array, slot, src } => {
            let (width, old): (usize, Vec<f64>) = {
                let state = file.array(array)?;
                file.check_access(state, 0, *slot, 0)?;
                let width = state.width;
                let mut old = Vec::with_capacity(lanes * width);
                for lane in 0..lanes {
                    for comp in 0..width {
                        old.push(state.data[state.offset(lanes, lane, *slot, comp)]);
                    }
                }
                (width, old)
            };
            let mut moves = Vec::with_capacity(lanes);
            for lane in 0..lanes {
                if group.is_active(lane) {
                    moves.push((lane, resolve_src(src, lane, group, file)?));
                }
            }
            for (lane, from) in moves {
                for comp in 0..width {
                    file.set(array, lane, *slot, comp, old[from * width + comp])?;
                }
            }
        }
        LaneStmt::DeclTemp { array } => {
            let width = file.array(array)?.width;
            file.temps.insert(
                array.clone(),
                ArrayState {
                    width,
                    data: vec![0.0; lanes * width],
                },
            );
        }
        LaneStmt::LoadTemp { array, slot } => {
            let width = file.temp(array)?.width;
            for lane in 0..lanes {
                if !group.is_active(lane) {
                    continue;
                }
                for comp in 0..width {
                    let value = file.get(array, lane, *slot, comp)?;
                    let temp = file
                        .temps
                        .get_mut(array)
                        .ok_or_else(|| sim("temporary vanished mid-step"))?;
                    temp.data[lane * width + comp] = value;
                }
            }
        }
        LaneStmt::SelectMove {
            array,
            dst,
            src,
            case,
        } => {
            let width = file.array(array)?.width;
            for lane in 0..lanes {
                if !group.is_active(lane) || lane != *case {
                    continue;
                }
                for comp in 0..width {
                    let value = file.get(array, lane, *src, comp)?;
                    file.set(array, lane, *dst, comp, value)?;
                }
            }
        }
        LaneStmt::SelectTemp { array, dst, case } => {
            let width = file.temp(array)?.width;
            for lane in 0..lanes {
                if !group.is_active(lane) || lane != *case {
                    continue;
                }
                for comp in 0..width {
                    let value = file.temp(array)?.data[lane * width + comp];
                    file.set(array, lane, *dst, comp, value)?;
                }
            }
        }
    }
    Ok(())
}

/// Execute a statement stream against one lane group.
pub fn run(stmts: &[LaneStmt], group: &LaneGroup, file: &mut RegFile) -> Result<()> {
    if group.lanes() != file.lanes {
        return Err(sim("lane group and register file disagree on group size"));
    }
    for stmt in stmts {
        step(stmt, group, file)?;
    }
    Ok(())
}

/// Run the whole gather/transpose/transform/transpose/scatter pipeline on
/// host data, one group at a time.
///
/// `input` is the flattened element array times component width, so its
/// length must be a multiple of `lanes * input_width`. The transform closure
/// is called once per lane with that lane's post-transpose registers
/// (slot-major, `lanes * width` values each side), mirroring the opaque
/// transform lines of the emitted kernel.
pub fn run_pipeline<F>(plan: &KernelPlan, input: &[f64], transform: F) -> Result<Vec<f64>>
where
    F: Fn(&[f64], &mut [f64]),
{
    let lanes = plan.lanes();
    let w_in = plan.input().width() as usize;
    let w_out = plan.output().width() as usize;
    let per_record = lanes * w_in;
    if input.len() % per_record != 0 {
        return Err(sim(&format!(
            "input length {} is not a whole number of {per_record}-value records",
            input.len()
        )));
    }
    let records = input.len() / per_record;
    let layout = RecordLayout::new(records, lanes);
    let fwd = lane_transpose("vin", lanes)?;
    let bwd = lane_transpose("vout", lanes)?;
    let group = LaneGroup::new(lanes)?;
    let mut output = vec![0.0; records * lanes * w_out];
    let mut in_regs = vec![0.0; lanes * w_in];
    let mut out_regs = vec![0.0; lanes * w_out];

    for g in 0..layout.groups() {
        let mut file = RegFile::new(lanes)?;
        file.add_array("vin", plan.input().width())?;
        file.add_array("vout", plan.output().width())?;
        let base = g * lanes;

        for c in 0..lanes {
            let n = base + c;
            for k in 0..lanes {
                if layout.in_bounds(n, k) {
                    let flat = layout.slot_index(n, k);
                    for comp in 0..w_in {
                        file.set("vin", c, k, comp, input[flat * w_in + comp])?;
                    }
                }
            }
        }

        run(&fwd, &group, &mut file)?;

        for c in 0..lanes {
            for k in 0..lanes {
                for comp in 0..w_in {
                    in_regs[k * w_in + comp] = file.get("vin", c, k, comp)?;
                }
            }
            out_regs.fill(0.0);
            transform(&in_regs, &mut out_regs);
            for k in 0..lanes {
                for comp in 0..w_out {
                    file.set("vout", c, k, comp, out_regs[k * w_out + comp])?;
                }
            }
        }

        run(&bwd, &group, &mut file)?;

        for c in 0..lanes {
            let n = base + c;
            for k in 0..lanes {
                if layout.in_bounds(n, k) {
                    let flat = layout.slot_index(n, k);
                    for comp in 0..w_out {
                        output[flat * w_out + comp] = file.get("vout", c, k, comp)?;
                    }
                }
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_file(lanes: usize) -> RegFile {
        let mut file = RegFile::new(lanes).unwrap();
        file.add_array("vin", 1).unwrap();
        for lane in 0..lanes {
            for slot in 0..lanes {
                file.set("vin", lane, slot, 0, (slot * lanes + lane) as f64)
                    .unwrap();
            }
        }
        file
    }

    #[test]
    fn address_chase_skews_each_row() {
        // Hand-built forward rotation only: register k of lane j must end up
        // holding register k of lane (j + k) % L.
        let lanes = 4usize;
        let mut stmts = vec![LaneStmt::DeclIndex {
            name: "vin_addr".into(),
            init: IndexInit::CaseId,
        }];
        for slot in 0..lanes {
            stmts.push(LaneStmt::ShuffleValue {
                array: "vin".into(),
                slot,
                src: LaneSrc::Register("vin_addr".into()),
            });
            stmts.push(LaneStmt::ShuffleIndex {
                name: "vin_addr".into(),
                src: LaneSrc::NextCase,
            });
        }
        let group = LaneGroup::new(lanes).unwrap();
        let mut file = seeded_file(lanes);
        run(&stmts, &group, &mut file).unwrap();
        for lane in 0..lanes {
            for slot in 0..lanes {
                let expect = (slot * lanes + (lane + slot) % lanes) as f64;
                assert_eq!(file.get("vin", lane, slot, 0).unwrap(), expect);
            }
        }
    }

    #[test]
    fn full_stream_transposes_the_square() {
        for lanes in [2usize, 4, 8] {
            let stmts = lane_transpose("vin", lanes).unwrap();
            let group = LaneGroup::new(lanes).unwrap();
            let mut file = seeded_file(lanes);
            run(&stmts, &group, &mut file).unwrap();
            for lane in 0..lanes {
                for slot in 0..lanes {
                    // Register k of lane c now holds register c of lane k.
                    let expect = (lane * lanes + slot) as f64;
                    assert_eq!(
                        file.get("vin", lane, slot, 0).unwrap(),
                        expect,
                        "lanes={lanes} lane={lane} slot={slot}"
                    );
                }
            }
        }
    }

    #[test]
    fn running_twice_restores_the_input() {
        for lanes in [1usize, 2, 4, 8, 16, 32] {
            let stmts = lane_transpose("vin", lanes).unwrap();
            let group = LaneGroup::new(lanes).unwrap();
            let mut file = seeded_file(lanes);
            run(&stmts, &group, &mut file).unwrap();
            run(&stmts, &group, &mut file).unwrap();
            for lane in 0..lanes {
                for slot in 0..lanes {
                    assert_eq!(
                        file.get("vin", lane, slot, 0).unwrap(),
                        (slot * lanes + lane) as f64,
                        "lanes={lanes}"
                    );
                }
            }
        }
    }

    #[test]
    fn vector_components_move_together() {
        let lanes = 4usize;
        let mut file = RegFile::new(lanes).unwrap();
        file.add_array("vin", 2).unwrap();
        for lane in 0..lanes {
            for slot in 0..lanes {
                let tag = (slot * lanes + lane) as f64;
                file.set("vin", lane, slot, 0, tag).unwrap();
                file.set("vin", lane, slot, 1, -tag).unwrap();
            }
        }
        let stmts = lane_transpose("vin", lanes).unwrap();
        let group = LaneGroup::new(lanes).unwrap();
        run(&stmts, &group, &mut file).unwrap();
        for lane in 0..lanes {
            for slot in 0..lanes {
                let tag = (lane * lanes + slot) as f64;
                assert_eq!(file.get("vin", lane, slot, 0).unwrap(), tag);
                assert_eq!(file.get("vin", lane, slot, 1).unwrap(), -tag);
            }
        }
    }

    #[test]
    fn full_mask_matches_the_default() {
        let lanes = 4usize;
        let stmts = lane_transpose("vin", lanes).unwrap();
        let plain = LaneGroup::new(lanes).unwrap();
        let masked = LaneGroup::new(lanes)
            .unwrap()
            .with_mask(LaneGroup::full_mask(lanes));
        let mut a = seeded_file(lanes);
        let mut b = seeded_file(lanes);
        run(&stmts, &plain, &mut a).unwrap();
        run(&stmts, &masked, &mut b).unwrap();
        for lane in 0..lanes {
            for slot in 0..lanes {
                assert_eq!(
                    a.get("vin", lane, slot, 0).unwrap(),
                    b.get("vin", lane, slot, 0).unwrap()
                );
            }
        }
    }

    #[test]
    fn broadcast_from_an_inactive_lane_fails() {
        let lanes = 4usize;
        let stmts = lane_transpose("vin", lanes).unwrap();
        let group = LaneGroup::new(lanes).unwrap().with_mask(0b0111);
        let mut file = seeded_file(lanes);
        let err = run(&stmts, &group, &mut file).unwrap_err();
        assert!(err.to_string().contains("inactive"));
    }

    #[test]
    fn pipeline_identity_reproduces_the_input() {
        let plan = KernelPlan::new("turn_sim", "float", "float", 4).unwrap();
        let input: Vec<f64> = (0..40).map(f64::from).collect();
        let out = run_pipeline(&plan, &input, |regs_in, regs_out| {
            regs_out.copy_from_slice(regs_in);
        })
        .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn transform_sees_the_transposed_view() {
        // Tagging each post-transpose slot k with +1000*k must surface in the
        // output as +1000*(n % L): slot index during transform is the column
        // offset within the group.
        let lanes = 4usize;
        let plan = KernelPlan::new("turn_view", "float", "float", lanes).unwrap();
        let records = 10usize;
        let input: Vec<f64> = (0..records * lanes).map(|v| v as f64).collect();
        let out = run_pipeline(&plan, &input, |regs_in, regs_out| {
            for (k, (dst, src)) in regs_out.iter_mut().zip(regs_in.iter()).enumerate() {
                *dst = src + (1000 * k) as f64;
            }
        })
        .unwrap();
        let layout = RecordLayout::new(records, lanes);
        for n in 0..layout.padded() {
            for k in 0..lanes {
                if layout.in_bounds(n, k) {
                    let flat = layout.slot_index(n, k);
                    assert_eq!(out[flat], input[flat] + (1000 * (n % lanes)) as f64);
                }
            }
        }
    }

    #[test]
    fn pipeline_rejects_ragged_input() {
        let plan = KernelPlan::new("turn_ragged", "float", "float", 4).unwrap();
        let err = run_pipeline(&plan, &[1.0; 10], |i, o| o.copy_from_slice(i)).unwrap_err();
        assert!(err.to_string().contains("records"));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let plan = KernelPlan::new("turn_empty", "float", "float", 8).unwrap();
        let out = run_pipeline(&plan, &[], |i, o| o.copy_from_slice(i)).unwrap();
        assert!(out.is_empty());
    }
}
