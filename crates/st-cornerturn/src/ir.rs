// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lane instruction list for the corner-turn sequences.
//!
//! The transpose generator produces a flat `Vec<LaneStmt>`. Each statement
//! renders to one line of CUDA or WGSL (one line per vector component where
//! CUDA's shuffle is scalar-only), and the same statements drive the software
//! simulator, so the tests execute exactly what the emitters print.
//!
//! CUDA shuffles use the width argument of `__shfl_sync` to stay inside the
//! lane group; WGSL has no width argument, so source lanes are offset by the
//! group's segment base within the subgroup (`seg`).

use serde::Serialize;

use crate::element::{ElementType, COMPONENTS};
use crate::error::Result;

/// Emission target for generated kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Cuda,
    Wgsl,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Cuda => "cuda",
            Dialect::Wgsl => "wgsl",
        }
    }
}

/// Source lane of a broadcast, resolved per executing lane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaneSrc {
    /// `(case_id + 1) % lanes`, the forward address chase.
    NextCase,
    /// `(case_id + lanes - 1) % lanes`, the mirrored chase.
    PrevCase,
    /// Value of a named per-lane index register (the dynamic address).
    Register(String),
}

/// Initial value of a per-lane index register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexInit {
    /// `case_id`
    CaseId,
    /// `(lanes - case_id) % lanes`
    MirrorCase,
}

/// One lane-group instruction.
///
/// `array` names the per-lane register array the statement touches; index
/// registers and the cycle temporary are derived names (`{array}_addr`,
/// `{array}_tmp`) so two transposes can coexist in one kernel body.
#[derive(Clone, Debug, PartialEq)]
pub enum LaneStmt {
    /// Declare and initialize a per-lane index register.
    DeclIndex { name: String, init: IndexInit },
    /// Reassign an existing index register.
    AssignIndex { name: String, init: IndexInit },
    /// `name = lane_broadcast(name, src)`.
    ShuffleIndex { name: String, src: LaneSrc },
    /// `array[slot] = lane_broadcast(array[slot], src)`, every component.
    ShuffleValue {
        array: String,
        slot: usize,
        src: LaneSrc,
    },
    /// Declare the per-array temporary used by the in-place cycles.
    DeclTemp { array: String },
    /// `tmp = array[slot]` on every lane.
    LoadTemp { array: String, slot: usize },
    /// `array[dst] = case_id == case ? array[src] : array[dst]`.
    SelectMove {
        array: String,
        dst: usize,
        src: usize,
        case: usize,
    },
    /// `array[dst] = case_id == case ? tmp : array[dst]`.
    SelectTemp {
        array: String,
        dst: usize,
        case: usize,
    },
}

impl LaneStmt {
    /// True for the statements that touch the lane-broadcast primitive.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            LaneStmt::ShuffleIndex { .. } | LaneStmt::ShuffleValue { .. }
        )
    }
}

pub(crate) fn temp_name(array: &str) -> String {
    format!("{array}_tmp")
}

/// Everything the emitters need to render one statement stream.
pub struct EmitCx<'a> {
    dialect: Dialect,
    lanes: usize,
    width: u32,
    elem: String,
    mask: &'a str,
    indent: &'a str,
}

impl<'a> EmitCx<'a> {
    /// Resolve the element type for the dialect up front; emission itself is
    /// infallible after this.
    pub fn new(
        dialect: Dialect,
        lanes: usize,
        elem: &ElementType,
        mask: &'a str,
        indent: &'a str,
    ) -> Result<Self> {
        let name = match dialect {
            Dialect::Cuda => elem.cuda_name().to_string(),
            Dialect::Wgsl => elem.wgsl_name()?,
        };
        Ok(Self {
            dialect,
            lanes,
            width: elem.width(),
            elem: name,
            mask,
            indent,
        })
    }

    fn lane_expr(&self, src: &LaneSrc) -> String {
        let lanes = self.lanes;
        match src {
            LaneSrc::NextCase => format!("(case_id + 1u) % {lanes}u"),
            LaneSrc::PrevCase => format!("(case_id + {}u) % {lanes}u", lanes - 1),
            LaneSrc::Register(name) => name.clone(),
        }
    }

    fn init_expr(&self, init: IndexInit) -> String {
        let lanes = self.lanes;
        match init {
            IndexInit::CaseId => "case_id".to_string(),
            IndexInit::MirrorCase => format!("({lanes}u - case_id) % {lanes}u"),
        }
    }

    /// CUDA component suffixes: empty for scalars, `.x`/`.y`/... for vectors.
    fn cuda_components(&self) -> Vec<String> {
        if self.width == 1 {
            vec![String::new()]
        } else {
            COMPONENTS[..self.width as usize]
                .iter()
                .map(|c| format!(".{c}"))
                .collect()
        }
    }
}

impl LaneStmt {
    /// Render the statement for the context's dialect.
    pub fn emit(&self, cx: &EmitCx<'_>) -> String {
        match cx.dialect {
            Dialect::Cuda => self.emit_cuda(cx),
            Dialect::Wgsl => self.emit_wgsl(cx),
        }
    }

    fn emit_cuda(&self, cx: &EmitCx<'_>) -> String {
        let ind = cx.indent;
        let lanes = cx.lanes;
        let mask = cx.mask;
        match self {
            LaneStmt::DeclIndex { name, init } => {
                format!("{ind}unsigned int {name} = {};", cx.init_expr(*init))
            }
            LaneStmt::AssignIndex { name, init } => {
                format!("{ind}{name} = {};", cx.init_expr(*init))
            }
            LaneStmt::ShuffleIndex { name, src } => {
                let lane = cx.lane_expr(src);
                format!("{ind}{name} = __shfl_sync({mask}, {name}, {lane}, {lanes});")
            }
            LaneStmt::ShuffleValue { array, slot, src } => {
                let lane = cx.lane_expr(src);
                cx.cuda_components()
                    .iter()
                    .map(|c| {
                        format!(
                            "{ind}{array}[{slot}]{c} = \
                             __shfl_sync({mask}, {array}[{slot}]{c}, {lane}, {lanes});"
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            LaneStmt::DeclTemp { array } => {
                format!("{ind}{} {};", cx.elem, temp_name(array))
            }
            LaneStmt::LoadTemp { array, slot } => {
                format!("{ind}{} = {array}[{slot}];", temp_name(array))
            }
            LaneStmt::SelectMove {
                array,
                dst,
                src,
                case,
            } => cx
                .cuda_components()
                .iter()
                .map(|c| {
                    format!(
                        "{ind}{array}[{dst}]{c} = \
                         (case_id == {case}u) ? {array}[{src}]{c} : {array}[{dst}]{c};"
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            LaneStmt::SelectTemp { array, dst, case } => {
                let tmp = temp_name(array);
                cx.cuda_components()
                    .iter()
                    .map(|c| {
                        format!(
                            "{ind}{array}[{dst}]{c} = \
                             (case_id == {case}u) ? {tmp}{c} : {array}[{dst}]{c};"
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }

    fn emit_wgsl(&self, cx: &EmitCx<'_>) -> String {
        let ind = cx.indent;
        match self {
            LaneStmt::DeclIndex { name, init } => {
                format!("{ind}var {name}: u32 = {};", cx.init_expr(*init))
            }
            LaneStmt::AssignIndex { name, init } => {
                format!("{ind}{name} = {};", cx.init_expr(*init))
            }
            LaneStmt::ShuffleIndex { name, src } => {
                let lane = cx.lane_expr(src);
                format!("{ind}{name} = subgroupShuffle({name}, seg + {lane});")
            }
            LaneStmt::ShuffleValue { array, slot, src } => {
                let lane = cx.lane_expr(src);
                format!("{ind}{array}[{slot}] = subgroupShuffle({array}[{slot}], seg + {lane});")
            }
            LaneStmt::DeclTemp { array } => {
                format!("{ind}var {}: {};", temp_name(array), cx.elem)
            }
            LaneStmt::LoadTemp { array, slot } => {
                format!("{ind}{} = {array}[{slot}];", temp_name(array))
            }
            LaneStmt::SelectMove {
                array,
                dst,
                src,
                case,
            } => format!(
                "{ind}{array}[{dst}] = select({array}[{dst}], {array}[{src}], case_id == {case}u);"
            ),
            LaneStmt::SelectTemp { array, dst, case } => {
                let tmp = temp_name(array);
                format!("{ind}{array}[{dst}] = select({array}[{dst}], {tmp}, case_id == {case}u);")
            }
        }
    }
}

/// Render a whole statement stream, one emitted line per row.
pub fn emit_stream(stmts: &[LaneStmt], cx: &EmitCx<'_>) -> String {
    stmts
        .iter()
        .map(|stmt| stmt.emit(cx))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuda_cx(elem: &str, lanes: usize) -> EmitCx<'static> {
        let ty = ElementType::parse(elem).unwrap();
        EmitCx::new(Dialect::Cuda, lanes, &ty, "mask", "").unwrap()
    }

    fn wgsl_cx(elem: &str, lanes: usize) -> EmitCx<'static> {
        let ty = ElementType::parse(elem).unwrap();
        EmitCx::new(Dialect::Wgsl, lanes, &ty, "", "").unwrap()
    }

    #[test]
    fn cuda_scalar_shuffle() {
        let stmt = LaneStmt::ShuffleValue {
            array: "in".into(),
            slot: 2,
            src: LaneSrc::Register("in_addr".into()),
        };
        assert_eq!(
            stmt.emit(&cuda_cx("float", 4)),
            "in[2] = __shfl_sync(mask, in[2], in_addr, 4);"
        );
    }

    #[test]
    fn cuda_vector_shuffle_expands_components() {
        let stmt = LaneStmt::ShuffleValue {
            array: "in".into(),
            slot: 0,
            src: LaneSrc::Register("in_addr".into()),
        };
        let out = stmt.emit(&cuda_cx("float2", 4));
        assert!(out.contains("in[0].x = __shfl_sync(mask, in[0].x, in_addr, 4);"));
        assert!(out.contains("in[0].y = __shfl_sync(mask, in[0].y, in_addr, 4);"));
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn cuda_select_is_a_ternary() {
        let stmt = LaneStmt::SelectMove {
            array: "out".into(),
            dst: 0,
            src: 3,
            case: 1,
        };
        assert_eq!(
            stmt.emit(&cuda_cx("float", 4)),
            "out[0] = (case_id == 1u) ? out[3] : out[0];"
        );
    }

    #[test]
    fn cuda_address_chase() {
        let decl = LaneStmt::DeclIndex {
            name: "in_addr".into(),
            init: IndexInit::CaseId,
        };
        let step = LaneStmt::ShuffleIndex {
            name: "in_addr".into(),
            src: LaneSrc::NextCase,
        };
        let back = LaneStmt::ShuffleIndex {
            name: "in_addr".into(),
            src: LaneSrc::PrevCase,
        };
        let cx = cuda_cx("float", 8);
        assert_eq!(decl.emit(&cx), "unsigned int in_addr = case_id;");
        assert_eq!(
            step.emit(&cx),
            "in_addr = __shfl_sync(mask, in_addr, (case_id + 1u) % 8u, 8);"
        );
        assert_eq!(
            back.emit(&cx),
            "in_addr = __shfl_sync(mask, in_addr, (case_id + 7u) % 8u, 8);"
        );
    }

    #[test]
    fn wgsl_shuffles_are_segment_relative() {
        let stmt = LaneStmt::ShuffleValue {
            array: "vin".into(),
            slot: 1,
            src: LaneSrc::Register("vin_addr".into()),
        };
        assert_eq!(
            stmt.emit(&wgsl_cx("float", 4)),
            "vin[1] = subgroupShuffle(vin[1], seg + vin_addr);"
        );
    }

    #[test]
    fn wgsl_select_orders_false_then_true() {
        let stmt = LaneStmt::SelectMove {
            array: "vin".into(),
            dst: 2,
            src: 1,
            case: 3,
        };
        assert_eq!(
            stmt.emit(&wgsl_cx("float2", 4)),
            "vin[2] = select(vin[2], vin[1], case_id == 3u);"
        );
    }

    #[test]
    fn wgsl_temp_declares_the_vector_type() {
        let stmt = LaneStmt::DeclTemp { array: "vin".into() };
        assert_eq!(
            stmt.emit(&wgsl_cx("uint4", 4)),
            "var vin_tmp: vec4<u32>;"
        );
    }

    #[test]
    fn mirror_init_renders_per_dialect() {
        let stmt = LaneStmt::AssignIndex {
            name: "out_addr".into(),
            init: IndexInit::MirrorCase,
        };
        assert_eq!(
            stmt.emit(&cuda_cx("float", 4)),
            "out_addr = (4u - case_id) % 4u;"
        );
        assert_eq!(
            stmt.emit(&wgsl_cx("float", 4)),
            "out_addr = (4u - case_id) % 4u;"
        );
    }

    #[test]
    fn stream_joins_lines_in_order() {
        let cx = cuda_cx("float", 2);
        let stmts = vec![
            LaneStmt::DeclIndex {
                name: "in_addr".into(),
                init: IndexInit::CaseId,
            },
            LaneStmt::LoadTemp {
                array: "in".into(),
                slot: 0,
            },
        ];
        let out = emit_stream(&stmts, &cx);
        assert_eq!(
            out,
            "unsigned int in_addr = case_id;\nin_tmp = in[0];"
        );
    }
}
