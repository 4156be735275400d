// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Full kernel emission around the lane transpose.
//!
//! A [`KernelPlan`] captures everything a specialization needs: entry-point
//! name, input/output element types, lane-group size, the transform lines
//! applied between the two transposes, and the active-mask policy. `emit`
//! renders the plan as CUDA C or WGSL compute source.
//!
//! The emitted kernel is a five-step sandwich: guarded strided gather,
//! forward lane transpose, caller transforms, inverse lane transpose,
//! strided scatter. The gather/scatter stride is the group-aligned padded
//! count, so every flat index below `n_total * lanes` is touched exactly
//! once and the tail never reads or writes out of bounds.

use serde::Serialize;

use crate::cycles::check_group;
use crate::element::ElementType;
use crate::error::{config, unsupported, Result};
use crate::ir::{emit_stream, Dialect, EmitCx};
use crate::transpose::lane_transpose;

/// Which lanes the broadcast mask names.
///
/// The transpose is only correct when every lane of the group is active and
/// converged, so the default simply asks the hardware. An explicit expression
/// is CUDA-only; WGSL subgroup shuffles carry no mask operand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum MaskPolicy {
    #[default]
    ActiveLanes,
    Expr(String),
}

/// Generation-time description of one corner-turn kernel.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KernelPlan {
    name: String,
    input: ElementType,
    output: ElementType,
    lanes: usize,
    transforms: Vec<String>,
    mask: MaskPolicy,
}

fn valid_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl KernelPlan {
    /// Validate the invocation parameters and build a plan with no transforms
    /// and the default mask policy.
    pub fn new(name: &str, input: &str, output: &str, lanes: usize) -> Result<Self> {
        if !valid_ident(name) {
            return Err(config(&format!("invalid kernel name {name:?}")));
        }
        check_group(lanes)?;
        Ok(Self {
            name: name.to_string(),
            input: ElementType::parse(input)?,
            output: ElementType::parse(output)?,
            lanes,
            transforms: Vec::new(),
            mask: MaskPolicy::default(),
        })
    }

    /// Append one transform statement. Lines are emitted verbatim between the
    /// transposes, in insertion order.
    pub fn with_transform(mut self, line: impl Into<String>) -> Self {
        self.transforms.push(line.into());
        self
    }

    pub fn with_mask(mut self, mask: MaskPolicy) -> Self {
        self.mask = mask;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&self) -> &ElementType {
        &self.input
    }

    pub fn output(&self) -> &ElementType {
        &self.output
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn transforms(&self) -> &[String] {
        &self.transforms
    }

    pub fn mask(&self) -> &MaskPolicy {
        &self.mask
    }

    /// Register-array name the gather fills, as seen by transform lines.
    pub fn input_array(dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Cuda => "in",
            Dialect::Wgsl => "vin",
        }
    }

    /// Register-array name the scatter drains.
    pub fn output_array(dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Cuda => "out",
            Dialect::Wgsl => "vout",
        }
    }

    /// Pass-through transform lines, one per register slot.
    pub fn identity_transforms(&self, dialect: Dialect) -> Vec<String> {
        let src = Self::input_array(dialect);
        let dst = Self::output_array(dialect);
        (0..self.lanes)
            .map(|k| format!("{dst}[{k}] = {src}[{k}];"))
            .collect()
    }

    /// Render the kernel source for `dialect`.
    pub fn emit(&self, dialect: Dialect) -> Result<String> {
        let source = match dialect {
            Dialect::Cuda => self.emit_cuda()?,
            Dialect::Wgsl => self.emit_wgsl()?,
        };
        tracing::debug!(
            kernel = %self.name,
            dialect = dialect.name(),
            lanes = self.lanes,
            bytes = source.len(),
            "emitted corner-turn kernel"
        );
        Ok(source)
    }

    fn emit_cuda(&self) -> Result<String> {
        let lanes = self.lanes;
        let name = &self.name;
        let in_ty = self.input.cuda_name();
        let out_ty = self.output.cuda_name();

        let mut lines: Vec<String> = Vec::new();
        lines.push(format!(
            "// {name}: corner-turn round trip over groups of {lanes} lanes."
        ));
        lines.push(
            "// Each element is read and written exactly once; everything between the"
                .to_string(),
        );
        lines.push("// gather and the scatter moves through register shuffles.".to_string());
        lines.push(format!("extern \"C\" __global__ void {name}("));
        lines.push(format!("    const {in_ty} * __restrict__ in_data,"));
        lines.push(format!("    {out_ty} * __restrict__ out_data,"));
        lines.push("    const int n_total)".to_string());
        lines.push("{".to_string());
        lines.push("    const int n = blockIdx.x * blockDim.x + threadIdx.x;".to_string());
        if lanes > 1 {
            lines.push(format!(
                "    const unsigned int case_id = threadIdx.x % {lanes}u;"
            ));
            let mask_expr = match &self.mask {
                MaskPolicy::ActiveLanes => "__activemask()".to_string(),
                MaskPolicy::Expr(expr) => expr.clone(),
            };
            lines.push(format!("    const unsigned int mask = {mask_expr};"));
        }
        lines.push(format!(
            "    const int nmulup = {lanes} * ((n_total + {}) / {lanes});",
            lanes - 1
        ));
        lines.push(format!("    const int total = n_total * {lanes};"));
        lines.push("    if (n >= nmulup) {".to_string());
        lines.push("        return;".to_string());
        lines.push("    }".to_string());
        lines.push(format!("    {in_ty} in[{lanes}];"));
        lines.push(format!("    {out_ty} out[{lanes}];"));
        for k in 0..lanes {
            lines.push(format!(
                "    if (n + {k} * nmulup < total) {{ in[{k}] = in_data[n + {k} * nmulup]; }}"
            ));
        }
        if lanes > 1 {
            let fwd_cx = EmitCx::new(Dialect::Cuda, lanes, &self.input, "mask", "    ")?;
            lines.push("    // lane transpose, forward".to_string());
            lines.push(emit_stream(&lane_transpose("in", lanes)?, &fwd_cx));
        }
        if !self.transforms.is_empty() {
            lines.push("    // transform".to_string());
            for line in &self.transforms {
                lines.push(format!("    {}", line.trim()));
            }
        }
        if lanes > 1 {
            let bwd_cx = EmitCx::new(Dialect::Cuda, lanes, &self.output, "mask", "    ")?;
            lines.push("    // lane transpose, inverse".to_string());
            lines.push(emit_stream(&lane_transpose("out", lanes)?, &bwd_cx));
        }
        for k in 0..lanes {
            lines.push(format!(
                "    if (n + {k} * nmulup < total) {{ out_data[n + {k} * nmulup] = out[{k}]; }}"
            ));
        }
        lines.push("}".to_string());
        lines.push(String::new());
        Ok(lines.join("\n"))
    }

    fn emit_wgsl(&self) -> Result<String> {
        if let MaskPolicy::Expr(_) = self.mask {
            return Err(unsupported(
                "wgsl",
                "subgroup shuffles carry no explicit lane mask",
            ));
        }
        let lanes = self.lanes;
        let name = &self.name;
        let in_ty = self.input.wgsl_name()?;
        let out_ty = self.output.wgsl_name()?;
        let workgroup = lanes.max(64);

        let mut lines: Vec<String> = Vec::new();
        lines.push(format!(
            "// {name}: corner-turn round trip over groups of {lanes} lanes."
        ));
        if lanes > 1 {
            // No `enable subgroups;` here: naga's WGSL front end rejects the
            // directive and admits the subgroup builtins without it.
            lines.push(
                "// Assumes subgroup invocation ids pack linearly within the workgroup."
                    .to_string(),
            );
        }
        lines.push(String::new());
        lines.push("struct Params {".to_string());
        lines.push("    n_total: u32,".to_string());
        lines.push("    _pad0: u32,".to_string());
        lines.push("    _pad1: u32,".to_string());
        lines.push("    _pad2: u32,".to_string());
        lines.push("};".to_string());
        lines.push(String::new());
        lines.push(format!(
            "@group(0) @binding(0) var<storage, read> in_data: array<{in_ty}>;"
        ));
        lines.push(format!(
            "@group(0) @binding(1) var<storage, read_write> out_data: array<{out_ty}>;"
        ));
        lines.push("@group(0) @binding(2) var<uniform> params: Params;".to_string());
        lines.push(String::new());
        lines.push(format!("@compute @workgroup_size({workgroup}, 1, 1)"));
        if lanes > 1 {
            lines.push(format!("fn {name}("));
            lines.push("    @builtin(global_invocation_id) gid: vec3<u32>,".to_string());
            lines.push("    @builtin(subgroup_invocation_id) sid: u32,".to_string());
            lines.push(") {".to_string());
        } else {
            lines.push(format!(
                "fn {name}(@builtin(global_invocation_id) gid: vec3<u32>) {{"
            ));
        }
        lines.push("    let n = gid.x;".to_string());
        if lanes > 1 {
            lines.push(format!("    let case_id = sid % {lanes}u;"));
            lines.push(format!("    let seg = (sid / {lanes}u) * {lanes}u;"));
        }
        lines.push(format!(
            "    let nmulup = {lanes}u * ((params.n_total + {}u) / {lanes}u);",
            lanes - 1
        ));
        lines.push(format!("    let total = params.n_total * {lanes}u;"));
        lines.push("    if (n >= nmulup) {".to_string());
        lines.push("        return;".to_string());
        lines.push("    }".to_string());
        lines.push(format!("    var vin: array<{in_ty}, {lanes}>;"));
        lines.push(format!("    var vout: array<{out_ty}, {lanes}>;"));
        for k in 0..lanes {
            lines.push(format!(
                "    if (n + {k}u * nmulup < total) {{ vin[{k}] = in_data[n + {k}u * nmulup]; }}"
            ));
        }
        if lanes > 1 {
            let fwd_cx = EmitCx::new(Dialect::Wgsl, lanes, &self.input, "", "    ")?;
            lines.push("    // lane transpose, forward".to_string());
            lines.push(emit_stream(&lane_transpose("vin", lanes)?, &fwd_cx));
        }
        if !self.transforms.is_empty() {
            lines.push("    // transform".to_string());
            for line in &self.transforms {
                lines.push(format!("    {}", line.trim()));
            }
        }
        if lanes > 1 {
            let bwd_cx = EmitCx::new(Dialect::Wgsl, lanes, &self.output, "", "    ")?;
            lines.push("    // lane transpose, inverse".to_string());
            lines.push(emit_stream(&lane_transpose("vout", lanes)?, &bwd_cx));
        }
        for k in 0..lanes {
            lines.push(format!(
                "    if (n + {k}u * nmulup < total) {{ out_data[n + {k}u * nmulup] = vout[{k}]; }}"
            ));
        }
        lines.push("}".to_string());
        lines.push(String::new());
        Ok(lines.join("\n"))
    }
}
