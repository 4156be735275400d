// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Corner-turn kernel generation for SpiralTorch backends.
//!
//! A corner turn converts between the strided layout coherency data arrives
//! in and the lane-contiguous layout per-element transforms want, without a
//! trip through shared or global memory: each lane group of `L` lanes holds
//! an `L`x`L` tile in registers and transposes it with lane broadcasts. This
//! crate decomposes the per-case register permutations into cycles, builds
//! the branch-free three-phase shuffle sequence, and wraps it in a complete
//! CUDA or WGSL kernel with guarded strided gather/scatter and caller
//! transform lines in between.
//!
//! ```
//! use st_cornerturn::{Dialect, KernelPlan};
//!
//! let plan = KernelPlan::new("turn_f32", "float", "float", 4)?;
//! let plan = plan
//!     .identity_transforms(Dialect::Cuda)
//!     .into_iter()
//!     .fold(plan, |p, line| p.with_transform(line));
//! let source = plan.emit(Dialect::Cuda)?;
//! assert!(source.contains("__shfl_sync"));
//! # Ok::<(), st_cornerturn::Error>(())
//! ```
//!
//! The [`sim`] module executes the same statement streams on the host, so
//! every algebraic property is testable without a device; the `cuda` and
//! `wgpu` features add real launch paths.

pub mod caps;
pub mod cycles;
pub mod element;
pub mod error;
pub mod ir;
pub mod kernel;
pub mod layout;
pub mod registry;
pub mod sim;
pub mod trace_init;
pub mod transpose;

#[cfg(feature = "cuda")]
pub mod cuda_exec;
#[cfg(feature = "wgpu")]
pub mod wgpu_exec;

pub use caps::{BackendKind, LaneCaps};
pub use cycles::{rotation_cycles, valid_group, CycleStep};
pub use element::ElementType;
pub use error::{Error, Result};
pub use ir::{emit_stream, Dialect, EmitCx, IndexInit, LaneSrc, LaneStmt};
pub use kernel::{KernelPlan, MaskPolicy};
pub use layout::RecordLayout;
pub use registry::{cached_source, KernelKey};
pub use sim::{run, run_pipeline, LaneGroup, RegFile};
pub use trace_init::{init_tracing, InitError};
pub use transpose::lane_transpose;
