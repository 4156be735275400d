//! Lane-width capabilities of the launch backends.
//!
//! A corner-turn group must fit inside the hardware unit that services the
//! broadcast: the warp on CUDA, the subgroup on WGSL, the mask word in the
//! simulator. Backends construct a [`LaneCaps`] up front and validate plans
//! against it before any source is compiled.

use serde::Serialize;

use crate::cycles::valid_group;
use crate::error::{config, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cuda,
    Wgsl,
    Cpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LaneCaps {
    backend: BackendKind,
    lane_width: usize,
    max_workgroup: usize,
}

impl LaneCaps {
    /// NVIDIA warps are 32 lanes wide on every shipped architecture.
    pub fn cuda() -> Self {
        Self {
            backend: BackendKind::Cuda,
            lane_width: 32,
            max_workgroup: 1024,
        }
    }

    /// Subgroup width varies per adapter; callers pass the probed minimum.
    pub fn wgsl(subgroup_width: usize) -> Self {
        Self {
            backend: BackendKind::Wgsl,
            lane_width: subgroup_width,
            max_workgroup: 256,
        }
    }

    /// The simulator masks lanes with one 64-bit word.
    pub fn cpu() -> Self {
        Self {
            backend: BackendKind::Cpu,
            lane_width: 64,
            max_workgroup: 64,
        }
    }

    pub fn with_lane_width(mut self, lane_width: usize) -> Self {
        self.lane_width = lane_width;
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn lane_width(&self) -> usize {
        self.lane_width
    }

    pub fn supports_group(&self, lanes: usize) -> bool {
        valid_group(lanes) && lanes <= self.lane_width
    }

    pub fn validate_group(&self, lanes: usize) -> Result<()> {
        if !self.supports_group(lanes) {
            return Err(config(&format!(
                "group of {lanes} lanes does not fit a {:?} lane width of {}",
                self.backend, self.lane_width
            )));
        }
        Ok(())
    }

    /// Threads per block/workgroup for a dispatch: a multiple of the group
    /// size, at least 64 for occupancy, capped by the backend limit.
    pub fn workgroup_for(&self, lanes: usize) -> usize {
        lanes.max(64).min(self.max_workgroup)
    }
}
