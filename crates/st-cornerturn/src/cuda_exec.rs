//! CUDA launch path: NVRTC-compile the emitted kernel and run it.
//!
//! Scalar `float` kernels only; wider element types go through custom
//! launches on the caller's side. Compiled modules are memoized per kernel
//! key next to the source cache, so repeated launches of one specialization
//! pay NVRTC once and reuse the loaded function.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cudarc::driver::{CudaDevice, CudaFunction, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;
use once_cell::sync::OnceCell;

use crate::caps::LaneCaps;
use crate::error::{backend, config, unsupported, Result};
use crate::ir::Dialect;
use crate::kernel::KernelPlan;
use crate::layout::RecordLayout;
use crate::registry::{cached_source, KernelKey};

static DEVICE: OnceCell<Arc<CudaDevice>> = OnceCell::new();
static FUNCS: OnceCell<Mutex<HashMap<String, CudaFunction>>> = OnceCell::new();

fn device() -> Result<Arc<CudaDevice>> {
    DEVICE
        .get_or_try_init(|| {
            CudaDevice::new(0).map_err(|e| backend(&format!("no cuda device: {e}")))
        })
        .cloned()
}

fn compile_and_load(plan: &KernelPlan, module: &str) -> Result<CudaFunction> {
    let source = cached_source(plan, Dialect::Cuda)?;
    let ptx = compile_ptx(source.as_ref())
        .map_err(|e| backend(&format!("nvrtc rejected {}: {e}", plan.name())))?;
    let dev = device()?;
    // cudarc keeps function names for the lifetime of the module; modules
    // stay cached for the process, so one leaked name per specialization.
    let func_name: &'static str = Box::leak(plan.name().to_string().into_boxed_str());
    dev.load_ptx(ptx, module, &[func_name])
        .map_err(|e| backend(&format!("ptx load failed: {e}")))?;
    dev.get_func(module, func_name)
        .ok_or_else(|| backend(&format!("kernel {func_name} missing after load")))
}

/// NVRTC-compile and load the plan's kernel, memoized per kernel key.
fn loaded_func(plan: &KernelPlan) -> Result<CudaFunction> {
    let key = KernelKey::of(plan, Dialect::Cuda).encode();
    let cache = FUNCS.get_or_init(|| Mutex::new(HashMap::new()));
    let Ok(mut guard) = cache.lock() else {
        // Poisoned by a panicking thread; reloading under the same module
        // name could clobber a live function, so give up instead.
        return Err(backend("cuda kernel cache poisoned"));
    };
    if let Some(func) = guard.get(&key) {
        tracing::trace!(key = %key, "cuda kernel cache hit");
        return Ok(func.clone());
    }
    let func = compile_and_load(plan, &key)?;
    tracing::debug!(key = %key, "compiled and loaded corner-turn kernel");
    guard.insert(key, func.clone());
    Ok(func)
}

/// Round-trip `input` through the plan's kernel on device 0.
///
/// `input` is the flat element array, `records * lanes` floats; the output
/// has the same shape in the plan's output type (also `float` here).
pub fn launch_f32(plan: &KernelPlan, input: &[f32]) -> Result<Vec<f32>> {
    let caps = LaneCaps::cuda();
    let lanes = plan.lanes();
    caps.validate_group(lanes)?;
    if plan.input().cuda_name() != "float" || plan.output().cuda_name() != "float" {
        return Err(unsupported(
            "cuda",
            "launch_f32 drives scalar float kernels only",
        ));
    }
    if input.len() % lanes != 0 {
        return Err(config(&format!(
            "input of {} elements is not a whole number of {lanes}-lane records",
            input.len()
        )));
    }
    let records = input.len() / lanes;
    if records == 0 {
        return Ok(Vec::new());
    }
    if records
        .checked_mul(lanes)
        .map_or(true, |flat| flat > i32::MAX as usize)
    {
        return Err(config("flat index space exceeds the 32-bit kernel bound"));
    }

    let func = loaded_func(plan)?;
    let dev = device()?;

    let layout = RecordLayout::new(records, lanes);
    let block = caps.workgroup_for(lanes) as u32;
    let grid = (layout.padded() as u32).div_ceil(block);
    tracing::debug!(
        kernel = plan.name(),
        records,
        lanes,
        grid,
        block,
        "launching corner-turn kernel"
    );

    let d_in = dev
        .htod_sync_copy(input)
        .map_err(|e| backend(&format!("upload failed: {e}")))?;
    let mut d_out = dev
        .alloc_zeros::<f32>(records * lanes)
        .map_err(|e| backend(&format!("device alloc failed: {e}")))?;
    let cfg = LaunchConfig {
        grid_dim: (grid, 1, 1),
        block_dim: (block, 1, 1),
        shared_mem_bytes: 0,
    };
    unsafe {
        func.launch(cfg, (&d_in, &mut d_out, records as i32))
            .map_err(|e| backend(&format!("launch failed: {e}")))?;
    }
    dev.dtoh_sync_copy(&d_out)
        .map_err(|e| backend(&format!("download failed: {e}")))
}
