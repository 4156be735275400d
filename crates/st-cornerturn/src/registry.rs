// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide cache of emitted kernel source.
//!
//! Specializations are requested repeatedly with the same parameters (one
//! plan per element type and group size, re-launched per batch), so the
//! rendered source is memoized behind a stable string key. Backends share
//! the cached `Arc<str>` instead of re-running emission.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::Result;
use crate::ir::Dialect;
use crate::kernel::KernelPlan;

/// Identity of one emitted specialization.
///
/// Name, types and lane count are kept readable; transform lines and the
/// mask policy are folded into a fingerprint since they are free-form text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct KernelKey {
    dialect: Dialect,
    name: String,
    input: String,
    output: String,
    lanes: usize,
    fingerprint: u64,
}

impl KernelKey {
    pub fn of(plan: &KernelPlan, dialect: Dialect) -> Self {
        let mut hasher = DefaultHasher::new();
        plan.transforms().hash(&mut hasher);
        plan.mask().hash(&mut hasher);
        Self {
            dialect,
            name: plan.name().to_string(),
            input: plan.input().name().to_string(),
            output: plan.output().name().to_string(),
            lanes: plan.lanes(),
            fingerprint: hasher.finish(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{:016x}",
            self.dialect.name(),
            self.name,
            self.input,
            self.output,
            self.lanes,
            self.fingerprint
        )
    }
}

impl fmt::Display for KernelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

static CACHE: OnceCell<Mutex<HashMap<String, Arc<str>>>> = OnceCell::new();

/// Emit `plan` for `dialect`, reusing previously rendered source when the
/// key matches. Emission failures are returned and never cached.
pub fn cached_source(plan: &KernelPlan, dialect: Dialect) -> Result<Arc<str>> {
    let key = KernelKey::of(plan, dialect).encode();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let Ok(mut guard) = cache.lock() else {
        // Poisoned by a panicking thread; fall back to a fresh emission.
        return Ok(plan.emit(dialect)?.into());
    };
    if let Some(hit) = guard.get(&key) {
        tracing::trace!(key = %key, "kernel source cache hit");
        return Ok(Arc::clone(hit));
    }
    let source: Arc<str> = plan.emit(dialect)?.into();
    guard.insert(key, Arc::clone(&source));
    Ok(source)
}
