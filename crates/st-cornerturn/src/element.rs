// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Element types for corner-turn kernels.
//!
//! Types arrive as CUDA-style names (`float`, `double2`, `int4`, ...): the
//! trailing decimal digits are the component width, a name without digits is
//! a scalar. The CUDA dialect declares the name verbatim; the WGSL dialect
//! maps the base onto `f32`/`i32`/`u32` and wraps widths above one in a
//! `vecW<T>`.

use serde::Serialize;

use crate::error::{config, unsupported, Result};

/// CUDA vector component accessors, in declaration order.
pub(crate) const COMPONENTS: [&str; 4] = ["x", "y", "z", "w"];

/// A parsed element type: base name plus component width in 1..=4.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ElementType {
    name: String,
    base: String,
    width: u32,
}

impl ElementType {
    /// Parse a CUDA-style type name.
    ///
    /// A name with no trailing digits keeps the historical silent fallback
    /// to width 1, logged at debug level so it stays observable.
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(config("empty element type name"));
        }
        let base = trimmed.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = &trimmed[base.len()..];
        if base.is_empty() {
            return Err(config(&format!(
                "element type `{trimmed}` has no base name"
            )));
        }
        let width = if digits.is_empty() {
            tracing::debug!(ty = trimmed, "no component suffix, assuming scalar");
            1
        } else {
            digits.parse::<u32>().map_err(|_| {
                config(&format!(
                    "component suffix `{digits}` of `{trimmed}` does not fit a width"
                ))
            })?
        };
        if !(1..=4).contains(&width) {
            return Err(config(&format!(
                "component width {width} of `{trimmed}` is outside 1..=4"
            )));
        }
        Ok(Self {
            name: trimmed.to_string(),
            base: base.to_string(),
            width,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Declared type in CUDA source; vector names are real CUDA types.
    pub fn cuda_name(&self) -> &str {
        &self.name
    }

    /// WGSL scalar for the base name, if the dialect can represent it.
    pub fn wgsl_scalar(&self) -> Result<&'static str> {
        match self.base.as_str() {
            "float" => Ok("f32"),
            "int" => Ok("i32"),
            "uint" | "unsigned" => Ok("u32"),
            other => Err(unsupported(
                "wgsl",
                &format!("no WGSL scalar for base type `{other}`"),
            )),
        }
    }

    /// Declared type in WGSL source (`f32`, `vec2<f32>`, ...).
    pub fn wgsl_name(&self) -> Result<String> {
        let scalar = self.wgsl_scalar()?;
        Ok(if self.width == 1 {
            scalar.to_string()
        } else {
            format!("vec{}<{}>", self.width, scalar)
        })
    }
}
