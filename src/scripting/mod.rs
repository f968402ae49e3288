//! Rhai Scripting Engine for Expression Nodes
//!
//! `Expression` nodes evaluate a user-written Rhai expression every time one
//! of their inputs changes. The expression result becomes the node output.
//!
//! ## Variables
//!
//! - `a`, `b`, `c` - The node's numeric inputs
//! - `time()` - Seconds since the graph clock started
//! - `dt()` - Seconds since the previous tick
//! - `tick()` - Tick counter
//! - `prev()` - The node's previous result (NaN before the first result)
//!
//! ## Helper Functions
//!
//! - `smooth(current, previous, alpha)` / `smooth(value, alpha)` - Exponential smoothing
//! - `lowpass(current, previous, cutoff_hz, dt)` / `lowpass(value, cutoff_hz)` - First-order lowpass
//! - `lerp(a, b, t)`, `map_range(x, in_min, in_max, out_min, out_max)`, `smoothstep(e0, e1, x)`
//! - `pulse(period, duty)` - 1.0 during the first `duty` fraction of each period, else 0.0
//! - The usual math functions (`sin`, `cos`, `abs`, `clamp`, `floor`, `fract`, ...)
//!
//! ## Example Expressions
//!
//! Brightness following a slow sine:
//! ```rhai
//! 0.5 + 0.5 * sin(time() * 2.0 * pi() * 0.25)
//! ```
//!
//! Crossfade two inputs:
//! ```rhai
//! lerp(a, b, clamp(c, 0.0, 1.0))
//! ```
//!
//! Smoothed audio level:
//! ```rhai
//! smooth(a, 0.9)
//! ```

mod engine;

pub use engine::{ExpressionContext, ScriptEngine};

use crate::error::{LumaError, Result};
use rhai::{Engine, AST};
use std::collections::HashMap;

/// A compiled expression.
#[derive(Clone)]
pub struct CompiledExpression {
    ast: AST,
    source: String,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("source", &self.source)
            .finish()
    }
}

/// Cache for compiled expressions, keyed by source.
#[derive(Default)]
pub struct ScriptCache {
    cache: HashMap<String, CompiledExpression>,
}

impl ScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached expression or compile and cache it
    pub fn get_or_compile(&mut self, engine: &Engine, source: &str) -> Result<CompiledExpression> {
        if let Some(compiled) = self.cache.get(source) {
            return Ok(compiled.clone());
        }

        let ast = engine
            .compile_expression(source)
            .map_err(|e| LumaError::Script(format!("Compilation error: {}", e)))?;

        let compiled = CompiledExpression {
            ast,
            source: source.to_string(),
        };
        self.cache.insert(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

/// Ready-made expressions offered by editors
pub mod builtins {
    /// Passes `a` through unchanged
    pub const IDENTITY: &str = "a";

    /// Crossfade between `a` and `b` by `c`
    pub const CROSSFADE: &str = "lerp(a, b, clamp(c, 0.0, 1.0))";

    /// Slow breathing brightness
    pub const BREATHE: &str = "0.5 + 0.5 * sin(time() * 2.0 * pi() * 0.25)";

    /// Strobe at `a` Hz
    pub const STROBE: &str = "pulse(1.0 / max(a, 0.01), 0.5)";

    /// Smoothed input
    pub const SMOOTH: &str = "smooth(a, 0.9)";

    /// Input rescaled from 0..1 to `b`..`c`
    pub const RESCALE: &str = "map_range(a, 0.0, 1.0, b, c)";

    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Identity", IDENTITY),
            ("Crossfade", CROSSFADE),
            ("Breathe", BREATHE),
            ("Strobe", STROBE),
            ("Smooth", SMOOTH),
            ("Rescale", RESCALE),
        ]
    }
}
