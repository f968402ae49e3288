//! Rhai Script Engine Implementation
//!
//! Evaluates `Expression` node scripts. Timing and the previous result are
//! exposed through registered functions that read a shared context, which
//! is updated before each evaluation.

use crate::error::{LumaError, Result};
use crate::scripting::{CompiledExpression, ScriptCache};
use rhai::{Dynamic, Engine, Scope};
use std::sync::{Arc, RwLock};

/// Per-evaluation data visible to scripts.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionContext {
    pub time_secs: f64,
    pub dt_secs: f64,
    pub tick: u64,
    /// Previous result, NaN if there is none.
    pub prev: f64,
}

impl Default for ExpressionContext {
    fn default() -> Self {
        Self {
            time_secs: 0.0,
            dt_secs: 0.0,
            tick: 0,
            prev: f64::NAN,
        }
    }
}

type SharedContext = Arc<RwLock<ExpressionContext>>;

/// The script engine used by expression nodes.
pub struct ScriptEngine {
    engine: Engine,
    cache: RwLock<ScriptCache>,
    context: SharedContext,
}

impl ScriptEngine {
    pub fn new() -> Self {
        let context = Arc::new(RwLock::new(ExpressionContext::default()));
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, context.clone());

        Self {
            engine,
            cache: RwLock::new(ScriptCache::new()),
            context,
        }
    }

    /// Configure the Rhai engine with built-in functions and safety limits
    fn configure_engine(engine: &mut Engine, context: SharedContext) {
        // Expressions run on the evaluation thread every tick
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(16);
        engine.set_max_operations(10_000);
        engine.set_max_string_size(1_000);
        engine.set_max_array_size(256);
        engine.set_max_map_size(256);

        {
            let ctx = context.clone();
            engine.register_fn("time", move || -> f64 {
                ctx.read().map(|c| c.time_secs).unwrap_or(0.0)
            });
        }
        {
            let ctx = context.clone();
            engine.register_fn("dt", move || -> f64 {
                ctx.read().map(|c| c.dt_secs).unwrap_or(0.0)
            });
        }
        {
            let ctx = context.clone();
            engine.register_fn("tick", move || -> i64 {
                ctx.read().map(|c| c.tick as i64).unwrap_or(0)
            });
        }
        {
            let ctx = context.clone();
            engine.register_fn("prev", move || -> f64 {
                ctx.read().map(|c| c.prev).unwrap_or(f64::NAN)
            });
        }

        // ===== Signal helpers =====

        engine.register_fn("smooth", |current: f64, previous: f64, alpha: f64| -> f64 {
            let alpha = alpha.clamp(0.0, 1.0);
            if !previous.is_nan() {
                alpha * previous + (1.0 - alpha) * current
            } else {
                current
            }
        });
        {
            let ctx = context.clone();
            engine.register_fn("smooth", move |current: f64, alpha: f64| -> f64 {
                let alpha = alpha.clamp(0.0, 1.0);
                let prev = ctx.read().map(|c| c.prev).unwrap_or(f64::NAN);
                if !prev.is_nan() {
                    alpha * prev + (1.0 - alpha) * current
                } else {
                    current
                }
            });
        }

        engine.register_fn(
            "lowpass",
            |current: f64, previous: f64, cutoff_hz: f64, dt: f64| -> f64 {
                lowpass(current, previous, cutoff_hz, dt)
            },
        );
        {
            let ctx = context.clone();
            engine.register_fn("lowpass", move |current: f64, cutoff_hz: f64| -> f64 {
                let (prev, dt) = ctx
                    .read()
                    .map(|c| (c.prev, c.dt_secs))
                    .unwrap_or((f64::NAN, 0.0));
                lowpass(current, prev, cutoff_hz, dt)
            });
        }
        {
            let ctx = context;
            engine.register_fn("pulse", move |period: f64, duty: f64| -> f64 {
                let time = ctx.read().map(|c| c.time_secs).unwrap_or(0.0);
                if period <= 0.0 {
                    return 0.0;
                }
                if (time / period).fract() < duty.clamp(0.0, 1.0) {
                    1.0
                } else {
                    0.0
                }
            });
        }

        engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
        engine.register_fn(
            "map_range",
            |x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| {
                if in_max == in_min {
                    out_min
                } else {
                    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
                }
            },
        );
        engine.register_fn("smoothstep", |e0: f64, e1: f64, x: f64| {
            let t = if e1 == e0 {
                0.0
            } else {
                ((x - e0) / (e1 - e0)).clamp(0.0, 1.0)
            };
            t * t * (3.0 - 2.0 * t)
        });

        // ===== Mathematical Functions =====

        engine.register_fn("abs", |x: f64| x.abs());
        engine.register_fn("sqrt", |x: f64| x.sqrt());
        engine.register_fn("pow", |x: f64, y: f64| x.powf(y));
        engine.register_fn("exp", |x: f64| x.exp());
        engine.register_fn("ln", |x: f64| x.ln());
        engine.register_fn("sin", |x: f64| x.sin());
        engine.register_fn("cos", |x: f64| x.cos());
        engine.register_fn("tan", |x: f64| x.tan());
        engine.register_fn("atan2", |y: f64, x: f64| y.atan2(x));
        engine.register_fn("floor", |x: f64| x.floor());
        engine.register_fn("ceil", |x: f64| x.ceil());
        engine.register_fn("round", |x: f64| x.round());
        engine.register_fn("fract", |x: f64| x.fract());
        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));
        engine.register_fn("min", |a: f64, b: f64| a.min(b));
        engine.register_fn("max", |a: f64, b: f64| a.max(b));
        engine.register_fn("pi", || std::f64::consts::PI);
        engine.register_fn("is_nan", |x: f64| x.is_nan());
    }

    /// Compile an expression, reusing a cached compilation of the same source
    pub fn compile(&self, source: &str) -> Result<CompiledExpression> {
        let mut cache = self
            .cache
            .write()
            .map_err(|e| LumaError::Script(format!("Failed to acquire cache lock: {}", e)))?;
        cache.get_or_compile(&self.engine, source)
    }

    /// Evaluate a compiled expression with inputs `a`, `b`, `c`
    pub fn execute(
        &self,
        expression: &CompiledExpression,
        inputs: [f64; 3],
        ctx: ExpressionContext,
    ) -> Result<f64> {
        {
            let mut context = self
                .context
                .write()
                .map_err(|e| LumaError::Script(format!("Failed to acquire context lock: {}", e)))?;
            *context = ctx;
        }

        let mut scope = Scope::new();
        scope.push("a", inputs[0]);
        scope.push("b", inputs[1]);
        scope.push("c", inputs[2]);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &expression.ast)
            .map_err(|e| LumaError::Script(format!("Execution error: {}", e)))?;

        if let Ok(f) = result.as_float() {
            Ok(f)
        } else if let Ok(i) = result.as_int() {
            Ok(i as f64)
        } else if let Ok(b) = result.as_bool() {
            Ok(if b { 1.0 } else { 0.0 })
        } else {
            Err(LumaError::Script(format!(
                "Expression must return a number, got {}",
                result.type_name()
            )))
        }
    }

    /// Compile and evaluate in one step
    pub fn eval(&self, source: &str, inputs: [f64; 3], ctx: ExpressionContext) -> Result<f64> {
        let expression = self.compile(source)?;
        self.execute(&expression, inputs, ctx)
    }

    /// Check that `source` compiles as an expression
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile_expression(source)
            .map(|_| ())
            .map_err(|e| LumaError::Script(format!("Validation error: {}", e)))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

fn lowpass(current: f64, previous: f64, cutoff_hz: f64, dt: f64) -> f64 {
    if !previous.is_nan() && dt > 0.0 && cutoff_hz > 0.0 {
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
        let alpha = dt / (rc + dt);
        previous + alpha * (current - previous)
    } else {
        current
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cache.read().map(|c| c.len()).ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, inputs: [f64; 3]) -> f64 {
        ScriptEngine::new()
            .eval(source, inputs, ExpressionContext::default())
            .unwrap()
    }

    #[test]
    fn test_inputs_in_scope() {
        assert_eq!(eval("a + b * c", [1.0, 2.0, 3.0]), 7.0);
    }

    #[test]
    fn test_int_and_bool_results() {
        assert_eq!(eval("40 + 2", [0.0; 3]), 42.0);
        assert_eq!(eval("a > 0.5", [1.0, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn test_context_functions() {
        let engine = ScriptEngine::new();
        let ctx = ExpressionContext {
            time_secs: 2.5,
            dt_secs: 0.1,
            tick: 25,
            prev: 4.0,
        };
        assert_eq!(engine.eval("time()", [0.0; 3], ctx).unwrap(), 2.5);
        assert_eq!(engine.eval("tick()", [0.0; 3], ctx).unwrap(), 25.0);
        assert_eq!(engine.eval("prev()", [0.0; 3], ctx).unwrap(), 4.0);
    }

    #[test]
    fn test_smooth_uses_prev() {
        let engine = ScriptEngine::new();
        let first = engine
            .eval("smooth(a, 0.5)", [10.0, 0.0, 0.0], ExpressionContext::default())
            .unwrap();
        assert_eq!(first, 10.0);

        let ctx = ExpressionContext {
            prev: 10.0,
            ..Default::default()
        };
        let second = engine.eval("smooth(a, 0.5)", [0.0; 3], ctx).unwrap();
        assert_eq!(second, 5.0);
    }

    #[test]
    fn test_pulse() {
        let engine = ScriptEngine::new();
        let at = |t: f64| ExpressionContext {
            time_secs: t,
            ..Default::default()
        };
        assert_eq!(engine.eval("pulse(1.0, 0.25)", [0.0; 3], at(0.1)).unwrap(), 1.0);
        assert_eq!(engine.eval("pulse(1.0, 0.25)", [0.0; 3], at(0.6)).unwrap(), 0.0);
    }

    #[test]
    fn test_non_numeric_result_is_error() {
        let engine = ScriptEngine::new();
        assert!(engine
            .eval("\"text\"", [0.0; 3], ExpressionContext::default())
            .is_err());
        assert!(engine
            .eval("a +", [0.0; 3], ExpressionContext::default())
            .is_err());
    }
}
