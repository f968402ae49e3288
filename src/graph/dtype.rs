//! Port data types and the values that flow through ports.
//!
//! # Main Types
//!
//! - [`Value`] - A concrete port value (float, int, bool, text, color, vec2)
//! - [`BaseType`] - The storage kind a value has
//! - [`DType`] - A declared port type: base type plus arguments such as the
//!   default value, range or choice options
//!
//! `DType` is a closed set. Each variant knows its own name, default value
//! and how to (de)serialize values to JSON, so documents never dispatch on
//! type strings outside this module.

use serde_json::{json, Value as JsonValue};
use std::fmt;

/// A value held by a port.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Color([f32; 4]),
    Vec2([f64; 2]),
}

impl Value {
    pub fn base_type(&self) -> BaseType {
        match self {
            Value::Float(_) => BaseType::Float,
            Value::Int(_) => BaseType::Int,
            Value::Bool(_) => BaseType::Bool,
            Value::Text(_) => BaseType::Text,
            Value::Color(_) => BaseType::Color,
            Value::Vec2(_) => BaseType::Vec2,
        }
    }

    /// Numeric view of the value. Bools map to 0/1, other kinds to `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.is_finite() => Some(v.round() as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(v) => Some(*v != 0),
            Value::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Color([r, g, b, a]) => write!(f, "rgba({r}, {g}, {b}, {a})"),
            Value::Vec2([x, y]) => write!(f, "({x}, {y})"),
        }
    }
}

/// Storage kind of a port. Two dtypes with the same base type are
/// value-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Float,
    Int,
    Bool,
    Text,
    Color,
    Vec2,
}

/// Declared data type of a port.
#[derive(Debug, Clone, PartialEq)]
pub enum DType {
    Float {
        default: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    Int {
        default: i64,
        min: Option<i64>,
        max: Option<i64>,
    },
    Bool {
        default: bool,
    },
    Text {
        default: String,
    },
    Color {
        default: [f32; 4],
    },
    Vec2 {
        default: [f64; 2],
    },
    /// Index into a list of named options. Stored as an int.
    Choice {
        options: Vec<String>,
        default: usize,
    },
}

/// Names accepted by [`DType::from_parts`].
pub const DTYPE_NAMES: &[&str] = &["float", "int", "bool", "text", "color", "vec2", "choice"];

/// Error resolving a dtype from a saved document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dtype '{0}'")]
pub struct UnknownDType(pub String);

impl DType {
    pub fn float(default: f64) -> Self {
        DType::Float {
            default,
            min: None,
            max: None,
        }
    }

    pub fn float_range(default: f64, min: f64, max: f64) -> Self {
        DType::Float {
            default,
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn int(default: i64) -> Self {
        DType::Int {
            default,
            min: None,
            max: None,
        }
    }

    pub fn int_range(default: i64, min: i64, max: i64) -> Self {
        DType::Int {
            default,
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn bool(default: bool) -> Self {
        DType::Bool { default }
    }

    pub fn text(default: &str) -> Self {
        DType::Text {
            default: default.to_string(),
        }
    }

    pub fn color(default: [f32; 4]) -> Self {
        DType::Color { default }
    }

    pub fn vec2(default: [f64; 2]) -> Self {
        DType::Vec2 { default }
    }

    pub fn choice(options: &[&str], default: usize) -> Self {
        DType::Choice {
            options: options.iter().map(|s| s.to_string()).collect(),
            default,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::Float { .. } => "float",
            DType::Int { .. } => "int",
            DType::Bool { .. } => "bool",
            DType::Text { .. } => "text",
            DType::Color { .. } => "color",
            DType::Vec2 { .. } => "vec2",
            DType::Choice { .. } => "choice",
        }
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            DType::Float { .. } => BaseType::Float,
            DType::Int { .. } | DType::Choice { .. } => BaseType::Int,
            DType::Bool { .. } => BaseType::Bool,
            DType::Text { .. } => BaseType::Text,
            DType::Color { .. } => BaseType::Color,
            DType::Vec2 { .. } => BaseType::Vec2,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            DType::Float { default, .. } => Value::Float(*default),
            DType::Int { default, .. } => Value::Int(*default),
            DType::Bool { default } => Value::Bool(*default),
            DType::Text { default } => Value::Text(default.clone()),
            DType::Color { default } => Value::Color(*default),
            DType::Vec2 { default } => Value::Vec2(*default),
            DType::Choice { default, .. } => Value::Int(*default as i64),
        }
    }

    /// Whether `value` can be stored in a port of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        value.base_type() == self.base_type()
    }

    pub fn serialize_value(&self, value: &Value) -> JsonValue {
        match value {
            Value::Float(v) => json!(v),
            Value::Int(v) => json!(v),
            Value::Bool(v) => json!(v),
            Value::Text(v) => json!(v),
            Value::Color(c) => json!(c),
            Value::Vec2(v) => json!(v),
        }
    }

    /// Decode a saved value. Returns `None` if the JSON does not fit this type.
    pub fn unserialize_value(&self, raw: &JsonValue) -> Option<Value> {
        match self.base_type() {
            BaseType::Float => raw.as_f64().map(Value::Float),
            BaseType::Int => raw
                .as_i64()
                .or_else(|| raw.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
                .map(Value::Int),
            BaseType::Bool => raw.as_bool().map(Value::Bool),
            BaseType::Text => raw.as_str().map(|s| Value::Text(s.to_string())),
            BaseType::Color => {
                let parts = float_array::<4>(raw)?;
                Some(Value::Color(parts.map(|v| v as f32)))
            }
            BaseType::Vec2 => float_array::<2>(raw).map(Value::Vec2),
        }
    }

    /// Type arguments as saved in a document's `dtype_args`.
    pub fn args(&self) -> JsonValue {
        let default = self.serialize_value(&self.default_value());
        match self {
            DType::Float { min, max, .. } => json!({ "default": default, "min": min, "max": max }),
            DType::Int { min, max, .. } => json!({ "default": default, "min": min, "max": max }),
            DType::Choice { options, .. } => json!({ "default": default, "options": options }),
            _ => json!({ "default": default }),
        }
    }

    /// Rebuild a dtype from its saved name and arguments.
    ///
    /// An unknown name is an error. Missing or malformed arguments fall back
    /// to that dtype's defaults.
    pub fn from_parts(name: &str, args: &JsonValue) -> Result<DType, UnknownDType> {
        let mut dtype = match name {
            "float" => DType::Float {
                default: 0.0,
                min: args.get("min").and_then(JsonValue::as_f64),
                max: args.get("max").and_then(JsonValue::as_f64),
            },
            "int" => DType::Int {
                default: 0,
                min: args.get("min").and_then(JsonValue::as_i64),
                max: args.get("max").and_then(JsonValue::as_i64),
            },
            "bool" => DType::bool(false),
            "text" => DType::text(""),
            "color" => DType::color([0.0, 0.0, 0.0, 1.0]),
            "vec2" => DType::vec2([0.0, 0.0]),
            "choice" => DType::Choice {
                options: args
                    .get("options")
                    .and_then(JsonValue::as_array)
                    .map(|opts| {
                        opts.iter()
                            .filter_map(|o| o.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
                default: 0,
            },
            other => return Err(UnknownDType(other.to_string())),
        };

        if let Some(raw) = args.get("default") {
            match dtype.unserialize_value(raw) {
                Some(value) => dtype.set_default(value),
                None => tracing::warn!(
                    "Unreadable default {} for dtype '{}', using the dtype default",
                    raw,
                    name
                ),
            }
        }
        Ok(dtype)
    }

    fn set_default(&mut self, value: Value) {
        match (self, value) {
            (DType::Float { default, .. }, Value::Float(v)) => *default = v,
            (DType::Int { default, .. }, Value::Int(v)) => *default = v,
            (DType::Choice { default, .. }, Value::Int(v)) => *default = v.max(0) as usize,
            (DType::Bool { default }, Value::Bool(v)) => *default = v,
            (DType::Text { default }, Value::Text(v)) => *default = v,
            (DType::Color { default }, Value::Color(v)) => *default = v,
            (DType::Vec2 { default }, Value::Vec2(v)) => *default = v,
            _ => {}
        }
    }

    /// Convert `value` into this dtype's base type and clamp it.
    ///
    /// Numeric kinds convert into each other. Everything else must already
    /// have the right base type.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        let converted = match (self.base_type(), value) {
            (base, v) if v.base_type() == base => v,
            (BaseType::Float, v) => Value::Float(v.as_f64()?),
            (BaseType::Int, v @ (Value::Float(_) | Value::Bool(_))) => Value::Int(v.as_i64()?),
            (BaseType::Bool, v @ (Value::Float(_) | Value::Int(_))) => Value::Bool(v.as_bool()?),
            _ => return None,
        };
        Some(self.clamp(converted))
    }

    /// Clamp numeric values to the declared range.
    pub fn clamp(&self, value: Value) -> Value {
        match (self, value) {
            (DType::Float { min, max, .. }, Value::Float(mut v)) => {
                if let Some(lo) = min {
                    v = v.max(*lo);
                }
                if let Some(hi) = max {
                    v = v.min(*hi);
                }
                Value::Float(v)
            }
            (DType::Int { min, max, .. }, Value::Int(mut v)) => {
                if let Some(lo) = min {
                    v = v.max(*lo);
                }
                if let Some(hi) = max {
                    v = v.min(*hi);
                }
                Value::Int(v)
            }
            (DType::Choice { options, .. }, Value::Int(v)) if !options.is_empty() => {
                Value::Int(v.clamp(0, options.len() as i64 - 1))
            }
            (_, other) => other,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn float_array<const N: usize>(raw: &JsonValue) -> Option<[f64; N]> {
    let items = raw.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_is_int_based() {
        let dtype = DType::choice(&["sine", "square"], 1);
        assert_eq!(dtype.base_type(), BaseType::Int);
        assert_eq!(dtype.default_value(), Value::Int(1));
        assert!(dtype.accepts(&Value::Int(0)));
        assert!(!dtype.accepts(&Value::Float(0.0)));
    }

    #[test]
    fn test_color_serializes_as_four_floats() {
        let dtype = DType::color([1.0, 0.5, 0.25, 1.0]);
        let raw = dtype.serialize_value(&dtype.default_value());
        assert_eq!(raw, json!([1.0, 0.5, 0.25, 1.0]));
        assert_eq!(
            dtype.unserialize_value(&raw),
            Some(Value::Color([1.0, 0.5, 0.25, 1.0]))
        );
        assert_eq!(dtype.unserialize_value(&json!([1.0, 0.5])), None);
    }

    #[test]
    fn test_int_accepts_integral_floats() {
        let dtype = DType::int(0);
        assert_eq!(dtype.unserialize_value(&json!(3.0)), Some(Value::Int(3)));
        assert_eq!(dtype.unserialize_value(&json!(3.5)), None);
    }

    #[test]
    fn test_from_parts_restores_args() {
        let original = DType::float_range(0.5, 0.0, 2.0);
        let restored = DType::from_parts(original.name(), &original.args()).unwrap();
        assert_eq!(restored, original);

        let choice = DType::choice(&["a", "b", "c"], 2);
        let restored = DType::from_parts("choice", &choice.args()).unwrap();
        assert_eq!(restored, choice);
    }

    #[test]
    fn test_from_parts_bad_default_falls_back() {
        let dtype = DType::from_parts("float", &json!({ "default": "loud" })).unwrap();
        assert_eq!(dtype.default_value(), Value::Float(0.0));
    }

    #[test]
    fn test_from_parts_unknown_name() {
        let err = DType::from_parts("texture3d", &JsonValue::Null).unwrap_err();
        assert_eq!(err, UnknownDType("texture3d".to_string()));
    }

    #[test]
    fn test_clamp() {
        let dtype = DType::float_range(0.0, -1.0, 1.0);
        assert_eq!(dtype.clamp(Value::Float(4.0)), Value::Float(1.0));
        let dtype = DType::choice(&["a", "b"], 0);
        assert_eq!(dtype.clamp(Value::Int(-3)), Value::Int(0));
    }
}
