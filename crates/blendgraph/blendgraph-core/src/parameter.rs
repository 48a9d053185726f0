//! Value parameters declared on a graph.

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;

/// Type and default of a parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    Float {
        #[serde(default)]
        default: f32,
        #[serde(default = "default_min")]
        min: f32,
        #[serde(default = "default_max")]
        max: f32,
    },
    Bool {
        #[serde(default)]
        default: bool,
    },
    Int {
        #[serde(default)]
        default: i32,
    },
    Vector2 {
        #[serde(default)]
        default: [f32; 2],
    },
    Vector3 {
        #[serde(default)]
        default: [f32; 3],
    },
    Vector4 {
        #[serde(default)]
        default: [f32; 4],
    },
    Rotation {
        #[serde(default = "default_rotation")]
        default: [f32; 4],
    },
}

fn default_min() -> f32 {
    f32::MIN
}

fn default_max() -> f32 {
    f32::MAX
}

fn default_rotation() -> [f32; 4] {
    crate::math::QUAT_IDENTITY
}

impl ParameterKind {
    pub fn float(default: f32) -> Self {
        ParameterKind::Float {
            default,
            min: f32::MIN,
            max: f32::MAX,
        }
    }

    pub fn default_value(&self) -> Attribute {
        match *self {
            ParameterKind::Float { default, .. } => Attribute::Float(default),
            ParameterKind::Bool { default } => Attribute::Bool(default),
            ParameterKind::Int { default } => Attribute::Int(default),
            ParameterKind::Vector2 { default } => Attribute::Vector2(default),
            ParameterKind::Vector3 { default } => Attribute::Vector3(default),
            ParameterKind::Vector4 { default } => Attribute::Vector4(default),
            ParameterKind::Rotation { default } => Attribute::Rotation(default),
        }
    }

    /// Clamp a value written through the instance API. Float ranges only.
    pub fn clamp(&self, value: Attribute) -> Attribute {
        match (self, value) {
            (ParameterKind::Float { min, max, .. }, Attribute::Float(v)) => {
                Attribute::Float(v.clamp(*min, *max))
            }
            (_, other) => other,
        }
    }
}

/// A named, typed parameter the host drives at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueParameter {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParameterKind,
}

impl ValueParameter {
    pub fn new(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_kinds() {
        let p: ValueParameter =
            serde_json::from_str(r#"{ "name": "speed", "type": "float", "default": 1.5, "min": 0.0, "max": 2.0 }"#)
                .unwrap();
        assert_eq!(p.kind.default_value(), Attribute::Float(1.5));
        assert_eq!(p.kind.clamp(Attribute::Float(9.0)), Attribute::Float(2.0));

        let q: ValueParameter = serde_json::from_str(r#"{ "name": "aim", "type": "rotation" }"#).unwrap();
        assert_eq!(q.kind.default_value(), Attribute::Rotation([0.0, 0.0, 0.0, 1.0]));
    }
}
