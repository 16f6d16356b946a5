//! Drag results emitted by the gizmo widget.
//!
//! The widget's payload shape depends on the mode and has varied between
//! widget versions. Each mode has an ordered list of shapes; the first shape
//! that matches the payload wins.

use super::GizmoMode;
use crate::scene::clamp_scale_component;
use glam::DVec3;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum DragResult {
    /// New world position of the target.
    Translate(DVec3),
    Rotate(RotationResult),
    Scale(ScaleResult),
}

impl DragResult {
    pub fn mode(&self) -> GizmoMode {
        match self {
            Self::Translate(_) => GizmoMode::Translate,
            Self::Rotate(_) => GizmoMode::Rotate,
            Self::Scale(_) => GizmoMode::Scale,
        }
    }

    pub fn position(&self) -> Option<DVec3> {
        match self {
            Self::Translate(position) => Some(*position),
            _ => None,
        }
    }

    /// Parse a widget payload for `mode`.
    pub fn from_widget(mode: GizmoMode, payload: &Value) -> Option<Self> {
        match mode {
            GizmoMode::Translate => PositionShape::ORDER
                .iter()
                .find_map(|shape| shape.extract(payload))
                .map(Self::Translate),
            GizmoMode::Rotate => RotationShape::ORDER
                .iter()
                .find_map(|shape| shape.extract(payload))
                .map(Self::Rotate),
            GizmoMode::Scale => ScaleShape::ORDER
                .iter()
                .find_map(|shape| shape.extract(payload))
                .map(Self::Scale),
        }
    }
}

/// Rotation in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationResult {
    HeadingPitchRoll { heading: f64, pitch: f64, roll: f64 },
    Axes { x: f64, y: f64, z: f64 },
}

impl RotationResult {
    /// Degrees in storage order; `None` if any component is not finite.
    pub fn to_degrees(&self) -> Option<[f64; 3]> {
        let radians = match *self {
            Self::HeadingPitchRoll {
                heading,
                pitch,
                roll,
            } => [heading, pitch, roll],
            Self::Axes { x, y, z } => [x, y, z],
        };
        radians
            .iter()
            .all(|v| v.is_finite())
            .then(|| radians.map(f64::to_degrees))
    }
}

/// Scale as the widget reported it; components may be missing.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleResult {
    Named([Option<f64>; 3]),
    Axes([Option<f64>; 3]),
    Array([Option<f64>; 3]),
    Field([Option<f64>; 3]),
    Uniform(f64),
}

impl ScaleResult {
    /// Per-axis scale with every component floored at the minimum scale.
    pub fn to_scale(&self) -> [f64; 3] {
        match self {
            Self::Named(c) | Self::Axes(c) | Self::Array(c) | Self::Field(c) => {
                c.map(clamp_scale_component)
            }
            Self::Uniform(u) => [clamp_scale_component(Some(*u)); 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionShape {
    /// `{ x, y, z }`
    Object,
    /// `[x, y, z]`
    Array,
    /// `{ position: ... }` in either of the above forms.
    Field,
}

impl PositionShape {
    pub const ORDER: [Self; 3] = [Self::Object, Self::Array, Self::Field];

    pub fn extract(self, payload: &Value) -> Option<DVec3> {
        match self {
            Self::Object => {
                let [x, y, z] = named(payload, ["x", "y", "z"]);
                Some(DVec3::new(x?, y?, z?))
            }
            Self::Array => {
                let [x, y, z] = array3(payload)?;
                Some(DVec3::new(x?, y?, z?))
            }
            Self::Field => {
                let inner = payload.get("position")?;
                Self::Object.extract(inner).or_else(|| Self::Array.extract(inner))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationShape {
    /// `{ heading, pitch, roll }`
    HeadingPitchRoll,
    /// `{ x, y, z }`
    Axes,
}

impl RotationShape {
    pub const ORDER: [Self; 2] = [Self::HeadingPitchRoll, Self::Axes];

    pub fn extract(self, payload: &Value) -> Option<RotationResult> {
        match self {
            Self::HeadingPitchRoll => {
                let [heading, pitch, roll] = any_named(payload, ["heading", "pitch", "roll"])?;
                Some(RotationResult::HeadingPitchRoll {
                    heading: heading.unwrap_or(0.0),
                    pitch: pitch.unwrap_or(0.0),
                    roll: roll.unwrap_or(0.0),
                })
            }
            Self::Axes => {
                let [x, y, z] = any_named(payload, ["x", "y", "z"])?;
                Some(RotationResult::Axes {
                    x: x.unwrap_or(0.0),
                    y: y.unwrap_or(0.0),
                    z: z.unwrap_or(0.0),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleShape {
    /// `{ scaleX, scaleY, scaleZ }`
    Named,
    /// `{ x, y, z }`
    Axes,
    /// `[sx, sy, sz]`
    Array,
    /// `{ scale: [sx, sy, sz] }`
    Field,
    /// A bare number or `{ scale: n }`.
    Uniform,
}

impl ScaleShape {
    pub const ORDER: [Self; 5] = [
        Self::Named,
        Self::Axes,
        Self::Array,
        Self::Field,
        Self::Uniform,
    ];

    pub fn extract(self, payload: &Value) -> Option<ScaleResult> {
        match self {
            Self::Named => any_named(payload, ["scaleX", "scaleY", "scaleZ"]).map(ScaleResult::Named),
            Self::Axes => any_named(payload, ["x", "y", "z"]).map(ScaleResult::Axes),
            Self::Array => array3(payload).map(ScaleResult::Array),
            Self::Field => {
                let items = payload.get("scale")?.as_array()?;
                let mut components = [None; 3];
                for (slot, item) in components.iter_mut().zip(items) {
                    *slot = item.as_f64();
                }
                Some(ScaleResult::Field(components))
            }
            Self::Uniform => payload
                .as_f64()
                .or_else(|| payload.get("scale").and_then(Value::as_f64))
                .map(ScaleResult::Uniform),
        }
    }
}

fn named(payload: &Value, keys: [&str; 3]) -> [Option<f64>; 3] {
    keys.map(|key| payload.get(key).and_then(Value::as_f64))
}

/// Like [`named`], but `None` unless at least one key carries a number.
fn any_named(payload: &Value, keys: [&str; 3]) -> Option<[Option<f64>; 3]> {
    let components = named(payload, keys);
    components.iter().any(Option::is_some).then_some(components)
}

fn array3(payload: &Value) -> Option<[Option<f64>; 3]> {
    match payload.as_array()?.as_slice() {
        [x, y, z] => Some([x.as_f64(), y.as_f64(), z.as_f64()]),
        _ => None,
    }
}
