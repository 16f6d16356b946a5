pub mod serialization;

use crate::geo::{enu_frame, SceneOrigin};
use glam::{DMat4, DQuat, DVec3};
use serde::{Deserialize, Deserializer};

/// Persisted placement of one instance - matches what the scene API stores.
///
/// `location` is in scene-local ENU meters, `rotation` in degrees
/// (heading, pitch, roll), `scale` is unitless per axis.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Transform {
    pub location: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            location: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl Transform {
    /// Smallest scale factor a persisted transform may carry.
    pub const MIN_SCALE: f64 = 0.01;

    pub fn at(location: [f64; 3]) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    pub fn location_vec(&self) -> DVec3 {
        DVec3::from_array(self.location)
    }

    /// Copy with `offset` added to the location, rotation and scale untouched.
    pub fn offset_by(&self, offset: DVec3) -> Self {
        Self {
            location: (self.location_vec() + offset).to_array(),
            ..*self
        }
    }
}

/// Clamp one scale component; missing, non-positive and non-finite values
/// collapse to the floor.
pub fn clamp_scale_component(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.max(Transform::MIN_SCALE),
        _ => Transform::MIN_SCALE,
    }
}

/// Asset markers that make an instance node renderable.
///
/// Nodes without a recognized marker are pure grouping nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Model,
    Tileset,
    Video,
    Iot,
    Attachment,
    Point,
}

impl AssetKind {
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker.trim().to_ascii_lowercase().as_str() {
            "model" | "gltf" | "glb" => Some(Self::Model),
            "tileset" | "3dtiles" | "tiles" => Some(Self::Tileset),
            "video" => Some(Self::Video),
            "iot" | "mqtt" => Some(Self::Iot),
            "attachment" => Some(Self::Attachment),
            "point" | "poi" => Some(Self::Point),
            _ => None,
        }
    }
}

/// One node of a scene's instance hierarchy. The root is synthetic.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InstanceNode {
    pub uid: String,
    #[serde(rename = "assetType", default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub children: Vec<InstanceNode>,
}

impl InstanceNode {
    pub fn group(uid: &str, children: Vec<InstanceNode>) -> Self {
        Self {
            uid: uid.to_string(),
            asset_type: None,
            children,
        }
    }

    pub fn asset(uid: &str, asset_type: &str, children: Vec<InstanceNode>) -> Self {
        Self {
            uid: uid.to_string(),
            asset_type: Some(asset_type.to_string()),
            children,
        }
    }

    pub fn asset_kind(&self) -> Option<AssetKind> {
        self.asset_type.as_deref().and_then(AssetKind::from_marker)
    }

    pub fn is_renderable(&self) -> bool {
        self.asset_kind().is_some()
    }

    /// Depth-first search for `uid`, this node included.
    pub fn find(&self, uid: &str) -> Option<&InstanceNode> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(uid))
    }

    /// Every node below this one, depth-first, pre-order.
    pub fn descendants(&self) -> Vec<&InstanceNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&InstanceNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<InstanceNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<InstanceNode>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Local TRS matrix of a persisted transform.
///
/// Heading turns about -Z (clockwise seen from above), pitch about -Y and
/// roll about X, applied roll first.
pub fn compose_transform_matrix(transform: &Transform) -> DMat4 {
    let [heading, pitch, roll] = transform.rotation.map(f64::to_radians);
    let rotation = DQuat::from_rotation_z(-heading)
        * DQuat::from_rotation_y(-pitch)
        * DQuat::from_rotation_x(roll);
    DMat4::from_scale_rotation_translation(
        DVec3::from_array(transform.scale),
        rotation,
        DVec3::from_array(transform.location),
    )
}

/// World matrix of an instance placed at `transform` in the scene frame.
pub fn instance_world_matrix(origin: Option<&SceneOrigin>, transform: &Transform) -> DMat4 {
    let local = compose_transform_matrix(transform);
    match origin {
        Some(origin) => enu_frame(origin) * local,
        None => local,
    }
}
