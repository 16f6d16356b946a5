use crate::geo::SceneOrigin;
use crate::scene::{InstanceNode, Transform};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Nesting levels at which the scene API has returned an instance transform,
/// newest schema first.
pub const TRANSFORM_POINTERS: [&str; 4] = [
    "/data/data/instance/transform",
    "/data/instance/transform",
    "/data/data/transform",
    "/data/transform",
];

/// Locate the transform inside an instance-properties envelope.
///
/// Candidates that are absent or fail to parse are skipped; the first one
/// that parses wins.
pub fn probe_transform(payload: &Value) -> Option<Transform> {
    TRANSFORM_POINTERS.iter().find_map(|pointer| {
        let candidate = payload.pointer(pointer)?;
        if !candidate.is_object() {
            return None;
        }
        match serde_json::from_value::<Transform>(candidate.clone()) {
            Ok(transform) => Some(transform),
            Err(err) => {
                log::debug!("Ignoring transform at {}: {}", pointer, err);
                None
            }
        }
    })
}

/// Offline copy of one scene: hierarchy plus persisted transforms.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub scene_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<SceneOrigin>,
    pub tree: InstanceNode,
    #[serde(default)]
    pub transforms: BTreeMap<String, Transform>,
}

pub fn save_snapshot_to_file(snapshot: &SceneSnapshot, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_snapshot_from_file(path: &Path) -> Result<SceneSnapshot> {
    let json = std::fs::read_to_string(path)?;
    let snapshot: SceneSnapshot = serde_json::from_str(&json)?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transform_json(x: f64) -> Value {
        json!({ "location": [x, 0.0, 0.0], "rotation": [0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0] })
    }

    #[test]
    fn test_probe_finds_each_nesting_level() {
        let payloads = [
            json!({ "data": { "data": { "instance": { "transform": transform_json(1.0) } } } }),
            json!({ "data": { "instance": { "transform": transform_json(2.0) } } }),
            json!({ "data": { "data": { "transform": transform_json(3.0) } } }),
            json!({ "data": { "transform": transform_json(4.0) } }),
        ];
        for (index, payload) in payloads.iter().enumerate() {
            let transform = probe_transform(payload).unwrap();
            assert_eq!(transform.location[0], (index + 1) as f64);
        }
    }

    #[test]
    fn test_probe_only_instance_level_present() {
        let payload = json!({
            "code": 200,
            "data": { "instance": { "uid": "A", "transform": { "location": [7, 8, 9] } } }
        });
        let transform = probe_transform(&payload).unwrap();
        assert_eq!(transform.location, [7.0, 8.0, 9.0]);
        assert_eq!(transform.scale, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_probe_prefers_deepest_schema() {
        let payload = json!({
            "data": {
                "transform": transform_json(4.0),
                "data": { "instance": { "transform": transform_json(1.0) } }
            }
        });
        assert_eq!(probe_transform(&payload).unwrap().location[0], 1.0);
    }

    #[test]
    fn test_probe_skips_malformed_candidate() {
        let payload = json!({
            "data": {
                "instance": { "transform": { "location": "nowhere" } },
                "transform": transform_json(4.0)
            }
        });
        assert_eq!(probe_transform(&payload).unwrap().location[0], 4.0);
    }

    #[test]
    fn test_probe_missing_everywhere() {
        assert!(probe_transform(&json!({ "data": { "instance": null } })).is_none());
        assert!(probe_transform(&json!("error")).is_none());
    }

    #[test]
    fn test_snapshot_save_load_via_file() {
        let mut transforms = BTreeMap::new();
        transforms.insert("A".to_string(), Transform::at([1.0, 2.0, 3.0]));
        let snapshot = SceneSnapshot {
            scene_id: "scene-1".to_string(),
            origin: Some(SceneOrigin::new(116.5, 39.75, 0.0)),
            tree: InstanceNode::group("root", vec![InstanceNode::asset("A", "model", vec![])]),
            transforms,
        };

        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!(
            "twin_gizmo_snapshot_{}_{}.json",
            std::process::id(),
            nonce
        ));

        save_snapshot_to_file(&snapshot, &path).unwrap();
        let loaded = load_snapshot_from_file(&path).unwrap();
        assert_eq!(loaded, snapshot);

        let _ = std::fs::remove_file(path);
    }
}
