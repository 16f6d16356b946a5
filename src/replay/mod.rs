//! Headless replay of recorded gizmo sessions.
//!
//! A script is a JSON array of pointer/UI events. Each event is fed through a
//! [`SceneEditor`] backed by an in-memory scene and a recording overlay, with a
//! simulated widget standing in for the on-screen gizmo.

use crate::backend::{fetch_transform, SceneBackend};
use crate::editor::SceneEditor;
use crate::geo::{local_offset_to_world, SceneOrigin};
use crate::gizmo::{ControllerState, DragResult, GizmoController, GizmoMode};
use crate::reconcile::ReconcileReport;
use crate::render::{MemoryScene, RecordingOverlay, RenderScene};
use crate::scene::instance_world_matrix;
use futures::future::join_all;
use glam::{DMat4, DVec3};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid script {path}: {source}")]
    Script {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ReplayError>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ReplayEvent {
    Select { target: String },
    ToggleMode,
    ClearSelection,
    DragStart,
    /// Raw widget payload, parsed for the current mode.
    DragMove { result: Value },
    /// Move the target by a scene-local offset in meters.
    DragBy { local: [f64; 3] },
    DragEnd,
    InvalidateTree,
}

#[derive(Debug)]
pub enum CommandOutcome {
    None,
    Message(String),
    Mode(GizmoMode),
    Reconciled(ReconcileReport),
}

pub fn load_script(path: &Path) -> Result<Vec<ReplayEvent>> {
    let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ReplayError::Script {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the viewer scene from what the backend has persisted.
///
/// Instances whose transform cannot be read are left out of the scene.
pub async fn seed_scene<B: SceneBackend>(
    backend: &B,
    scene_id: &str,
    origin: Option<&SceneOrigin>,
) -> MemoryScene {
    let mut scene = MemoryScene::new();
    let tree = match backend.fetch_instance_tree(scene_id).await {
        Ok(tree) => tree,
        Err(err) => {
            log::warn!("Scene {} tree unavailable, starting empty: {}", scene_id, err);
            return scene;
        }
    };
    let ids: Vec<String> = tree
        .descendants()
        .into_iter()
        .filter(|node| node.is_renderable())
        .map(|node| node.uid.clone())
        .collect();
    let transforms = join_all(ids.iter().map(|id| fetch_transform(backend, id))).await;
    for (id, transform) in ids.iter().zip(transforms) {
        match transform {
            Ok(transform) => scene.insert(id, instance_world_matrix(origin, &transform)),
            Err(err) => log::warn!("Skipping instance {}: {}", id, err),
        }
    }
    log::info!("Seeded {} of {} instances", scene.len(), ids.len());
    scene
}

pub struct Replay<B> {
    editor: SceneEditor<MemoryScene, RecordingOverlay, B>,
}

impl<B: SceneBackend> Replay<B> {
    pub async fn new(
        backend: B,
        scene_id: &str,
        origin: Option<SceneOrigin>,
        stagger_delays: [Duration; 2],
    ) -> Self {
        let scene = seed_scene(&backend, scene_id, origin.as_ref()).await;
        let controller =
            GizmoController::new(scene, RecordingOverlay::new()).with_stagger_delays(stagger_delays);
        Self {
            editor: SceneEditor::new(controller, backend, scene_id, origin),
        }
    }

    pub fn editor(&self) -> &SceneEditor<MemoryScene, RecordingOverlay, B> {
        &self.editor
    }

    pub async fn run(&mut self, events: &[ReplayEvent]) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.apply(event).await);
        }
        outcomes
    }

    pub async fn apply(&mut self, event: &ReplayEvent) -> CommandOutcome {
        log::debug!("Replaying {:?}", event);
        match event {
            ReplayEvent::Select { target } => {
                if self.editor.controller().scene().world_matrix(target).is_none() {
                    return CommandOutcome::Message(format!("{} is not in the scene", target));
                }
                self.editor.select(target).await;
                CommandOutcome::None
            }
            ReplayEvent::ToggleMode => CommandOutcome::Mode(self.editor.toggle_mode().await),
            ReplayEvent::ClearSelection => {
                self.editor.clear_selection();
                CommandOutcome::None
            }
            ReplayEvent::DragStart => {
                self.editor.drag_start();
                CommandOutcome::None
            }
            ReplayEvent::DragMove { result } => self.widget_move(result),
            ReplayEvent::DragBy { local } => self.widget_translate(DVec3::from_array(*local)),
            ReplayEvent::DragEnd => match self.editor.drag_end().await {
                Ok(Some(report)) => CommandOutcome::Reconciled(report),
                Ok(None) => CommandOutcome::None,
                Err(err) => CommandOutcome::Message(err.to_string()),
            },
            ReplayEvent::InvalidateTree => {
                self.editor.invalidate_tree();
                CommandOutcome::None
            }
        }
    }

    fn dragging_target(&self) -> Option<String> {
        let controller = self.editor.controller();
        if controller.state() != ControllerState::Dragging {
            return None;
        }
        controller.session().map(|session| session.target_id().to_string())
    }

    fn widget_move(&mut self, payload: &Value) -> CommandOutcome {
        let mode = self.editor.controller().mode();
        let Some(result) = DragResult::from_widget(mode, payload) else {
            return CommandOutcome::Message(format!("unrecognized {:?} payload", mode));
        };
        if let (DragResult::Translate(position), Some(target)) = (&result, self.dragging_target()) {
            let scene = self.editor.controller_mut().scene_mut();
            if let Some(mut matrix) = scene.world_matrix(&target) {
                matrix.w_axis = position.extend(1.0);
                scene.set_world_matrix(&target, matrix);
            }
        }
        self.editor.drag_moving(result);
        CommandOutcome::None
    }

    fn widget_translate(&mut self, local: DVec3) -> CommandOutcome {
        if self.editor.controller().mode() != GizmoMode::Translate {
            return CommandOutcome::Message("dragBy needs translate mode".to_string());
        }
        let Some(target) = self.dragging_target() else {
            return CommandOutcome::Message("dragBy outside of a drag".to_string());
        };
        let offset = local_offset_to_world(self.editor.origin(), local);
        let scene = self.editor.controller_mut().scene_mut();
        let Some(matrix) = scene.world_matrix(&target) else {
            return CommandOutcome::Message(format!("{} is not in the scene", target));
        };
        let moved = DMat4::from_translation(offset) * matrix;
        scene.set_world_matrix(&target, moved);
        self.editor.drag_moving(DragResult::Translate(moved.w_axis.truncate()));
        CommandOutcome::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, UpdateCall};
    use crate::scene::serialization::SceneSnapshot;
    use crate::scene::{InstanceNode, Transform};
    use futures::executor::block_on;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn backend() -> MemoryBackend {
        let mut transforms = BTreeMap::new();
        transforms.insert("A".to_string(), Transform::at([0.0, 0.0, 0.0]));
        transforms.insert("B".to_string(), Transform::at([10.0, 0.0, 0.0]));
        MemoryBackend::from_snapshot(SceneSnapshot {
            scene_id: "s1".to_string(),
            origin: Some(SceneOrigin::new(116.39, 39.91, 0.0)),
            tree: InstanceNode::group(
                "root",
                vec![InstanceNode::asset("A", "model", vec![InstanceNode::asset("B", "model", vec![])])],
            ),
            transforms,
        })
    }

    fn replay() -> Replay<MemoryBackend> {
        block_on(Replay::new(
            backend(),
            "s1",
            Some(SceneOrigin::new(116.39, 39.91, 0.0)),
            [Duration::from_millis(50), Duration::from_millis(100)],
        ))
    }

    fn events(value: Value) -> Vec<ReplayEvent> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_script_events() {
        let script = events(json!([
            { "event": "select", "target": "A" },
            { "event": "toggleMode" },
            { "event": "dragMove", "result": { "scale": 2.0 } },
            { "event": "dragBy", "local": [1.0, 0.0, 0.0] },
            { "event": "invalidateTree" }
        ]));
        assert_eq!(script[0], ReplayEvent::Select { target: "A".to_string() });
        assert_eq!(script[3], ReplayEvent::DragBy { local: [1.0, 0.0, 0.0] });
        assert_eq!(script.len(), 5);
    }

    #[test]
    fn test_seed_scene_places_instances() {
        let replay = replay();
        let scene = replay.editor().controller().scene();
        assert_eq!(scene.len(), 2);
        assert!(scene.world_matrix("B").is_some());
    }

    #[test]
    fn test_replay_translate_session() {
        let mut replay = replay();
        let outcomes = block_on(replay.run(&events(json!([
            { "event": "select", "target": "A" },
            { "event": "dragStart" },
            { "event": "dragBy", "local": [5.0, 0.0, 0.0] },
            { "event": "dragEnd" }
        ]))));
        let Some(CommandOutcome::Reconciled(report)) = outcomes.last() else {
            panic!("expected a reconcile report, got {outcomes:?}");
        };
        assert!(DVec3::from_array(report.target.location).abs_diff_eq(DVec3::new(5.0, 0.0, 0.0), 1e-6));
        assert!(report.batched);
        let calls = replay.editor().backend().calls();
        assert!(matches!(&calls[..], [UpdateCall::Batch(updates)] if updates.len() == 2));
    }

    #[test]
    fn test_replay_scale_session() {
        let mut replay = replay();
        let outcomes = block_on(replay.run(&events(json!([
            { "event": "select", "target": "A" },
            { "event": "toggleMode" },
            { "event": "toggleMode" },
            { "event": "dragStart" },
            { "event": "dragMove", "result": { "x": 3.0, "y": 1.0, "z": -1.0 } },
            { "event": "dragEnd" }
        ]))));
        assert!(matches!(outcomes[2], CommandOutcome::Mode(GizmoMode::Scale)));
        let Some(CommandOutcome::Reconciled(report)) = outcomes.last() else {
            panic!("expected a reconcile report, got {outcomes:?}");
        };
        assert_eq!(report.target.scale, [3.0, 1.0, 0.01]);
        assert!(!report.batched);
    }

    #[test]
    fn test_drag_by_outside_drag_is_reported() {
        let mut replay = replay();
        let outcome = block_on(replay.apply(&ReplayEvent::DragBy { local: [1.0, 0.0, 0.0] }));
        assert!(matches!(outcome, CommandOutcome::Message(_)));
        let outcome = block_on(replay.apply(&ReplayEvent::Select { target: "missing".to_string() }));
        assert!(matches!(outcome, CommandOutcome::Message(_)));
        assert!(replay.editor().backend().calls().is_empty());
    }

    #[test]
    fn test_missing_script_is_io_error() {
        let err = load_script(Path::new("/nonexistent/script.json")).unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
    }
}
