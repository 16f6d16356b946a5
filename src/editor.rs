//! Scene editing entry points for the host UI.
//!
//! [`SceneEditor`] ties the gizmo controller to the instance tree and the
//! scene API: selecting resolves descendants, releasing a drag persists the
//! result. Every method runs on the UI thread; the async ones suspend only on
//! network round-trips, during which further pointer events may arrive.

use crate::backend::SceneBackend;
use crate::geo::SceneOrigin;
use crate::gizmo::{DragResult, GizmoController, GizmoMode, SessionTicket};
use crate::hierarchy::{find_descendants, InstanceTreeCache};
use crate::reconcile::{self, ReconcileReport, TransformReconciler};
use crate::render::{GizmoOverlay, RenderScene};
use serde_json::Value;

pub struct SceneEditor<S, O, B> {
    controller: GizmoController<S, O>,
    tree: InstanceTreeCache,
    backend: B,
    scene_id: String,
    origin: Option<SceneOrigin>,
}

impl<S: RenderScene, O: GizmoOverlay, B: SceneBackend> SceneEditor<S, O, B> {
    pub fn new(
        controller: GizmoController<S, O>,
        backend: B,
        scene_id: &str,
        origin: Option<SceneOrigin>,
    ) -> Self {
        if origin.is_none() {
            log::warn!("Scene {} has no origin; locations will be raw world coordinates", scene_id);
        }
        Self {
            controller,
            tree: InstanceTreeCache::new(),
            backend,
            scene_id: scene_id.to_string(),
            origin,
        }
    }

    pub fn controller(&self) -> &GizmoController<S, O> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut GizmoController<S, O> {
        &mut self.controller
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn origin(&self) -> Option<&SceneOrigin> {
        self.origin.as_ref()
    }

    pub fn tree_cache(&self) -> &InstanceTreeCache {
        &self.tree
    }

    /// Move to another scene. The selection is dropped; the tree cache
    /// refetches on next use because it is keyed by scene.
    pub fn switch_scene(&mut self, scene_id: &str, origin: Option<SceneOrigin>) {
        self.controller.clear_selection();
        self.scene_id = scene_id.to_string();
        self.origin = origin;
    }

    /// Forget the cached hierarchy after a reparent or delete made elsewhere.
    pub fn invalidate_tree(&mut self) {
        self.tree.invalidate();
    }

    pub async fn select(&mut self, target: &str) -> SessionTicket {
        let ticket = self.controller.arm(target);
        self.resolve_descendants(ticket, target).await;
        ticket
    }

    pub fn clear_selection(&mut self) {
        self.controller.clear_selection();
    }

    pub async fn toggle_mode(&mut self) -> GizmoMode {
        let target = self
            .controller
            .session()
            .map(|session| session.target_id().to_string());
        if let (Some(ticket), Some(target)) = (self.controller.cycle_mode(), target) {
            self.resolve_descendants(ticket, &target).await;
        }
        self.controller.mode()
    }

    pub fn drag_start(&mut self) {
        self.controller.on_drag_start();
    }

    pub fn drag_moving(&mut self, result: DragResult) {
        self.controller.on_drag_moving(result);
    }

    /// Relay a raw widget payload, parsed for the current mode.
    pub fn drag_moving_payload(&mut self, payload: &Value) {
        match DragResult::from_widget(self.controller.mode(), payload) {
            Some(result) => self.controller.on_drag_moving(result),
            None => log::warn!("Unrecognized {:?} drag payload: {}", self.controller.mode(), payload),
        }
    }

    /// Finish the drag and persist it. `Ok(None)` if nothing was dragged.
    pub async fn drag_end(&mut self) -> reconcile::Result<Option<ReconcileReport>> {
        let Some(completed) = self.controller.on_drag_end() else {
            return Ok(None);
        };
        TransformReconciler::new(&self.backend, self.origin.as_ref())
            .reconcile(&completed)
            .await
            .map(Some)
    }

    async fn resolve_descendants(&mut self, ticket: SessionTicket, target: &str) {
        if !ticket.wants_descendants() {
            return;
        }
        let ids = find_descendants(&mut self.tree, &self.backend, &self.scene_id, target).await;
        self.controller.attach_descendants(ticket, ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, UpdateCall};
    use crate::geo::{local_offset_to_world, to_local};
    use crate::render::{MemoryScene, RecordingOverlay};
    use crate::scene::serialization::SceneSnapshot;
    use crate::scene::{InstanceNode, Transform};
    use futures::executor::block_on;
    use glam::{DMat4, DVec3};
    use serde_json::json;
    use std::collections::BTreeMap;

    type Editor = SceneEditor<MemoryScene, RecordingOverlay, MemoryBackend>;

    fn origin() -> SceneOrigin {
        SceneOrigin::new(116.39, 39.91, 0.0)
    }

    fn editor() -> Editor {
        let mut transforms = BTreeMap::new();
        transforms.insert("A".to_string(), Transform::at([0.0, 0.0, 0.0]));
        transforms.insert("B".to_string(), Transform::at([10.0, 0.0, 0.0]));
        transforms.insert("L".to_string(), Transform::at([-20.0, 3.0, 0.0]));
        let snapshot = SceneSnapshot {
            scene_id: "s1".to_string(),
            origin: Some(origin()),
            tree: InstanceNode::group(
                "root",
                vec![
                    InstanceNode::asset("A", "model", vec![InstanceNode::asset("B", "model", vec![])]),
                    InstanceNode::asset("L", "model", vec![]),
                ],
            ),
            transforms,
        };
        let scene = MemoryScene::from_transforms(Some(&origin()), &snapshot.transforms);
        let controller = GizmoController::new(scene, RecordingOverlay::new());
        SceneEditor::new(controller, MemoryBackend::from_snapshot(snapshot), "s1", Some(origin()))
    }

    /// Move the target by a scene-local offset the way the widget would.
    fn drag_local(editor: &mut Editor, target: &str, local: DVec3) {
        let world_offset = local_offset_to_world(editor.origin(), local);
        let scene = editor.controller_mut().scene_mut();
        let moved = DMat4::from_translation(world_offset) * scene.world_matrix(target).unwrap();
        scene.set_world_matrix(target, moved);
        editor.drag_moving(DragResult::Translate(moved.w_axis.truncate()));
    }

    fn assert_location(actual: [f64; 3], expected: [f64; 3]) {
        assert!(
            DVec3::from_array(actual).abs_diff_eq(DVec3::from_array(expected), 1e-6),
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn test_end_to_end_translate_with_child() {
        let mut editor = editor();
        block_on(editor.select("A"));
        assert_eq!(editor.controller().session().unwrap().descendant_ids(), ["B".to_string()]);

        editor.drag_start();
        drag_local(&mut editor, "A", DVec3::new(2.0, 0.0, 0.0));
        drag_local(&mut editor, "A", DVec3::new(3.0, 0.0, 0.0));
        let report = block_on(editor.drag_end()).unwrap().unwrap();

        assert_location(report.target.location, [5.0, 0.0, 0.0]);
        assert_eq!(report.descendants.len(), 1);
        assert_location(report.descendants[0].transform.location, [15.0, 0.0, 0.0]);
        assert!(report.batched);

        let calls = editor.backend().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], UpdateCall::Batch(updates) if updates.len() == 2));
        assert_location(editor.backend().transform("B").unwrap().location, [15.0, 0.0, 0.0]);

        // The viewer shows the child where it was persisted.
        let child = editor.controller().scene().world_matrix("B").unwrap();
        let shown = to_local(editor.origin(), child.w_axis.truncate());
        assert!(shown.abs_diff_eq(DVec3::new(15.0, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_leaf_translate_is_single_update() {
        let mut editor = editor();
        block_on(editor.select("L"));
        editor.drag_start();
        drag_local(&mut editor, "L", DVec3::new(0.0, 1.0, 0.0));
        let report = block_on(editor.drag_end()).unwrap().unwrap();
        assert!(!report.batched);
        assert_location(report.target.location, [-20.0, 4.0, 0.0]);
        assert!(matches!(editor.backend().calls()[0], UpdateCall::Single { .. }));
    }

    #[test]
    fn test_scale_payload_through_editor() {
        let mut editor = editor();
        block_on(editor.select("A"));
        block_on(editor.toggle_mode());
        assert_eq!(block_on(editor.toggle_mode()), GizmoMode::Scale);
        assert!(editor.controller().session().unwrap().descendant_ids().is_empty());

        editor.drag_start();
        editor.drag_moving_payload(&json!({ "scaleX": 2.0, "scaleY": 0.0 }));
        let report = block_on(editor.drag_end()).unwrap().unwrap();
        assert_eq!(report.target.scale, [2.0, 0.01, 0.01]);
        assert_eq!(editor.backend().transform("B").unwrap().location, [10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_toggle_back_to_translate_recaches() {
        let mut editor = editor();
        block_on(editor.select("A"));
        for _ in 0..3 {
            block_on(editor.toggle_mode());
        }
        let session = editor.controller().session().unwrap();
        assert_eq!(session.mode(), GizmoMode::Translate);
        assert_eq!(session.cached_descendant_count(), 1);
        // Tree fetched once, reused across toggles.
        assert_eq!(editor.backend().tree_fetches(), 1);
    }

    #[test]
    fn test_tree_failure_degrades_to_single_object() {
        let mut editor = editor();
        editor.backend().fail_tree_fetches(true);
        block_on(editor.select("A"));
        editor.drag_start();
        drag_local(&mut editor, "A", DVec3::new(1.0, 0.0, 0.0));
        let report = block_on(editor.drag_end()).unwrap().unwrap();
        assert!(report.descendants.is_empty());
        assert_location(editor.backend().transform("B").unwrap().location, [10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_release_without_drag_persists_nothing() {
        let mut editor = editor();
        block_on(editor.select("A"));
        assert!(block_on(editor.drag_end()).unwrap().is_none());
        editor.drag_start();
        assert!(block_on(editor.drag_end()).unwrap().is_none());
        assert!(editor.backend().calls().is_empty());
    }

    #[test]
    fn test_toggle_during_drag_persists_nothing() {
        let mut editor = editor();
        block_on(editor.select("A"));
        editor.drag_start();
        drag_local(&mut editor, "A", DVec3::new(4.0, 0.0, 0.0));
        assert_eq!(block_on(editor.toggle_mode()), GizmoMode::Rotate);
        assert!(block_on(editor.drag_end()).unwrap().is_none());
        assert!(editor.backend().calls().is_empty());
        assert_eq!(editor.backend().transform("A").unwrap().location, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_switch_scene_drops_selection() {
        let mut editor = editor();
        block_on(editor.select("A"));
        editor.switch_scene("s2", None);
        assert!(editor.controller().session().is_none());
        assert_eq!(editor.scene_id(), "s2");
        // Unknown scene: descendants degrade to none.
        block_on(editor.select("A"));
        assert!(editor.controller().session().unwrap().descendant_ids().is_empty());
        assert_eq!(editor.tree_cache().cached_scene(), None);
    }
}
