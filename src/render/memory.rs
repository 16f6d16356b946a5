use super::{GizmoOverlay, GizmoParams, HandleId, RenderRequest, RenderScene};
use crate::geo::SceneOrigin;
use crate::scene::{instance_world_matrix, Transform};
use glam::DMat4;
use std::collections::HashMap;

/// Headless [`RenderScene`] holding one world matrix per primitive.
#[derive(Default)]
pub struct MemoryScene {
    matrices: HashMap<String, DMat4>,
    renders: Vec<RenderRequest>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self {
            matrices: HashMap::new(),
            renders: Vec::new(),
        }
    }

    /// Place every instance at its persisted transform in the scene frame.
    pub fn from_transforms<'a, I>(origin: Option<&SceneOrigin>, transforms: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Transform)>,
    {
        let mut scene = Self::new();
        for (id, transform) in transforms {
            scene.insert(id, instance_world_matrix(origin, transform));
        }
        scene
    }

    pub fn insert(&mut self, id: &str, matrix: DMat4) {
        self.matrices.insert(id.to_string(), matrix);
    }

    pub fn remove(&mut self, id: &str) -> Option<DMat4> {
        self.matrices.remove(id)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn renders(&self) -> &[RenderRequest] {
        &self.renders
    }

    pub fn clear_renders(&mut self) {
        self.renders.clear();
    }
}

impl RenderScene for MemoryScene {
    fn world_matrix(&self, id: &str) -> Option<DMat4> {
        self.matrices.get(id).copied()
    }

    fn set_world_matrix(&mut self, id: &str, matrix: DMat4) -> bool {
        match self.matrices.get_mut(id) {
            Some(slot) => {
                *slot = matrix;
                true
            }
            None => false,
        }
    }

    fn request_render(&mut self, when: RenderRequest) {
        self.renders.push(when);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    Attached(HandleId, GizmoParams),
    Detached(HandleId),
}

/// [`GizmoOverlay`] that only records what it was asked to show.
#[derive(Default)]
pub struct RecordingOverlay {
    next_handle: u64,
    attached: Option<(HandleId, GizmoParams)>,
    events: Vec<OverlayEvent>,
}

impl RecordingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widget currently on screen.
    pub fn attached(&self) -> Option<&GizmoParams> {
        self.attached.as_ref().map(|(_, params)| params)
    }

    pub fn events(&self) -> &[OverlayEvent] {
        &self.events
    }
}

impl GizmoOverlay for RecordingOverlay {
    fn attach(&mut self, params: GizmoParams) -> HandleId {
        self.next_handle += 1;
        let handle = HandleId(self.next_handle);
        self.attached = Some((handle, params.clone()));
        self.events.push(OverlayEvent::Attached(handle, params));
        handle
    }

    fn detach(&mut self, handle: HandleId) {
        if matches!(self.attached, Some((current, _)) if current == handle) {
            self.attached = None;
        }
        self.events.push(OverlayEvent::Detached(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gizmo::GizmoMode;
    use glam::DVec3;

    #[test]
    fn test_set_matrix_only_for_known_primitives() {
        let mut scene = MemoryScene::new();
        scene.insert("A", DMat4::IDENTITY);
        let moved = DMat4::from_translation(DVec3::X);
        assert!(scene.set_world_matrix("A", moved));
        assert!(!scene.set_world_matrix("B", moved));
        assert_eq!(scene.world_matrix("A"), Some(moved));
        assert_eq!(scene.world_matrix("B"), None);
    }

    #[test]
    fn test_from_transforms_uses_persisted_locations() {
        let transforms: HashMap<String, Transform> =
            [("A".to_string(), Transform::at([1.0, 2.0, 3.0]))].into_iter().collect();
        let scene = MemoryScene::from_transforms(None, &transforms);
        let matrix = scene.world_matrix("A").unwrap();
        assert_eq!(matrix.w_axis.truncate(), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_overlay_tracks_attached_widget() {
        let mut overlay = RecordingOverlay::new();
        let first = overlay.attach(GizmoParams {
            target: "A".to_string(),
            mode: GizmoMode::Translate,
        });
        overlay.detach(first);
        assert!(overlay.attached().is_none());
        let second = overlay.attach(GizmoParams {
            target: "A".to_string(),
            mode: GizmoMode::Rotate,
        });
        assert_ne!(first, second);
        assert_eq!(overlay.attached().unwrap().mode, GizmoMode::Rotate);
        assert_eq!(overlay.events().len(), 3);
    }
}
