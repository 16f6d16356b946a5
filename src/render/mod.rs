//! Seams to the external 3D viewer.
//!
//! The viewer owns primitives and the on-screen gizmo widget. The core only
//! needs to look primitives up by instance id, read and write their world
//! matrices, ask for redraws, and attach or detach the widget.

mod memory;

pub use memory::{MemoryScene, OverlayEvent, RecordingOverlay};

use crate::gizmo::GizmoMode;
use glam::DMat4;
use std::time::Duration;

/// When the viewer should redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRequest {
    Immediate,
    NextFrame,
    After(Duration),
}

pub trait RenderScene {
    /// World matrix of the primitive for `id`; `None` if it is not in the scene.
    fn world_matrix(&self, id: &str) -> Option<DMat4>;

    /// Returns `false` if no primitive exists for `id`.
    fn set_world_matrix(&mut self, id: &str, matrix: DMat4) -> bool;

    fn request_render(&mut self, when: RenderRequest);
}

/// Identifies one attached gizmo widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct GizmoParams {
    pub target: String,
    pub mode: GizmoMode,
}

/// The viewer's transform widget. Drag callbacks are relayed to
/// [`GizmoController`](crate::gizmo::GizmoController) by the host.
pub trait GizmoOverlay {
    fn attach(&mut self, params: GizmoParams) -> HandleId;

    fn detach(&mut self, handle: HandleId);
}
