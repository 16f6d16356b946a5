//! Interactive manipulation sessions.
//!
//! A [`GizmoSession`] lives from selection (or mode toggle) until the next
//! selection, toggle or clear. Within it the controller runs
//! `Armed -> Dragging -> Released` for every drag. Only translation is
//! propagated to descendants: live, as incremental offsets for visual
//! feedback, and on release, by recomputing every descendant from the pose
//! it had when the drag began.

mod result;

pub use result::{
    DragResult, PositionShape, RotationResult, RotationShape, ScaleResult, ScaleShape,
};

use crate::reconcile::{calibrate, rigid_delta};
use crate::render::{GizmoOverlay, GizmoParams, HandleId, RenderRequest, RenderScene};
use glam::{DMat4, DVec3};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GizmoMode {
    #[default]
    Translate,
    Rotate,
    Scale,
}

impl GizmoMode {
    /// Toggle order: translate, rotate, scale, back to translate.
    pub fn next(self) -> Self {
        match self {
            Self::Translate => Self::Rotate,
            Self::Rotate => Self::Scale,
            Self::Scale => Self::Translate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Armed,
    Dragging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Armed,
    Dragging,
    /// A drag finished; the session stays selectable for another drag.
    Released,
}

/// Identifies the session a pending descendant lookup belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTicket {
    generation: u64,
    mode: GizmoMode,
}

impl SessionTicket {
    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    /// Whether descendants should be resolved for this session.
    pub fn wants_descendants(&self) -> bool {
        self.mode == GizmoMode::Translate
    }
}

#[derive(Debug)]
pub struct GizmoSession {
    target_id: String,
    mode: GizmoMode,
    generation: u64,
    phase: SessionPhase,
    handle: HandleId,
    initial_target_matrix: Option<DMat4>,
    descendant_ids: Vec<String>,
    initial_descendant_matrices: HashMap<String, DMat4>,
    last_live_position: Option<DVec3>,
    last_result: Option<DragResult>,
}

impl GizmoSession {
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn initial_target_matrix(&self) -> Option<DMat4> {
        self.initial_target_matrix
    }

    pub fn descendant_ids(&self) -> &[String] {
        &self.descendant_ids
    }

    pub fn initial_descendant_matrix(&self, id: &str) -> Option<DMat4> {
        self.initial_descendant_matrices.get(id).copied()
    }

    pub fn cached_descendant_count(&self) -> usize {
        self.initial_descendant_matrices.len()
    }

    pub fn last_live_position(&self) -> Option<DVec3> {
        self.last_live_position
    }

    pub fn last_result(&self) -> Option<&DragResult> {
        self.last_result.as_ref()
    }
}

/// A drag that reached its end event, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedDrag {
    pub target_id: String,
    pub mode: GizmoMode,
    pub result: DragResult,
    pub descendant_ids: Vec<String>,
    /// World position of the target when the drag began (translate only).
    pub start_position: Option<DVec3>,
}

/// Redraw delays after a bulk matrix update, beyond the immediate and
/// next-frame requests.
pub const DEFAULT_STAGGER_DELAYS: [Duration; 2] =
    [Duration::from_millis(50), Duration::from_millis(100)];

pub struct GizmoController<S, O> {
    scene: S,
    overlay: O,
    mode: GizmoMode,
    session: Option<GizmoSession>,
    generation: u64,
    stagger_delays: [Duration; 2],
}

impl<S: RenderScene, O: GizmoOverlay> GizmoController<S, O> {
    pub fn new(scene: S, overlay: O) -> Self {
        Self {
            scene,
            overlay,
            mode: GizmoMode::default(),
            session: None,
            generation: 0,
            stagger_delays: DEFAULT_STAGGER_DELAYS,
        }
    }

    pub fn with_stagger_delays(mut self, delays: [Duration; 2]) -> Self {
        self.stagger_delays = delays;
        self
    }

    pub fn mode(&self) -> GizmoMode {
        self.mode
    }

    pub fn state(&self) -> ControllerState {
        match self.session.as_ref().map(|session| session.phase) {
            Some(SessionPhase::Armed) => ControllerState::Armed,
            Some(SessionPhase::Dragging) => ControllerState::Dragging,
            Some(SessionPhase::Released) | None => ControllerState::Idle,
        }
    }

    pub fn session(&self) -> Option<&GizmoSession> {
        self.session.as_ref()
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn overlay(&self) -> &O {
        &self.overlay
    }

    /// Start a session on `target` in the current mode, replacing any other.
    pub fn arm(&mut self, target: &str) -> SessionTicket {
        self.end_session();

        self.generation += 1;
        let mode = self.mode;
        let handle = self.overlay.attach(GizmoParams {
            target: target.to_string(),
            mode,
        });
        let initial_target_matrix = match mode {
            GizmoMode::Translate => {
                let matrix = self.scene.world_matrix(target);
                if matrix.is_none() {
                    log::warn!("Selected instance {} has no primitive in the scene", target);
                }
                matrix
            }
            GizmoMode::Rotate | GizmoMode::Scale => None,
        };

        self.session = Some(GizmoSession {
            target_id: target.to_string(),
            mode,
            generation: self.generation,
            phase: SessionPhase::Armed,
            handle,
            initial_target_matrix,
            descendant_ids: Vec::new(),
            initial_descendant_matrices: HashMap::new(),
            last_live_position: None,
            last_result: None,
        });
        log::info!("Gizmo armed on {} ({:?})", target, mode);

        SessionTicket {
            generation: self.generation,
            mode,
        }
    }

    /// Hand the session the descendants resolved for `ticket` and cache
    /// their current world matrices.
    ///
    /// Returns `false` if the ticket's session is gone or not translating.
    pub fn attach_descendants(&mut self, ticket: SessionTicket, ids: Vec<String>) -> bool {
        let Some(session) = self.session.as_mut() else {
            log::debug!("Descendants arrived with no active session");
            return false;
        };
        if session.generation != ticket.generation {
            log::debug!("Dropping descendants resolved for a replaced session");
            return false;
        }
        if session.mode != GizmoMode::Translate {
            return false;
        }

        session.descendant_ids = ids;
        let cached = cache_descendant_matrices(&self.scene, session);
        log::debug!(
            "Cached {}/{} descendant matrices for {}",
            cached,
            session.descendant_ids.len(),
            session.target_id
        );
        true
    }

    /// Drop the session and its widget. A drag in progress is abandoned.
    pub fn clear_selection(&mut self) {
        self.end_session();
    }

    /// Advance the mode and re-arm the current target in it.
    pub fn cycle_mode(&mut self) -> Option<SessionTicket> {
        self.mode = self.mode.next();
        log::info!("Gizmo mode is now {:?}", self.mode);
        let target = self.session.as_ref().map(|session| session.target_id.clone())?;
        Some(self.arm(&target))
    }

    pub fn on_drag_start(&mut self) {
        let Some(session) = self.session.as_mut() else {
            log::debug!("Drag start without a session");
            return;
        };
        if session.phase == SessionPhase::Dragging {
            return;
        }
        session.phase = SessionPhase::Dragging;
        session.last_result = None;

        match self.scene.world_matrix(&session.target_id) {
            Some(matrix) => {
                session.last_live_position = Some(matrix.w_axis.truncate());
                if session.mode == GizmoMode::Translate {
                    session.initial_target_matrix = Some(matrix);
                }
            }
            None => log::warn!("Dragged instance {} is not in the scene", session.target_id),
        }

        if session.mode == GizmoMode::Translate
            && session.initial_descendant_matrices.len() != session.descendant_ids.len()
        {
            log::info!(
                "Descendant cache incomplete for {} ({}/{}); re-caching",
                session.target_id,
                session.initial_descendant_matrices.len(),
                session.descendant_ids.len()
            );
            cache_descendant_matrices(&self.scene, session);
        }
    }

    pub fn on_drag_moving(&mut self, result: DragResult) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != SessionPhase::Dragging {
            log::debug!("Ignoring drag update outside of a drag");
            return;
        }
        if result.mode() != session.mode {
            log::debug!("Ignoring {:?} result in {:?} session", result.mode(), session.mode);
            return;
        }

        if let Some(position) = result.position() {
            if let Some(last) = session.last_live_position {
                let delta = position - last;
                if delta != DVec3::ZERO && !session.initial_descendant_matrices.is_empty() {
                    let step = DMat4::from_translation(delta);
                    for id in &session.descendant_ids {
                        if !session.initial_descendant_matrices.contains_key(id) {
                            continue;
                        }
                        match self.scene.world_matrix(id) {
                            Some(current) => {
                                self.scene.set_world_matrix(id, step * current);
                            }
                            None => log::debug!("Descendant {} left the scene mid-drag", id),
                        }
                    }
                    self.scene.request_render(RenderRequest::Immediate);
                }
            }
            session.last_live_position = Some(position);
        }
        session.last_result = Some(result);
    }

    pub fn on_drag_end(&mut self) -> Option<CompletedDrag> {
        let session = self.session.as_mut()?;
        if session.phase != SessionPhase::Dragging {
            return None;
        }
        session.phase = SessionPhase::Released;
        let start_position = session
            .initial_target_matrix
            .map(|matrix| matrix.w_axis.truncate());

        if session.mode == GizmoMode::Translate && !session.descendant_ids.is_empty() {
            calibrate_descendants(&mut self.scene, session, self.stagger_delays);
        }

        let Some(result) = session.last_result.take() else {
            log::debug!("Drag on {} ended without movement", session.target_id);
            return None;
        };
        Some(CompletedDrag {
            target_id: session.target_id.clone(),
            mode: session.mode,
            result,
            descendant_ids: session.descendant_ids.clone(),
            start_position,
        })
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            if session.phase == SessionPhase::Dragging {
                log::info!("Drag on {} cancelled", session.target_id);
            }
            self.overlay.detach(session.handle);
        }
    }
}

/// Snapshot the current world matrix of every descendant present in the scene.
fn cache_descendant_matrices<S: RenderScene>(scene: &S, session: &mut GizmoSession) -> usize {
    session.initial_descendant_matrices.clear();
    for id in &session.descendant_ids {
        match scene.world_matrix(id) {
            Some(matrix) => {
                session.initial_descendant_matrices.insert(id.clone(), matrix);
            }
            None => log::warn!("Descendant {} has no primitive in the scene; skipped", id),
        }
    }
    session.initial_descendant_matrices.len()
}

/// Place every cached descendant at `delta * initial`, where `delta` is the
/// target's net motion since the drag began, then make those poses the
/// baseline for the session's next drag.
fn calibrate_descendants<S: RenderScene>(
    scene: &mut S,
    session: &mut GizmoSession,
    stagger_delays: [Duration; 2],
) {
    let Some(initial_target) = session.initial_target_matrix else {
        log::warn!("No initial matrix for {}; descendants not calibrated", session.target_id);
        return;
    };
    let Some(final_target) = scene.world_matrix(&session.target_id) else {
        log::warn!("Dragged instance {} vanished before calibration", session.target_id);
        return;
    };
    let delta = rigid_delta(initial_target, final_target);

    for id in &session.descendant_ids {
        let Some(initial) = session.initial_descendant_matrices.get_mut(id) else {
            log::warn!("No cached matrix for descendant {}; skipped", id);
            continue;
        };
        let calibrated = calibrate(delta, *initial);
        if scene.set_world_matrix(id, calibrated) {
            *initial = calibrated;
        } else {
            log::warn!("Descendant {} is not in the scene; skipped", id);
        }
    }
    session.initial_target_matrix = Some(final_target);

    scene.request_render(RenderRequest::Immediate);
    scene.request_render(RenderRequest::NextFrame);
    for delay in stagger_delays {
        scene.request_render(RenderRequest::After(delay));
    }
}
