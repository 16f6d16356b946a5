//! Turning a finished drag into persisted transforms.
//!
//! Translation is converted into scene-local meters and the same local
//! offset is pushed down to every affected descendant. Rotation and scale
//! only ever touch the dragged instance.

use crate::backend::{fetch_transform, BackendError, InstanceUpdate, SceneBackend};
use crate::geo::{to_local, SceneOrigin};
use crate::gizmo::{CompletedDrag, DragResult, GizmoMode};
use crate::scene::Transform;
use glam::{DMat4, DVec3};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to persist transform of {id}: {source}")]
    Persist {
        id: String,
        #[source]
        source: BackendError,
    },
    #[error("failed to persist {count} transforms: {source}")]
    PersistBatch {
        count: usize,
        #[source]
        source: BackendError,
    },
    #[error("backend did not apply transforms for {}", .rejected.join(", "))]
    PartiallyRejected { rejected: Vec<String> },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// What a reconcile pass submitted.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub target_id: String,
    pub mode: GizmoMode,
    pub target: Transform,
    pub descendants: Vec<InstanceUpdate>,
    /// Descendants left out because their properties could not be read.
    pub skipped: Vec<String>,
    pub batched: bool,
}

/// Net rigid motion taking `initial` to `current`.
pub fn rigid_delta(initial: DMat4, current: DMat4) -> DMat4 {
    current * initial.inverse()
}

/// Pose of a rigidly attached child after its parent moved by `delta`.
///
/// Always applied to the child's pose from before the drag, never to a pose
/// that already has per-frame deltas folded in.
pub fn calibrate(delta: DMat4, initial_child: DMat4) -> DMat4 {
    delta * initial_child
}

/// New transform for the dragged instance.
pub fn apply_drag_result(
    origin: Option<&SceneOrigin>,
    previous: &Transform,
    result: &DragResult,
) -> Transform {
    match result {
        DragResult::Translate(world) => Transform {
            location: to_local(origin, *world).to_array(),
            ..*previous
        },
        DragResult::Rotate(rotation) => {
            let rotation = rotation.to_degrees().unwrap_or_else(|| {
                log::warn!("Rotation result is not finite; keeping previous rotation");
                previous.rotation
            });
            Transform {
                rotation,
                ..*previous
            }
        }
        DragResult::Scale(scale) => Transform {
            scale: scale.to_scale(),
            ..*previous
        },
    }
}

pub struct TransformReconciler<'a, B> {
    backend: &'a B,
    origin: Option<&'a SceneOrigin>,
}

impl<'a, B: SceneBackend> TransformReconciler<'a, B> {
    pub fn new(backend: &'a B, origin: Option<&'a SceneOrigin>) -> Self {
        Self { backend, origin }
    }

    /// Persisted transform of `id`, or `None` if it cannot be read.
    async fn current_transform(&self, id: &str) -> Option<Transform> {
        match fetch_transform(self.backend, id).await {
            Ok(transform) => Some(transform),
            Err(err) => {
                log::warn!("Using default transform for {}: {}", id, err);
                None
            }
        }
    }

    /// Local translation the drag applied to the target.
    ///
    /// Measured against the persisted location when it was readable, else
    /// against the position the target had when the drag began. `None` if
    /// neither is known.
    fn drag_offset(
        &self,
        drag: &CompletedDrag,
        previous: Option<&Transform>,
        target: &Transform,
    ) -> Option<DVec3> {
        match (previous, drag.start_position) {
            (Some(previous), _) => Some(target.location_vec() - previous.location_vec()),
            (None, Some(start)) => Some(target.location_vec() - to_local(self.origin, start)),
            (None, None) => None,
        }
    }

    pub async fn reconcile(&self, drag: &CompletedDrag) -> Result<ReconcileReport> {
        let persisted = self.current_transform(&drag.target_id).await;
        let previous = persisted.unwrap_or_default();
        let target = apply_drag_result(self.origin, &previous, &drag.result);

        let mut report = ReconcileReport {
            target_id: drag.target_id.clone(),
            mode: drag.mode,
            target,
            descendants: Vec::new(),
            skipped: Vec::new(),
            batched: false,
        };

        let wants_descendants = drag.mode == GizmoMode::Translate && !drag.descendant_ids.is_empty();
        let offset = self.drag_offset(drag, persisted.as_ref(), &target);
        if wants_descendants && offset.is_none() {
            log::warn!(
                "Drag start of {} unknown; {} descendants left unpersisted",
                drag.target_id,
                drag.descendant_ids.len()
            );
        }
        let offset = offset.unwrap_or(DVec3::ZERO);
        if wants_descendants && offset != DVec3::ZERO {
            let fetched = futures::future::join_all(
                drag.descendant_ids
                    .iter()
                    .map(|id| fetch_transform(self.backend, id)),
            )
            .await;
            for (id, fetched) in drag.descendant_ids.iter().zip(fetched) {
                match fetched {
                    Ok(transform) => report.descendants.push(InstanceUpdate {
                        id: id.clone(),
                        transform: transform.offset_by(offset),
                    }),
                    Err(err) => {
                        log::warn!("Skipping descendant {}: {}", id, err);
                        report.skipped.push(id.clone());
                    }
                }
            }
        }

        self.submit(&mut report).await?;
        log::info!(
            "Persisted {:?} of {} ({} descendants, {} skipped)",
            report.mode,
            report.target_id,
            report.descendants.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    async fn submit(&self, report: &mut ReconcileReport) -> Result<()> {
        if report.descendants.is_empty() {
            return self
                .backend
                .update_instance_properties(&report.target_id, &report.target)
                .await
                .map_err(|source| ReconcileError::Persist {
                    id: report.target_id.clone(),
                    source,
                });
        }

        let mut updates = Vec::with_capacity(report.descendants.len() + 1);
        updates.push(InstanceUpdate {
            id: report.target_id.clone(),
            transform: report.target,
        });
        updates.extend(report.descendants.iter().cloned());
        report.batched = true;

        let outcome = self
            .backend
            .update_instances_properties(&updates)
            .await
            .map_err(|source| ReconcileError::PersistBatch {
                count: updates.len(),
                source,
            })?;
        if !outcome.is_complete() {
            log::warn!("Batch update partially rejected: {:?}", outcome.rejected);
            return Err(ReconcileError::PartiallyRejected {
                rejected: outcome.rejected,
            });
        }
        Ok(())
    }
}
