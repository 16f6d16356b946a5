use super::{BackendError, BatchOutcome, InstanceUpdate, Result, SceneBackend};
use crate::geo::SceneOrigin;
use crate::scene::serialization::SceneSnapshot;
use crate::scene::{InstanceNode, Transform};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};

/// An update as it reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateCall {
    Single { id: String, transform: Transform },
    Batch(Vec<InstanceUpdate>),
}

/// Snapshot-backed [`SceneBackend`] for offline replay and tests.
///
/// Records every update it receives and can be told to fail specific
/// requests.
pub struct MemoryBackend {
    scene_id: String,
    origin: Option<SceneOrigin>,
    tree: RefCell<InstanceNode>,
    transforms: RefCell<BTreeMap<String, Transform>>,
    calls: RefCell<Vec<UpdateCall>>,
    tree_fetches: Cell<usize>,
    fail_tree: Cell<bool>,
    unreadable: RefCell<HashSet<String>>,
    rejected: RefCell<HashSet<String>>,
}

impl MemoryBackend {
    pub fn from_snapshot(snapshot: SceneSnapshot) -> Self {
        Self {
            scene_id: snapshot.scene_id,
            origin: snapshot.origin,
            tree: RefCell::new(snapshot.tree),
            transforms: RefCell::new(snapshot.transforms),
            calls: RefCell::new(Vec::new()),
            tree_fetches: Cell::new(0),
            fail_tree: Cell::new(false),
            unreadable: RefCell::new(HashSet::new()),
            rejected: RefCell::new(HashSet::new()),
        }
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            scene_id: self.scene_id.clone(),
            origin: self.origin,
            tree: self.tree.borrow().clone(),
            transforms: self.transforms.borrow().clone(),
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn origin(&self) -> Option<&SceneOrigin> {
        self.origin.as_ref()
    }

    pub fn transform(&self, id: &str) -> Option<Transform> {
        self.transforms.borrow().get(id).copied()
    }

    pub fn set_transform(&self, id: &str, transform: Transform) {
        self.transforms.borrow_mut().insert(id.to_string(), transform);
    }

    /// Swap the hierarchy, as a reparent made elsewhere would.
    pub fn replace_tree(&self, tree: InstanceNode) {
        *self.tree.borrow_mut() = tree;
    }

    pub fn calls(&self) -> Vec<UpdateCall> {
        self.calls.borrow().clone()
    }

    pub fn tree_fetches(&self) -> usize {
        self.tree_fetches.get()
    }

    pub fn fail_tree_fetches(&self, fail: bool) {
        self.fail_tree.set(fail);
    }

    /// Make property fetches for `id` fail.
    pub fn make_unreadable(&self, id: &str) {
        self.unreadable.borrow_mut().insert(id.to_string());
    }

    /// Make updates for `id` be rejected.
    pub fn reject_updates_for(&self, id: &str) {
        self.rejected.borrow_mut().insert(id.to_string());
    }
}

impl SceneBackend for MemoryBackend {
    async fn fetch_instance_tree(&self, scene_id: &str) -> Result<InstanceNode> {
        self.tree_fetches.set(self.tree_fetches.get() + 1);
        if self.fail_tree.get() {
            return Err(BackendError::Transport {
                url: format!("memory://{}/tree", scene_id),
                message: "tree fetch disabled".to_string(),
            });
        }
        if scene_id != self.scene_id {
            return Err(BackendError::UnknownScene(scene_id.to_string()));
        }
        Ok(self.tree.borrow().clone())
    }

    async fn fetch_instance_properties(&self, instance_id: &str) -> Result<Value> {
        if self.unreadable.borrow().contains(instance_id) {
            return Err(BackendError::Transport {
                url: format!("memory://instance/{}", instance_id),
                message: "properties fetch disabled".to_string(),
            });
        }
        let transform = self
            .transform(instance_id)
            .ok_or_else(|| BackendError::UnknownInstance(instance_id.to_string()))?;
        Ok(json!({
            "data": {
                "code": 200,
                "data": { "instance": { "uid": instance_id, "transform": transform } }
            }
        }))
    }

    async fn update_instance_properties(&self, instance_id: &str, transform: &Transform) -> Result<()> {
        self.calls.borrow_mut().push(UpdateCall::Single {
            id: instance_id.to_string(),
            transform: *transform,
        });
        if self.rejected.borrow().contains(instance_id) {
            return Err(BackendError::Rejected(instance_id.to_string()));
        }
        self.set_transform(instance_id, *transform);
        Ok(())
    }

    async fn update_instances_properties(&self, updates: &[InstanceUpdate]) -> Result<BatchOutcome> {
        self.calls.borrow_mut().push(UpdateCall::Batch(updates.to_vec()));
        let mut outcome = BatchOutcome::default();
        for update in updates {
            if self.rejected.borrow().contains(&update.id) {
                outcome.rejected.push(update.id.clone());
                continue;
            }
            self.set_transform(&update.id, update.transform);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fetch_transform;
    use futures::executor::block_on;

    fn backend() -> MemoryBackend {
        let mut transforms = BTreeMap::new();
        transforms.insert("A".to_string(), Transform::at([1.0, 0.0, 0.0]));
        transforms.insert("B".to_string(), Transform::at([2.0, 0.0, 0.0]));
        MemoryBackend::from_snapshot(SceneSnapshot {
            scene_id: "s1".to_string(),
            origin: None,
            tree: InstanceNode::group("root", vec![InstanceNode::asset("A", "model", vec![])]),
            transforms,
        })
    }

    #[test]
    fn test_tree_fetch_counts_and_checks_scene() {
        let backend = backend();
        assert!(block_on(backend.fetch_instance_tree("s1")).is_ok());
        assert!(matches!(
            block_on(backend.fetch_instance_tree("other")),
            Err(BackendError::UnknownScene(_))
        ));
        assert_eq!(backend.tree_fetches(), 2);
    }

    #[test]
    fn test_properties_envelope_is_probeable() {
        let backend = backend();
        let transform = block_on(fetch_transform(&backend, "B")).unwrap();
        assert_eq!(transform.location, [2.0, 0.0, 0.0]);
        assert!(matches!(
            block_on(fetch_transform(&backend, "Z")),
            Err(BackendError::UnknownInstance(_))
        ));
    }

    #[test]
    fn test_batch_is_best_effort() {
        let backend = backend();
        backend.reject_updates_for("B");
        let outcome = block_on(backend.update_instances_properties(&[
            InstanceUpdate {
                id: "A".to_string(),
                transform: Transform::at([9.0, 0.0, 0.0]),
            },
            InstanceUpdate {
                id: "B".to_string(),
                transform: Transform::at([9.0, 0.0, 0.0]),
            },
        ]))
        .unwrap();
        assert_eq!(outcome.rejected, vec!["B".to_string()]);
        assert_eq!(backend.transform("A").unwrap().location, [9.0, 0.0, 0.0]);
        assert_eq!(backend.transform("B").unwrap().location, [2.0, 0.0, 0.0]);
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_snapshot_keeps_origin() {
        let mut snapshot = backend().snapshot();
        snapshot.origin = Some(SceneOrigin::new(116.39, 39.91, 0.0));
        let backend = MemoryBackend::from_snapshot(snapshot);
        block_on(backend.update_instance_properties("A", &Transform::at([3.0, 0.0, 0.0]))).unwrap();

        let written = backend.snapshot();
        assert_eq!(written.origin, Some(SceneOrigin::new(116.39, 39.91, 0.0)));
        assert_eq!(written.transforms["A"].location, [3.0, 0.0, 0.0]);
    }
}
