//! Instance hierarchy lookups.
//!
//! The tree for the current scene is fetched lazily and cached wholesale;
//! a fetch for a different scene or a failed fetch replaces or clears it.

use crate::backend::{self, SceneBackend};
use crate::scene::InstanceNode;
use std::rc::Rc;

struct CachedTree {
    scene_id: String,
    root: Rc<InstanceNode>,
}

/// Per-scene instance tree, owned by whoever drives the gizmo.
#[derive(Default)]
pub struct InstanceTreeCache {
    cached: Option<CachedTree>,
}

impl InstanceTreeCache {
    pub fn new() -> Self {
        Self { cached: None }
    }

    /// Scene whose tree is currently held, if any.
    pub fn cached_scene(&self) -> Option<&str> {
        self.cached.as_ref().map(|cached| cached.scene_id.as_str())
    }

    pub fn invalidate(&mut self) {
        if let Some(cached) = self.cached.take() {
            log::debug!("Instance tree cache for scene {} invalidated", cached.scene_id);
        }
    }

    pub async fn get<B: SceneBackend>(
        &mut self,
        backend: &B,
        scene_id: &str,
    ) -> backend::Result<Rc<InstanceNode>> {
        if let Some(cached) = &self.cached {
            if cached.scene_id == scene_id {
                return Ok(Rc::clone(&cached.root));
            }
        }

        match backend.fetch_instance_tree(scene_id).await {
            Ok(tree) => {
                let root = Rc::new(tree);
                self.cached = Some(CachedTree {
                    scene_id: scene_id.to_string(),
                    root: Rc::clone(&root),
                });
                log::debug!("Instance tree for scene {} cached", scene_id);
                Ok(root)
            }
            Err(err) => {
                self.cached = None;
                Err(err)
            }
        }
    }
}

/// Renderable descendants of `instance_id` within `root`, depth-first.
///
/// Grouping nodes are walked through but not returned. Unknown ids yield an
/// empty list.
pub fn collect_descendants(root: &InstanceNode, instance_id: &str) -> Vec<String> {
    let Some(node) = root.find(instance_id) else {
        return Vec::new();
    };
    node.descendants()
        .into_iter()
        .filter(|descendant| descendant.is_renderable())
        .map(|descendant| descendant.uid.clone())
        .collect()
}

/// Descendants that must move rigidly with `instance_id`.
///
/// Never fails: a tree that cannot be fetched degrades to single-object
/// manipulation.
pub async fn find_descendants<B: SceneBackend>(
    cache: &mut InstanceTreeCache,
    backend: &B,
    scene_id: &str,
    instance_id: &str,
) -> Vec<String> {
    match cache.get(backend, scene_id).await {
        Ok(root) => {
            let ids = collect_descendants(&root, instance_id);
            log::debug!("Instance {} has {} renderable descendants", instance_id, ids.len());
            ids
        }
        Err(err) => {
            log::warn!(
                "Could not load instance tree for scene {}: {}; moving {} alone",
                scene_id,
                err,
                instance_id
            );
            Vec::new()
        }
    }
}
