//! Scene API gateway.
//!
//! The core never talks to the network directly; it goes through
//! [`SceneBackend`]. Every method returns a future that is driven by the
//! host's executor on the UI thread, so nothing here needs to be `Send`.

mod http;
mod memory;

pub use http::{ApiPaths, HttpBackend};
pub use memory::{MemoryBackend, UpdateCall};

use crate::scene::serialization::probe_transform;
use crate::scene::{InstanceNode, Transform};
use serde_json::Value;
use std::future::Future;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered {status} {status_text}")]
    Status {
        url: String,
        status: u16,
        status_text: String,
    },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown scene {0}")]
    UnknownScene(String),
    #[error("unknown instance {0}")]
    UnknownInstance(String),
    #[error("no transform in the properties of instance {0}")]
    MissingTransform(String),
    #[error("update of instance {0} was rejected")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// One entry of a batch properties update.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InstanceUpdate {
    pub id: String,
    pub transform: Transform,
}

/// Body of a single properties update.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleUpdate {
    pub instance_id: String,
    pub transform: Transform,
}

/// Result of a best-effort batch update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Ids the backend reported as not applied.
    pub rejected: Vec<String>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub trait SceneBackend {
    /// Instance hierarchy of a scene, rooted at a synthetic node.
    fn fetch_instance_tree(&self, scene_id: &str) -> impl Future<Output = Result<InstanceNode>>;

    /// Raw properties envelope of one instance; see [`fetch_transform`].
    fn fetch_instance_properties(&self, instance_id: &str) -> impl Future<Output = Result<Value>>;

    fn update_instance_properties(
        &self,
        instance_id: &str,
        transform: &Transform,
    ) -> impl Future<Output = Result<()>>;

    /// Best-effort batch update; per-item rejections are reported, not rolled back.
    fn update_instances_properties(
        &self,
        updates: &[InstanceUpdate],
    ) -> impl Future<Output = Result<BatchOutcome>>;
}

/// Persisted transform of one instance, probed out of its properties envelope.
pub async fn fetch_transform<B: SceneBackend>(backend: &B, instance_id: &str) -> Result<Transform> {
    let payload = backend.fetch_instance_properties(instance_id).await?;
    probe_transform(&payload).ok_or_else(|| BackendError::MissingTransform(instance_id.to_string()))
}

/// Pull the rejected ids out of a batch response body, if it lists any.
pub(crate) fn rejected_ids(body: &Value) -> Vec<String> {
    ["/failed", "/data/failed"]
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(id) => Some(id.clone()),
                    Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
