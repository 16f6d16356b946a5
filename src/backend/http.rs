use super::{rejected_ids, BackendError, BatchOutcome, InstanceUpdate, Result, SceneBackend, SingleUpdate};
use crate::scene::{InstanceNode, Transform};
use serde_json::{json, Value};

/// Endpoint templates relative to the API base url.
///
/// `{sceneId}` and `{instanceId}` are substituted per request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiPaths {
    pub instance_tree: String,
    pub instance_properties: String,
    pub update_instance: String,
    pub update_instances: String,
}

impl Default for ApiPaths {
    fn default() -> Self {
        Self {
            instance_tree: "/scene/{sceneId}/instance/tree".to_string(),
            instance_properties: "/scene/instance/{instanceId}/properties".to_string(),
            update_instance: "/scene/instance/properties".to_string(),
            update_instances: "/scene/instances/properties".to_string(),
        }
    }
}

/// [`SceneBackend`] over the scene REST API.
pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    paths: ApiPaths,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>, paths: ApiPaths) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            paths,
        }
    }

    fn url(&self, template: &str, scene_id: &str, instance_id: &str) -> String {
        let path = template
            .replace("{sceneId}", scene_id)
            .replace("{instanceId}", instance_id);
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: &mut ehttp::Request) {
        if let Some(token) = &self.token {
            request.headers.insert("Authorization", format!("Bearer {}", token));
        }
    }

    fn get(&self, url: String) -> ehttp::Request {
        let mut request = ehttp::Request::get(url);
        self.authorize(&mut request);
        request
    }

    fn put_json<T: serde::Serialize>(&self, url: String, body: &T) -> Result<ehttp::Request> {
        let mut request = ehttp::Request::json(url, body)?;
        request.method = "PUT".to_string();
        self.authorize(&mut request);
        Ok(request)
    }

    /// Send `request` and decode its JSON body; non-2xx statuses are errors.
    async fn send(&self, request: ehttp::Request) -> Result<Value> {
        let url = request.url.clone();
        log::debug!("{} {}", request.method, url);
        let response = ehttp::fetch_async(request)
            .await
            .map_err(|message| BackendError::Transport {
                url: url.clone(),
                message,
            })?;
        if !response.ok {
            return Err(BackendError::Status {
                url,
                status: response.status,
                status_text: response.status_text,
            });
        }
        if response.bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&response.bytes).map_err(|source| BackendError::Decode { url, source })
    }
}

impl SceneBackend for HttpBackend {
    async fn fetch_instance_tree(&self, scene_id: &str) -> Result<InstanceNode> {
        let url = self.url(&self.paths.instance_tree, scene_id, "");
        let body = self.send(self.get(url.clone())).await?;
        // Some deployments wrap the tree in `{ data: ... }`.
        let tree = match body.get("uid") {
            Some(_) => body,
            None => body.get("data").cloned().unwrap_or(Value::Null),
        };
        serde_json::from_value(tree).map_err(|source| BackendError::Decode { url, source })
    }

    async fn fetch_instance_properties(&self, instance_id: &str) -> Result<Value> {
        let url = self.url(&self.paths.instance_properties, "", instance_id);
        let body = self.send(self.get(url)).await?;
        // Match the response envelope the transform probes expect.
        Ok(json!({ "data": body }))
    }

    async fn update_instance_properties(&self, instance_id: &str, transform: &Transform) -> Result<()> {
        let url = self.url(&self.paths.update_instance, "", instance_id);
        let body = SingleUpdate {
            instance_id: instance_id.to_string(),
            transform: *transform,
        };
        self.send(self.put_json(url, &body)?).await?;
        Ok(())
    }

    async fn update_instances_properties(&self, updates: &[InstanceUpdate]) -> Result<BatchOutcome> {
        let url = self.url(&self.paths.update_instances, "", "");
        let body = self.send(self.put_json(url, &updates)?).await?;
        Ok(BatchOutcome {
            rejected: rejected_ids(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_templates_substitute_ids() {
        let backend = HttpBackend::new("http://twin.local/api/", None, ApiPaths::default());
        assert_eq!(
            backend.url(&backend.paths.instance_tree, "s1", ""),
            "http://twin.local/api/scene/s1/instance/tree"
        );
        assert_eq!(
            backend.url(&backend.paths.instance_properties, "", "i9"),
            "http://twin.local/api/scene/instance/i9/properties"
        );
    }

    #[test]
    fn test_put_request_carries_json_body() {
        let backend = HttpBackend::new("http://twin.local", Some("abc".to_string()), ApiPaths::default());
        let request = backend
            .put_json(
                "http://twin.local/x".to_string(),
                &SingleUpdate {
                    instance_id: "A".to_string(),
                    transform: Transform::default(),
                },
            )
            .unwrap();
        assert_eq!(request.method, "PUT");
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["instanceId"], "A");
        assert_eq!(body["transform"]["location"], serde_json::json!([0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_paths_partial_override() {
        let paths: ApiPaths = serde_json::from_str(r#"{"instanceTree":"/v2/tree/{sceneId}"}"#).unwrap();
        assert_eq!(paths.instance_tree, "/v2/tree/{sceneId}");
        assert_eq!(paths.update_instances, ApiPaths::default().update_instances);
    }
}
