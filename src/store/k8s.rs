//! # Kubernetes Store
//!
//! `ResourceStore` backed by the Kubernetes API server.
//!
//! `replace` and `replace_status` send the full object including
//! `metadata.resourceVersion`, so the API server rejects stale writes with
//! 409 Conflict.

use super::{ResourceStore, StoreError};
use crate::controller::reconciler::types::{Reconcilable, ResourceKey};
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Store for any namespaced custom resource kind
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

fn map_kube_error(key: &ResourceKey, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict(key.clone()),
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(key.clone()),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeStore
where
    K: Reconcilable
        + Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Serialize
        + DeserializeOwned
        + Debug,
    <K as Resource>::DynamicType: Default,
{
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_kube_error(key, e))
    }

    async fn update(&self, resource: &K) -> Result<K, StoreError> {
        let key = resource.key();
        let stored = self
            .api::<K>(&key.namespace)
            .replace(&key.name, &self.post_params(), resource)
            .await
            .map_err(|e| map_kube_error(&key, e))?;
        debug!(
            resource.namespace = key.namespace.as_str(),
            resource.name = key.name.as_str(),
            resource.version = stored.resource_version().unwrap_or("unknown"),
            "store.update"
        );
        Ok(stored)
    }

    async fn update_status(&self, resource: &K) -> Result<K, StoreError> {
        let key = resource.key();
        let body = serde_json::to_vec(resource)
            .map_err(|e| StoreError::Backend(format!("failed to serialize {key}: {e}")))?;
        let stored = self
            .api::<K>(&key.namespace)
            .replace_status(&key.name, &self.post_params(), body)
            .await
            .map_err(|e| map_kube_error(&key, e))?;
        debug!(
            resource.namespace = key.namespace.as_str(),
            resource.name = key.name.as_str(),
            resource.version = stored.resource_version().unwrap_or("unknown"),
            "store.update_status"
        );
        Ok(stored)
    }
}
