//! # Shared Registry
//!
//! The [`Registry`] trait is the boundary to the shared key-value store that
//! persists the process tree and the module catalog. It is hash-collection
//! shaped: every access is a single-key read, write or delete on a named
//! collection. There are no multi-key transactions, so registry writes are
//! deliberately *not* atomic with actor start/exit; readers must tolerate
//! fragments (see `ClusterClient::list_processes`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// One persisted process. Created on successful actor startup, deleted on
/// termination. `parent_process_name` is a lookup key, never an owning link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub process_name: String,
    pub parent_process_name: String,
    pub module_name: String,
}

impl ProcessRecord {
    pub fn to_wire(&self) -> Result<String, ClusterError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_wire(text: &str) -> Result<Self, ClusterError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// The shared-store capability injected into every component.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn put(&self, collection: &str, key: &str, value: String) -> Result<(), ClusterError>;

    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>, ClusterError>;

    async fn all(&self, collection: &str) -> Result<HashMap<String, String>, ClusterError>;

    async fn delete(&self, collection: &str, key: &str) -> Result<(), ClusterError>;
}

/// In-process registry backed by a locked map. Shared by every component of
/// a single-host cluster and by the tests.
#[derive(Default)]
pub struct MemoryRegistry {
    collections: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn put(&self, collection: &str, key: &str, value: String) -> Result<(), ClusterError> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| ClusterError::RegistryClosed)?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<String>, ClusterError> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| ClusterError::RegistryClosed)?;
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn all(&self, collection: &str) -> Result<HashMap<String, String>, ClusterError> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| ClusterError::RegistryClosed)?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), ClusterError> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| ClusterError::RegistryClosed)?;
        if let Some(entries) = collections.get_mut(collection) {
            entries.remove(key);
        }
        Ok(())
    }
}
