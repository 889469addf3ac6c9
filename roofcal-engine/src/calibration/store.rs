//! Key-value store abstraction for region models
//!
//! Implementations must be read-your-writes consistent: a `get` after a
//! completed `put` on the same key returns the written model.

use super::model::RegionCorrectionModel;
use async_trait::async_trait;
use roofcal_common::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait CalibrationStore: Send + Sync {
    async fn get(&self, region_key: &str) -> Result<Option<RegionCorrectionModel>>;

    /// Insert or replace the model stored under `model.region_key`
    async fn put(&self, model: &RegionCorrectionModel) -> Result<()>;

    /// Returns true if a model was removed
    async fn remove(&self, region_key: &str) -> Result<bool>;

    /// All models, sorted by region key
    async fn list(&self) -> Result<Vec<RegionCorrectionModel>>;

    /// Replace the entire contents with `models`
    async fn replace_all(&self, models: &[RegionCorrectionModel]) -> Result<()>;
}

/// Non-durable store for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct InMemoryCalibrationStore {
    models: RwLock<HashMap<String, RegionCorrectionModel>>,
}

impl InMemoryCalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalibrationStore for InMemoryCalibrationStore {
    async fn get(&self, region_key: &str) -> Result<Option<RegionCorrectionModel>> {
        Ok(self.models.read().await.get(region_key).cloned())
    }

    async fn put(&self, model: &RegionCorrectionModel) -> Result<()> {
        self.models
            .write()
            .await
            .insert(model.region_key.clone(), model.clone());
        Ok(())
    }

    async fn remove(&self, region_key: &str) -> Result<bool> {
        Ok(self.models.write().await.remove(region_key).is_some())
    }

    async fn list(&self) -> Result<Vec<RegionCorrectionModel>> {
        let mut models: Vec<_> = self.models.read().await.values().cloned().collect();
        models.sort_by(|a, b| a.region_key.cmp(&b.region_key));
        Ok(models)
    }

    async fn replace_all(&self, models: &[RegionCorrectionModel]) -> Result<()> {
        let mut guard = self.models.write().await;
        guard.clear();
        for model in models {
            guard.insert(model.region_key.clone(), model.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roofcal_common::config::CalibrationSettings;

    fn model(key: &str) -> RegionCorrectionModel {
        RegionCorrectionModel::recompute(
            key,
            Vec::new(),
            &CalibrationSettings::default(),
            roofcal_common::time::now(),
        )
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let store = InMemoryCalibrationStore::new();
        store.put(&model("191")).await.unwrap();
        assert_eq!(store.get("191").await.unwrap(), Some(model("191")));
        assert!(store.get("100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sorted_and_remove() {
        let store = InMemoryCalibrationStore::new();
        store.put(&model("z9")).await.unwrap();
        store.put(&model("a1")).await.unwrap();

        let keys: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.region_key)
            .collect();
        assert_eq!(keys, vec!["a1", "z9"]);

        assert!(store.remove("a1").await.unwrap());
        assert!(!store.remove("a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_replace_all_clears_previous() {
        let store = InMemoryCalibrationStore::new();
        store.put(&model("old")).await.unwrap();
        store.replace_all(&[model("new")]).await.unwrap();

        assert!(store.get("old").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
