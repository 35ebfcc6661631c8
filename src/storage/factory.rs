//! Storage factory for creating backends based on configuration

use crate::core::config::{BackendType, StorageConfig};
use crate::storage::{DocumentBackend, MemoryBackend};
use std::sync::Arc;

/// Shared handle to a document backend
pub type SharedBackend = Arc<dyn DocumentBackend>;

/// Create a backend implementation based on configuration
pub fn create_backend(config: &StorageConfig) -> SharedBackend {
    match config.backend {
        BackendType::Memory => {
            tracing::debug!(database = %config.database, "Creating in-memory backend");
            Arc::new(MemoryBackend::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Document;

    #[tokio::test]
    async fn test_memory_backend_creation() {
        let config = StorageConfig {
            backend: BackendType::Memory,
            ..Default::default()
        };

        let backend = create_backend(&config);
        assert_eq!(backend.count("anything", Document::new()).await.unwrap(), 0);
    }
}
