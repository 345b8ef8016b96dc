#[cfg(feature = "storage-local")]
use crate::LocalDriver;
#[cfg(feature = "storage-tos")]
use crate::ObjectStorageDriver;
use crate::{Driver, StorageBackend, StorageError, StorageResult};
use bucketfs_core::StorageSettings;
use std::sync::Arc;

/// Create a storage driver based on configuration
pub async fn create_driver(settings: &StorageSettings) -> StorageResult<Arc<dyn Driver>> {
    match settings.backend {
        #[cfg(feature = "storage-tos")]
        StorageBackend::Tos => {
            let resolved = settings
                .driver
                .resolve()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?;

            let driver = ObjectStorageDriver::from_config(&resolved).await;
            Ok(Arc::new(driver))
        }

        #[cfg(not(feature = "storage-tos"))]
        StorageBackend::Tos => Err(StorageError::ConfigError(
            "Object storage backend not available (storage-tos feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let driver = LocalDriver::new(&settings.local_path).await?;
            Ok(Arc::new(driver))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}
