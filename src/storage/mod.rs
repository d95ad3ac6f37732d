//! Storage implementations.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::ledger_store::{LedgerStore, StorageError};

pub mod memory;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use memory::MemoryLedgerStore;

#[cfg(feature = "mongodb")]
pub use mongodb::MongoLedgerStore;

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn LedgerStore>, StorageError> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory ledger store");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
        #[cfg(feature = "mongodb")]
        StorageType::Mongodb => {
            info!(
                uri = %config.mongodb.uri,
                database = %config.mongodb.database,
                "Storage: MongoDB ledger store"
            );
            let store = MongoLedgerStore::connect(&config.mongodb.uri, &config.mongodb.database)
                .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb"))]
        StorageType::Mongodb => {
            error!("MongoDB storage requested but 'mongodb' feature is not enabled");
            Err(StorageError::Unavailable(
                "mongodb feature not enabled".to_string(),
            ))
        }
    }
}
