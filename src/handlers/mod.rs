//! Job handlers: the work a job type performs, behind one trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::execution::JobExecution;
use crate::models::job::{JobType, ScheduleJob};
use crate::services::collector::{CollectorError, MarketCollector};

pub mod backup;
pub mod collection;
pub mod placeholder;

pub use backup::{BackupHandler, BackupSettings};
pub use collection::{OrderCollectionHandler, ProductCollectionHandler};
pub use placeholder::NotImplementedHandler;

/// Work performed for one job type.
///
/// The returned value is stored verbatim as the execution's `result_summary`.
/// Returning an error marks the execution failed and bumps the job's error
/// counter, so handlers should not swallow errors they want surfaced.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(
        &self,
        job: &ScheduleJob,
        execution: &JobExecution,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Table of handlers keyed by job type, filled once at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard handler set.
    ///
    /// `ShipmentSync` and `ReturnSync` are deliberately left unregistered;
    /// jobs of those types fail with [`HandlerError::NotRegistered`].
    pub fn with_defaults(collector: Arc<dyn MarketCollector>, backup: BackupSettings) -> Self {
        let mut registry = Self::new();
        registry.register(
            JobType::ProductCollection,
            ProductCollectionHandler::new(collector.clone()),
        );
        registry.register(
            JobType::OrderCollection,
            OrderCollectionHandler::new(collector),
        );
        registry.register(JobType::InventorySync, NotImplementedHandler);
        registry.register(JobType::PriceUpdate, NotImplementedHandler);
        registry.register(JobType::DatabaseBackup, BackupHandler::new(backup));
        registry.register(JobType::ReportGeneration, NotImplementedHandler);
        registry
    }

    pub fn register(&mut self, job_type: JobType, handler: impl JobHandler + 'static) {
        self.handlers.insert(job_type, Arc::new(handler));
    }

    pub fn get(&self, job_type: JobType) -> Result<Arc<dyn JobHandler>, HandlerError> {
        self.handlers
            .get(&job_type)
            .cloned()
            .ok_or(HandlerError::NotRegistered(job_type))
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// Look up the job's handler and run it.
    pub async fn invoke(
        &self,
        job: &ScheduleJob,
        execution: &JobExecution,
    ) -> Result<serde_json::Value, HandlerError> {
        let handler = self.get(job.job_type)?;
        handler.run(job, execution).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("No handler registered for job type {0}")]
    NotRegistered(JobType),

    #[error("Collection failed for market {market}: {source}")]
    Collector {
        market: String,
        #[source]
        source: CollectorError,
    },

    #[error("Backup failed: {0}")]
    Backup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
