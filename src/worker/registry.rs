use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::classify::Failure;
use crate::error::{BridgeError, BridgeResult};

/// Framework job reconstructed from an envelope on the worker side
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Class name the envelope was dispatched to
    pub class_name: String,

    /// Original framework job id (the backend id when absent)
    pub job_id: String,

    /// Backend-assigned id of the envelope being executed
    pub provider_job_id: Option<String>,

    /// Original queue name when carried in metadata, else the resolved one
    pub queue: String,

    pub args: Vec<Value>,

    /// Number of previous executions
    pub executions: u32,

    pub locale: Option<String>,
}

/// Handler invoked to execute a dispatched job
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn perform(&self, job: JobContext) -> Result<(), Failure>;
}

/// Explicit class-name → handler registry, populated at startup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a class name. Registering the same name
    /// twice is an error.
    pub fn register(
        &mut self,
        class_name: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> BridgeResult<()> {
        let class_name = class_name.into();
        if self.handlers.contains_key(&class_name) {
            return Err(BridgeError::Internal(format!(
                "handler '{class_name}' already registered"
            )));
        }
        self.handlers.insert(class_name, handler);
        Ok(())
    }

    pub fn resolve(&self, class_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(class_name).cloned()
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.handlers.contains_key(class_name)
    }

    pub fn registered_classes(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}
