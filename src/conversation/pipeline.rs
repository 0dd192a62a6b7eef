//! Collaborators shared by every conversation.

use std::sync::Arc;

use crate::bridge::EventBridge;
use crate::config::EncoreConfig;
use crate::model::ModelClient;
use crate::retrieval::{NoRetriever, Retriever};
use crate::tools::ToolRegistry;

/// Model, retriever, tools and configuration, cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) model: Arc<dyn ModelClient>,
    pub(crate) retriever: Arc<dyn Retriever>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) config: Arc<EncoreConfig>,
}

impl Pipeline {
    /// Pipeline with no retrieval index and no tools.
    pub fn new(model: Arc<dyn ModelClient>, config: EncoreConfig) -> Self {
        Self {
            model,
            retriever: Arc::new(NoRetriever),
            tools: Arc::new(ToolRegistry::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn model(&self) -> &Arc<dyn ModelClient> {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &EncoreConfig {
        &self.config
    }

    /// Bridge sized by the configured event queue capacity.
    pub fn bridge(&self) -> EventBridge {
        EventBridge::new(self.config.event_queue_capacity)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("model", &self.model.model_id())
            .field("tools", &self.tools)
            .finish()
    }
}
