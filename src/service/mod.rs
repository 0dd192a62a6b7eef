//! Process-scoped entry point owning sessions and their sweeper.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bridge::EventStream;
use crate::config::EncoreConfig;
use crate::conversation::Pipeline;
use crate::error::{EncoreError, Result};
use crate::model::OllamaClient;
use crate::session::{Session, SessionStore, SweeperHandle};
use crate::tools::Artifact;
use crate::types::{Message, SendOptions, StreamEvent};

/// Transport-facing chat surface. Construct once per process, call
/// [`start`](Self::start) to begin idle-session eviction and
/// [`shutdown`](Self::shutdown) before exit.
#[derive(Debug)]
pub struct ChatService {
    store: Arc<SessionStore>,
    pipeline: Pipeline,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl ChatService {
    /// Fails when the pipeline's configuration does not validate.
    pub fn new(pipeline: Pipeline) -> Result<Self> {
        pipeline.config().validate()?;
        Ok(Self {
            store: Arc::new(SessionStore::new(pipeline.clone())),
            pipeline,
            sweeper: Mutex::new(None),
        })
    }

    /// Service backed by Ollama, with no retrieval index and no tools.
    pub fn from_config(config: EncoreConfig) -> Result<Self> {
        let model = OllamaClient::new(config.ollama_base_url.clone(), config.model.clone());
        Self::new(Pipeline::new(Arc::new(model), config))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Fresh random session id.
    pub fn new_session_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Start the idle-session sweeper. Calling again while running is a no-op.
    pub async fn start(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.as_ref().is_some_and(|s| !s.is_finished()) {
            return;
        }
        let config = self.pipeline.config();
        tracing::debug!(
            interval_secs = config.sweep_interval_secs,
            max_age_secs = config.session_max_age_secs,
            "starting session sweeper"
        );
        *sweeper = Some(
            self.store
                .spawn_sweeper(config.sweep_interval(), config.session_max_age()),
        );
    }

    /// Stop the sweeper and drop every session.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.shutdown().await;
        }
        self.store.clear().await;
    }

    pub async fn is_running(&self) -> bool {
        self.sweeper
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }

    pub async fn session(&self, session_id: &str) -> Arc<Session> {
        self.store.get_or_create(session_id).await
    }

    /// Start a streamed exchange on `session_id`, creating the session if new.
    pub async fn send_stream(
        &self,
        session_id: &str,
        message: impl Into<String>,
        options: SendOptions,
    ) -> Result<EventStream<StreamEvent>> {
        self.session(session_id).await.send_stream(message, options)
    }

    pub async fn send(&self, session_id: &str, message: &str, options: SendOptions) -> Result<String> {
        self.session(session_id).await.send(message, options).await
    }

    /// Clear a session's history. Unknown ids are a no-op.
    pub async fn reset(&self, session_id: &str) -> Result<()> {
        match self.store.get(session_id).await {
            Some(session) => session.reset(),
            None => Ok(()),
        }
    }

    /// Committed history; empty for unknown ids.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        match self.store.get(session_id).await {
            Some(session) => session.history().await,
            None => Vec::new(),
        }
    }

    pub async fn set_context_summary(&self, session_id: &str, summary: impl Into<String>) {
        self.session(session_id).await.set_context_summary(summary);
    }

    pub async fn artifacts(&self, session_id: &str) -> Vec<Artifact> {
        match self.store.get(session_id).await {
            Some(session) => session.artifacts().await,
            None => Vec::new(),
        }
    }

    /// Remove a session outright.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        match self.store.get(session_id).await {
            Some(session) if session.is_busy() => Err(EncoreError::SessionBusy(session_id.to_string())),
            Some(_) => {
                self.store.remove(session_id).await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}
