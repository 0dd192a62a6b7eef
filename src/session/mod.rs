//! Session registry with idle-based eviction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bridge::EventStream;
use crate::conversation::{Conversation, Pipeline};
use crate::error::{EncoreError, Result};
use crate::tools::Artifact;
use crate::types::{Message, SendOptions, StreamEvent};

/// One user's dialogue. Exchanges on a session never overlap: a second
/// concurrent send is rejected with [`EncoreError::SessionBusy`].
#[derive(Debug)]
pub struct Session {
    id: String,
    conversation: Arc<tokio::sync::Mutex<Conversation>>,
    pipeline: Pipeline,
    pending_summary: Mutex<Option<String>>,
    committed: Mutex<Committed>,
    created_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
}

/// Copy of the conversation state as of the last commit.
#[derive(Debug, Default)]
struct Committed {
    history: Vec<Message>,
    artifacts: Vec<Artifact>,
}

impl Session {
    pub fn new(id: impl Into<String>, pipeline: Pipeline) -> Self {
        let id = id.into();
        Self {
            conversation: Arc::new(tokio::sync::Mutex::new(Conversation::new(
                id.clone(),
                pipeline.clone(),
            ))),
            id,
            pipeline,
            pending_summary: Mutex::new(None),
            committed: Mutex::new(Committed::default()),
            created_at: Utc::now(),
            last_access: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Mark the session as used now.
    pub fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    }

    /// Time since the last touch.
    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .elapsed()
    }

    /// Whether an exchange currently holds the conversation.
    pub fn is_busy(&self) -> bool {
        self.conversation.try_lock().is_err()
    }

    /// Context to append to the system prompt of the next exchange only.
    pub fn set_context_summary(&self, summary: impl Into<String>) {
        *self.pending_summary.lock().unwrap_or_else(|p| p.into_inner()) = Some(summary.into());
    }

    pub fn has_context_summary(&self) -> bool {
        self.pending_summary
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    fn take_context_summary(&self) -> Option<String> {
        self.pending_summary
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    fn publish(&self, conversation: &Conversation) {
        *self.committed.lock().unwrap_or_else(|p| p.into_inner()) = Committed {
            history: conversation.history(),
            artifacts: conversation.artifacts().to_vec(),
        };
    }

    fn lock_for_exchange(&self) -> Result<tokio::sync::OwnedMutexGuard<Conversation>> {
        self.conversation
            .clone()
            .try_lock_owned()
            .map_err(|_| EncoreError::SessionBusy(self.id.clone()))
    }

    /// Attach the pending summary unless the caller supplied one.
    fn prepare_options(&self, mut options: SendOptions) -> SendOptions {
        let pending = self.take_context_summary();
        if options.context_summary.is_none() {
            options.context_summary = pending;
        }
        options
    }

    /// Start a streamed exchange. Events arrive on the returned stream,
    /// which ends normally once history is committed.
    pub fn send_stream(
        self: &Arc<Self>,
        message: impl Into<String>,
        options: SendOptions,
    ) -> Result<EventStream<StreamEvent>> {
        let conversation = self.lock_for_exchange()?;
        self.touch();
        let options = self.prepare_options(options);
        let message = message.into();
        let session = Arc::clone(self);

        Ok(self.pipeline.bridge().spawn(move |sink| async move {
            let mut conversation = conversation;
            let result = conversation.send_stream(&message, &options, &sink).await;
            if result.is_ok() {
                session.publish(&conversation);
            }
            drop(conversation);
            session.touch();
            if let Err(err) = &result {
                tracing::debug!(session = %session.id, error = %err, "exchange ended without commit");
            }
            result.map(|_| ())
        }))
    }

    /// Run an exchange to completion and return the final text.
    pub async fn send(&self, message: &str, options: SendOptions) -> Result<String> {
        let mut conversation = self.lock_for_exchange()?;
        self.touch();
        let options = self.prepare_options(options);
        let result = conversation.send(message, &options).await;
        if result.is_ok() {
            self.publish(&conversation);
        }
        self.touch();
        result
    }

    /// Clear history. Rejected while an exchange is running.
    pub fn reset(&self) -> Result<()> {
        let mut conversation = self.lock_for_exchange()?;
        conversation.reset();
        self.publish(&conversation);
        self.take_context_summary();
        self.touch();
        Ok(())
    }

    /// Committed history. A running exchange is not waited for; its turn
    /// appears once it commits.
    pub async fn history(&self) -> Vec<Message> {
        self.touch();
        self.committed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .history
            .clone()
    }

    /// Artifacts of the most recent committed exchange.
    pub async fn artifacts(&self) -> Vec<Artifact> {
        self.committed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .artifacts
            .clone()
    }
}

/// Shortest period the sweeper runs at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Map of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    pipeline: Pipeline,
}

impl SessionStore {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pipeline,
        }
    }

    /// Existing session for `id`, or a new one. Touches the session.
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.get(id).await {
            return session;
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session = %id, "creating session");
                Arc::new(Session::new(id, self.pipeline.clone()))
            })
            .clone();
        session.touch();
        session
    }

    /// Existing session for `id`. Touches the session.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        session.touch();
        Some(session)
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    /// Remove sessions idle longer than `max_age`. Sessions with a running
    /// exchange are kept. Returns the number removed.
    pub async fn cleanup_stale(&self, max_age: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_busy() || session.idle_for() <= max_age);
        before - sessions.len()
    }

    /// Run [`cleanup_stale`](Self::cleanup_stale) every `interval` on a
    /// background task. Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> SweeperHandle {
        if interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                "sweep interval too short; using minimum"
            );
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let store = Arc::clone(self);
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.cleanup_stale(max_age).await;
                        if removed > 0 {
                            let remaining = store.len().await;
                            tracing::info!(removed, remaining, "evicted idle sessions");
                        }
                    }
                }
            }
        });
        SweeperHandle { token, handle }
    }
}

/// Running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "session sweeper exited abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
