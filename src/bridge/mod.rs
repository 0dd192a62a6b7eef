//! Relay of producer events to an async consumer.
//!
//! An exchange is written as straight-line logic that emits events as it
//! goes. [`EventBridge`] runs that logic on its own task and hands the caller
//! an [`EventStream`] that yields the events in production order, followed by
//! either normal end of stream or one terminal error.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{FutureExt, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{EncoreError, Result};

/// Default queue capacity between producer and consumer.
pub const DEFAULT_CAPACITY: usize = 64;

/// Item carried by the bridge channel.
#[derive(Debug)]
pub enum Relay<T> {
    Event(T),
    /// Producer completed normally.
    Finished,
    /// Producer failed; always the last item.
    Failed(EncoreError),
}

/// Spawns producers and wires them to consumer streams.
#[derive(Debug, Clone, Copy)]
pub struct EventBridge {
    capacity: usize,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBridge {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn channel<T>(&self) -> (EventSink<T>, mpsc::Sender<Relay<T>>, mpsc::Receiver<Relay<T>>, CancellationToken) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let token = CancellationToken::new();
        let sink = EventSink {
            tx: tx.clone(),
            token: token.clone(),
        };
        (sink, tx, rx, token)
    }

    /// Run an async producer on a new task.
    pub fn spawn<T, F, Fut>(&self, producer: F) -> EventStream<T>
    where
        T: Send + 'static,
        F: FnOnce(EventSink<T>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (sink, tx, rx, token) = self.channel();
        let fut = producer(sink);
        let handle = tokio::spawn(async move {
            let terminal = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => terminal_relay(result),
                Err(panic) => Relay::Failed(panic_error(panic)),
            };
            let _ = tx.send(terminal).await;
        });
        EventStream::new(rx, token, handle)
    }

    /// Run a synchronous producer on the blocking pool.
    pub fn spawn_blocking<T, F>(&self, producer: F) -> EventStream<T>
    where
        T: Send + 'static,
        F: FnOnce(EventSink<T>) -> Result<()> + Send + 'static,
    {
        let (sink, tx, rx, token) = self.channel();
        let handle = tokio::task::spawn_blocking(move || {
            let terminal = match std::panic::catch_unwind(AssertUnwindSafe(|| producer(sink))) {
                Ok(result) => terminal_relay(result),
                Err(panic) => Relay::Failed(panic_error(panic)),
            };
            let _ = tx.blocking_send(terminal);
        });
        EventStream::new(rx, token, handle)
    }
}

fn terminal_relay<T>(result: Result<()>) -> Relay<T> {
    match result {
        Ok(()) => Relay::Finished,
        Err(err) => Relay::Failed(err),
    }
}

fn panic_error(panic: Box<dyn Any + Send>) -> EncoreError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::warn!(%message, "event producer panicked");
    EncoreError::Stream(format!("producer panicked: {message}"))
}

/// Producer-side handle.
pub struct EventSink<T> {
    tx: mpsc::Sender<Relay<T>>,
    token: CancellationToken,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> std::fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T> EventSink<T> {
    /// Send an event, waiting while the queue is full.
    pub async fn emit(&self, event: T) -> Result<()> {
        if self.is_cancelled() {
            return Err(EncoreError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(EncoreError::Cancelled),
            sent = self.tx.send(Relay::Event(event)) => sent.map_err(|_| EncoreError::Cancelled),
        }
    }

    /// Send an event from a blocking context. Must not be called from
    /// within an async task.
    pub fn blocking_emit(&self, event: T) -> Result<()> {
        if self.is_cancelled() {
            return Err(EncoreError::Cancelled);
        }
        self.tx
            .blocking_send(Relay::Event(event))
            .map_err(|_| EncoreError::Cancelled)
    }

    /// Safe stopping point: errors once the consumer has gone away.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(EncoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once the consumer cancels or goes away.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = self.tx.closed() => {}
        }
    }
}

/// Consumer-side stream of producer events.
///
/// Dropping the stream cancels the producer, which stops at its next
/// checkpoint. Use [`EventStream::close`] to also wait for it to finish.
pub struct EventStream<T> {
    rx: mpsc::Receiver<Relay<T>>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    done: bool,
}

impl<T> EventStream<T> {
    fn new(rx: mpsc::Receiver<Relay<T>>, token: CancellationToken, handle: JoinHandle<()>) -> Self {
        Self {
            rx,
            token,
            handle: Some(handle),
            done: false,
        }
    }

    /// Ask the producer to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the producer and wait for its task to exit.
    pub async fn close(mut self) -> Result<()> {
        self.token.cancel();
        self.rx.close();
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| EncoreError::Stream(format!("producer task failed: {e}"))),
            None => Ok(()),
        }
    }
}

impl<T> Unpin for EventStream<T> {}

impl<T> Stream for EventStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Relay::Event(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Relay::Finished)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Relay::Failed(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.done = true;
                if this.token.is_cancelled() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Err(EncoreError::Stream(
                        "event producer exited without completing".into(),
                    ))))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("done", &self.done)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
