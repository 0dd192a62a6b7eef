//! Encore: conversational orchestration engine.
//!
//! Manages multi-turn chat sessions that augment each user message with
//! retrieved reference context, stream a language model's reply while
//! separating its reasoning from visible text, and run the model's tool
//! calls in bounded rounds. Every exchange produces an ordered stream of
//! typed [`StreamEvent`](types::StreamEvent)s.
//!
//! # Quick Start
//!
//! ```no_run
//! use encore::prelude::*;
//! use futures::StreamExt;
//!
//! # async fn example() -> encore::error::Result<()> {
//! let service = ChatService::from_config(EncoreConfig::load()?)?;
//! service.start().await;
//!
//! let mut events = service
//!     .send_stream("session-1", "What makes a tritone unstable?", SendOptions::default())
//!     .await?;
//! while let Some(event) = events.next().await {
//!     if let StreamEvent::Token { text } = event? {
//!         print!("{text}");
//!     }
//! }
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod conversation;
pub mod error;
pub mod model;
pub mod prelude;
pub mod prompt;
pub mod retrieval;
pub mod service;
pub mod session;
pub mod thinking;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
