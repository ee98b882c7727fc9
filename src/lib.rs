//! Skill-Sharing Talk Server Library
//!
//! An HTTP server for proposing talks and commenting on them, with
//! long-polling change notification.
//!
//! # Features
//! - Create, replace, fetch and delete talks by title
//! - Append comments to a talk
//! - Conditional `GET /talks` with ETag versions and `Prefer: wait=N`
//!   long polling
//! - JSON file persistence with a bounded write cadence
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `TalkServer` is the central actor owning the store, the version
//!   counter and the waiter registry
//! - axum handlers talk to it through a cloneable `ServerHandle`
//! - a `Persister` task writes snapshots to disk in the background
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use skillshare_server::{handler, ServerHandle, TalkStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8000").await.unwrap();
//!     let server = ServerHandle::spawn(TalkStore::new(), None);
//!
//!     handler::serve(listener, server, std::future::pending()).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod persistence;
pub mod server;
pub mod store;
pub mod talk;
pub mod types;
pub mod waiter;

// Re-export main types for convenience
pub use config::Config;
pub use error::AppError;
pub use handler::{router, serve};
pub use message::{CommentInput, TalkInput};
pub use persistence::{PersistHandle, PersistPolicy};
pub use server::{ServerCommand, ServerHandle, TalkServer};
pub use store::{PutOutcome, TalkStore};
pub use talk::{Comment, Talk};
pub use types::{Version, WaiterId};
pub use waiter::{Snapshot, WaitOutcome, WaiterRegistry};
