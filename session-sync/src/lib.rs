//! Session synchronization core
//!
//! Keeps a single open workbench session's local representation consistent
//! with server-side state that can change asynchronously (a model finishing
//! a response, another client editing the same session), while persisting
//! locally-issued edits without overwhelming the network and in the correct
//! order relative to other user actions.
//!
//! # Overview
//!
//! The library provides:
//! - `WriteBackQueue` - coalesces keystroke-rate edits into one write per
//!   flush window, last value wins
//! - `SessionMonitor` - one streaming connection per session, with a
//!   four-state lifecycle and capped exponential reconnect backoff
//! - `SessionController` - composition root wiring the two together:
//!   edits enqueue, dependent actions flush first, change notifications
//!   trigger a refetch
//! - `PersistenceTransport` / `ChangeStream` / `ChangeStreamConnector` -
//!   the seams a concrete HTTP/WebSocket client plugs into
//!
//! # Example
//!
//! ```ignore
//! use session_sync::{ControllerEvent, SessionController};
//! use shared::SessionId;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = Arc::new(make_client("http://localhost:8080"));
//!     let connector = make_change_connector("http://localhost:8080");
//!     let mut controller = SessionController::new(api, connector);
//!
//!     controller.open(SessionId::from("s-1")).await?;
//!     controller.edit_prompt("Tell me about lighthouses")?;
//!     let response = controller.submit_prompt().await?;
//!     println!("response {} started", response.id);
//!
//!     while let Some(event) = controller.next_event().await {
//!         match event {
//!             ControllerEvent::Updated(session) => {
//!                 println!("{} responses", session.responses.len());
//!             }
//!             ControllerEvent::Connection(state) => {
//!                 println!("connection: {}", state);
//!             }
//!             ControllerEvent::SessionGone => break,
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod controller;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod transport;

// Re-export main types at crate root
pub use backoff::ReconnectDelay;
pub use controller::{ControllerEvent, SessionController, PROMPT_FIELD};
pub use error::SyncError;
pub use monitor::{ConnectionState, MonitorEvent, SessionMonitor};
pub use queue::{WriteBackQueue, DEFAULT_FLUSH_WINDOW};
pub use transport::{ChangeStream, ChangeStreamConnector, PersistenceTransport};
