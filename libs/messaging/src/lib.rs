//! Object-Handle Messaging
//!
//! Routes messages between distributed objects living on different ranks of
//! a rendering cluster. Objects are addressed by a stable [`ObjectHandle`];
//! senders never need to know anything else about the receiving object.
//!
//! ```text
//!  rank-0                                         rank-1
//! ┌──────────────────────┐                      ┌──────────────────────────┐
//! │ object ─ send_to ──┐ │  [handle][payload]   │ delivery loop            │
//! │                    └─┼───── transport ─────>│   └─ registry.resolve ─┐ │
//! │ Dispatcher           │                      │                        ▼ │
//! │   └─ HandlerRegistry │                      │      handler.consume(..) │
//! └──────────────────────┘                      └──────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Fire and forget**: `send_to` returns after hand-off; nothing is
//!   acknowledged.
//! - **Per-destination order**: messages from one rank to one rank arrive in
//!   send order.
//! - **Sequential delivery**: a handler returns before the next message is
//!   routed by the same delivery loop.
//! - **No stale routing**: messages for unregistered handles, or handles
//!   whose owner was dropped, are dropped and counted, never delivered.
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use messaging::{Dispatcher, MessageHandler, MessagingConfig, ObjectHandle};
//! use std::sync::Arc;
//! use transport::{InProcessFabric, Rank};
//!
//! # async fn run() -> messaging::Result<()> {
//! let dispatcher = Dispatcher::new(InProcessFabric::loopback(), MessagingConfig::default())?;
//!
//! let volume: Arc<dyn MessageHandler> = Arc::new(|from: Rank, payload: Bytes| {
//!     println!("{} sent {} bytes", from, payload.len());
//! });
//! let _registration = dispatcher.register_scoped(ObjectHandle::new(42), &volume)?;
//!
//! dispatcher.start()?;
//! dispatcher.send_to(Rank::ZERO, ObjectHandle::new(42), vec![0xAA, 0xBB])?;
//! dispatcher.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod handle;
pub mod handler;
pub mod registration;
pub mod registry;
pub mod router;
pub mod stats;

mod delivery;

pub use config::MessagingConfig;
pub use dispatcher::Dispatcher;
pub use error::{MessagingError, Result};
pub use frame::{FrameError, HANDLE_PREFIX_LEN};
pub use handle::ObjectHandle;
pub use handler::MessageHandler;
pub use registration::Registration;
pub use registry::{HandlerRegistry, Registered, Resolution};
pub use router::DeliveryOutcome;
pub use stats::{DispatchMetrics, DispatchStats};
