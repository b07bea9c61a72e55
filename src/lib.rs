//! Renderer side plumbing for browser extensions.
//!
//! - [`Injector`] maps the content scripts of extensions onto the document of
//!   a frame and runs them inside one isolated world per extension.
//! - [`Ipc`] gives every call to the host process the semantics of a function
//!   call on top of a transport that only passes named messages. The
//!   [`IpcHandler`] owns the correlation state and has to be polled.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use futures::StreamExt;
//! # use scriptoxide::{Ipc, RendererConfig};
//! # use scriptoxide::transport::{InboundMessage, Transport};
//! # async fn run(transport: Arc<dyn Transport>, inbound: futures::channel::mpsc::UnboundedReceiver<InboundMessage>) -> scriptoxide::error::Result<()> {
//! let (ipc, mut handler) = Ipc::new(transport, inbound, &RendererConfig::default());
//! async_std::task::spawn(async move { while let Some(_unhandled) = handler.next().await {} });
//!
//! let prefs: Vec<String> = ipc.invoke("GET_PREFERENCES", vec![]).await?;
//! # Ok(())
//! # }
//! ```

pub use scriptoxide_types as types;

pub use crate::config::RendererConfig;
pub use crate::handler::{IpcEvent, IpcHandler};
pub use crate::injector::Injector;
pub use crate::ipc::Ipc;

pub mod config;
pub mod error;
pub mod handler;
pub mod injector;
pub mod ipc;
pub mod transport;
