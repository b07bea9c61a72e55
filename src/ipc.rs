use std::future::Future;
use std::sync::Arc;

use futures::channel::mpsc::{channel, Sender};
use futures::{FutureExt, SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;

use scriptoxide_types::ResponseFrame;

use crate::config::RendererConfig;
use crate::error::{HandlerError, Result};
use crate::handler::invokefuture::into_result;
use crate::handler::{CallHandler, HandlerMessage, InvokeFuture, IpcEvent, IpcHandler};
use crate::transport::{InboundMessage, Transport};

/// A handle to the call correlation layer of a renderer.
///
/// Every call made through an [`Ipc`] behaves like a single function call
/// across the process boundary: it resolves with the result the other side
/// replied with, or fails with the error it raised.
///
/// The handle is cheap to clone, all state lives in the [`IpcHandler`] which
/// must be polled for any call to make progress.
#[derive(Debug, Clone)]
pub struct Ipc {
    /// The `Sender` to send messages to the handler that owns the pending
    /// calls
    sender: Sender<HandlerMessage>,
    transport: Arc<dyn Transport>,
}

impl Ipc {
    /// Creates a new handle and the handler driving it.
    ///
    /// `inbound` are all messages the transport delivers to this renderer.
    pub fn new<S>(
        transport: Arc<dyn Transport>,
        inbound: S,
        config: &RendererConfig,
    ) -> (Self, IpcHandler)
    where
        S: Stream<Item = InboundMessage> + Send + 'static,
    {
        let (tx, rx) = channel(config.request_capacity());
        let handler = IpcHandler::new(Arc::clone(&transport), rx, inbound.boxed());
        let ipc = Self {
            sender: tx,
            transport,
        };
        (ipc, handler)
    }

    /// Call `channel` with `args` and resolve with the deserialized result.
    ///
    /// Concurrent calls are resolved in whatever order their responses
    /// arrive. A call can't be withdrawn once it was issued; if no response
    /// ever arrives the future never resolves.
    pub fn invoke<T: DeserializeOwned>(
        &self,
        channel: impl Into<String>,
        args: Vec<Value>,
    ) -> InvokeFuture<T> {
        InvokeFuture::new(channel.into(), args, self.sender.clone())
    }

    /// Call `channel` with `args` and block until the host replied.
    ///
    /// # Note
    ///
    /// This blocks the entire thread for the duration of the round trip, no
    /// other renderer work makes progress meanwhile.
    pub fn invoke_sync<T: DeserializeOwned>(&self, channel: &str, args: Vec<Value>) -> Result<T> {
        // synchronous calls carry no request id
        let mut frame = Vec::with_capacity(args.len() + 1);
        frame.push(Value::Null);
        frame.extend(args);

        tracing::debug!("Submit sync call on {}", channel);
        let reply = self.transport.send_sync(channel, frame)?;
        into_result(ResponseFrame::from_args(reply)?)
    }

    /// Register `handler` as the sole responder for calls on `channel`.
    ///
    /// Every inbound call gets exactly one reply: the value the handler
    /// resolved with or the error it failed with.
    pub async fn handle<F, Fut>(&self, channel: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(IpcEvent, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let responder: Arc<CallHandler> =
            Arc::new(move |event: IpcEvent, args: Vec<Value>| handler(event, args).boxed());
        self.sender
            .clone()
            .send(HandlerMessage::Handle(channel.into(), responder))
            .await?;
        Ok(())
    }
}
