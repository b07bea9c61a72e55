use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use fnv::FnvHashMap;
use futures::channel::mpsc::Receiver;
use futures::channel::oneshot::Sender as OneshotSender;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Fuse, FusedStream, FuturesUnordered, Stream, StreamExt};
use futures::task::{Context, Poll};
use futures::FutureExt;
use serde_json::Value;

use scriptoxide_types::{
    response_channel, sync_response_channel, RequestFrame, RequestId, ResponseFrame,
};

use crate::error::{HandlerError, Result};
use crate::transport::{InboundMessage, Transport};

pub use invokefuture::InvokeFuture;

pub(crate) mod invokefuture;

/// A registered responder for inbound calls on a channel.
pub type CallHandler =
    dyn Fn(IpcEvent, Vec<Value>) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync;

/// Describes the inbound call a [`CallHandler`] is invoked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcEvent {
    /// The channel the call arrived on
    pub channel: String,
    /// The web contents that issued the call, if known
    pub sender_id: Option<u64>,
    /// Identifier of the call, the reply is sent on
    /// `<channel>_RESPONSE_<request_id>`.
    ///
    /// Synchronous calls carry no identifier, they are answered on
    /// `<channel>_RESPONSE_null`.
    pub request_id: Option<RequestId>,
}

/// The handler that owns all the correlation state of a renderer and drives
/// outgoing calls and inbound requests.
///
/// It hands out request ids, keeps track of every call that still awaits its
/// response and runs the registered [`CallHandler`]s. All of this state is
/// confined to the task polling the handler.
///
/// Inbound messages that are neither a response to a pending call nor a call
/// on a handled channel are yielded by the stream.
#[must_use = "streams do nothing unless polled"]
pub struct IpcHandler {
    transport: Arc<dyn Transport>,
    /// Messages from the `Ipc` handles
    from_client: Fuse<Receiver<HandlerMessage>>,
    /// Messages delivered by the transport
    inbound: Fuse<BoxStream<'static, InboundMessage>>,
    /// Calls awaiting their response, keyed by the response channel
    pending_calls: FnvHashMap<String, PendingCall>,
    /// The sole responder per channel
    handlers: FnvHashMap<String, Arc<CallHandler>>,
    /// Replies of handlers that are still running
    in_flight: FuturesUnordered<BoxFuture<'static, Reply>>,
    /// The value of the last handed out request id
    last_request_id: u64,
}

impl IpcHandler {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        from_client: Receiver<HandlerMessage>,
        inbound: BoxStream<'static, InboundMessage>,
    ) -> Self {
        Self {
            transport,
            from_client: from_client.fuse(),
            inbound: inbound.fuse(),
            pending_calls: Default::default(),
            handlers: Default::default(),
            in_flight: FuturesUnordered::new(),
            last_request_id: 0,
        }
    }

    /// Number of calls that are still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.pending_calls.len()
    }

    /// Whether a handler is registered for `channel`
    pub fn is_handled(&self, channel: &str) -> bool {
        self.handlers.contains_key(channel)
    }

    /// The next identifier, the first one is `1`.
    fn next_request_id(&mut self) -> RequestId {
        self.last_request_id += 1;
        RequestId::new(self.last_request_id)
    }

    /// Register a listener for the response and send the request frame.
    ///
    /// Once the transport stopped delivering, nothing could resolve the call
    /// and it fails right away.
    fn submit_call(&mut self, msg: CallMessage, now: Instant) {
        if self.inbound.is_terminated() {
            tracing::debug!("Inbound closed, failing call on {}", msg.channel);
            // dropping the sender cancels the call
            return;
        }
        let id = self.next_request_id();
        let response = response_channel(&msg.channel, id);
        tracing::debug!("Submit call {} on {}", id, msg.channel);

        self.pending_calls.insert(
            response.clone(),
            PendingCall {
                id,
                sender: msg.sender,
                issued: now,
            },
        );

        let frame = RequestFrame::new(msg.channel, id, msg.args);
        let channel = frame.channel.clone();
        if let Err(err) = self.transport.send(&channel, frame.into_args()) {
            if let Some(call) = self.pending_calls.remove(&response) {
                let _ = call.sender.send(Err(err.into()));
            }
        }
    }

    /// Replaces any handler previously registered for the channel.
    fn register_handler(&mut self, channel: String, handler: Arc<CallHandler>) {
        if self.handlers.insert(channel.clone(), handler).is_some() {
            tracing::debug!("Replaced handler for {}", channel);
        } else {
            tracing::debug!("Handling calls on {}", channel);
        }
    }

    /// Process a message received from the transport.
    ///
    /// Returns the message back if nothing here was waiting for it.
    fn on_inbound(&mut self, msg: InboundMessage) -> Option<InboundMessage> {
        // the first message on a response channel resolves the call, the
        // listener is gone afterwards
        if let Some(call) = self.pending_calls.remove(&msg.channel) {
            tracing::trace!(
                "Received response to {} after {:?}",
                call.id,
                call.issued.elapsed()
            );
            let resp = ResponseFrame::from_args(msg.args).map_err(Into::into);
            let _ = call.sender.send(resp);
            return None;
        }

        if let Some(handler) = self.handlers.get(&msg.channel) {
            let InboundMessage {
                channel,
                sender_id,
                mut args,
            } = msg;
            let call = if args.first() == Some(&Value::Null) {
                args.remove(0);
                Ok((None, args))
            } else {
                RequestFrame::from_args(channel.clone(), args)
                    .map(|frame| (Some(frame.id), frame.args))
            };
            match call {
                Ok((request_id, args)) => {
                    let reply_channel = match request_id {
                        Some(id) => response_channel(&channel, id),
                        None => sync_response_channel(&channel),
                    };
                    tracing::debug!("Dispatch call {:?} on {}", request_id, channel);
                    let event = IpcEvent {
                        channel,
                        sender_id,
                        request_id,
                    };
                    let fut = (**handler)(event, args);
                    self.in_flight.push(
                        async move {
                            let frame = match fut.await {
                                Ok(result) => ResponseFrame::ok(result),
                                Err(err) => {
                                    tracing::debug!("Call handler failed: {}", err);
                                    ResponseFrame::err(err.into())
                                }
                            };
                            Reply {
                                channel: reply_channel,
                                frame,
                            }
                        }
                        .boxed(),
                    );
                }
                Err(err) => {
                    tracing::warn!("Dropping malformed call on {}: {}", channel, err);
                }
            }
            return None;
        }

        Some(msg)
    }

    /// Send the settled reply of a handler back to the caller.
    fn send_reply(&mut self, reply: Reply) {
        let args = match reply.frame.into_args() {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!("Failed to serialize reply on {}: {}", reply.channel, err);
                return;
            }
        };
        if let Err(err) = self.transport.send(&reply.channel, args) {
            tracing::warn!("Failed to send reply on {}: {}", reply.channel, err);
        }
    }
}

impl Stream for IpcHandler {
    type Item = InboundMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let pin = self.get_mut();

        loop {
            let now = Instant::now();
            // temporary pinning of the receivers is fine since both are fused
            // and `Unpin`
            while let Poll::Ready(Some(msg)) = Pin::new(&mut pin.from_client).poll_next(cx) {
                match msg {
                    HandlerMessage::Call(msg) => pin.submit_call(msg, now),
                    HandlerMessage::Handle(channel, handler) => {
                        pin.register_handler(channel, handler)
                    }
                }
            }

            while let Poll::Ready(Some(reply)) = pin.in_flight.poll_next_unpin(cx) {
                pin.send_reply(reply);
            }

            match Pin::new(&mut pin.inbound).poll_next(cx) {
                Poll::Ready(Some(msg)) => {
                    if let Some(msg) = pin.on_inbound(msg) {
                        return Poll::Ready(Some(msg));
                    }
                }
                Poll::Ready(None) => {
                    // nothing can resolve the pending calls anymore, dropping
                    // their senders fails them
                    pin.pending_calls.clear();
                    if pin.from_client.is_terminated() && pin.in_flight.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Pending;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl fmt::Debug for IpcHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcHandler")
            .field("transport", &self.transport)
            .field("pending_calls", &self.pending_calls.len())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("in_flight", &self.in_flight.len())
            .field("last_request_id", &self.last_request_id)
            .finish()
    }
}

/// A call that was sent and awaits its response.
#[derive(Debug)]
struct PendingCall {
    id: RequestId,
    sender: OneshotSender<Result<ResponseFrame>>,
    /// Time the call was issued
    issued: Instant,
}

/// The settled result of a [`CallHandler`] and where it goes.
#[derive(Debug)]
struct Reply {
    channel: String,
    frame: ResponseFrame,
}

/// An outgoing call issued by an `Ipc` handle.
#[derive(Debug)]
pub(crate) struct CallMessage {
    pub channel: String,
    pub args: Vec<Value>,
    pub sender: OneshotSender<Result<ResponseFrame>>,
}

/// Messages used internally to communicate with the handler
pub(crate) enum HandlerMessage {
    Call(CallMessage),
    Handle(String, Arc<CallHandler>),
}

impl fmt::Debug for HandlerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerMessage::Call(msg) => f.debug_tuple("Call").field(msg).finish(),
            HandlerMessage::Handle(channel, _) => f.debug_tuple("Handle").field(channel).finish(),
        }
    }
}
