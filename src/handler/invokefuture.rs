use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::{
    mpsc,
    oneshot::{self, channel as oneshot_channel},
};
use futures::Sink;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use serde_json::Value;

use scriptoxide_types::ResponseFrame;

use crate::error::{IpcError, RemoteError, Result};
use crate::handler::{CallMessage, HandlerMessage};

pin_project! {
    /// Resolves once the response to the call arrived.
    ///
    /// The call is handed to the `IpcHandler` on the first poll.
    #[must_use = "futures do nothing unless polled"]
    pub struct InvokeFuture<T> {
        #[pin]
        rx_response: oneshot::Receiver<Result<ResponseFrame>>,
        #[pin]
        handler_sender: mpsc::Sender<HandlerMessage>,

        message: Option<HandlerMessage>,

        _marker: PhantomData<fn() -> T>
    }
}

impl<T: DeserializeOwned> InvokeFuture<T> {
    pub(crate) fn new(
        channel: String,
        args: Vec<Value>,
        handler_sender: mpsc::Sender<HandlerMessage>,
    ) -> Self {
        let (tx, rx_response) = oneshot_channel();
        let message = Some(HandlerMessage::Call(CallMessage {
            channel,
            args,
            sender: tx,
        }));

        Self {
            rx_response,
            handler_sender,
            message,
            _marker: PhantomData,
        }
    }
}

impl<T> Future for InvokeFuture<T>
where
    T: DeserializeOwned,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        if this.message.is_some() {
            match this.handler_sender.as_mut().poll_ready(cx) {
                Poll::Ready(Err(e)) => Poll::Ready(Err(e.into())),
                Poll::Ready(Ok(_)) => {
                    let message = this.message.take().expect("existence checked above");
                    this.handler_sender.start_send(message)?;

                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
                Poll::Pending => Poll::Pending,
            }
        } else {
            match this.rx_response.as_mut().poll(cx) {
                Poll::Ready(Ok(Ok(response))) => Poll::Ready(into_result(response)),
                Poll::Ready(Ok(Err(e))) => Poll::Ready(Err(e)),
                Poll::Ready(Err(e)) => Poll::Ready(Err(e.into())),
                Poll::Pending => Poll::Pending,
            }
        }
    }
}

/// Fails with the reconstructed error if the error slot is set, deserializes
/// the result otherwise.
pub(crate) fn into_result<T: DeserializeOwned>(response: ResponseFrame) -> Result<T> {
    if let Some(err) = response.error {
        return Err(IpcError::Remote(RemoteError::from(err)));
    }
    Ok(serde_json::from_value(response.result)?)
}
