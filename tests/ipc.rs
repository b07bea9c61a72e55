use std::sync::Arc;

use futures::channel::mpsc::unbounded;
use futures::StreamExt;
use serde_json::{json, Value};

use scriptoxide::error::{HandlerError, IpcError};
use scriptoxide::transport::InboundMessage;
use scriptoxide::types::{response_channel, RequestFrame, RequestId, SerializedError};
use scriptoxide::{Ipc, IpcEvent, RendererConfig};

mod common;
use common::{spawn_handler, TestTransport};

#[async_std::test]
async fn invoke_resolves_with_handler_result() {
    let (inbound_tx, inbound_rx) = unbounded();
    let transport = Arc::new(TestTransport::loopback(inbound_tx));
    let (ipc, handler) = Ipc::new(transport, inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    ipc.handle("ADD", |_event: IpcEvent, args: Vec<Value>| async move {
        let a: i64 = serde_json::from_value(args[0].clone())?;
        let b: i64 = serde_json::from_value(args[1].clone())?;
        Ok::<_, HandlerError>(json!(a + b))
    })
    .await
    .unwrap();

    let sum: i64 = ipc.invoke("ADD", vec![json!(40), json!(2)]).await.unwrap();
    assert_eq!(sum, 42);
}

#[async_std::test]
async fn invoke_rejects_with_handler_error() {
    let (inbound_tx, inbound_rx) = unbounded();
    let transport = Arc::new(TestTransport::loopback(inbound_tx));
    let (ipc, handler) = Ipc::new(transport, inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    ipc.handle("FAIL", |_, _| async {
        Err::<Value, _>(
            HandlerError::new("nope")
                .with_name("RangeError")
                .with_stack("at fail (handler.js:1:1)"),
        )
    })
    .await
    .unwrap();

    match ipc.invoke::<Value>("FAIL", vec![]).await {
        Err(IpcError::Remote(err)) => {
            assert_eq!(err.message(), "nope");
            assert_eq!(err.name(), Some("RangeError"));
            assert_eq!(err.stack(), Some("at fail (handler.js:1:1)"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[async_std::test]
async fn out_of_order_responses_resolve_their_own_call() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (ipc, handler) = Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    let first = ipc.invoke::<String>("ECHO", vec![json!("one")]);
    let second = ipc.invoke::<String>("ECHO", vec![json!("two")]);

    let host = async {
        let mut frames = Vec::new();
        for _ in 0..2 {
            let (channel, args) = outgoing.next().await.unwrap();
            frames.push(RequestFrame::from_args(channel, args).unwrap());
        }
        assert_eq!(frames[0].id, RequestId::new(1));
        assert_eq!(frames[1].id, RequestId::new(2));

        // answer the later request first
        for frame in frames.into_iter().rev() {
            let reply = format!("{}!", frame.args[0].as_str().unwrap());
            inbound_tx
                .unbounded_send(InboundMessage::new(
                    response_channel(&frame.channel, frame.id),
                    vec![Value::Null, json!(reply)],
                ))
                .unwrap();
        }
    };

    let (first, second, ()) = futures::join!(first, second, host);
    assert_eq!(first.unwrap(), "one!");
    assert_eq!(second.unwrap(), "two!");
}

#[async_std::test]
async fn request_ids_keep_increasing() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (ipc, handler) = Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    for expected in 1..=3u64 {
        let call = ipc.invoke::<u64>("PING", vec![]);
        let host = async {
            let (channel, args) = outgoing.next().await.unwrap();
            assert_eq!(channel, "PING");
            let frame = RequestFrame::from_args(channel, args).unwrap();
            assert_eq!(frame.id.get(), expected);
            inbound_tx
                .unbounded_send(InboundMessage::new(
                    format!("PING_RESPONSE_{}", expected),
                    vec![Value::Null, json!(expected)],
                ))
                .unwrap();
        };
        let (resp, ()) = futures::join!(call, host);
        assert_eq!(resp.unwrap(), expected);
    }
}

#[async_std::test]
async fn handler_replies_once_on_response_channel() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (ipc, handler) = Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    ipc.handle("GREET", |event: IpcEvent, args: Vec<Value>| async move {
        assert_eq!(event.sender_id, Some(3));
        assert_eq!(event.request_id, Some(RequestId::new(5)));
        Ok::<_, HandlerError>(json!(format!(
            "hello {}",
            args[0].as_str().unwrap_or_default()
        )))
    })
    .await
    .unwrap();

    inbound_tx
        .unbounded_send(InboundMessage::new("GREET", vec![json!(5), json!("host")]).with_sender(3))
        .unwrap();

    let (channel, args) = outgoing.next().await.unwrap();
    assert_eq!(channel, "GREET_RESPONSE_5");
    assert_eq!(args, vec![Value::Null, json!("hello host")]);
}

#[async_std::test]
async fn handler_errors_are_serialized() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (ipc, handler) = Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    ipc.handle("BROKEN", |_, _| async {
        Err::<Value, _>(HandlerError::new("broken").with_name("TypeError"))
    })
    .await
    .unwrap();

    inbound_tx
        .unbounded_send(InboundMessage::new("BROKEN", vec![json!(9)]))
        .unwrap();

    let (channel, args) = outgoing.next().await.unwrap();
    assert_eq!(channel, "BROKEN_RESPONSE_9");
    assert_eq!(args.len(), 1);
    let err = SerializedError::from_value(args[0].clone()).unwrap();
    assert_eq!(err, SerializedError::new("broken").with_name("TypeError"));
}

#[async_std::test]
async fn latest_handler_is_the_sole_responder() {
    let (inbound_tx, inbound_rx) = unbounded();
    let transport = Arc::new(TestTransport::loopback(inbound_tx));
    let (ipc, handler) = Ipc::new(transport, inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    ipc.handle("WHO", |_, _| async { Ok::<_, HandlerError>(json!("first")) })
        .await
        .unwrap();
    ipc.handle("WHO", |_, _| async { Ok::<_, HandlerError>(json!("second")) })
        .await
        .unwrap();

    let who: String = ipc.invoke("WHO", vec![]).await.unwrap();
    assert_eq!(who, "second");
}

#[async_std::test]
async fn unhandled_messages_are_yielded() {
    let (transport, _outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (_ipc, mut handler) =
        Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());

    let msg = InboundMessage::new("SOMETHING_ELSE", vec![json!(1)]).with_sender(2);
    inbound_tx.unbounded_send(msg.clone()).unwrap();
    assert_eq!(handler.next().await, Some(msg));
    assert_eq!(handler.pending_calls(), 0);
}

#[async_std::test]
async fn pending_calls_fail_once_inbound_closes() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (ipc, handler) = Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    let call = ipc.invoke::<Value>("NEVER", vec![]);
    let host = async {
        outgoing.next().await.unwrap();
        drop(inbound_tx);
    };
    let (resp, ()) = futures::join!(call, host);
    assert!(matches!(resp, Err(IpcError::ChannelClosed(_))));
}

#[async_std::test]
async fn calls_without_request_id_are_answered() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded();
    let (ipc, handler) = Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());
    spawn_handler(handler);

    ipc.handle("TITLE", |event: IpcEvent, args: Vec<Value>| async move {
        assert_eq!(event.request_id, None);
        Ok::<_, HandlerError>(json!(args.len()))
    })
    .await
    .unwrap();

    inbound_tx
        .unbounded_send(InboundMessage::new(
            "TITLE",
            vec![Value::Null, json!("a"), json!("b")],
        ))
        .unwrap();

    let (channel, args) = outgoing.next().await.unwrap();
    assert_eq!(channel, "TITLE_RESPONSE_null");
    assert_eq!(args, vec![Value::Null, json!(2)]);
}

#[async_std::test]
async fn calls_after_inbound_closed_fail_without_being_sent() {
    let (transport, mut outgoing) = TestTransport::host();
    let (inbound_tx, inbound_rx) = unbounded::<InboundMessage>();
    let (ipc, mut handler) =
        Ipc::new(Arc::new(transport), inbound_rx, &RendererConfig::default());

    drop(inbound_tx);
    // let the handler observe the end of the inbound stream
    assert!(futures::poll!(handler.next()).is_pending());
    spawn_handler(handler);

    let resp = ipc.invoke::<Value>("LATE", vec![]).await;
    assert!(matches!(resp, Err(IpcError::ChannelClosed(_))));
    // nothing went over the wire
    assert!(outgoing.try_next().is_err());
}

#[test]
fn invoke_sync_round_trip() {
    let (transport, _outgoing) = TestTransport::host();
    let transport = Arc::new(transport.sync_responder(|channel, args| match channel {
        "GET_URL" => vec![Value::Null, json!("https://example.com/")],
        _ => vec![json!({"message": format!("unknown {}", args.len()), "name": "Error"})],
    }));
    let (_inbound_tx, inbound_rx) = unbounded::<InboundMessage>();
    let (ipc, _handler) = Ipc::new(transport.clone(), inbound_rx, &RendererConfig::default());

    let url: String = ipc.invoke_sync("GET_URL", vec![json!(1)]).unwrap();
    assert_eq!(url, "https://example.com/");

    match ipc.invoke_sync::<Value>("WHAT", vec![json!(1), json!(2)]) {
        Err(IpcError::Remote(err)) => {
            assert_eq!(err.message(), "unknown 3");
            assert_eq!(err.name(), Some("Error"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    // synchronous calls carry `null` instead of a request id
    let calls = transport.sync_calls.lock().unwrap();
    assert_eq!(calls[0], ("GET_URL".to_string(), vec![Value::Null, json!(1)]));
}
