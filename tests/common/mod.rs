#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::Value;
use url::Url;

use scriptoxide::error::{ScriptError, TransportError};
use scriptoxide::injector::frame::WebFrame;
use scriptoxide::injector::world::{IsolatedWorld, WorldId};
use scriptoxide::transport::{InboundMessage, Transport};
use scriptoxide::types::InjectionSource;
use scriptoxide::IpcHandler;

type SyncResponder = Box<dyn Fn(&str, Vec<Value>) -> Vec<Value> + Send + Sync>;

#[derive(Debug)]
enum Route {
    /// Everything sent ends up with the test acting as the host
    Host(UnboundedSender<(String, Vec<Value>)>),
    /// Everything sent is delivered back to the sending renderer
    Loopback(UnboundedSender<InboundMessage>),
}

/// A transport that records everything it is asked to deliver.
pub struct TestTransport {
    route: Route,
    sync_responder: Option<SyncResponder>,
    pub broadcasts: Mutex<Vec<(u64, String, Vec<Value>)>>,
    pub sync_calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl TestTransport {
    pub fn host() -> (Self, UnboundedReceiver<(String, Vec<Value>)>) {
        let (tx, rx) = unbounded();
        (Self::with_route(Route::Host(tx)), rx)
    }

    pub fn loopback(inbound: UnboundedSender<InboundMessage>) -> Self {
        Self::with_route(Route::Loopback(inbound))
    }

    pub fn sync_responder(
        mut self,
        f: impl Fn(&str, Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    ) -> Self {
        self.sync_responder = Some(Box::new(f));
        self
    }

    fn with_route(route: Route) -> Self {
        Self {
            route,
            sync_responder: None,
            broadcasts: Default::default(),
            sync_calls: Default::default(),
        }
    }
}

impl fmt::Debug for TestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTransport")
            .field("route", &self.route)
            .finish()
    }
}

impl Transport for TestTransport {
    fn send(&self, channel: &str, args: Vec<Value>) -> Result<(), TransportError> {
        let res = match self.route {
            Route::Host(ref tx) => tx.unbounded_send((channel.to_string(), args)).is_ok(),
            Route::Loopback(ref tx) => tx
                .unbounded_send(InboundMessage::new(channel, args))
                .is_ok(),
        };
        if res {
            Ok(())
        } else {
            Err(TransportError::new("disconnected"))
        }
    }

    fn send_sync(&self, channel: &str, args: Vec<Value>) -> Result<Vec<Value>, TransportError> {
        self.sync_calls
            .lock()
            .unwrap()
            .push((channel.to_string(), args.clone()));
        let responder = self
            .sync_responder
            .as_ref()
            .ok_or_else(|| TransportError::new("no sync responder"))?;
        Ok(responder(channel, args))
    }

    fn send_to_all(
        &self,
        web_contents_id: u64,
        channel: &str,
        args: Vec<Value>,
    ) -> Result<(), TransportError> {
        self.broadcasts
            .lock()
            .unwrap()
            .push((web_contents_id, channel.to_string(), args));
        Ok(())
    }
}

/// Drive the handler in the background, dropping unhandled messages.
pub fn spawn_handler(handler: IpcHandler) {
    async_std::task::spawn(handler.for_each(|_| async {}));
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Script {
        world: WorldId,
        url: String,
        code: String,
    },
    Css(String),
}

/// A frame that records what was injected into it.
///
/// Executed code evaluates to itself parsed as json, or to the code as string
/// if it isn't json. Code starting with `throw ` fails with the rest as
/// message.
#[derive(Debug)]
pub struct RecordingFrame {
    pub main_frame: bool,
    pub url: Url,
    pub events: Vec<FrameEvent>,
    pub world_names: HashMap<WorldId, String>,
    pub hidden: HashMap<String, Value>,
}

impl RecordingFrame {
    pub fn new(url: &str) -> Self {
        Self {
            main_frame: true,
            url: Url::parse(url).unwrap(),
            events: Vec::new(),
            world_names: HashMap::new(),
            hidden: HashMap::new(),
        }
    }

    pub fn sub_frame(url: &str) -> Self {
        Self {
            main_frame: false,
            ..Self::new(url)
        }
    }

    /// The code of all executed scripts in order
    pub fn scripts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|ev| match ev {
                FrameEvent::Script { code, .. } => Some(code.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl WebFrame for RecordingFrame {
    fn is_main_frame(&self) -> bool {
        self.main_frame
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn set_isolated_world_info(&mut self, world: &IsolatedWorld) {
        self.world_names
            .insert(world.id(), world.name().to_string());
    }

    fn set_hidden_value(&mut self, key: &str, value: Value) {
        self.hidden.insert(key.to_string(), value);
    }

    fn execute_in_isolated_world(
        &mut self,
        id: WorldId,
        sources: &[InjectionSource],
    ) -> Result<Value, ScriptError> {
        let mut result = Value::Null;
        for source in sources {
            self.events.push(FrameEvent::Script {
                world: id,
                url: source.url.clone(),
                code: source.code.clone(),
            });
            if let Some(msg) = source.code.strip_prefix("throw ") {
                return Err(ScriptError::new(msg).with_name("Error"));
            }
            result = serde_json::from_str(&source.code)
                .unwrap_or_else(|_| Value::String(source.code.clone()));
        }
        Ok(result)
    }

    fn insert_css(&mut self, css: &str) {
        self.events.push(FrameEvent::Css(css.to_string()));
    }
}

/// Route the crate's logs to the test output, safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
