use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The channel the host uses to ask a renderer to run code on behalf of an
/// extension API call (`chrome.tabs.executeScript`).
pub const EXECUTE_SCRIPT_CHANNEL: &str = "CHROME_TABS_EXECUTESCRIPT";

/// Identifier of a single outgoing call.
///
/// [`RequestId`]s are allocated from a counter that only ever increases for the
/// lifetime of the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl RequestId {
    pub fn new(id: u64) -> Self {
        RequestId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// The channel a reply to the request `id` issued on `channel` is sent on:
/// `<channel>_RESPONSE_<id>`
pub fn response_channel(channel: &str, id: RequestId) -> String {
    format!("{}_RESPONSE_{}", channel, id.0)
}

/// The channel a reply to a synchronous request on `channel` is sent on,
/// those carry no request id: `<channel>_RESPONSE_null`
pub fn sync_response_channel(channel: &str) -> String {
    format!("{}_RESPONSE_null", channel)
}

/// The channel an acknowledgement for a push style request is broadcast on:
/// `<channel>_RESULT_<id>`
pub fn result_channel(channel: &str, id: RequestId) -> String {
    format!("{}_RESULT_{}", channel, id.0)
}

/// `CHROME_TABS_EXECUTESCRIPT_RESULT_<id>`
pub fn execute_script_result_channel(id: RequestId) -> String {
    result_channel(EXECUTE_SCRIPT_CHANNEL, id)
}

/// An error in a form that can cross the process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedError {
    /// Error Message
    pub message: String,
    /// The kind of the error, like `TypeError`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stack trace text, if the origin had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            stack: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Reads the error slot of a frame.
    ///
    /// A bare string is accepted as the message of an unnamed error.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        match value {
            Value::String(message) => Ok(Self::new(message)),
            value => serde_json::from_value(value),
        }
    }
}

impl fmt::Display for SerializedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.name {
            write!(f, "{}: {}", name, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// A request frame: `(requestId, ...args)` sent on `channel`
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub channel: Cow<'static, str>,
    pub id: RequestId,
    pub args: Vec<Value>,
}

impl RequestFrame {
    pub fn new(channel: impl Into<Cow<'static, str>>, id: RequestId, args: Vec<Value>) -> Self {
        Self {
            channel: channel.into(),
            id,
            args,
        }
    }

    /// The positional arguments as they go over the wire
    pub fn into_args(self) -> Vec<Value> {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(Value::from(self.id.0));
        args.extend(self.args);
        args
    }

    /// Splits the leading request id off the positional arguments received on
    /// `channel`.
    pub fn from_args(
        channel: impl Into<Cow<'static, str>>,
        mut args: Vec<Value>,
    ) -> serde_json::Result<Self> {
        if args.is_empty() {
            return Err(serde::de::Error::custom("missing request id"));
        }
        let id = serde_json::from_value(args.remove(0))?;
        Ok(Self::new(channel, id, args))
    }
}

/// The reply to a [`RequestFrame`]: `(error|null, result?)`
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    /// The reason why the call failed.
    pub error: Option<SerializedError>,
    /// The response payload, `null` if absent.
    pub result: Value,
}

impl ResponseFrame {
    pub fn ok(result: Value) -> Self {
        Self {
            error: None,
            result,
        }
    }

    pub fn err(error: SerializedError) -> Self {
        Self {
            error: Some(error),
            result: Value::Null,
        }
    }

    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Interprets the positional arguments of a reply.
    ///
    /// An absent or `null` error slot means the call succeeded.
    pub fn from_args(args: Vec<Value>) -> serde_json::Result<Self> {
        let mut args = args.into_iter();
        let error = match args.next() {
            None | Some(Value::Null) => None,
            Some(error) => Some(SerializedError::from_value(error)?),
        };
        let result = args.next().unwrap_or(Value::Null);
        Ok(Self { error, result })
    }

    pub fn into_args(self) -> serde_json::Result<Vec<Value>> {
        match self.error {
            Some(error) => Ok(vec![serde_json::to_value(error)?]),
            None => Ok(vec![Value::Null, self.result]),
        }
    }
}

/// When a content script is injected into the document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum RunAt {
    DocumentStart,
    DocumentEnd,
    /// Also used for every value that isn't recognized.
    DocumentIdle,
}

impl Default for RunAt {
    fn default() -> Self {
        RunAt::DocumentIdle
    }
}

impl From<String> for RunAt {
    fn from(s: String) -> Self {
        match s.as_str() {
            "document_start" => RunAt::DocumentStart,
            "document_end" => RunAt::DocumentEnd,
            _ => RunAt::DocumentIdle,
        }
    }
}

/// A single piece of code or css to inject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionSource {
    pub url: String,
    pub code: String,
}

impl InjectionSource {
    pub fn new(url: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            code: code.into(),
        }
    }
}

/// A content script declared in an extension manifest.
///
/// See <https://developer.chrome.com/extensions/content_scripts>
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentScript {
    /// The match patterns of the pages this script applies to
    pub matches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<Vec<InjectionSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<Vec<InjectionSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<RunAt>,
    /// Whether sub frames receive the injection too
    #[serde(default)]
    pub all_frames: bool,
}

/// The content scripts of a single extension, as delivered by the host at
/// startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionScripts {
    pub extension_id: String,
    #[serde(default)]
    pub content_scripts: Vec<ContentScript>,
}

/// A request of the host to run `code` inside the isolated world of an
/// extension, received as `(senderId, requestId, extensionId, url, code)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteScriptRequest {
    /// The web contents that asked for the execution
    pub sender_id: u64,
    pub request_id: RequestId,
    pub extension_id: String,
    pub url: String,
    pub code: String,
}

impl ExecuteScriptRequest {
    pub fn from_args(args: Vec<Value>) -> serde_json::Result<Self> {
        // the derived impl accepts the fields in sequence form
        serde_json::from_value(Value::Array(args))
    }

    pub fn into_args(self) -> Vec<Value> {
        vec![
            Value::from(self.sender_id),
            Value::from(self.request_id.0),
            Value::from(self.extension_id),
            Value::from(self.url),
            Value::from(self.code),
        ]
    }
}

/// One way acknowledgement of an [`ExecuteScriptRequest`].
///
/// This is broadcast to the sender and never awaited by the renderer, so it is
/// not a [`ResponseFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteScriptAck {
    pub request_id: RequestId,
    /// Whatever the last expression of the executed code evaluated to
    pub result: Value,
    /// The exception thrown by the executed code, if any
    pub error: Option<SerializedError>,
}

impl ExecuteScriptAck {
    /// Positional arguments: `(result)` or `(null, error)`
    pub fn into_args(self) -> serde_json::Result<Vec<Value>> {
        match self.error {
            Some(error) => Ok(vec![Value::Null, serde_json::to_value(error)?]),
            None => Ok(vec![self.result]),
        }
    }

    pub fn from_args(request_id: RequestId, args: Vec<Value>) -> serde_json::Result<Self> {
        let mut args = args.into_iter();
        let result = args.next().unwrap_or(Value::Null);
        let error = match args.next() {
            None | Some(Value::Null) => None,
            Some(error) => Some(SerializedError::from_value(error)?),
        };
        Ok(Self {
            request_id,
            result,
            error,
        })
    }
}
