use std::fmt;

use serde_json::Value;
use url::Url;

use scriptoxide_types::{
    result_channel, ContentScript, ExecuteScriptAck, ExecuteScriptRequest, ExtensionScripts,
    InjectionSource, RunAt,
};

use crate::config::RendererConfig;
use crate::error::{InjectError, PatternError};
use crate::injector::frame::WebFrame;
use crate::injector::pattern::{document_url, MatchPattern};
use crate::injector::world::{WorldId, WorldRegistry};
use crate::transport::{InboundMessage, Transport};

pub mod frame;
pub mod pattern;
pub mod world;

/// The points in the life of a document injections are scheduled on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DocumentLifecycle {
    /// The document element was created, nothing else was constructed yet
    Start,
    /// The DOM is complete, subresources may still be loading
    End,
    /// The `DOMContentLoaded` event fired
    DomContentLoaded,
}

impl From<RunAt> for DocumentLifecycle {
    fn from(run_at: RunAt) -> Self {
        match run_at {
            RunAt::DocumentStart => DocumentLifecycle::Start,
            RunAt::DocumentEnd => DocumentLifecycle::End,
            RunAt::DocumentIdle => DocumentLifecycle::DomContentLoaded,
        }
    }
}

/// A [`ContentScript`] whose match patterns were compiled.
///
/// Patterns that failed to compile are left out, they match nothing.
#[derive(Debug, Clone)]
pub struct CompiledContentScript {
    patterns: Vec<MatchPattern>,
    js: Vec<InjectionSource>,
    css: Vec<InjectionSource>,
    run_at: RunAt,
    all_frames: bool,
}

impl CompiledContentScript {
    /// Compiles every pattern of the script on its own.
    ///
    /// Returns the errors of the patterns that were left out.
    pub fn compile(script: &ContentScript) -> (Self, Vec<PatternError>) {
        let mut patterns = Vec::with_capacity(script.matches.len());
        let mut errors = Vec::new();
        for pattern in &script.matches {
            match MatchPattern::parse(pattern) {
                Ok(pattern) => patterns.push(pattern),
                Err(err) => errors.push(err),
            }
        }
        let compiled = Self {
            patterns,
            js: script.js.clone().unwrap_or_default(),
            css: script.css.clone().unwrap_or_default(),
            run_at: script.run_at.unwrap_or_default(),
            all_frames: script.all_frames,
        };
        (compiled, errors)
    }

    /// Whether any of the patterns matches the document at `url`
    pub fn matches(&self, url: &Url) -> bool {
        let url = document_url(url);
        self.patterns.iter().any(|p| p.matches(&url))
    }

    pub fn patterns(&self) -> &[MatchPattern] {
        &self.patterns
    }

    pub fn js(&self) -> &[InjectionSource] {
        &self.js
    }

    pub fn css(&self) -> &[InjectionSource] {
        &self.css
    }

    pub fn run_at(&self) -> RunAt {
        self.run_at
    }

    pub fn all_frames(&self) -> bool {
        self.all_frames
    }
}

#[derive(Debug)]
enum Injection {
    /// Runs inside the isolated world of the extension
    Scripts {
        extension_id: String,
        sources: Vec<InjectionSource>,
    },
    /// Inserted into the page's cascade, stylesheets aren't isolated
    Stylesheets(Vec<InjectionSource>),
}

#[derive(Debug)]
struct ScheduledInjection {
    trigger: DocumentLifecycle,
    injection: Injection,
}

/// Receives the errors of scheduled injections.
pub type InjectionErrorHook = Box<dyn FnMut(&InjectError)>;

/// Injects the code of extensions into the isolated worlds of a frame.
///
/// Declared content scripts are matched against the document once and then
/// wait for the [`DocumentLifecycle`] signal they were declared for. Requests
/// of the host to run code right away are served through
/// [`Injector::on_execute_script`].
///
/// Errors of scheduled injections have nobody to be reported to, they are
/// logged and handed to the hook installed with
/// [`Injector::on_injection_error`], if any.
pub struct Injector<F> {
    frame: F,
    worlds: WorldRegistry,
    /// Injections waiting for their lifecycle signal
    scheduled: Vec<ScheduledInjection>,
    execute_script_channel: String,
    on_error: Option<InjectionErrorHook>,
}

impl<F: WebFrame> Injector<F> {
    pub fn new(frame: F, config: &RendererConfig) -> Self {
        Self {
            frame,
            worlds: WorldRegistry::new(config),
            scheduled: Vec::new(),
            execute_script_channel: config.execute_script_channel().to_string(),
            on_error: None,
        }
    }

    pub fn frame(&self) -> &F {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut F {
        &mut self.frame
    }

    pub fn worlds(&self) -> &WorldRegistry {
        &self.worlds
    }

    /// Number of injections still waiting for their lifecycle signal
    pub fn scheduled(&self) -> usize {
        self.scheduled.len()
    }

    /// Install a hook that receives the errors of scheduled injections.
    pub fn on_injection_error(&mut self, hook: impl FnMut(&InjectError) + 'static) {
        self.on_error = Some(Box::new(hook));
    }

    /// Consume the content scripts the host declared at startup.
    ///
    /// Malformed patterns are reported and never match, the other patterns
    /// of the same declaration still apply.
    /// Returns the number of declarations that matched this frame.
    pub fn load(&mut self, preferences: Vec<ExtensionScripts>) -> usize {
        let mut matched = 0;
        for pref in preferences {
            for script in &pref.content_scripts {
                let (script, errors) = CompiledContentScript::compile(script);
                for err in errors {
                    tracing::warn!(
                        "Ignoring match pattern of {}: {}",
                        pref.extension_id,
                        err
                    );
                    self.report(err.into());
                }
                if self.inject(&pref.extension_id, &script) {
                    matched += 1;
                }
            }
        }
        matched
    }

    /// Schedule the content script of the extension if it applies to this
    /// frame.
    ///
    /// Returns `false` if the script doesn't apply.
    pub fn inject(&mut self, extension_id: &str, script: &CompiledContentScript) -> bool {
        if !self.frame.is_main_frame() && !script.all_frames {
            return false;
        }
        if !script.matches(self.frame.url()) {
            return false;
        }

        let trigger = DocumentLifecycle::from(script.run_at);
        if !script.js.is_empty() {
            self.scheduled.push(ScheduledInjection {
                trigger,
                injection: Injection::Scripts {
                    extension_id: extension_id.to_string(),
                    sources: script.js.clone(),
                },
            });
        }
        if !script.css.is_empty() {
            self.scheduled.push(ScheduledInjection {
                trigger,
                injection: Injection::Stylesheets(script.css.clone()),
            });
        }
        tracing::debug!("Scheduled content script of {} on {:?}", extension_id, trigger);
        true
    }

    /// The isolated world of the extension, allocated on first use.
    pub fn world_for(&mut self, extension_id: &str) -> Result<WorldId, InjectError> {
        Ok(self.worlds.world_for(extension_id)?.id())
    }

    /// Run `code` inside the isolated world of the extension right away.
    ///
    /// Resolves to whatever the code's last expression evaluated to.
    pub fn run_one_shot(
        &mut self,
        extension_id: &str,
        url: &str,
        code: &str,
    ) -> Result<Value, InjectError> {
        self.run_content_script(extension_id, &[InjectionSource::new(url, code)])
    }

    /// Fire every injection that waits for `event`.
    ///
    /// Each injection fires at most once. Returns the number of fired
    /// injections.
    pub fn on_lifecycle(&mut self, event: DocumentLifecycle) -> usize {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|s| s.trigger == event);
        self.scheduled = waiting;

        tracing::trace!("{:?}: firing {} injections", event, due.len());
        let fired = due.len();
        for scheduled in due {
            self.fire(scheduled.injection);
        }
        fired
    }

    /// Serve a request of the host to run code on behalf of an extension and
    /// broadcast the acknowledgement back to the sender.
    pub fn on_execute_script(
        &mut self,
        req: ExecuteScriptRequest,
        transport: &dyn Transport,
    ) -> Result<(), InjectError> {
        let (result, error) = match self.run_one_shot(&req.extension_id, &req.url, &req.code) {
            Ok(result) => (result, None),
            Err(err) => {
                tracing::debug!("Execute script {} failed: {}", req.request_id, err);
                (Value::Null, Some(err.to_serialized()))
            }
        };
        let ack = ExecuteScriptAck {
            request_id: req.request_id,
            result,
            error,
        };
        let channel = result_channel(&self.execute_script_channel, req.request_id);
        transport.send_to_all(req.sender_id, &channel, ack.into_args()?)?;
        Ok(())
    }

    /// Handle `msg` if it arrived on the execute script channel.
    ///
    /// Returns `false` for messages on any other channel.
    pub fn on_message(
        &mut self,
        msg: &InboundMessage,
        transport: &dyn Transport,
    ) -> Result<bool, InjectError> {
        if msg.channel != self.execute_script_channel {
            return Ok(false);
        }
        let req = ExecuteScriptRequest::from_args(msg.args.clone())?;
        self.on_execute_script(req, transport)?;
        Ok(true)
    }

    fn run_content_script(
        &mut self,
        extension_id: &str,
        sources: &[InjectionSource],
    ) -> Result<Value, InjectError> {
        let world = self.worlds.world_for(extension_id)?;
        // the world's bootstrap looks up its owner under this key
        self.frame
            .set_hidden_value(&world.owner_key(), Value::from(extension_id));
        self.frame.set_isolated_world_info(world);
        Ok(self.frame.execute_in_isolated_world(world.id(), sources)?)
    }

    fn fire(&mut self, injection: Injection) {
        match injection {
            Injection::Scripts {
                extension_id,
                sources,
            } => {
                for source in &sources {
                    if let Err(err) =
                        self.run_content_script(&extension_id, std::slice::from_ref(source))
                    {
                        tracing::warn!("Content script {} failed: {}", source.url, err);
                        self.report(err);
                    }
                }
            }
            Injection::Stylesheets(css) => {
                for source in &css {
                    self.frame.insert_css(&source.code);
                }
            }
        }
    }

    fn report(&mut self, err: InjectError) {
        if let Some(hook) = self.on_error.as_mut() {
            hook(&err);
        }
    }
}

impl<F: fmt::Debug> fmt::Debug for Injector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("frame", &self.frame)
            .field("worlds", &self.worlds)
            .field("scheduled", &self.scheduled)
            .field("execute_script_channel", &self.execute_script_channel)
            .finish()
    }
}
