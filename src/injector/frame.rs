use serde_json::Value;
use url::Url;

use scriptoxide_types::InjectionSource;

use crate::error::ScriptError;
use crate::injector::world::{IsolatedWorld, WorldId};

/// The frame of the document this renderer hosts.
///
/// A frame may have any number of isolated worlds next to its main world.
pub trait WebFrame {
    /// Whether this is the top level frame of the page
    fn is_main_frame(&self) -> bool;

    /// The url of the loaded document
    fn url(&self) -> &Url;

    /// Configures the world before code is executed in it.
    fn set_isolated_world_info(&mut self, world: &IsolatedWorld);

    /// Stores a value in the frame that is invisible to page script.
    fn set_hidden_value(&mut self, key: &str, value: Value);

    /// Runs `sources` in order inside the world `id`.
    ///
    /// Resolves to what the last expression evaluated to.
    fn execute_in_isolated_world(
        &mut self,
        id: WorldId,
        sources: &[InjectionSource],
    ) -> Result<Value, ScriptError>;

    /// Adds a stylesheet to the page's cascade.
    fn insert_css(&mut self, css: &str);
}
