use std::fmt;

use fnv::FnvHashMap;

use crate::config::RendererConfig;
use crate::error::InjectError;

/// Identifier of a context for JavaScript execution inside a frame.
///
/// `0` is the main world of the document, extension worlds start at
/// [`crate::config::ISOLATED_WORLD_EXTENSIONS`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorldId(i32);

impl WorldId {
    /// The world the page's own scripts run in
    pub const MAIN: WorldId = WorldId(0);

    pub fn new(id: i32) -> Self {
        WorldId(id)
    }

    pub fn get(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An execution context that shares the document with the page but has its
/// own global object.
///
/// Each extension gets exactly one isolated world, page scripts can't observe
/// the state of extension scripts and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedWorld {
    id: WorldId,
    extension_id: String,
    /// `<extension id> [<world id>]`, only used for diagnostics
    name: String,
}

impl IsolatedWorld {
    fn new(id: WorldId, extension_id: impl Into<String>) -> Self {
        let extension_id = extension_id.into();
        let name = format!("{} [{}]", extension_id, id);
        Self {
            id,
            extension_id,
            name,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn extension_id(&self) -> &str {
        &self.extension_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the hidden value the world's bootstrap reads its owner from
    pub fn owner_key(&self) -> String {
        owner_key(self.id)
    }
}

/// `extension-<world id>`
pub fn owner_key(id: WorldId) -> String {
    format!("extension-{}", id)
}

/// Hands out one isolated world per extension.
///
/// Ids come from a counter that is never reset and freed ids are never
/// reused, worlds live as long as the renderer process.
#[derive(Debug, Clone)]
pub struct WorldRegistry {
    /// `None` once the id range is used up
    next_id: Option<i32>,
    max_worlds: Option<u32>,
    worlds: FnvHashMap<String, IsolatedWorld>,
    owners: FnvHashMap<WorldId, String>,
}

impl WorldRegistry {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            next_id: Some(config.world_id_base()),
            max_worlds: config.max_worlds(),
            worlds: Default::default(),
            owners: Default::default(),
        }
    }

    /// Returns the world of the extension, allocating it on first use.
    pub fn world_for(&mut self, extension_id: &str) -> Result<&IsolatedWorld, InjectError> {
        if !self.worlds.contains_key(extension_id) {
            let id = self.next_world_id()?;
            tracing::debug!("Allocated isolated world {} for {}", id, extension_id);
            self.owners.insert(id, extension_id.to_string());
            self.worlds.insert(
                extension_id.to_string(),
                IsolatedWorld::new(id, extension_id),
            );
        }
        Ok(&self.worlds[extension_id])
    }

    /// The world of the extension, if one was allocated
    pub fn get(&self, extension_id: &str) -> Option<&IsolatedWorld> {
        self.worlds.get(extension_id)
    }

    /// The extension that owns the world `id`
    pub fn extension_for(&self, id: WorldId) -> Option<&str> {
        self.owners.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IsolatedWorld> + '_ {
        self.worlds.values()
    }

    fn next_world_id(&mut self) -> Result<WorldId, InjectError> {
        let exhausted = InjectError::WorldsExhausted {
            allocated: self.worlds.len(),
        };
        if let Some(max) = self.max_worlds {
            if self.worlds.len() >= max as usize {
                return Err(exhausted);
            }
        }
        let id = self.next_id.ok_or(exhausted)?;
        self.next_id = id.checked_add(1);
        Ok(WorldId(id))
    }
}
