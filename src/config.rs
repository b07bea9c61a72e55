use std::borrow::Cow;

use scriptoxide_types::EXECUTE_SCRIPT_CHANNEL;

/// Start of the extension isolated world ids.
///
/// Everything below is reserved for the main world of the document and other
/// embedders.
pub const ISOLATED_WORLD_EXTENSIONS: i32 = 1 << 20;

#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// The first id handed out to an extension's isolated world.
    world_id_base: i32,
    /// Upper limit of isolated worlds allocated in this process, unlimited if
    /// `None`.
    ///
    /// Ids are never reused, so this bounds the ids in use to
    /// `world_id_base..world_id_base + max_worlds`.
    max_worlds: Option<u32>,
    /// The channel the host sends execute script requests on.
    execute_script_channel: Cow<'static, str>,
    /// Capacity of the channel between the `Ipc` handles and the driving
    /// `IpcHandler`.
    request_capacity: usize,
}

impl RendererConfig {
    pub fn builder() -> RendererConfigBuilder {
        RendererConfigBuilder::default()
    }

    pub fn world_id_base(&self) -> i32 {
        self.world_id_base
    }

    pub fn max_worlds(&self) -> Option<u32> {
        self.max_worlds
    }

    pub fn execute_script_channel(&self) -> &str {
        &self.execute_script_channel
    }

    pub fn request_capacity(&self) -> usize {
        self.request_capacity
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            world_id_base: ISOLATED_WORLD_EXTENSIONS,
            max_worlds: None,
            execute_script_channel: EXECUTE_SCRIPT_CHANNEL.into(),
            request_capacity: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RendererConfigBuilder {
    world_id_base: i32,
    max_worlds: Option<u32>,
    execute_script_channel: Cow<'static, str>,
    request_capacity: usize,
}

impl Default for RendererConfigBuilder {
    fn default() -> Self {
        let config = RendererConfig::default();
        Self {
            world_id_base: config.world_id_base,
            max_worlds: config.max_worlds,
            execute_script_channel: config.execute_script_channel,
            request_capacity: config.request_capacity,
        }
    }
}

impl RendererConfigBuilder {
    pub fn world_id_base(mut self, base: i32) -> Self {
        self.world_id_base = base;
        self
    }

    pub fn max_worlds(mut self, max: u32) -> Self {
        self.max_worlds = Some(max);
        self
    }

    pub fn execute_script_channel(mut self, channel: impl Into<Cow<'static, str>>) -> Self {
        self.execute_script_channel = channel.into();
        self
    }

    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity;
        self
    }

    pub fn build(self) -> std::result::Result<RendererConfig, String> {
        if self.world_id_base <= 0 {
            return Err(format!(
                "World id base must be positive, got {}",
                self.world_id_base
            ));
        }
        if let Some(max) = self.max_worlds {
            if i64::from(self.world_id_base) + i64::from(max) > i64::from(i32::MAX) {
                return Err(format!(
                    "{} worlds starting at {} exceed the world id range",
                    max, self.world_id_base
                ));
            }
        }
        if self.execute_script_channel.is_empty() {
            return Err("Execute script channel must not be empty".to_string());
        }

        Ok(RendererConfig {
            world_id_base: self.world_id_base,
            max_worlds: self.max_worlds,
            execute_script_channel: self.execute_script_channel,
            request_capacity: self.request_capacity,
        })
    }
}
