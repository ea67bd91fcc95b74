//! Registry of channel handlers and their webhook transforms.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::handler::ChannelHandler;
use crate::transform::ChannelTransform;

pub struct ChannelRegistry {
    handlers: HashMap<String, Arc<dyn ChannelHandler>>,
    transforms: HashMap<String, Arc<dyn ChannelTransform>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            transforms: HashMap::new(),
        }
    }

    /// Register a handler/transform pair. A channel registered twice is
    /// replaced.
    pub fn register(
        &mut self,
        handler: Arc<dyn ChannelHandler>,
        transform: Arc<dyn ChannelTransform>,
    ) {
        let name = handler.name().to_string();
        info!(channel = %name, "registering channel");
        self.handlers.insert(name.clone(), handler);
        self.transforms.insert(name, transform);
    }

    pub fn handler(&self, channel: &str) -> Option<Arc<dyn ChannelHandler>> {
        self.handlers.get(channel).cloned()
    }

    pub fn transform(&self, channel: &str) -> Option<Arc<dyn ChannelTransform>> {
        self.transforms.get(channel).cloned()
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run every handler's `setup`. Failures are logged, not fatal: one
    /// channel failing to register its webhook must not take the rest down.
    pub async fn setup_all(&self) {
        for (name, handler) in &self.handlers {
            if let Err(e) = handler.setup().await {
                warn!(channel = %name, error = %e, "channel setup failed");
            }
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
