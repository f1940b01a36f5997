//! JSON response rendering.
//!
//! The renderer is itself an injected value, registered as a Constant
//! binding under [`RENDERER_BINDING`]. The dispatcher resolves it per
//! response, so a scoped override can swap rendering behavior for a test
//! or a single request flow without touching the dispatcher.

use crate::error::Error;
use crate::producer::Producer;
use crate::registry::Registry;

/// Binding name the dispatcher resolves to render response data.
pub const RENDERER_BINDING: &str = "json_renderer";

/// Renders JSON response bodies.
#[derive(Debug, Clone)]
pub struct JsonRenderer {
    pretty: bool,
}

impl JsonRenderer {
    /// Create a renderer. `pretty` renders indented output with sorted
    /// keys; otherwise output is compact.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Render JSON-serializable data.
    pub fn render(&self, data: &serde_json::Value) -> Result<Vec<u8>, Error> {
        let rendered = if self.pretty {
            serde_json::to_vec_pretty(data)
        } else {
            serde_json::to_vec(data)
        };
        rendered.map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Register the renderer as a Constant binding.
pub fn register(registry: &Registry, pretty: bool) -> Result<(), Error> {
    registry.register(RENDERER_BINDING, Producer::constant(JsonRenderer::new(pretty)))?;
    Ok(())
}
